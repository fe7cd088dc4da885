//! Service layer: store client, platform adapter, and the engines built on
//! top of them.

pub mod gateway;
pub mod metadata;
pub mod platform;
pub mod revival;
pub mod scheduler;
pub mod scores;
pub mod store;
pub mod surfaces;

pub use gateway::InteractionGateway;
pub use metadata::{LoadedMetadata, MetadataRepository};
pub use revival::{RevivalEngine, RevivalReport};
pub use scheduler::ResultsScheduler;
