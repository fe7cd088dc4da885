//! Chat Platform Boundary
//!
//! Trait definition for the consumed chat-platform capabilities: posting and
//! editing messages with component groups, fetching messages, restoring
//! threads, and receiving command/selection events. Adapters implement the
//! platform-specific transport.

pub mod discord;
pub mod socket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::records::{MessageId, RatingCategory, ThreadId};
use crate::utils::error::BotResult;

/// Resolved state of a conversation thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub archived: bool,
    pub locked: bool,
}

impl ThreadInfo {
    /// Whether the thread accepts edits without restoration
    pub fn is_open(&self) -> bool {
        !self.archived && !self.locked
    }
}

/// One interactive selection group (a dropdown) attached to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectGroup {
    /// Stable id so selections route after restarts, e.g. `rate:dino_raptor:Complexity`
    pub custom_id: String,
    pub placeholder: String,
    pub options: Vec<String>,
}

/// Renderable message content: an embed plus optional component groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePayload {
    pub title: String,
    pub body: String,
    /// (name, value) embed fields
    pub fields: Vec<(String, String)>,
    pub components: Vec<SelectGroup>,
}

// ---------------------------------------------------------------------------
// Incoming events
// ---------------------------------------------------------------------------

/// Slash-command invocation received from the platform
#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    /// Post the rating surface for an entity
    Rate { entity_id: String },
    /// Post or update a results surface, global or scoped to one entity
    Results {
        entity_id: Option<String>,
        thread_id: Option<ThreadId>,
    },
}

/// A command together with its invocation context
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub command: BotCommand,
    pub channel_id: ThreadId,
    pub user_id: String,
    /// Id for the initial interaction acknowledgement
    pub interaction_id: String,
    /// Token for the acknowledgement and the ephemeral follow-up reply
    pub interaction_token: String,
}

/// A dropdown selection carrying (user, message, chosen value)
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub entity_id: String,
    pub category: RatingCategory,
    pub value: u8,
    pub user_id: String,
    pub thread_id: ThreadId,
    pub message_id: MessageId,
    pub interaction_id: String,
    pub interaction_token: String,
}

/// Everything the event source forwards to the interaction handlers
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    Command(CommandInvocation),
    Selection(SelectionEvent),
}

// ---------------------------------------------------------------------------
// Platform trait
// ---------------------------------------------------------------------------

/// Chat platform capabilities consumed by the bot.
///
/// Implementations own the transport; errors map into the shared taxonomy
/// (`ThreadUnavailable`, `SurfaceUnavailable`, `BindingFailure`, …).
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Begin receiving command and selection events.
    ///
    /// Events are forwarded through the provided mpsc sender; the adapter
    /// spawns its own task for the event loop.
    async fn start(&self, event_tx: mpsc::Sender<BotEvent>) -> BotResult<()>;

    /// Stop the adapter gracefully.
    async fn stop(&self) -> BotResult<()>;

    /// Resolve a conversation thread by id.
    async fn fetch_thread(&self, thread_id: ThreadId) -> BotResult<ThreadInfo>;

    /// Unarchive/unlock a thread so its messages accept edits.
    async fn restore_thread(&self, thread_id: ThreadId) -> BotResult<()>;

    /// Verify a message exists and is reachable.
    async fn fetch_message(&self, thread_id: ThreadId, message_id: MessageId) -> BotResult<()>;

    /// Post a new message; returns the created message id.
    async fn post_message(&self, thread_id: ThreadId, payload: &MessagePayload)
        -> BotResult<MessageId>;

    /// Replace a message's content and components by id.
    async fn edit_message(
        &self,
        thread_id: ThreadId,
        message_id: MessageId,
        payload: &MessagePayload,
    ) -> BotResult<()>;

    /// Re-attach interactive component groups to an existing message.
    ///
    /// Binding is atomic per surface: on failure the message is left with its
    /// prior components, never a partial set.
    async fn bind_components(
        &self,
        thread_id: ThreadId,
        message_id: MessageId,
        groups: &[SelectGroup],
    ) -> BotResult<()>;

    /// Acknowledge an interaction with a deferred ephemeral response.
    ///
    /// Must happen before any slower work; the ephemeral follow-up then
    /// completes the deferral.
    async fn ack_interaction(&self, interaction_id: &str, interaction_token: &str)
        -> BotResult<()>;

    /// Ephemeral follow-up reply to an acknowledged interaction.
    async fn reply_ephemeral(&self, interaction_token: &str, text: &str) -> BotResult<()>;
}
