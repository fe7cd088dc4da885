//! Revival Engine
//!
//! Startup reconciliation: for every entity loaded from metadata, walk a
//! per-entity state machine that re-opens its thread, re-fetches its surface
//! messages, and re-binds the interactive rating components. Each entity
//! progresses independently; one failure never blocks the rest.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::models::records::MetadataRecord;
use crate::services::metadata::MetadataRepository;
use crate::services::platform::ChatPlatform;
use crate::services::surfaces::{self, SurfaceKind};
use crate::utils::error::BotResult;

/// Steps of the per-entity revival walk, in order. Recorded on failure so the
/// report says how far the entity got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevivalStep {
    ThreadCheck,
    ThreadRestore,
    SurfaceFetch,
    ComponentBind,
}

impl RevivalStep {
    fn describe(self) -> &'static str {
        match self {
            RevivalStep::ThreadCheck => "thread check",
            RevivalStep::ThreadRestore => "thread restore",
            RevivalStep::SurfaceFetch => "surface fetch",
            RevivalStep::ComponentBind => "component bind",
        }
    }
}

/// Terminal outcome for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
enum EntityOutcome {
    Revived,
    Failed { step: RevivalStep, reason: String },
}

/// Startup summary across all entities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevivalReport {
    pub revived: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RevivalReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct RevivalEngine {
    platform: Arc<dyn ChatPlatform>,
    repo: Arc<MetadataRepository>,
    concurrency: usize,
}

impl RevivalEngine {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        repo: Arc<MetadataRepository>,
        concurrency: usize,
    ) -> Self {
        Self {
            platform,
            repo,
            concurrency: concurrency.max(1),
        }
    }

    /// Revive every entity, at most `concurrency` in flight at once.
    pub async fn run(&self, records: Vec<MetadataRecord>) -> RevivalReport {
        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(records.len());

        for record in records {
            let platform = Arc::clone(&self.platform);
            let repo = Arc::clone(&self.repo);
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                // Semaphore is never closed while handles are alive
                let _permit = limiter.acquire_owned().await;
                let entity_id = record.entity_id.clone();
                let outcome = revive_entity(platform.as_ref(), &repo, record).await;
                (entity_id, outcome)
            }));
        }

        let mut report = RevivalReport::default();
        for handle in handles {
            match handle.await {
                Ok((entity_id, EntityOutcome::Revived)) => report.revived.push(entity_id),
                Ok((entity_id, EntityOutcome::Failed { step, reason })) => {
                    tracing::warn!(entity = %entity_id, step = step.describe(), reason, "revival failed");
                    report
                        .failed
                        .push((entity_id, format!("{}: {}", step.describe(), reason)));
                }
                Err(e) => {
                    tracing::error!(error = %e, "revival task panicked");
                }
            }
        }

        tracing::info!(
            revived = report.revived.len(),
            failed = report.failed.len(),
            entities = ?report.revived,
            "revival complete"
        );
        report
    }
}

/// Walk one entity through the revival steps.
async fn revive_entity(
    platform: &dyn ChatPlatform,
    repo: &MetadataRepository,
    record: MetadataRecord,
) -> EntityOutcome {
    let entity_id = record.entity_id.clone();

    // Thread check
    let thread = match platform.fetch_thread(record.thread_id).await {
        Ok(info) => info,
        Err(e) => {
            return EntityOutcome::Failed {
                step: RevivalStep::ThreadCheck,
                reason: e.to_string(),
            }
        }
    };

    // Thread restore, only when the platform idled it out
    if !thread.is_open() {
        tracing::debug!(entity = %entity_id, thread = record.thread_id, "re-opening idle thread");
        if let Err(e) = platform.restore_thread(record.thread_id).await {
            return EntityOutcome::Failed {
                step: RevivalStep::ThreadRestore,
                reason: e.to_string(),
            };
        }
    }

    // Rating surface: fetch it if known, recreate it if gone. A failure here
    // is recorded but does not end the walk; the results surface still gets
    // its own pass below.
    let rating_id = match ensure_rating_surface(platform, &record).await {
        Ok(id) => {
            if Some(id) != record.rating_message_id {
                let updated = MetadataRecord {
                    rating_message_id: Some(id),
                    results_message_id: None,
                    ..record.clone()
                };
                if let Err(e) = repo.upsert(updated).await {
                    tracing::warn!(entity = %entity_id, error = %e, "failed to persist recreated rating surface");
                }
            }
            Ok(id)
        }
        Err(e) => {
            tracing::warn!(entity = %entity_id, error = %e, "rating surface unavailable");
            Err(e)
        }
    };

    // Results surface: display-only, so a missing one is not fatal; the
    // aggregation cycle recreates it.
    match record.results_message_id {
        Some(id) => {
            if let Err(e) = platform.fetch_message(record.thread_id, id).await {
                tracing::debug!(entity = %entity_id, error = %e, "results surface gone; deferring to next cycle");
                repo.mark_results_pending(&entity_id).await;
            }
        }
        None => repo.mark_results_pending(&entity_id).await,
    }

    let rating_id = match rating_id {
        Ok(id) => id,
        Err(e) => {
            return EntityOutcome::Failed {
                step: RevivalStep::SurfaceFetch,
                reason: e.to_string(),
            }
        }
    };

    // Re-bind the rating dropdowns so selections reach this process
    let groups = SurfaceKind::Rating.components(&entity_id);
    if let Err(e) = platform
        .bind_components(record.thread_id, rating_id, &groups)
        .await
    {
        return EntityOutcome::Failed {
            step: RevivalStep::ComponentBind,
            reason: e.to_string(),
        };
    }

    tracing::debug!(entity = %entity_id, "revived");
    EntityOutcome::Revived
}

/// Fetch the recorded rating message, or post a fresh one when it is missing
/// or no longer fetchable. Returns the live message id.
async fn ensure_rating_surface(
    platform: &dyn ChatPlatform,
    record: &MetadataRecord,
) -> BotResult<crate::models::records::MessageId> {
    if let Some(id) = record.rating_message_id {
        match platform.fetch_message(record.thread_id, id).await {
            Ok(()) => return Ok(id),
            Err(e) => {
                tracing::debug!(entity = %record.entity_id, error = %e, "rating surface gone; recreating");
            }
        }
    }
    let payload = surfaces::rating_payload(&record.entity_id);
    platform.post_message(record.thread_id, &payload).await
}
