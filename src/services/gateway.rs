//! Interaction Handlers
//!
//! The dispatch loop between platform events and bot behavior: `rate` and
//! `results` commands plus dropdown selection events. Runs as its own task;
//! every handler reports back to the invoking user with an ephemeral reply
//! and never propagates a failure out of the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::records::{MetadataRecord, VoteRecord, GLOBAL_RESULTS_KEY, VOTES_TAB};
use crate::services::metadata::MetadataRepository;
use crate::services::platform::{
    BotCommand, BotEvent, ChatPlatform, CommandInvocation, SelectionEvent,
};
use crate::services::scheduler;
use crate::services::store::SheetStore;
use crate::services::surfaces;
use crate::utils::error::{BotError, BotResult};

pub struct InteractionGateway {
    store: Arc<dyn SheetStore>,
    platform: Arc<dyn ChatPlatform>,
    repo: Arc<MetadataRepository>,
    results_interval: Duration,
}

impl InteractionGateway {
    pub fn new(
        store: Arc<dyn SheetStore>,
        platform: Arc<dyn ChatPlatform>,
        repo: Arc<MetadataRepository>,
        results_interval: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            repo,
            results_interval,
        }
    }

    /// Drain events until the channel closes or shutdown is requested.
    pub async fn run(&self, mut events: mpsc::Receiver<BotEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("interaction gateway stopping");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.dispatch(event).await,
                        None => {
                            tracing::info!("event channel closed; gateway exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, event: BotEvent) {
        match event {
            BotEvent::Command(invocation) => self.handle_command(invocation).await,
            BotEvent::Selection(selection) => self.handle_selection(selection).await,
        }
    }

    async fn handle_command(&self, invocation: CommandInvocation) {
        let token = invocation.interaction_token.clone();
        // Deferred ack first; the ephemeral reply completes it later
        if let Err(e) = self
            .platform
            .ack_interaction(&invocation.interaction_id, &token)
            .await
        {
            tracing::debug!(error = %e, "interaction ack failed");
        }
        let result = match invocation.command.clone() {
            BotCommand::Rate { entity_id } => {
                self.handle_rate(&entity_id, invocation.channel_id, &token)
                    .await
            }
            BotCommand::Results {
                entity_id,
                thread_id,
            } => {
                self.handle_results(
                    entity_id.as_deref(),
                    thread_id,
                    invocation.channel_id,
                    &token,
                )
                .await
            }
        };
        if let Err(e) = result {
            tracing::warn!(command = ?invocation.command, error = %e, "command failed");
            let text = user_facing_reply(&e);
            if let Err(e) = self.platform.reply_ephemeral(&token, text).await {
                tracing::debug!(error = %e, "failed to deliver error reply");
            }
        }
    }

    /// `/rate <entity>`: post the rating surface, or patch it in place when
    /// one already exists. Never creates a duplicate metadata row.
    async fn handle_rate(
        &self,
        entity_id: &str,
        channel_id: u64,
        token: &str,
    ) -> BotResult<()> {
        let payload = surfaces::rating_payload(entity_id);

        let existing = self.repo.get(entity_id).await;
        match existing {
            Some(record) => {
                let thread_id = record.thread_id;
                match record.rating_message_id {
                    Some(message_id) => {
                        match self.platform.edit_message(thread_id, message_id, &payload).await {
                            Ok(()) => {}
                            // Surface was deleted; fall back to a fresh post
                            Err(BotError::SurfaceUnavailable(_)) => {
                                let message_id =
                                    self.platform.post_message(thread_id, &payload).await?;
                                self.record_rating_surface(thread_id, entity_id, message_id)
                                    .await?;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    None => {
                        let message_id = self.platform.post_message(thread_id, &payload).await?;
                        self.record_rating_surface(thread_id, entity_id, message_id)
                            .await?;
                    }
                }
            }
            None => {
                let message_id = self.platform.post_message(channel_id, &payload).await?;
                self.record_rating_surface(channel_id, entity_id, message_id)
                    .await?;
                // New entity: its results surface appears on the next cycle
                self.repo.mark_results_pending(entity_id).await;
            }
        }

        self.platform
            .reply_ephemeral(token, &format!("Rating surface ready for **{}**.", entity_id))
            .await
    }

    async fn record_rating_surface(
        &self,
        thread_id: u64,
        entity_id: &str,
        message_id: u64,
    ) -> BotResult<()> {
        self.repo
            .upsert(MetadataRecord {
                thread_id,
                entity_id: entity_id.to_string(),
                rating_message_id: Some(message_id),
                results_message_id: None,
            })
            .await
    }

    /// Dropdown selection: append one vote row. Aggregation later keeps only
    /// the newest row per (user, entity, category).
    async fn handle_selection(&self, selection: SelectionEvent) {
        if let Err(e) = self
            .platform
            .ack_interaction(&selection.interaction_id, &selection.interaction_token)
            .await
        {
            tracing::debug!(error = %e, "interaction ack failed");
        }
        let vote = VoteRecord {
            user_id: selection.user_id.clone(),
            entity_id: selection.entity_id.clone(),
            category: selection.category,
            value: selection.value,
            timestamp: Utc::now(),
        };

        let reply = match self.store.append(VOTES_TAB, vote.to_row()).await {
            Ok(()) => format!(
                "You rated **{}** {}: {}",
                selection.entity_id, selection.category, selection.value
            ),
            Err(BotError::StoreUnavailable(_)) => {
                "Vote storage is busy right now; try again shortly.".to_string()
            }
            Err(e) => {
                tracing::warn!(entity = %selection.entity_id, error = %e, "vote append failed");
                "Could not record your vote.".to_string()
            }
        };

        if let Err(e) = self
            .platform
            .reply_ephemeral(&selection.interaction_token, &reply)
            .await
        {
            tracing::debug!(error = %e, "failed to deliver vote acknowledgement");
        }
    }

    /// `/results [entity] [thread]`: recompute and publish immediately,
    /// without waiting for the next scheduled cycle. An explicit thread
    /// argument moves the surface there even when one already exists.
    async fn handle_results(
        &self,
        entity_filter: Option<&str>,
        requested_thread: Option<u64>,
        channel_id: u64,
        token: &str,
    ) -> BotResult<()> {
        let scores = scheduler::compile_current(self.store.as_ref()).await?;
        let interval_mins = self.results_interval.as_secs() / 60;
        let payload = surfaces::results_payload(&scores, entity_filter, interval_mins)?;

        let key = entity_filter.unwrap_or(GLOBAL_RESULTS_KEY).to_string();
        let existing = self.repo.get(&key).await;

        match existing.and_then(|r| r.results_message_id.map(|id| (r.thread_id, id))) {
            Some((thread_id, message_id))
                if requested_thread.is_none() || requested_thread == Some(thread_id) =>
            {
                self.platform
                    .edit_message(thread_id, message_id, &payload)
                    .await?;
            }
            _ => {
                let destination = requested_thread.unwrap_or(channel_id);
                let message_id = self.platform.post_message(destination, &payload).await?;
                self.repo
                    .upsert(MetadataRecord {
                        thread_id: destination,
                        entity_id: key.clone(),
                        rating_message_id: None,
                        results_message_id: Some(message_id),
                    })
                    .await?;
                self.repo.clear_results_pending(&key).await;
            }
        }

        self.platform
            .reply_ephemeral(token, "Results updated.")
            .await
    }
}

/// Map an internal error onto the reply the invoking user sees.
fn user_facing_reply(err: &BotError) -> &'static str {
    match err {
        BotError::NotFound(_) => "No ratings found for that entity.",
        BotError::StoreUnavailable(_) => "The vote store is busy right now; try again shortly.",
        _ => "Something went wrong handling that command.",
    }
}
