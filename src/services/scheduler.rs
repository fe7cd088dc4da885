//! Aggregation Scheduler
//!
//! Periodic recompute-and-republish of results surfaces. One cycle reads the
//! vote log fresh, compiles scores, and edits (or recreates) the results
//! message for every tracked entity. Ticks never overlap: a tick that lands
//! while a cycle is still running is skipped and logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::records::{
    CompiledScore, MetadataRecord, VoteRecord, COMPILED_TAB, VOTES_TAB,
};
use crate::services::metadata::MetadataRepository;
use crate::services::platform::ChatPlatform;
use crate::services::scores;
use crate::services::store::SheetStore;
use crate::services::surfaces;
use crate::utils::error::{BotError, BotResult};

/// Range holding vote data rows
const VOTES_RANGE: &str = "A2:E";
/// Range holding previously compiled score rows
const COMPILED_RANGE: &str = "A2:C";

pub struct ResultsScheduler {
    store: Arc<dyn SheetStore>,
    platform: Arc<dyn ChatPlatform>,
    repo: Arc<MetadataRepository>,
    interval: Duration,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl ResultsScheduler {
    pub fn new(
        store: Arc<dyn SheetStore>,
        platform: Arc<dyn ChatPlatform>,
        repo: Arc<MetadataRepository>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            repo,
            interval,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the periodic loop. The first tick fires after one full interval;
    /// startup publication is the revival engine's concern.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // immediate first tick, discard
            let mut in_flight: Option<JoinHandle<()>> = None;
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => {
                        tracing::info!("results scheduler stopping");
                        // The cycle checks the token between entities; wait
                        // for it so the current entity is never killed
                        // mid-write
                        if let Some(handle) = in_flight.take() {
                            if let Err(e) = handle.await {
                                tracing::warn!(error = %e, "results cycle task join failed");
                            }
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Some(handle) = scheduler.on_tick() {
                            in_flight = Some(handle);
                        }
                    }
                }
            }
        })
    }

    /// Request shutdown; a cycle in flight finishes its current entity.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn on_tick(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("results cycle still running; skipping this tick");
            return None;
        }
        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = scheduler.run_cycle().await {
                tracing::warn!(error = %e, "results cycle failed");
            }
            scheduler.running.store(false, Ordering::SeqCst);
        }))
    }

    /// One full recompute-and-republish pass.
    pub async fn run_cycle(&self) -> BotResult<()> {
        let scores = compile_current(self.store.as_ref()).await?;
        let tracked = self.repo.tracked().await;
        let pending = self.repo.pending_results().await;

        let mut updated = 0usize;
        let mut failed = 0usize;
        for record in &tracked {
            // Stop request: finish nothing further, current entity already done
            if self.cancel.is_cancelled() {
                tracing::info!("results cycle interrupted by shutdown");
                break;
            }
            let force_new = pending.contains(&record.entity_id);
            match self.refresh_entity(record, &scores, force_new).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!(entity = %record.entity_id, error = %e, "results refresh failed");
                }
            }
        }

        tracing::info!(updated, failed, tracked = tracked.len(), "results cycle complete");
        Ok(())
    }

    /// Refresh one entity's results surface. Returns `Ok(true)` when a message
    /// was edited or posted, `Ok(false)` when there was nothing to publish.
    async fn refresh_entity(
        &self,
        record: &MetadataRecord,
        scores: &[CompiledScore],
        force_new: bool,
    ) -> BotResult<bool> {
        let interval_mins = self.interval.as_secs() / 60;
        let payload = match surfaces::results_payload(scores, Some(&record.entity_id), interval_mins)
        {
            Ok(payload) => payload,
            // No scores yet for this entity; nothing to publish
            Err(BotError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        match record.results_message_id {
            Some(message_id) if !force_new => {
                match self
                    .platform
                    .edit_message(record.thread_id, message_id, &payload)
                    .await
                {
                    Ok(()) => Ok(true),
                    // Message deleted out from under us; fall through to repost
                    Err(BotError::SurfaceUnavailable(_)) => {
                        self.post_and_record(record, &payload).await
                    }
                    Err(e) => Err(e),
                }
            }
            _ => self.post_and_record(record, &payload).await,
        }
    }

    async fn post_and_record(
        &self,
        record: &MetadataRecord,
        payload: &crate::services::platform::MessagePayload,
    ) -> BotResult<bool> {
        let message_id = self.platform.post_message(record.thread_id, payload).await?;
        self.repo
            .upsert(MetadataRecord {
                thread_id: record.thread_id,
                entity_id: record.entity_id.clone(),
                rating_message_id: None,
                results_message_id: Some(message_id),
            })
            .await?;
        self.repo.clear_results_pending(&record.entity_id).await;
        Ok(true)
    }
}

/// Compile the current scores: the vote log read fresh and de-duplicated, or
/// the previously compiled tab (cache-eligible) when no votes exist yet.
pub async fn compile_current(store: &dyn SheetStore) -> BotResult<Vec<CompiledScore>> {
    let rows = store.read(VOTES_TAB, VOTES_RANGE).await?;
    let mut votes = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        match VoteRecord::from_row(row) {
            Some(vote) => votes.push(vote),
            None => {
                tracing::debug!(row = idx + 2, "skipping malformed vote row");
            }
        }
    }

    if votes.is_empty() {
        let rows = store.read(COMPILED_TAB, COMPILED_RANGE).await?;
        let mut compiled = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(score) = CompiledScore::from_row(row) {
                compiled.push(score);
            }
        }
        return Ok(compiled);
    }

    let deduped = scores::dedupe_votes(&votes);
    Ok(scores::compile(&deduped))
}
