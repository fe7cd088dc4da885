//! Metadata Repository
//!
//! Typed view over the Metadata tab: one live row per entity linking its
//! thread and surface message ids. The repository owns the in-memory
//! validated view for the process lifetime; it is rebuilt from the store on
//! every restart, never diffed against a previous run.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::records::{
    MetadataRecord, RowValidity, METADATA_HEADER, METADATA_TAB, VOTES_HEADER, VOTES_TAB,
};
use crate::services::store::SheetStore;
use crate::utils::error::BotResult;

/// Range holding metadata data rows (header lives in row 1)
const METADATA_RANGE: &str = "A2:D";

/// Result of `load_all`: the usable sequence plus the count of rows that were
/// excluded (and left in the store for manual correction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedMetadata {
    pub usable: Vec<MetadataRecord>,
    pub skipped: usize,
}

/// Repository over the Metadata tab plus the shared set of entities waiting
/// for a results surface to be (re)created.
pub struct MetadataRepository {
    store: Arc<dyn SheetStore>,
    records: Mutex<Vec<MetadataRecord>>,
    pending_results: Mutex<HashSet<String>>,
}

impl MetadataRepository {
    pub fn new(store: Arc<dyn SheetStore>) -> Self {
        Self {
            store,
            records: Mutex::new(Vec::new()),
            pending_results: Mutex::new(HashSet::new()),
        }
    }

    /// Verify the Votes and Metadata tabs carry their expected header rows,
    /// creating or correcting them when they do not.
    pub async fn ensure_headers(&self) -> BotResult<()> {
        self.ensure_header(VOTES_TAB, &VOTES_HEADER).await?;
        self.ensure_header(METADATA_TAB, &METADATA_HEADER).await?;
        Ok(())
    }

    async fn ensure_header(&self, tab: &str, header: &[&str]) -> BotResult<()> {
        let range = format!("A1:{}1", (b'A' + (header.len() - 1) as u8) as char);
        let rows = self.store.read(tab, &range).await?;
        let expected: Vec<String> = header.iter().map(|s| s.to_string()).collect();
        match rows.first() {
            None => {
                tracing::info!(tab, "header row missing; creating");
                self.store.append(tab, expected).await?;
            }
            Some(existing) if *existing != expected => {
                tracing::warn!(tab, "header row mismatch; correcting in place");
                let fields: Vec<(usize, String)> =
                    expected.into_iter().enumerate().collect();
                self.store.update(tab, 1, &fields).await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Load and classify every metadata row, in tab-row order.
    ///
    /// Unusable rows (missing thread or entity id) are counted and excluded,
    /// never repaired and never deleted. A store failure here is fatal to
    /// startup; no progress is possible without the metadata tab.
    pub async fn load_all(&self) -> BotResult<LoadedMetadata> {
        let rows = self.store.read(METADATA_TAB, METADATA_RANGE).await?;

        let mut usable = Vec::new();
        let mut skipped = 0usize;
        for (idx, row) in rows.iter().enumerate() {
            match MetadataRecord::classify_row(row) {
                RowValidity::Usable(record) => usable.push(record),
                RowValidity::Unusable { reason } => {
                    skipped += 1;
                    // Sheet row = data index + 2 (header row offset)
                    tracing::warn!(row = idx + 2, reason, "skipping unusable metadata row");
                }
            }
        }

        let entity_ids: Vec<&str> = usable.iter().map(|r| r.entity_id.as_str()).collect();
        tracing::info!(
            usable = usable.len(),
            skipped,
            entities = ?entity_ids,
            "metadata loaded"
        );

        *self.records.lock().await = usable.clone();
        Ok(LoadedMetadata { usable, skipped })
    }

    /// Insert-or-update the record keyed by `entity_id`.
    ///
    /// Partial update semantics: `None` message id fields keep whatever the
    /// live row already holds; only provided fields are written. Safe to call
    /// repeatedly with identical input.
    pub async fn upsert(&self, record: MetadataRecord) -> BotResult<()> {
        let rows = self.store.read(METADATA_TAB, METADATA_RANGE).await?;
        let existing = rows.iter().position(|row| {
            row.get(1).map(|cell| cell.trim()) == Some(record.entity_id.as_str())
        });

        match existing {
            Some(idx) => {
                let mut fields: Vec<(usize, String)> =
                    vec![(0, record.thread_id.to_string())];
                if let Some(id) = record.rating_message_id {
                    fields.push((2, id.to_string()));
                }
                if let Some(id) = record.results_message_id {
                    fields.push((3, id.to_string()));
                }
                self.store.update(METADATA_TAB, idx + 2, &fields).await?;
            }
            None => {
                self.store.append(METADATA_TAB, record.to_row()).await?;
            }
        }

        // Mirror into the in-memory view, retaining unprovided fields
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.entity_id == record.entity_id) {
            Some(current) => {
                current.thread_id = record.thread_id;
                if record.rating_message_id.is_some() {
                    current.rating_message_id = record.rating_message_id;
                }
                if record.results_message_id.is_some() {
                    current.results_message_id = record.results_message_id;
                }
            }
            None => records.push(record),
        }
        Ok(())
    }

    /// Snapshot of the validated in-memory view
    pub async fn tracked(&self) -> Vec<MetadataRecord> {
        self.records.lock().await.clone()
    }

    /// Look up one entity's record
    pub async fn get(&self, entity_id: &str) -> Option<MetadataRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.entity_id == entity_id)
            .cloned()
    }

    /// Queue an entity for results-surface creation on the next cycle
    pub async fn mark_results_pending(&self, entity_id: &str) {
        self.pending_results
            .lock()
            .await
            .insert(entity_id.to_string());
    }

    /// Entities currently waiting for a results surface
    pub async fn pending_results(&self) -> HashSet<String> {
        self.pending_results.lock().await.clone()
    }

    /// Clear an entity once its results surface exists again
    pub async fn clear_results_pending(&self, entity_id: &str) {
        self.pending_results.lock().await.remove(entity_id);
    }
}
