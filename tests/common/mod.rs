//! Shared in-memory fakes for integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use anthranks::services::platform::{
    BotEvent, ChatPlatform, MessagePayload, SelectGroup, ThreadInfo,
};
use anthranks::services::store::{Rows, SheetStore};
use anthranks::{BotError, BotResult};

/// Tab-backed store fake. Rows include the header; reads honor the two range
/// shapes the bot uses (header row vs data rows).
pub struct FakeStore {
    tabs: Mutex<HashMap<String, Rows>>,
    fail_reads: Mutex<HashMap<String, usize>>,
    gate: Option<Arc<Semaphore>>,
    pub read_count: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            tabs: Mutex::new(HashMap::new()),
            fail_reads: Mutex::new(HashMap::new()),
            gate: None,
            read_count: AtomicUsize::new(0),
        }
    }

    /// A store whose reads block until `release_reads` grants permits.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn seed_tab(&self, tab: &str, header: &[&str], rows: Vec<Vec<&str>>) {
        let mut all: Rows = vec![header.iter().map(|s| s.to_string()).collect()];
        all.extend(
            rows.into_iter()
                .map(|row| row.into_iter().map(|s| s.to_string()).collect::<Vec<_>>()),
        );
        self.tabs.lock().unwrap().insert(tab.to_string(), all);
    }

    pub fn rows(&self, tab: &str) -> Rows {
        self.tabs.lock().unwrap().get(tab).cloned().unwrap_or_default()
    }

    /// Make the next `count` reads of `tab` fail with `RateLimited`.
    pub fn fail_next_reads(&self, tab: &str, count: usize) {
        self.fail_reads.lock().unwrap().insert(tab.to_string(), count);
    }
}

#[async_trait]
impl SheetStore for FakeStore {
    async fn read(&self, tab: &str, range: &str) -> BotResult<Rows> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| BotError::internal("gate closed"))?;
            permit.forget();
        }
        self.read_count.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.fail_reads.lock().unwrap();
            if let Some(remaining) = failures.get_mut(tab) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BotError::RateLimited("quota exceeded".into()));
                }
            }
        }
        let rows = self.rows(tab);
        if range.starts_with("A1") {
            Ok(rows.into_iter().take(1).collect())
        } else {
            Ok(rows.into_iter().skip(1).collect())
        }
    }

    async fn append(&self, tab: &str, row: Vec<String>) -> BotResult<()> {
        self.tabs.lock().unwrap().entry(tab.to_string()).or_default().push(row);
        Ok(())
    }

    async fn update(
        &self,
        tab: &str,
        row_index: usize,
        fields: &[(usize, String)],
    ) -> BotResult<()> {
        let mut tabs = self.tabs.lock().unwrap();
        let rows = tabs.entry(tab.to_string()).or_default();
        let row = rows
            .get_mut(row_index - 1)
            .ok_or_else(|| BotError::internal("row index out of range"))?;
        for (col, value) in fields {
            while row.len() <= *col {
                row.push(String::new());
            }
            row[*col] = value.clone();
        }
        Ok(())
    }
}

/// Scriptable platform fake recording every call.
pub struct FakePlatform {
    pub archived_threads: Mutex<HashSet<u64>>,
    pub missing_threads: Mutex<HashSet<u64>>,
    pub missing_messages: Mutex<HashSet<u64>>,
    /// Message ids whose edit fails with a non-retryable platform error
    pub broken_edits: Mutex<HashSet<u64>>,
    pub restored: Mutex<Vec<u64>>,
    pub posts: Mutex<Vec<(u64, MessagePayload)>>,
    pub edits: Mutex<Vec<(u64, u64, MessagePayload)>>,
    pub binds: Mutex<Vec<(u64, u64, usize)>>,
    pub replies: Mutex<Vec<String>>,
    pub acks: Mutex<Vec<String>>,
    /// When set, edits block until `add_permits` lets them through.
    edit_gate: Mutex<Option<Arc<Semaphore>>>,
    next_message_id: AtomicU64,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            archived_threads: Mutex::new(HashSet::new()),
            missing_threads: Mutex::new(HashSet::new()),
            missing_messages: Mutex::new(HashSet::new()),
            broken_edits: Mutex::new(HashSet::new()),
            restored: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            binds: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            edit_gate: Mutex::new(None),
            next_message_id: AtomicU64::new(9000),
        }
    }

    pub fn gate_edits(&self, gate: Arc<Semaphore>) {
        *self.edit_gate.lock().unwrap() = Some(gate);
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn start(&self, _event_tx: mpsc::Sender<BotEvent>) -> BotResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BotResult<()> {
        Ok(())
    }

    async fn fetch_thread(&self, thread_id: u64) -> BotResult<ThreadInfo> {
        if self.missing_threads.lock().unwrap().contains(&thread_id) {
            return Err(BotError::thread_unavailable(format!("thread {}", thread_id)));
        }
        Ok(ThreadInfo {
            id: thread_id,
            archived: self.archived_threads.lock().unwrap().contains(&thread_id),
            locked: false,
        })
    }

    async fn restore_thread(&self, thread_id: u64) -> BotResult<()> {
        self.restored.lock().unwrap().push(thread_id);
        self.archived_threads.lock().unwrap().remove(&thread_id);
        Ok(())
    }

    async fn fetch_message(&self, _thread_id: u64, message_id: u64) -> BotResult<()> {
        if self.missing_messages.lock().unwrap().contains(&message_id) {
            return Err(BotError::surface_unavailable(format!("message {}", message_id)));
        }
        Ok(())
    }

    async fn post_message(&self, thread_id: u64, payload: &MessagePayload) -> BotResult<u64> {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.posts.lock().unwrap().push((thread_id, payload.clone()));
        Ok(id)
    }

    async fn edit_message(
        &self,
        thread_id: u64,
        message_id: u64,
        payload: &MessagePayload,
    ) -> BotResult<()> {
        let gate = self.edit_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| BotError::internal("gate closed"))?;
            permit.forget();
        }
        if self.broken_edits.lock().unwrap().contains(&message_id) {
            return Err(BotError::platform(format!("edit {} rejected", message_id)));
        }
        if self.missing_messages.lock().unwrap().contains(&message_id) {
            return Err(BotError::surface_unavailable(format!("message {}", message_id)));
        }
        self.edits
            .lock()
            .unwrap()
            .push((thread_id, message_id, payload.clone()));
        Ok(())
    }

    async fn bind_components(
        &self,
        thread_id: u64,
        message_id: u64,
        groups: &[SelectGroup],
    ) -> BotResult<()> {
        self.binds
            .lock()
            .unwrap()
            .push((thread_id, message_id, groups.len()));
        Ok(())
    }

    async fn ack_interaction(&self, interaction_id: &str, _token: &str) -> BotResult<()> {
        self.acks.lock().unwrap().push(interaction_id.to_string());
        Ok(())
    }

    async fn reply_ephemeral(&self, _interaction_token: &str, text: &str) -> BotResult<()> {
        self.replies.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
