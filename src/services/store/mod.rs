//! Durable Store Client
//!
//! Narrow read/append/update interface over the external spreadsheet store,
//! with retry/backoff on retryable failures and a TTL cache for the Compiled
//! tab. The client is the sole owner of network/session state for the store;
//! retryable errors never escape it except as the terminal `StoreUnavailable`.

pub mod backoff;
pub mod cache;

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::models::records::COMPILED_TAB;
use crate::utils::error::{classify_http_status, BotResult};

pub use backoff::{with_retries, RetryPolicy};
pub use cache::TtlCache;

/// Rows travel as plain string cells
pub type Rows = Vec<Vec<String>>;

/// Narrow contract over the tabular store.
///
/// `update` patches individual cells of one row (0-based column, value);
/// omitted columns keep their prior values. `row_index` is the 1-based sheet
/// row, header included.
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn read(&self, tab: &str, range: &str) -> BotResult<Rows>;
    async fn append(&self, tab: &str, row: Vec<String>) -> BotResult<()>;
    async fn update(&self, tab: &str, row_index: usize, fields: &[(usize, String)]) -> BotResult<()>;
}

/// Google Sheets values-API client
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    sheet_id: String,
    token: String,
    policy: RetryPolicy,
    cache: TtlCache,
}

impl SheetsClient {
    pub fn new(
        sheet_id: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
        cache_ttl: Duration,
        policy: RetryPolicy,
    ) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            sheet_id: sheet_id.into(),
            token: token.into(),
            policy,
            cache: TtlCache::new(cache_ttl),
        })
    }

    /// Only the derived Compiled view is safe to serve stale
    fn is_cached_tab(tab: &str) -> bool {
        tab == COMPILED_TAB
    }

    fn values_url(&self, suffix: &str) -> String {
        format!("{}/{}/values/{}", self.base_url, self.sheet_id, suffix)
    }

    async fn fetch_rows(&self, tab: &str, range: &str) -> BotResult<Rows> {
        let url = self.values_url(&format!("{}!{}", tab, range));
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status, &body));
        }
        let body: serde_json::Value = response.json().await?;
        let rows = body
            .get("values")
            .and_then(|v| v.as_array())
            .map(|outer| {
                outer
                    .iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().unwrap_or_default().to_string())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn post_values(&self, url: &str, payload: serde_json::Value) -> BotResult<()> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status, &body));
        }
        Ok(())
    }

    /// 0-based column index to sheet column letters
    fn column_letter(mut index: usize) -> String {
        let mut letters = String::new();
        loop {
            letters.insert(0, (b'A' + (index % 26) as u8) as char);
            if index < 26 {
                break;
            }
            index = index / 26 - 1;
        }
        letters
    }
}

#[async_trait]
impl SheetStore for SheetsClient {
    async fn read(&self, tab: &str, range: &str) -> BotResult<Rows> {
        if !Self::is_cached_tab(tab) {
            let (rows, _) = with_retries(&self.policy, "store read", || self.fetch_rows(tab, range)).await?;
            return Ok(rows);
        }

        if let Some(rows) = self.cache.get(tab, range).await {
            return Ok(rows);
        }
        let _guard = self.cache.refill_lock().await;
        if let Some(rows) = self.cache.get(tab, range).await {
            return Ok(rows);
        }
        let (rows, _) = with_retries(&self.policy, "store read", || self.fetch_rows(tab, range)).await?;
        self.cache.insert(tab, range, rows.clone()).await;
        Ok(rows)
    }

    async fn append(&self, tab: &str, row: Vec<String>) -> BotResult<()> {
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(&format!("{}!A1", tab))
        );
        let payload = json!({ "values": [row] });
        let ((), _) =
            with_retries(&self.policy, "store append", || self.post_values(&url, payload.clone()))
                .await?;
        self.cache.invalidate_tab(tab).await;
        Ok(())
    }

    async fn update(&self, tab: &str, row_index: usize, fields: &[(usize, String)]) -> BotResult<()> {
        // One batch write, one cell range per provided field
        let data: Vec<serde_json::Value> = fields
            .iter()
            .map(|(col, value)| {
                let cell = format!("{}!{}{}", tab, Self::column_letter(*col), row_index);
                json!({ "range": cell, "values": [[value]] })
            })
            .collect();
        let url = format!(
            "{}/{}/values:batchUpdate",
            self.base_url, self.sheet_id
        );
        let payload = json!({ "valueInputOption": "RAW", "data": data });
        let ((), _) =
            with_retries(&self.policy, "store update", || self.post_values(&url, payload.clone()))
                .await?;
        self.cache.invalidate_tab(tab).await;
        Ok(())
    }
}
