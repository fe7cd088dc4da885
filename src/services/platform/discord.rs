//! Discord Adapter
//!
//! Discord REST adapter implementing the `ChatPlatform` trait over reqwest.
//! Event reception (slash commands and component selections) runs over the
//! gateway websocket in the `socket` module; everything else is plain REST
//! against API v10.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::socket;
use super::{BotEvent, ChatPlatform, MessagePayload, SelectGroup, ThreadInfo};
use crate::models::records::{MessageId, ThreadId};
use crate::utils::error::{BotError, BotResult};

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord REST + gateway adapter
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    application_id: String,
    cancel_token: CancellationToken,
}

impl DiscordClient {
    pub fn new(
        token: impl Into<String>,
        application_id: impl Into<String>,
        request_timeout: Duration,
    ) -> BotResult<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(BotError::config("platform token is required"));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            token,
            application_id: application_id.into(),
            cancel_token: CancellationToken::new(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn api_get(&self, path: &str) -> BotResult<Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth_header())
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            return Err(BotError::platform(format!("GET {}: HTTP {}: {}", path, status, body)));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn api_send(&self, method: reqwest::Method, path: &str, payload: &Value) -> BotResult<Value> {
        let response = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth_header())
            .json(payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            return Err(BotError::platform(format!(
                "{} {}: HTTP {}: {}",
                method, path, status, body
            )));
        }
        if body.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_str(&body)?)
        }
    }

    /// Build the message body Discord expects from a payload
    fn message_json(payload: &MessagePayload) -> Value {
        json!({
            "embeds": [{
                "title": payload.title,
                "description": payload.body,
                "fields": payload.fields.iter().map(|(name, value)| {
                    json!({ "name": name, "value": value, "inline": false })
                }).collect::<Vec<_>>(),
            }],
            "components": components_json(&payload.components),
        })
    }

    /// Overwrite the application's `rate` and `results` command definitions.
    ///
    /// A non-zero guild id scopes the commands to that guild (instant
    /// propagation); zero registers them globally.
    pub async fn register_commands(&self, guild_id: u64) -> BotResult<()> {
        let path = if guild_id == 0 {
            format!("/applications/{}/commands", self.application_id)
        } else {
            format!(
                "/applications/{}/guilds/{}/commands",
                self.application_id, guild_id
            )
        };
        let commands = json!([
            {
                "name": "rate",
                "description": "Post the rating dropdowns for an entity",
                "options": [{
                    "type": 3,
                    "name": "entity",
                    "description": "Entity to rate",
                    "required": true,
                }],
            },
            {
                "name": "results",
                "description": "Post or refresh a results board",
                "options": [
                    {
                        "type": 3,
                        "name": "entity",
                        "description": "Limit to one entity",
                        "required": false,
                    },
                    {
                        "type": 3,
                        "name": "thread",
                        "description": "Thread id to post into",
                        "required": false,
                    },
                ],
            },
        ]);
        self.api_send(reqwest::Method::PUT, &path, &commands)
            .await
            .map_err(|e| BotError::platform(format!("command registration: {}", e)))?;
        tracing::info!(guild = guild_id, "slash commands registered");
        Ok(())
    }
}

/// Select groups become one action row per dropdown
pub(crate) fn components_json(groups: &[SelectGroup]) -> Vec<Value> {
    groups
        .iter()
        .map(|group| {
            json!({
                "type": 1,
                "components": [{
                    "type": 3,
                    "custom_id": group.custom_id,
                    "placeholder": group.placeholder,
                    "min_values": 1,
                    "max_values": 1,
                    "options": group.options.iter().map(|opt| {
                        json!({ "label": opt, "value": opt })
                    }).collect::<Vec<_>>(),
                }],
            })
        })
        .collect()
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn start(&self, event_tx: mpsc::Sender<BotEvent>) -> BotResult<()> {
        socket::spawn_gateway(self.token.clone(), event_tx, self.cancel_token.clone());
        Ok(())
    }

    async fn stop(&self) -> BotResult<()> {
        self.cancel_token.cancel();
        Ok(())
    }

    async fn fetch_thread(&self, thread_id: ThreadId) -> BotResult<ThreadInfo> {
        let channel = self
            .api_get(&format!("/channels/{}", thread_id))
            .await
            .map_err(|e| BotError::thread_unavailable(format!("thread {}: {}", thread_id, e)))?;
        let meta = channel.get("thread_metadata");
        Ok(ThreadInfo {
            id: thread_id,
            archived: meta
                .and_then(|m| m.get("archived"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            locked: meta
                .and_then(|m| m.get("locked"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    async fn restore_thread(&self, thread_id: ThreadId) -> BotResult<()> {
        self.api_send(
            reqwest::Method::PATCH,
            &format!("/channels/{}", thread_id),
            &json!({ "archived": false, "locked": false }),
        )
        .await
        .map_err(|e| BotError::thread_unavailable(format!("restore {}: {}", thread_id, e)))?;
        Ok(())
    }

    async fn fetch_message(&self, thread_id: ThreadId, message_id: MessageId) -> BotResult<()> {
        self.api_get(&format!("/channels/{}/messages/{}", thread_id, message_id))
            .await
            .map_err(|e| {
                BotError::surface_unavailable(format!("message {}: {}", message_id, e))
            })?;
        Ok(())
    }

    async fn post_message(
        &self,
        thread_id: ThreadId,
        payload: &MessagePayload,
    ) -> BotResult<MessageId> {
        let created = self
            .api_send(
                reqwest::Method::POST,
                &format!("/channels/{}/messages", thread_id),
                &Self::message_json(payload),
            )
            .await
            .map_err(|e| BotError::surface_unavailable(format!("post in {}: {}", thread_id, e)))?;
        created
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| id.parse::<MessageId>().ok())
            .ok_or_else(|| BotError::platform("message create response missing id"))
    }

    async fn edit_message(
        &self,
        thread_id: ThreadId,
        message_id: MessageId,
        payload: &MessagePayload,
    ) -> BotResult<()> {
        self.api_send(
            reqwest::Method::PATCH,
            &format!("/channels/{}/messages/{}", thread_id, message_id),
            &Self::message_json(payload),
        )
        .await
        .map_err(|e| BotError::surface_unavailable(format!("edit {}: {}", message_id, e)))?;
        Ok(())
    }

    async fn bind_components(
        &self,
        thread_id: ThreadId,
        message_id: MessageId,
        groups: &[SelectGroup],
    ) -> BotResult<()> {
        // Single PATCH so the message either gains the full set or keeps its
        // prior components
        self.api_send(
            reqwest::Method::PATCH,
            &format!("/channels/{}/messages/{}", thread_id, message_id),
            &json!({ "components": components_json(groups) }),
        )
        .await
        .map_err(|e| BotError::binding_failure(format!("bind {}: {}", message_id, e)))?;
        Ok(())
    }

    async fn ack_interaction(
        &self,
        interaction_id: &str,
        interaction_token: &str,
    ) -> BotResult<()> {
        // Type 5: deferred ephemeral response, completed by the follow-up
        self.api_send(
            reqwest::Method::POST,
            &format!("/interactions/{}/{}/callback", interaction_id, interaction_token),
            &json!({ "type": 5, "data": { "flags": 64 } }),
        )
        .await
        .map_err(|e| BotError::platform(format!("interaction ack: {}", e)))?;
        Ok(())
    }

    async fn reply_ephemeral(&self, interaction_token: &str, text: &str) -> BotResult<()> {
        self.api_send(
            reqwest::Method::POST,
            &format!("/webhooks/{}/{}", self.application_id, interaction_token),
            &json!({ "content": text, "flags": 64 }),
        )
        .await
        .map_err(|e| BotError::platform(format!("ephemeral reply: {}", e)))?;
        Ok(())
    }
}
