//! Discord Gateway Socket
//!
//! Minimal gateway websocket client: identify, heartbeat, and forward
//! INTERACTION_CREATE dispatches as `BotEvent`s. Reconnects with backoff on
//! disconnect; shuts down with the adapter's cancellation token.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use super::{BotCommand, BotEvent, CommandInvocation, SelectionEvent};
use crate::models::records::RatingCategory;
use crate::services::store::RetryPolicy;
use crate::utils::error::{BotError, BotResult};

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Spawn the gateway loop; it reconnects until the token is cancelled.
pub(crate) fn spawn_gateway(
    token: String,
    event_tx: mpsc::Sender<BotEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let policy = RetryPolicy::default();
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match run_connection(&token, &event_tx, &cancel).await {
                Ok(()) => break,
                Err(err) => {
                    let delay = policy.delay_for_attempt(attempt.min(5));
                    attempt += 1;
                    tracing::warn!(error = %err, delay_ms = delay.as_millis() as u64, "gateway disconnected; reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }
        tracing::info!("gateway loop stopped");
    });
}

/// One gateway session. `Ok(())` means a clean cancellation; any disconnect
/// surfaces as an error so the outer loop reconnects.
async fn run_connection(
    token: &str,
    event_tx: &mpsc::Sender<BotEvent>,
    cancel: &CancellationToken,
) -> BotResult<()> {
    let session = uuid::Uuid::new_v4();
    let (ws, _) = connect_async(GATEWAY_URL)
        .await
        .map_err(|e| BotError::platform(format!("gateway connect: {}", e)))?;
    let (mut write, mut read) = ws.split();
    tracing::debug!(%session, "gateway connected");

    // Armed once Hello supplies the real interval; no beats before that
    let mut heartbeat: Option<tokio::time::Interval> = None;
    let mut seq: Option<u64> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = armed_tick(&mut heartbeat) => {
                let beat = json!({ "op": 1, "d": seq }).to_string();
                write
                    .send(Message::Text(beat))
                    .await
                    .map_err(|e| BotError::platform(format!("heartbeat send: {}", e)))?;
            }
            frame = read.next() => {
                let message = match frame {
                    None => return Err(BotError::platform("gateway stream ended")),
                    Some(Err(e)) => return Err(BotError::platform(format!("gateway read: {}", e))),
                    Some(Ok(m)) => m,
                };
                match message {
                    Message::Text(text) => {
                        let payload: Value = serde_json::from_str(&text)?;
                        if let Some(s) = payload.get("s").and_then(Value::as_u64) {
                            seq = Some(s);
                        }
                        match payload.get("op").and_then(Value::as_u64) {
                            // Hello: adopt the server's heartbeat interval, then identify
                            Some(10) => {
                                let interval_ms = payload["d"]["heartbeat_interval"]
                                    .as_u64()
                                    .unwrap_or(41_250);
                                let period = Duration::from_millis(interval_ms);
                                let mut interval =
                                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                                heartbeat = Some(interval);
                                let identify = json!({
                                    "op": 2,
                                    "d": {
                                        "token": token,
                                        "intents": 0,
                                        "properties": { "os": "linux", "browser": "anthranks", "device": "anthranks" },
                                    },
                                })
                                .to_string();
                                write
                                    .send(Message::Text(identify))
                                    .await
                                    .map_err(|e| BotError::platform(format!("identify send: {}", e)))?;
                            }
                            // Heartbeat request
                            Some(1) => {
                                let beat = json!({ "op": 1, "d": seq }).to_string();
                                write
                                    .send(Message::Text(beat))
                                    .await
                                    .map_err(|e| BotError::platform(format!("heartbeat send: {}", e)))?;
                            }
                            // Heartbeat ack
                            Some(11) => {}
                            // Invalid session / reconnect request
                            Some(9) | Some(7) => {
                                return Err(BotError::platform("gateway requested reconnect"));
                            }
                            Some(0) => {
                                if payload.get("t").and_then(Value::as_str) == Some("INTERACTION_CREATE") {
                                    if let Some(event) = parse_interaction(&payload["d"]) {
                                        if event_tx.send(event).await.is_err() {
                                            // Receiver dropped: handlers are gone
                                            return Ok(());
                                        }
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    Message::Ping(data) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Message::Close(_) => return Err(BotError::platform("gateway closed connection")),
                    _ => {}
                }
            }
        }
    }
}

/// Tick the heartbeat interval once armed; pend forever until then.
async fn armed_tick(heartbeat: &mut Option<tokio::time::Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Map an INTERACTION_CREATE dispatch into a `BotEvent`.
///
/// Type 2 is a slash-command invocation (`/rate`, `/results`); type 3 is a
/// component selection whose custom id carries `rate:{entity}:{category}`.
/// Anything unrecognized is ignored.
pub(crate) fn parse_interaction(d: &Value) -> Option<BotEvent> {
    let interaction_type = d.get("type").and_then(Value::as_u64)?;
    let interaction_id = d.get("id").and_then(Value::as_str)?.to_string();
    let interaction_token = d.get("token").and_then(Value::as_str)?.to_string();
    let channel_id = d.get("channel_id").and_then(Value::as_str)?.parse().ok()?;
    let user_id = d
        .pointer("/member/user/id")
        .or_else(|| d.pointer("/user/id"))
        .and_then(Value::as_str)?
        .to_string();

    match interaction_type {
        2 => {
            let name = d.pointer("/data/name").and_then(Value::as_str)?;
            let option = |key: &str| -> Option<String> {
                d.pointer("/data/options")?
                    .as_array()?
                    .iter()
                    .find(|opt| opt.get("name").and_then(Value::as_str) == Some(key))
                    .and_then(|opt| opt.get("value"))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
            };
            let command = match name {
                "rate" => BotCommand::Rate {
                    entity_id: option("entity")?,
                },
                "results" => BotCommand::Results {
                    entity_id: option("entity"),
                    thread_id: option("thread").and_then(|t| t.parse().ok()),
                },
                _ => return None,
            };
            Some(BotEvent::Command(CommandInvocation {
                command,
                channel_id,
                user_id,
                interaction_id,
                interaction_token,
            }))
        }
        3 => {
            let custom_id = d.pointer("/data/custom_id").and_then(Value::as_str)?;
            let (entity_id, category) = parse_select_id(custom_id)?;
            let value = d
                .pointer("/data/values")?
                .as_array()?
                .first()?
                .as_str()?
                .parse::<u8>()
                .ok()?;
            if !(1..=5).contains(&value) {
                return None;
            }
            let message_id = d.pointer("/message/id").and_then(Value::as_str)?.parse().ok()?;
            Some(BotEvent::Selection(SelectionEvent {
                entity_id,
                category,
                value,
                user_id,
                thread_id: channel_id,
                message_id,
                interaction_id,
                interaction_token,
            }))
        }
        _ => None,
    }
}

/// Split a `rate:{entity}:{category}` component id
pub(crate) fn parse_select_id(custom_id: &str) -> Option<(String, RatingCategory)> {
    let rest = custom_id.strip_prefix("rate:")?;
    let (entity_id, category) = rest.rsplit_once(':')?;
    if entity_id.is_empty() {
        return None;
    }
    Some((entity_id.to_string(), category.parse().ok()?))
}
