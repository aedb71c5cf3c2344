//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{ScanEvent, TrackedUrl};
use crate::service::CollectionScheduler;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<ScanEvent>,
    scheduler: Arc<CollectionScheduler>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &scheduler).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(scan_event) => {
                        if subs.matches(&scan_event) {
                            let msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::to_value(&scan_event).unwrap_or_default(),
                            );
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Splits a client message into the echo id and the command.
///
/// Accepts a bare command or an envelope carrying the command in
/// `payload`.
fn parse_command(text: &str) -> Result<(String, WsCommand), WsMessage> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Err(WsMessage::error("", 400, "malformed JSON"));
    };

    let (id, body) = match value.get("payload") {
        Some(payload) if payload.is_object() => (
            value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            payload.clone(),
        ),
        _ => (String::new(), value),
    };

    match serde_json::from_value::<WsCommand>(body) {
        Ok(command) => Ok((id, command)),
        Err(_) => Err(WsMessage::error(id, 404, "unknown command")),
    }
}

/// Splits raw subscription targets into the wildcard flag, parsed URLs
/// and rejected inputs.
fn parse_targets(raw: &[String]) -> (bool, Vec<TrackedUrl>, Vec<String>) {
    let mut wildcard = false;
    let mut urls = Vec::new();
    let mut rejected = Vec::new();
    for item in raw {
        if item == "*" {
            wildcard = true;
        } else {
            match TrackedUrl::parse(item) {
                Ok(url) => urls.push(url),
                Err(_) => rejected.push(item.clone()),
            }
        }
    }
    (wildcard, urls, rejected)
}

/// Handles a text message from the client, returning an optional JSON response.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    scheduler: &CollectionScheduler,
) -> Option<String> {
    let (id, command) = match parse_command(text) {
        Ok(parsed) => parsed,
        Err(err) => return serde_json::to_string(&err).ok(),
    };

    let payload = match command {
        WsCommand::Subscribe { urls } => {
            let (wildcard, urls, rejected) = parse_targets(&urls);
            subs.subscribe(&urls, wildcard);
            json!({
                "subscribed": urls,
                "rejected": rejected,
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { urls } => {
            let (wildcard, urls, rejected) = parse_targets(&urls);
            subs.unsubscribe(&urls, wildcard);
            json!({
                "unsubscribed": urls,
                "rejected": rejected,
                "remaining_count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::QueueStatus => {
            let status = scheduler.queue().status().await;
            json!({
                "draining": scheduler.is_draining(),
                "queue": status,
            })
        }
    };

    let response = WsMessage::new(id, WsMessageType::Response, payload);
    serde_json::to_string(&response).ok()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn envelope_id_is_echoed() {
        let text = r#"{"id":"req-1","type":"command","timestamp":"2024-01-01T00:00:00Z","payload":{"command":"queue_status"}}"#;
        let Ok((id, command)) = parse_command(text) else {
            panic!("valid envelope");
        };
        assert_eq!(id, "req-1");
        assert_eq!(command, WsCommand::QueueStatus);
    }

    #[test]
    fn malformed_json_is_an_error_message() {
        let Err(err) = parse_command("{not json") else {
            panic!("should fail");
        };
        assert_eq!(err.msg_type, WsMessageType::Error);
        assert_eq!(err.payload["code"], 400);
    }

    #[test]
    fn targets_split_wildcard_and_invalid() {
        let raw = vec![
            "*".to_string(),
            "https://example.com".to_string(),
            "ftp://example.com".to_string(),
        ];
        let (wildcard, urls, rejected) = parse_targets(&raw);
        assert!(wildcard);
        assert_eq!(urls.len(), 1);
        assert_eq!(rejected, vec!["ftp://example.com".to_string()]);
    }
}
