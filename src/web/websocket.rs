// src/web/websocket.rs - Live tag and alarm sockets
//
// Thin adapters over the notification hub. Each connection owns one
// subscription for its topic; hub events are forwarded as JSON text frames in
// the order the hub delivered them.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
#[cfg(feature = "metrics")]
use metrics::counter;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use super::AppState;
use crate::error::Result;
use crate::hub::Topic;

pub async fn tags_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state, Topic::TagUpdates))
}

pub async fn alarms_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state, Topic::AlarmUpdates))
}

/// Returns false once the client is gone
async fn send_json<T: Serialize + ?Sized>(socket: &mut WebSocket, payload: &T) -> bool {
    match encode_frame(payload) {
        Some(text) => socket.send(Message::Text(text)).await.is_ok(),
        None => true,
    }
}

/// Unencodable payloads skip the frame but keep the connection
fn encode_frame<T: Serialize + ?Sized>(payload: &T) -> Option<String> {
    match serde_json::to_string(payload) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Skipping websocket frame, payload did not encode: {}", e);
            #[cfg(feature = "metrics")]
            counter!("scada_websocket_frames_skipped_total").increment(1);
            None
        }
    }
}

/// Greeting plus, on the alarm socket, the current ACTIVE alarms
fn opening_frames(state: &AppState, topic: Topic) -> Result<Vec<JsonValue>> {
    let mut frames = vec![json!({
        "type": "connection_established",
        "message": format!("WebSocket connection established for {}", topic_label(topic)),
    })];
    if topic == Topic::AlarmUpdates {
        let alarms = state.engine.active_alarms()?;
        frames.push(json!({
            "type": "active_alarms",
            "total": alarms.len(),
            "items": alarms,
        }));
    }
    Ok(frames)
}

fn topic_label(topic: Topic) -> &'static str {
    match topic {
        Topic::TagUpdates => "tags",
        Topic::AlarmUpdates => "alarms",
    }
}

/// Reply to a client frame, if one is due
pub fn handle_client_message(text: &str, topic: Topic) -> Option<JsonValue> {
    let msg: JsonValue = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return Some(json!({ "type": "error", "message": format!("Invalid JSON: {}", e) }))
        }
    };

    match (msg["action"].as_str(), topic) {
        (Some("subscribe_tags"), Topic::TagUpdates) => Some(json!({
            "type": "subscription_confirmed",
            "message": "Subscribed to tag updates",
        })),
        (Some("subscribe_alarms"), Topic::AlarmUpdates) => Some(json!({
            "type": "subscription_confirmed",
            "message": "Subscribed to alarm updates",
        })),
        (Some("ping"), _) => Some(json!({ "type": "pong" })),
        (Some(action), _) => Some(json!({
            "type": "error",
            "message": format!("Unknown action '{}'", action),
        })),
        (None, _) => None,
    }
}

async fn serve_socket(mut socket: WebSocket, state: AppState, topic: Topic) {
    // Subscribe before the snapshot so nothing published in between is lost
    let mut subscription = state.engine.subscribe(topic);
    debug!("Websocket opened on {} (subscription {})", topic, subscription.id());

    let frames = match opening_frames(&state, topic) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Could not build websocket snapshot: {}", e);
            return;
        }
    };
    for frame in &frames {
        if !send_json(&mut socket, frame).await {
            return;
        }
    }

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    if !send_json(&mut socket, event.as_ref()).await {
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_message(&text, topic) {
                        if !send_json(&mut socket, &reply).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Websocket error on {}: {}", topic, e);
                    break;
                }
            },
        }
    }

    debug!(
        "Websocket closed on {} (subscription {}, {} dropped)",
        topic,
        subscription.id(),
        subscription.dropped()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_confirmation_per_socket() {
        let reply = handle_client_message(r#"{"action":"subscribe_tags"}"#, Topic::TagUpdates)
            .unwrap();
        assert_eq!(reply["type"], "subscription_confirmed");

        let reply = handle_client_message(r#"{"action":"subscribe_tags"}"#, Topic::AlarmUpdates)
            .unwrap();
        assert_eq!(reply["type"], "error");
    }

    #[test]
    fn test_ping_and_garbage() {
        let reply = handle_client_message(r#"{"action":"ping"}"#, Topic::AlarmUpdates).unwrap();
        assert_eq!(reply["type"], "pong");

        let reply = handle_client_message("not json", Topic::TagUpdates).unwrap();
        assert_eq!(reply["type"], "error");

        assert!(handle_client_message(r#"{"hello":1}"#, Topic::TagUpdates).is_none());
    }

    #[test]
    fn test_unencodable_frame_is_skipped() {
        // JSON object keys must be strings
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), 3u8);
        assert!(encode_frame(&bad).is_none());

        let text = encode_frame(&json!({ "type": "pong" })).unwrap();
        assert_eq!(text, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_alarm_socket_snapshot() {
        let engine = crate::engine::Engine::new(&crate::config::Config::default()).unwrap();
        let state = AppState::new(std::sync::Arc::new(engine));

        let frames = opening_frames(&state, Topic::AlarmUpdates).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], "connection_established");
        assert_eq!(frames[1]["type"], "active_alarms");
        assert_eq!(frames[1]["total"], 0);

        assert_eq!(opening_frames(&state, Topic::TagUpdates).unwrap().len(), 1);
    }
}
