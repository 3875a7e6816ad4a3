//! WebSocket handler streaming automation events

use automation_engine::AutomationEvent;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    RuleTriggered { rule_id: String, reason: String },
    RuleSkipped { rule_id: String },
    RuleExecuted { rule_id: String, execution_count: u64 },
    RuleFailed { rule_id: String, error: String },
    RuleCreated { rule_id: String },
    RuleUpdated { rule_id: String },
    RuleRemoved { rule_id: String },
}

impl From<AutomationEvent> for WsEvent {
    fn from(event: AutomationEvent) -> Self {
        match event {
            AutomationEvent::Triggered {
                rule_id,
                trigger_reason,
            } => Self::RuleTriggered {
                rule_id,
                reason: trigger_reason,
            },
            AutomationEvent::Skipped { rule_id } => Self::RuleSkipped { rule_id },
            AutomationEvent::Executed {
                rule_id,
                execution_count,
            } => Self::RuleExecuted {
                rule_id,
                execution_count,
            },
            AutomationEvent::Failed { rule_id, error } => Self::RuleFailed { rule_id, error },
            AutomationEvent::Created { rule_id } => Self::RuleCreated { rule_id },
            AutomationEvent::Updated { rule_id } => Self::RuleUpdated { rule_id },
            AutomationEvent::Removed { rule_id } => Self::RuleRemoved { rule_id },
        }
    }
}

fn to_message(event: &WsEvent) -> Option<Message> {
    serde_json::to_string(event).ok().map(Message::Text)
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(connected) = to_message(&WsEvent::Connected) else {
        return;
    };
    if sender.send(connected).await.is_err() {
        return;
    }

    let mut event_rx = state.engine.subscribe();
    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let Some(message) = to_message(&WsEvent::from(event)) else {
                        continue;
                    };
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!("WebSocket client lagged by {} events", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Client messages are ignored; we only watch for close
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
