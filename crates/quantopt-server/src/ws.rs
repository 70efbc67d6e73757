//! WebSocket gateway.
//!
//! Each connection gets its own bus subscription, taken before the initial
//! state is sent so nothing published in between is lost. Bus events are
//! forwarded as-is (`{event_type, task_id, payload, timestamp}`); frames
//! the gateway produces itself use `{type, data}`.

use crate::api::AppState;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use quantopt_core::{
    AppCore, Event, QueueAction, QueueStatus, SubscriberError, TaskCommand, TaskSummary,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub client_id: Option<String>,
}

/// Frame produced by the gateway itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GatewayFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Value,
}

impl GatewayFrame {
    fn new(kind: &'static str, data: Value) -> Self {
        Self { kind, data }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::new("ERROR", json!({ "message": message.into() }))
    }

    /// Serialize `data` into a frame of `kind`, or an ERROR frame if that fails.
    fn reply<T: Serialize>(kind: &'static str, data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::new(kind, data),
            Err(err) => {
                warn!(kind, error = %err, "Failed to serialize gateway frame");
                Self::error(format!("Failed to serialize {kind}: {err}"))
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct InitialState {
    tasks: Vec<TaskSummary>,
    queue_status: QueueStatus,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ControlTask {
    task_id: String,
    action: String,
}

#[derive(Debug, Deserialize)]
struct ControlQueue {
    action: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(core): State<AppState>,
) -> impl IntoResponse {
    let client_id = params
        .client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    ws.on_upgrade(move |socket| async move {
        if let Err(err) = serve_client(socket, core, client_id.clone()).await {
            warn!(client_id = %client_id, "WebSocket client error: {}", err);
        }
    })
}

fn task_listing(core: &AppCore, kind: &'static str) -> GatewayFrame {
    let state = InitialState {
        tasks: core.queue.list(),
        queue_status: core.queue.status(),
    };
    GatewayFrame::reply(kind, state)
}

/// Apply one client frame and build the reply.
pub fn handle_client_message(core: &AppCore, text: &str) -> GatewayFrame {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => return GatewayFrame::error(format!("Malformed message: {err}")),
    };

    match frame.kind.as_str() {
        "PING" => GatewayFrame::new("PONG", Value::Null),
        "GET_TASKS" => task_listing(core, "TASKS"),
        "CONTROL_TASK" => {
            let result = serde_json::from_value::<ControlTask>(frame.data)
                .map_err(|err| err.to_string())
                .and_then(|control| {
                    let command: TaskCommand =
                        control.action.parse().map_err(|e| format!("{e}"))?;
                    core.queue
                        .control_task(&control.task_id, command)
                        .map_err(|e| e.to_string())
                });
            match result {
                Ok(summary) => GatewayFrame::reply("TASK_CONTROLLED", summary),
                Err(message) => GatewayFrame::error(message),
            }
        }
        "CONTROL_QUEUE" => {
            let result = serde_json::from_value::<ControlQueue>(frame.data)
                .map_err(|err| err.to_string())
                .and_then(|control| {
                    control
                        .action
                        .parse::<QueueAction>()
                        .map_err(|e| e.to_string())
                });
            match result {
                Ok(action) => GatewayFrame::reply("QUEUE_STATUS", core.queue.control(action)),
                Err(message) => GatewayFrame::error(message),
            }
        }
        other => GatewayFrame::error(format!("Unknown message type: {other}")),
    }
}

fn text_frame<T: Serialize>(value: &T) -> anyhow::Result<Message> {
    Ok(Message::Text(serde_json::to_string(value)?.into()))
}

async fn serve_client(socket: WebSocket, core: AppState, client_id: String) -> anyhow::Result<()> {
    let mut subscription = core.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!(client_id = %client_id, subscriber_id = %subscription.id(), "WebSocket client connected");

    sender
        .send(text_frame(&GatewayFrame::new(
            "CONNECTED",
            json!({ "client_id": client_id }),
        ))?)
        .await?;
    sender.send(text_frame(&task_listing(&core, "INITIAL_STATE"))?).await?;

    let result = loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(Ok(event)) => {
                    if let Err(err) = sender.send(text_frame(&event)?).await {
                        break Err(err.into());
                    }
                }
                Some(Err(SubscriberError::Lagged(missed))) => {
                    let notice = Event::error(None, format!("Missed {missed} event(s), refresh state with GET_TASKS"));
                    if let Err(err) = sender.send(text_frame(&notice)?).await {
                        break Err(err.into());
                    }
                }
                None => break Ok(()),
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_client_message(&core, text.as_str());
                    debug!(client_id = %client_id, reply = reply.kind, "Client message handled");
                    if let Err(err) = sender.send(text_frame(&reply)?).await {
                        break Err(err.into());
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(err)) => break Err(err.into()),
            },
        }
    };

    subscription.unsubscribe();
    info!(client_id = %client_id, "WebSocket client disconnected");
    result
}
