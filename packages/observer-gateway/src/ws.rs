//! `GET /ws`: upgrades to a websocket relaying the observer's broadcast
//! `Event` stream as JSON, plus a tiny request protocol (`ping` / `get_state`)
//! layered on top for clients that can't just listen passively.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use observer_core::model::PaneInfo;

use crate::state::AppState;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsRequest {
    Ping,
    GetState,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum GatewayEvent {
    InitialState { panes: Vec<PaneInfo> },
    State { panes: Vec<PaneInfo> },
    Pong,
}

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.ctx.events.subscribe();

    let initial = current_panes(&state);
    if send_json(&mut sender, &GatewayEvent::InitialState { panes: initial })
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if send_json(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "gateway: websocket subscriber lagged, dropped events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_request(&text, &mut sender, &state).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

async fn handle_request(
    text: &str,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    state: &AppState,
) -> Result<(), axum::Error> {
    let Ok(request) = serde_json::from_str::<WsRequest>(text) else {
        return Ok(());
    };
    match request {
        WsRequest::Ping => send_json(sender, &GatewayEvent::Pong).await,
        WsRequest::GetState => {
            let panes = current_panes(state);
            send_json(sender, &GatewayEvent::State { panes }).await
        }
    }
}

fn current_panes(state: &AppState) -> Vec<PaneInfo> {
    state
        .ctx
        .registry
        .get_all()
        .into_iter()
        .map(|p| p.to_info())
        .collect()
}

async fn send_json<T: Serialize>(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(value).unwrap_or_else(|_| json!({}).to_string());
    sender.send(Message::Text(payload.into())).await
}
