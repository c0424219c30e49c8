//! WebSocket handler for live board updates.
//!
//! This is the subscription surface: a client connects with an optional
//! `project_id` scope and receives one JSON event per qualifying state change
//! until it disconnects. Each connection holds its own bus subscriptions;
//! dropping the connection releases them.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;

use super::AppState;
use crate::events::{
    EventFilter, COMMENT_ADDED, TICKET_CREATED, TICKET_DELETED, TICKET_UPDATED,
};

/// Connection parameters for the event stream.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Scope events to one project; omit to receive everything
    #[serde(default)]
    pub project_id: Option<i64>,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

/// Forward qualifying bus events to the client until either side hangs up.
async fn handle_socket(socket: WebSocket, state: AppState, params: WsParams) {
    let (mut sender, mut receiver) = socket.split();

    let filter = match params.project_id {
        Some(id) => EventFilter::project(id),
        None => EventFilter::all(),
    };

    let mut created = state.bus.subscribe_filtered(TICKET_CREATED, filter.clone());
    let mut updated = state.bus.subscribe_filtered(TICKET_UPDATED, filter.clone());
    let mut deleted = state.bus.subscribe_filtered(TICKET_DELETED, filter.clone());
    let mut comments = state.bus.subscribe_filtered(COMMENT_ADDED, filter);

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                e = created.recv() => e,
                e = updated.recv() => e,
                e = deleted.recv() => e,
                e = comments.recv() => e,
            };
            let Some(event) = event else {
                break;
            };
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Clients only send control frames; anything else is ignored.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Ping(data) => {
                    tracing::debug!("received ping: {:?}", data);
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
}
