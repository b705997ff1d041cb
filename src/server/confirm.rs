//! Readiness-quorum room with timeout ("confirm room").
//!
//! Waits until every connected member has signalled readiness, or for the
//! fallback timer, whichever comes first; then places one order per member,
//! relays each result to its member, and closes the room.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use crate::collaborator::order::OrderService;

use super::{
    client::{ClientSender, ConnectionId, Frame, next_connection_id, write_close},
    state::{AppState, RoomQuery},
};

/// Fallback deadline: trigger unconditionally this long after the first join.
const CONFIRM_FALLBACK: Duration = Duration::from_secs(3 * 60);
/// Bound on each order-placement call, independent of the per-client write.
const ORDER_TIMEOUT: Duration = Duration::from_secs(10);
/// Payload relayed to a member whose order call failed.
const ORDER_FAILED_PAYLOAD: &str = r#"{"error":"order failed"}"#;

#[derive(Debug, Deserialize)]
struct ConfirmMessage {
    status: String,
}

/// Readiness-quorum room state.
#[derive(Default)]
pub struct ConfirmRoom {
    members: HashMap<ConnectionId, ClientSender>,
    ready: HashSet<ConnectionId>,
    /// Set exactly once per room lifetime; reset only when the room empties.
    triggered: bool,
    fallback_timer: Option<JoinHandle<()>>,
}

impl ConfirmRoom {
    fn all_ready(&self) -> bool {
        !self.members.is_empty() && self.ready.len() == self.members.len()
    }
}

pub async fn confirm_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if query.room.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(ws.on_upgrade(move |socket| handle_confirm(socket, state, query.room)))
}

async fn handle_confirm(socket: WebSocket, state: Arc<AppState>, room_id: String) {
    let conn_id = next_connection_id();
    let (tx, rx) = mpsc::unbounded_channel();
    let room = state.confirm_rooms.get_or_create(&room_id).await;

    {
        let mut rm = room.lock().await;
        let was_empty = rm.members.is_empty();
        rm.members.insert(conn_id, tx);
        if was_empty {
            if let Some(timer) = rm.fallback_timer.take() {
                timer.abort();
            }
            rm.fallback_timer = Some(spawn_fallback_timer(
                room_id.clone(),
                room.clone(),
                state.order_service.clone(),
            ));
        }
    }
    tracing::info!(room = %room_id, conn = conn_id, "confirm client joined");

    pump_confirm_socket(socket, rx, &state, &room, &room_id, conn_id).await;

    let (empty, should_trigger) = {
        let mut rm = room.lock().await;
        rm.members.remove(&conn_id);
        rm.ready.remove(&conn_id);
        let empty = rm.members.is_empty();
        let should_trigger = !rm.triggered && rm.all_ready();
        if empty {
            if let Some(timer) = rm.fallback_timer.take() {
                timer.abort();
            }
            rm.triggered = false;
            rm.ready.clear();
        }
        (empty, should_trigger)
    };
    if should_trigger {
        // This departure made every remaining member ready.
        trigger(&room_id, &room, state.order_service.as_ref()).await;
    }
    if empty {
        state.confirm_rooms.remove(&room_id).await;
    }
    tracing::info!(room = %room_id, conn = conn_id, "confirm client disconnected");
}

fn spawn_fallback_timer(
    room_id: String,
    room: Arc<Mutex<ConfirmRoom>>,
    order: Arc<dyn OrderService>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(CONFIRM_FALLBACK).await;
        // Clear our own handle first so trigger does not abort the task it
        // is running on.
        {
            let mut rm = room.lock().await;
            rm.fallback_timer = None;
        }
        tracing::info!(room = %room_id, "confirm fallback timer fired");
        trigger(&room_id, &room, order.as_ref()).await;
    })
}

async fn pump_confirm_socket(
    socket: WebSocket,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    state: &Arc<AppState>,
    room: &Arc<Mutex<ConfirmRoom>>,
    room_id: &str,
    conn_id: ConnectionId,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(Frame::Text(json)) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Some(Frame::Close(reason)) => {
                    write_close(&mut sink, reason).await;
                    break;
                }
                None => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    // Anything that is not {"status":"ready"} is ignored.
                    let Ok(message) = serde_json::from_str::<ConfirmMessage>(&text) else {
                        continue;
                    };
                    if message.status != "ready" {
                        continue;
                    }
                    let should_trigger = {
                        let mut rm = room.lock().await;
                        rm.ready.insert(conn_id);
                        !rm.triggered && rm.all_ready()
                    };
                    if should_trigger {
                        trigger(room_id, room, state.order_service.as_ref()).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(room = %room_id, conn = conn_id, "confirm socket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// One-shot terminal action: place one order per member and relay results.
///
/// The `triggered` flag is checked-and-set under the room lock, so the
/// fallback timer, a readiness signal and a disconnect can race into this
/// function and exactly one caller performs the action.
pub(crate) async fn trigger(
    room_id: &str,
    room: &Arc<Mutex<ConfirmRoom>>,
    order: &dyn OrderService,
) {
    let targets: Vec<ClientSender> = {
        let mut rm = room.lock().await;
        if let Some(timer) = rm.fallback_timer.take() {
            timer.abort();
        }
        if rm.triggered || rm.members.is_empty() {
            return;
        }
        rm.triggered = true;
        rm.members.values().cloned().collect()
    };
    tracing::info!(room = %room_id, members = targets.len(), "confirm room triggered");

    for sender in &targets {
        let payload = match tokio::time::timeout(ORDER_TIMEOUT, order.place_order(room_id)).await {
            Ok(Ok(result)) => serde_json::to_string(&result).unwrap(),
            Ok(Err(e)) => {
                tracing::error!(room = %room_id, "order placement failed: {}", e);
                ORDER_FAILED_PAYLOAD.to_string()
            }
            Err(_) => {
                tracing::error!(room = %room_id, "order placement timed out");
                ORDER_FAILED_PAYLOAD.to_string()
            }
        };
        let _ = sender.send(Frame::Text(payload));
    }

    for sender in &targets {
        let _ = sender.send(Frame::Close("order completed"));
    }
}
