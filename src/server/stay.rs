//! Presence-quorum room ("stay room").
//!
//! Server-driven: each join broadcasts the headcount to every member; the
//! quorum-reaching join also announces a session start time ten seconds out
//! and closes the whole room.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};

use crate::common::time::{get_jst_timestamp, timestamp_to_jst_rfc3339};

use super::{
    client::{
        ClientSender, ConnectionId, Frame, close_all, fan_out, next_connection_id, write_close,
    },
    state::{AppState, RoomQuery},
};

/// Membership count at which the session is scheduled and the room closed.
pub const STAY_QUORUM: usize = 3;
/// Announced session start is this far after the quorum-reaching join.
const SESSION_START_DELAY_MILLIS: i64 = 10_000;
const PING_PERIOD: Duration = Duration::from_secs(30);
const PONG_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct StayPayload {
    stay_num: String,
    start_time: String,
}

/// Liveness bookkeeping for the ping/pong keep-alive: the connection is
/// considered gone once `PONG_WAIT` passes without a refresh.
struct KeepAlive {
    deadline: Instant,
}

impl KeepAlive {
    fn new() -> Self {
        Self {
            deadline: Instant::now() + PONG_WAIT,
        }
    }

    /// A pong arrived; push the deadline out by the full wait.
    fn refresh(&mut self) {
        self.deadline = Instant::now() + PONG_WAIT;
    }

    fn lapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Presence-quorum room state.
#[derive(Default)]
pub struct StayRoom {
    members: HashMap<ConnectionId, ClientSender>,
    /// Timestamp of the join that reached the quorum, in epoch millis.
    third_joined_at: Option<i64>,
}

impl StayRoom {
    fn senders(&self) -> Vec<ClientSender> {
        self.members.values().cloned().collect()
    }
}

pub async fn stay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if query.room.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(ws.on_upgrade(move |socket| handle_stay(socket, state, query.room)))
}

async fn handle_stay(socket: WebSocket, state: Arc<AppState>, room_id: String) {
    let conn_id = next_connection_id();
    let (tx, rx) = mpsc::unbounded_channel();
    let room = state.stay_rooms.get_or_create(&room_id).await;

    let (count, third_joined_at) = {
        let mut rm = room.lock().await;
        rm.members.insert(conn_id, tx);
        let count = rm.members.len();
        if count == STAY_QUORUM {
            rm.third_joined_at = Some(get_jst_timestamp());
        }
        (count, rm.third_joined_at)
    };
    tracing::info!(room = %room_id, conn = conn_id, count, "stay client joined");

    match count {
        n if n < STAY_QUORUM => {
            broadcast(&room, n.to_string(), "null".to_string()).await;
        }
        n if n == STAY_QUORUM => {
            let start_at =
                third_joined_at.unwrap_or_else(get_jst_timestamp) + SESSION_START_DELAY_MILLIS;
            broadcast(&room, n.to_string(), timestamp_to_jst_rfc3339(start_at)).await;
            let targets = { room.lock().await.senders() };
            close_all(&targets, "session ended");
        }
        _ => {
            // Out of contract: a 4th+ joiner sees the stale terminal state
            // with no start time, and nothing else happens.
            broadcast(&room, STAY_QUORUM.to_string(), "null".to_string()).await;
        }
    }

    pump_stay_socket(socket, rx, &room_id, conn_id).await;

    let empty = {
        let mut rm = room.lock().await;
        rm.members.remove(&conn_id);
        rm.members.is_empty()
    };
    if empty {
        state.stay_rooms.remove(&room_id).await;
    }
    tracing::info!(room = %room_id, conn = conn_id, "stay client disconnected");
}

/// Fan the headcount status out to every current member.
async fn broadcast(room: &Arc<Mutex<StayRoom>>, stay_num: String, start_time: String) {
    let payload = StayPayload {
        stay_num,
        start_time,
    };
    let json = serde_json::to_string(&payload).unwrap();
    let targets = { room.lock().await.senders() };
    fan_out(&targets, &json);
}

/// Own the socket until the peer leaves, the room closes it, or liveness
/// lapses. All writes happen here; pings go out on a fixed interval and a
/// pong refreshes the liveness deadline.
async fn pump_stay_socket(
    socket: WebSocket,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    room_id: &str,
    conn_id: ConnectionId,
) {
    let (mut sink, mut stream) = socket.split();
    let mut ping = tokio::time::interval(PING_PERIOD);
    let mut keep_alive = KeepAlive::new();

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if keep_alive.lapsed() {
                    tracing::warn!(room = %room_id, conn = conn_id, "stay client missed liveness deadline");
                    break;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
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
                Some(Ok(Message::Pong(_))) => {
                    keep_alive.refresh();
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(room = %room_id, conn = conn_id, "stay socket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
