//! Streaming aggregation bridge ("aggregate room").
//!
//! Relays numeric samples from each client into the aggregation
//! collaborator and fans the recomputed room average back out to every
//! local member on each update. The collaborator stream is routed by the
//! room id inside each message; the local membership list is authoritative
//! for the fan-out.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::collaborator::aggregation::AggregateRequest;

use super::{
    client::{ClientSender, ConnectionId, Frame, fan_out, next_connection_id, write_close},
    state::{AppState, RoomQuery},
};

#[derive(Debug, Deserialize)]
struct SampleMessage {
    value: f64,
}

#[derive(Debug, Serialize)]
struct AveragePayload {
    average: f64,
    count: u32,
}

/// Aggregate room state: membership only, the samples live in the
/// collaborator.
#[derive(Default)]
pub struct BridgeRoom {
    members: HashMap<ConnectionId, ClientSender>,
}

pub async fn aggregate_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if query.room.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(ws.on_upgrade(move |socket| handle_aggregate(socket, state, query.room)))
}

async fn handle_aggregate(socket: WebSocket, state: Arc<AppState>, room_id: String) {
    let conn_id = next_connection_id();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let room = state.bridge_rooms.get_or_create(&room_id).await;
    {
        let mut rm = room.lock().await;
        rm.members.insert(conn_id, tx);
    }
    tracing::info!(room = %room_id, conn = conn_id, "aggregate client joined");

    let stream = state.aggregation_service.open_stream();
    let requests = stream.requests;
    let mut updates = stream.updates;

    // Downstream: collaborator updates for this room fan out to every
    // member currently in the local room.
    let downstream_room = room.clone();
    let downstream_room_id = room_id.clone();
    let downstream = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if update.room != downstream_room_id {
                continue;
            }
            let payload = AveragePayload {
                average: update.average,
                count: update.count,
            };
            let json = serde_json::to_string(&payload).unwrap();
            let targets: Vec<ClientSender> = {
                let rm = downstream_room.lock().await;
                rm.members.values().cloned().collect()
            };
            fan_out(&targets, &json);
            tracing::debug!(
                room = %downstream_room_id,
                average = payload.average,
                count = payload.count,
                recipients = targets.len(),
                "broadcast aggregate update"
            );
        }
    });

    // Upstream: client samples to the collaborator; zero carries no signal
    // at this layer either.
    let (mut sink, mut ws_stream) = socket.split();
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
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(sample) = serde_json::from_str::<SampleMessage>(&text) else {
                        tracing::warn!(room = %room_id, "unparseable sample message: {}", text);
                        continue;
                    };
                    if sample.value == 0.0 {
                        continue;
                    }
                    let request = AggregateRequest {
                        room: room_id.clone(),
                        value: sample.value,
                    };
                    if requests.send(request).is_err() {
                        tracing::warn!(room = %room_id, "aggregation stream rejected a sample");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(room = %room_id, conn = conn_id, "aggregate socket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    // End-of-input to the collaborator, then wait for the downstream task
    // to observe stream closure before releasing the connection.
    drop(requests);
    let _ = downstream.await;

    let empty = {
        let mut rm = room.lock().await;
        rm.members.remove(&conn_id);
        rm.members.is_empty()
    };
    if empty {
        state.bridge_rooms.remove(&room_id).await;
    }
    tracing::info!(room = %room_id, conn = conn_id, "aggregate client disconnected");
}
