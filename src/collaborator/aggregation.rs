//! Streaming aggregation collaborator.
//!
//! The aggregate bridge opens one bidirectional stream per connection; the
//! room id travels inside each message, not the transport. The local
//! implementation hosts the sliding-window aggregator in process, one
//! worker task per stream.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::mpsc;

use crate::aggregator::SlidingWindowAggregator;

/// One sample travelling upstream.
#[derive(Debug, Clone)]
pub struct AggregateRequest {
    pub room: String,
    pub value: f64,
}

/// One recomputed room average travelling downstream.
#[derive(Debug, Clone)]
pub struct AggregateUpdate {
    pub room: String,
    pub average: f64,
    pub count: u32,
}

/// The two halves of an open aggregation stream. Dropping `requests`
/// signals end-of-input; the collaborator answers by closing `updates`.
pub struct AggregateStream {
    pub requests: mpsc::UnboundedSender<AggregateRequest>,
    pub updates: mpsc::UnboundedReceiver<AggregateUpdate>,
}

pub trait AggregationService: Send + Sync {
    fn open_stream(&self) -> AggregateStream;
}

/// In-process aggregation service over the shared sliding-window aggregator.
pub struct LocalAggregationService {
    aggregator: Arc<SlidingWindowAggregator>,
    stream_seq: AtomicU64,
}

impl LocalAggregationService {
    pub fn new(aggregator: Arc<SlidingWindowAggregator>) -> Self {
        Self {
            aggregator,
            stream_seq: AtomicU64::new(0),
        }
    }
}

impl AggregationService for LocalAggregationService {
    fn open_stream(&self) -> AggregateStream {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<AggregateRequest>();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let client_id = format!("c-{}", self.stream_seq.fetch_add(1, Ordering::Relaxed) + 1);
        let aggregator = self.aggregator.clone();

        tokio::spawn(async move {
            // The first non-empty room names this stream's client; the
            // stream stays bound to that room for its whole life.
            let mut room_id: Option<String> = None;
            while let Some(request) = request_rx.recv().await {
                if request.room.is_empty() {
                    continue;
                }
                if room_id.is_none() {
                    aggregator.add_client(&request.room, &client_id).await;
                    tracing::debug!(room = %request.room, client = %client_id, "aggregate client added");
                    room_id = Some(request.room.clone());
                }
                let room = match room_id.as_deref() {
                    Some(room) => room.to_string(),
                    None => continue,
                };
                if request.value == 0.0 {
                    continue;
                }
                let (average, count) = aggregator.update(&room, &client_id, request.value).await;
                if count == 0 {
                    continue;
                }
                let update = AggregateUpdate {
                    room,
                    average,
                    count: count as u32,
                };
                if update_tx.send(update).is_err() {
                    break;
                }
            }
            if let Some(room) = room_id {
                aggregator.remove_client(&room, &client_id).await;
                tracing::debug!(room = %room, client = %client_id, "aggregate client removed");
            }
        });

        AggregateStream {
            requests: request_tx,
            updates: update_rx,
        }
    }
}
