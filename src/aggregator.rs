//! Sliding-window aggregation of per-client numeric samples.
//!
//! Each room keeps, per client, the samples received within the trailing
//! window. Updating one client's value prunes expired samples for every
//! client in the room and recomputes the room-wide average over the
//! surviving non-zero values.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::common::time::{Clock, SystemClock};

/// Trailing span over which samples are retained, in milliseconds.
pub const WINDOW_MILLIS: i64 = 5_000;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: i64,
    value: f64,
}

#[derive(Debug, Default)]
struct RoomSamples {
    /// client id -> samples, append order equals time order.
    samples: HashMap<String, Vec<Sample>>,
}

/// Room-wide rolling average over a sliding time window.
///
/// A sample with value `0` is kept for window bookkeeping but never counts
/// toward the average; clients use it as a keep-alive rather than a reading.
pub struct SlidingWindowAggregator {
    rooms: Mutex<HashMap<String, RoomSamples>>,
    clock: Box<dyn Clock>,
}

impl SlidingWindowAggregator {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Build an aggregator over an injected clock. Tests use this to step
    /// time deterministically instead of sleeping through the window.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            clock: Box::new(clock),
        }
    }

    /// Ensure an entry exists for `client_id` in `room_id`. Idempotent.
    pub async fn add_client(&self, room_id: &str, client_id: &str) {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(room_id.to_string()).or_default();
        room.samples.entry(client_id.to_string()).or_default();
    }

    /// Drop `client_id`'s entry; an emptied room is dropped with it.
    pub async fn remove_client(&self, room_id: &str, client_id: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get_mut(room_id) {
            room.samples.remove(client_id);
            if room.samples.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Record `value` for `client_id` and return the room average and the
    /// number of samples it covers.
    ///
    /// The new sample is appended even when it is zero. Every client's
    /// sequence is then pruned to the window, compacting in place, and the
    /// average is taken over the surviving non-zero values; `(0.0, 0)` when
    /// none survive. The whole routine runs under one lock, so the
    /// cross-client prune sees a consistent snapshot.
    pub async fn update(&self, room_id: &str, client_id: &str, value: f64) -> (f64, usize) {
        let now = self.clock.now_jst_millis();
        let cutoff = now - WINDOW_MILLIS;

        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(room_id.to_string()).or_default();
        room.samples
            .entry(client_id.to_string())
            .or_default()
            .push(Sample { at: now, value });

        let mut sum = 0.0;
        let mut count = 0usize;
        room.samples.retain(|_, seq| {
            seq.retain(|sample| sample.at >= cutoff);
            for sample in seq.iter() {
                if sample.value != 0.0 {
                    sum += sample.value;
                    count += 1;
                }
            }
            !seq.is_empty()
        });

        if count == 0 {
            (0.0, 0)
        } else {
            (sum / count as f64, count)
        }
    }
}

impl Default for SlidingWindowAggregator {
    fn default() -> Self {
        Self::new()
    }
}
