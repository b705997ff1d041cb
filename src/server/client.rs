//! Per-connection plumbing shared by the room handlers.
//!
//! Each connection owns an unbounded channel; room code queues frames on it
//! and the connection's own task performs every socket write. Broadcasts
//! snapshot the sender list under the room lock and send after releasing
//! it, so a slow peer never serializes against concurrent joins and leaves.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{SinkExt, stream::SplitSink};

/// Process-local identity of one connection.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// Frame queued for a connection's writer.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    /// Write a normal-closure frame with this reason, then tear down.
    Close(&'static str),
}

pub type ClientSender = tokio::sync::mpsc::UnboundedSender<Frame>;

/// Bound on writing the close control frame so a stalled peer cannot block
/// teardown indefinitely.
pub const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Queue `payload` for every snapshotted member. A send failure means the
/// member's writer already exited; its own handler cleans up membership.
pub fn fan_out(targets: &[ClientSender], payload: &str) {
    for sender in targets {
        if sender.send(Frame::Text(payload.to_string())).is_err() {
            tracing::debug!("skipping frame for a connection that already closed");
        }
    }
}

/// Queue a close frame for every snapshotted member.
pub fn close_all(targets: &[ClientSender], reason: &'static str) {
    for sender in targets {
        let _ = sender.send(Frame::Close(reason));
    }
}

/// Write a normal-closure frame under the bounded write deadline.
pub async fn write_close(sink: &mut SplitSink<WebSocket, Message>, reason: &'static str) {
    let frame = Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: reason.into(),
    }));
    let _ = tokio::time::timeout(CLOSE_WRITE_TIMEOUT, sink.send(frame)).await;
}
