//! Shared helpers for the WebSocket integration tests: an in-process server
//! on an ephemeral port plus stub collaborators.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::StreamExt;
use kiosk_rooms_rs::{
    aggregator::SlidingWindowAggregator,
    collaborator::{
        aggregation::{AggregationService, LocalAggregationService},
        order::{OrderError, OrderResult, OrderService},
    },
    server::{router, state::AppState},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Order stub that succeeds and counts calls.
pub struct StubOrderService {
    pub calls: AtomicUsize,
}

impl StubOrderService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OrderService for StubOrderService {
    async fn place_order(&self, menu_item_id: &str) -> Result<OrderResult, OrderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderResult {
            id: format!("order-{}", n),
            menu_item_id: menu_item_id.to_string(),
            menu_name: "Matcha Shaved Ice".to_string(),
            status: "pending".to_string(),
            order_number: n as i64,
        })
    }
}

/// Order stub that always fails.
pub struct FailingOrderService;

#[async_trait]
impl OrderService for FailingOrderService {
    async fn place_order(&self, _menu_item_id: &str) -> Result<OrderResult, OrderError> {
        Err(OrderError::UpstreamStatus(reqwest::StatusCode::BAD_GATEWAY))
    }
}

/// Serve the full router on an ephemeral port with the given order service
/// and a fresh in-process aggregation service.
pub async fn spawn_server(order_service: Arc<dyn OrderService>) -> SocketAddr {
    let aggregation_service: Arc<dyn AggregationService> = Arc::new(LocalAggregationService::new(
        Arc::new(SlidingWindowAggregator::new()),
    ));
    let state = Arc::new(AppState::new(order_service, aggregation_service));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .await
            .expect("test server failed");
    });
    addr
}

pub async fn connect(addr: SocketAddr, path_and_query: &str) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path_and_query))
        .await
        .expect("websocket connect failed");
    ws
}

/// Read frames until the next text frame and parse it as JSON.
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended while waiting for a text frame")
            .expect("websocket error while waiting for a text frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("server sent invalid JSON");
        }
    }
}

/// Assert that the server closes the connection (close frame or stream end).
pub async fn expect_close(ws: &mut WsClient) {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    }
}

/// Assert that no frame other than pings arrives within `millis`.
pub async fn expect_silence(ws: &mut WsClient, millis: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(millis);
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {:?}", other),
        }
    }
}
