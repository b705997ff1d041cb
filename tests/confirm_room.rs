//! Integration tests for the readiness-quorum ("confirm") room.

mod common;

use std::sync::{Arc, atomic::Ordering};

use common::*;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

const READY: &str = r#"{"status":"ready"}"#;

#[tokio::test]
async fn all_ready_places_one_order_per_member() {
    let orders = StubOrderService::new();
    let addr = spawn_server(orders.clone()).await;

    let mut c1 = connect(addr, "/ws/confirm?room=matcha").await;
    let mut c2 = connect(addr, "/ws/confirm?room=matcha").await;
    // Let both registrations land before signalling.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    c1.send(Message::Text(READY.into())).await.unwrap();
    // Duplicate ready signals are harmless.
    c1.send(Message::Text(READY.into())).await.unwrap();
    c2.send(Message::Text(READY.into())).await.unwrap();

    for ws in [&mut c1, &mut c2] {
        let msg = recv_json(ws).await;
        assert_eq!(msg["menu_item_id"], "matcha");
        assert_eq!(msg["status"], "pending");
        expect_close(ws).await;
    }
    assert_eq!(orders.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_ready_messages_are_ignored() {
    let orders = StubOrderService::new();
    let addr = spawn_server(orders.clone()).await;

    let mut c1 = connect(addr, "/ws/confirm?room=lemon").await;
    let mut c2 = connect(addr, "/ws/confirm?room=lemon").await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    c1.send(Message::Text(r#"{"status":"maybe"}"#.into()))
        .await
        .unwrap();
    c1.send(Message::Text("not json at all".into()))
        .await
        .unwrap();
    expect_silence(&mut c1, 300).await;
    assert_eq!(orders.calls.load(Ordering::SeqCst), 0);

    c1.send(Message::Text(READY.into())).await.unwrap();
    c2.send(Message::Text(READY.into())).await.unwrap();
    for ws in [&mut c1, &mut c2] {
        assert_eq!(recv_json(ws).await["menu_item_id"], "lemon");
        expect_close(ws).await;
    }
}

#[tokio::test]
async fn disconnect_completing_quorum_triggers() {
    let orders = StubOrderService::new();
    let addr = spawn_server(orders.clone()).await;

    let mut c1 = connect(addr, "/ws/confirm?room=strawberry").await;
    let c2 = connect(addr, "/ws/confirm?room=strawberry").await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    c1.send(Message::Text(READY.into())).await.unwrap();
    // One member ready out of two: nothing happens yet.
    expect_silence(&mut c1, 200).await;

    // The other member leaving makes every remaining member ready.
    drop(c2);

    let msg = recv_json(&mut c1).await;
    assert_eq!(msg["menu_item_id"], "strawberry");
    expect_close(&mut c1).await;
    assert_eq!(orders.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_orders_downgrade_to_error_payload() {
    let addr = spawn_server(Arc::new(FailingOrderService)).await;

    let mut c1 = connect(addr, "/ws/confirm?room=melon").await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    c1.send(Message::Text(READY.into())).await.unwrap();

    let msg = recv_json(&mut c1).await;
    assert_eq!(msg["error"], "order failed");
    expect_close(&mut c1).await;
}

#[tokio::test]
async fn room_state_resets_after_empty() {
    let orders = StubOrderService::new();
    let addr = spawn_server(orders.clone()).await;

    let mut c1 = connect(addr, "/ws/confirm?room=ramune").await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    c1.send(Message::Text(READY.into())).await.unwrap();
    assert_eq!(recv_json(&mut c1).await["menu_item_id"], "ramune");
    expect_close(&mut c1).await;
    drop(c1);

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // A fresh occupant starts from a clean room: no residual readiness or
    // triggered flag, so a new ready signal triggers a new order.
    let mut again = connect(addr, "/ws/confirm?room=ramune").await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    again.send(Message::Text(READY.into())).await.unwrap();
    assert_eq!(recv_json(&mut again).await["menu_item_id"], "ramune");
    expect_close(&mut again).await;
    assert_eq!(orders.calls.load(Ordering::SeqCst), 2);
}
