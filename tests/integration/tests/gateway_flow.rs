//! End-to-end gateway tests over real HTTP and WebSocket connections.

use chatrelay_core::config::{Config, StoreKind};
use chatrelay_integration_tests::{next_json, rejected_status, TestServer};
use chatrelay_store::SqliteIdentityStore;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_history_frame_on_connect() {
    let server = TestServer::start(Config::default()).await;

    let (_client, history) = server.join("alice").await;
    assert_eq!(history["type"], "history");
    assert!(history["messages"].as_array().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_message_relayed_to_others_only() {
    let server = TestServer::start(Config::default()).await;
    let (mut alice, _) = server.join("alice").await;
    let (mut bob, _) = server.join("bob").await;

    alice.send(Message::Text("hi".to_string())).await.unwrap();

    let envelope = next_json(&mut bob).await.expect("bob receives the message");
    assert_eq!(envelope["content"], "hi");
    assert_eq!(envelope["username"], "alice");
    assert!(envelope["timestamp"].is_string());

    assert!(next_json(&mut alice).await.is_none(), "sender must not get an echo");
    assert!(next_json(&mut bob).await.is_none(), "exactly one envelope");

    server.stop().await;
}

#[tokio::test]
async fn test_late_joiner_receives_history() {
    let server = TestServer::start(Config::default()).await;
    let (mut alice, _) = server.join("alice").await;
    let (mut bob, _) = server.join("bob").await;

    for text in ["first", "second"] {
        alice.send(Message::Text(text.to_string())).await.unwrap();
        next_json(&mut bob).await.expect("relayed");
    }

    let (_carol, history) = server.join("carol").await;
    let messages = history["messages"].as_array().unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["first", "second"]);
    assert!(messages.iter().all(|m| m["username"] == "alice"));

    server.stop().await;
}

#[tokio::test]
async fn test_ticket_is_single_use() {
    let server = TestServer::start(Config::default()).await;
    let ticket = server.ticket_for("alice").await;

    let _first = server.connect(&ticket).await.expect("first use succeeds");
    let err = server.connect(&ticket).await.unwrap_err();
    assert_eq!(rejected_status(&err), Some(401));

    server.stop().await;
}

#[tokio::test]
async fn test_missing_or_forged_ticket_rejected() {
    let server = TestServer::start(Config::default()).await;

    for ticket in ["", "not-a-ticket"] {
        let err = server.connect(ticket).await.unwrap_err();
        assert_eq!(rejected_status(&err), Some(401));
    }
    assert_eq!(server.clients().await, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_origin_allow_list() {
    let server = TestServer::start(Config::default()).await;
    let ticket = server.ticket_for("alice").await;

    let err = server
        .connect_with_origin(&ticket, Some("https://evil.example"))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(&err), Some(401));

    // The rejected attempt left the ticket usable.
    server
        .connect_with_origin(&ticket, Some("http://localhost:8080"))
        .await
        .expect("allowed origin connects");

    server.stop().await;
}

#[tokio::test]
async fn test_expired_ticket_rejected() {
    let mut config = Config::default();
    config.tickets.retention_ms = 100;
    config.tickets.sweep_interval_ms = 20;
    let server = TestServer::start(config).await;

    let ticket = server.ticket_for("alice").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let err = server.connect(&ticket).await.unwrap_err();
    assert_eq!(rejected_status(&err), Some(401));
    assert!(server.gateway.state().vault.is_empty().await);

    server.stop().await;
}

#[tokio::test]
async fn test_capacity_limit() {
    let mut config = Config::default();
    config.gateway.max_connections = 1;
    let server = TestServer::start(config).await;

    let (alice, _) = server.join("alice").await;
    let ticket = server.ticket_for("bob").await;
    let err = server.connect(&ticket).await.unwrap_err();
    assert_eq!(rejected_status(&err), Some(503));

    // Turned away for room, not for the ticket: it still works once alice leaves.
    drop(alice);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.clients().await > 0 {
        assert!(tokio::time::Instant::now() < deadline, "alice was never removed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.connect(&ticket).await.expect("same ticket admitted");

    server.stop().await;
}

#[tokio::test]
async fn test_register_and_login_errors() {
    let server = TestServer::start(Config::default()).await;

    let response = server.register("alice", "secret", "a@example.com").await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["user"].get("password").is_none());

    let duplicate = server.register("alice", "other", "b@example.com").await;
    assert_eq!(duplicate.status(), 400);

    let incomplete = server.register("bob", "", "b@example.com").await;
    assert_eq!(incomplete.status(), 400);

    let wrong = server.login("alice", "nope").await;
    assert_eq!(wrong.status(), 401);
    let body: serde_json::Value = wrong.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    server.stop().await;
}

#[tokio::test]
async fn test_unresponsive_client_is_dropped() {
    let mut config = Config::default();
    config.keepalive.pong_wait_ms = 300;
    let server = TestServer::start(config).await;

    // Never polled after the handshake, so pings go unanswered.
    let (_silent, _) = server.join("alice").await;
    assert_eq!(server.clients().await, 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(server.clients().await, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_responsive_client_stays_connected() {
    let mut config = Config::default();
    config.keepalive.pong_wait_ms = 1000;
    let server = TestServer::start(config).await;

    let (mut client, _) = server.join("alice").await;
    // Reading answers pings with pongs.
    let reader = tokio::spawn(async move {
        while let Some(Ok(_)) = client.next().await {}
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(server.clients().await, 1);

    reader.abort();
    server.stop().await;
}

#[tokio::test]
async fn test_sqlite_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chatrelay.db");
    let mut config = Config::default();
    config.store.kind = StoreKind::Sqlite;
    config.store.path = Some(db.clone());

    {
        let store = Arc::new(SqliteIdentityStore::open(&db).await.unwrap());
        let server = TestServer::start_with_store(config.clone(), store).await;
        let (mut alice, _) = server.join("alice").await;
        let (mut bob, _) = server.join("bob").await;
        alice.send(Message::Text("persisted".to_string())).await.unwrap();
        next_json(&mut bob).await.expect("relayed");
        server.stop().await;
    }

    let store = chatrelay_store::open(&config).await.unwrap();
    let server = TestServer::start_with_store(config, store).await;
    let ticket = server.fresh_ticket("bob").await;
    let mut bob = server.connect(&ticket).await.unwrap();
    let history = next_json(&mut bob).await.unwrap();
    assert_eq!(history["messages"][0]["content"], "persisted");
    assert_eq!(history["messages"][0]["username"], "alice");

    server.stop().await;
}
