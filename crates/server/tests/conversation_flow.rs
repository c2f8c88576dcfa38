use chat_server::chat::presence::{ChannelConnection, ConnectionHandle, PresenceChange};
use chat_server::core::error::Error;
use chat_server::core::models::{Payload, ServerEvent};
use chat_server::core::{AppState, ChatServerConfig};
use std::sync::Arc;
use tempfile::tempdir;

fn text(s: &str) -> Payload {
    Payload::Text(s.to_string())
}

#[tokio::test]
async fn test_offline_receiver_reads_later() {
    let dir = tempdir().unwrap();
    let state = AppState::build(ChatServerConfig::in_memory(dir.path()))
        .await
        .unwrap();
    let candidates = vec!["alice".to_string()];

    // 1. Alice writes to Bob while Bob is offline
    assert!(!state.presence.is_online("bob"));
    let sent = state.router.send("alice", "bob", text("hello")).await.unwrap();
    assert!(!sent.seen);

    // 2. Bob connects and checks the sidebar
    let (connection, mut events) = ChannelConnection::new(8);
    assert_eq!(
        state.presence.connect("bob", Arc::new(connection)),
        PresenceChange::CameOnline("bob".into())
    );
    let counts = state.unseen.unseen_counts("bob", &candidates).await.unwrap();
    assert_eq!(counts.get("alice"), Some(&1));

    // Nothing was queued for Bob while he was away
    assert!(events.try_recv().is_err());

    // 3. Bob opens the conversation, which reads it
    let conversation = state.store.conversation("bob", "alice").await.unwrap();
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].payload, text("hello"));
    assert!(!conversation[0].seen);
    state.store.mark_conversation_read("alice", "bob").await.unwrap();

    let counts = state.unseen.unseen_counts("bob", &candidates).await.unwrap();
    assert!(counts.is_empty());
    let reread = state.store.conversation("alice", "bob").await.unwrap();
    assert!(reread[0].seen);
}

#[tokio::test]
async fn test_online_receiver_gets_live_push() {
    let dir = tempdir().unwrap();
    let state = AppState::build(ChatServerConfig::in_memory(dir.path()))
        .await
        .unwrap();

    let (connection, mut events) = ChannelConnection::new(8);
    state.presence.connect("bob", Arc::new(connection));

    let sent = state.router.send("alice", "bob", text("ping")).await.unwrap();
    match events.recv().await {
        Some(ServerEvent::NewMessage(pushed)) => assert_eq!(pushed, sent),
        other => panic!("expected a new message event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_payload_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let state = AppState::build(ChatServerConfig::in_memory(dir.path()))
        .await
        .unwrap();

    let result = state.router.send("alice", "bob", text("")).await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(state
        .store
        .conversation("alice", "bob")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_messages_survive_restart() {
    let dir = tempdir().unwrap();
    let config = ChatServerConfig::with_base_dir(dir.path());

    let sent = {
        let state = AppState::build(config.clone()).await.unwrap();
        state.router.send("alice", "bob", text("durable")).await.unwrap()
        // state is dropped here
    };

    assert!(dir.path().join("chat.sqlite").exists());

    let state = AppState::build(config).await.unwrap();
    let conversation = state.store.conversation("bob", "alice").await.unwrap();
    assert_eq!(conversation, vec![sent]);
    // Presence starts empty after a restart
    assert!(state.presence.online_user_ids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_and_connections() {
    let dir = tempdir().unwrap();
    let state = AppState::build(ChatServerConfig::in_memory(dir.path()))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..50 {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            let (connection, _events) = ChannelConnection::new(4);
            let connection = Arc::new(connection);
            let id = connection.id();
            state.presence.connect("bob", connection);
            state
                .router
                .send("alice", "bob", Payload::Text(format!("message {}", i)))
                .await
                .unwrap();
            state.presence.disconnect(id);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(!state.presence.is_online("bob"));
    assert_eq!(state.presence.connection_count(), 0);

    let conversation = state.store.conversation("alice", "bob").await.unwrap();
    assert_eq!(conversation.len(), 50);
    assert!(conversation
        .windows(2)
        .all(|w| w[0].created_at <= w[1].created_at));
}
