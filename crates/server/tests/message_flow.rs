//! End-to-end messaging scenario against a real on-disk store.

use dm_server::chat::MessageService;
use dm_server::models::{DeleteMode, RealtimeEvent, UserId};
use dm_server::presence::{Channel, PresenceRegistry};
use dm_server::realtime::Dispatcher;
use dm_server::store::ConversationStore;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_send_connect_deliver_delete_flow() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ConversationStore::new(dir.path()).await.unwrap());
    let presence = Arc::new(PresenceRegistry::new());
    let svc = MessageService::new(store.clone(), Dispatcher::new(presence.clone()));

    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    // 1. Alice sends while Bob is offline: conversation, thread, and entry
    //    are created; nothing is delivered.
    let hello = svc.send(&alice, &bob, "hello").await.unwrap();

    // 2. Bob connects.
    let (tx, mut bob_rx) = mpsc::unbounded_channel();
    let channel = Channel::new(tx);
    presence.register(bob.clone(), channel.clone());

    match bob_rx.recv().await.unwrap() {
        RealtimeEvent::GetOnlineUsers { users } => assert_eq!(users, vec![bob.clone()]),
        other => panic!("expected online-users snapshot, got {:?}", other),
    }

    // 3. Alice sends again: same thread, two entries, delivery fires.
    let again = svc.send(&alice, &bob, "again").await.unwrap();
    assert_eq!(again.thread_id, hello.thread_id);

    match bob_rx.recv().await.unwrap() {
        RealtimeEvent::NewMessage { entry, sender_id, thread_id, .. } => {
            assert_eq!(entry.text, "again");
            assert_eq!(sender_id, alice);
            assert_eq!(thread_id, hello.thread_id);
        }
        other => panic!("expected newMessage, got {:?}", other),
    }

    // 4. Alice deletes the first entry for everyone.
    svc.delete_entry(&alice, &bob, &hello.thread_id, &hello.entry.id, DeleteMode::ForEveryone)
        .await
        .unwrap();

    match bob_rx.recv().await.unwrap() {
        RealtimeEvent::DeleteMessage { entry_id, .. } => assert_eq!(entry_id, hello.entry.id),
        other => panic!("expected deleteMessage, got {:?}", other),
    }

    // 5. Both sides now see only "again".
    for (reader, other) in [(&alice, &bob), (&bob, &alice)] {
        let visible = svc.list_visible(reader, other).await.unwrap();
        assert_eq!(visible.len(), 1, "reader {} should see one entry", reader);
        assert_eq!(visible[0].entry.text, "again");
    }

    // 6. The history survives a process restart.
    let store2 = Arc::new(ConversationStore::new(dir.path()).await.unwrap());
    let svc2 = MessageService::new(store2, Dispatcher::new(Arc::new(PresenceRegistry::new())));
    let visible = svc2.list_visible(&bob, &alice).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].entry.text, "again");

    // 7. Bob disconnects; a later notify is a silent no-op.
    presence.unregister(&bob, channel.id());
    svc.send(&alice, &bob, "anyone there?").await.unwrap();
    assert!(presence.lookup(&bob).is_none());
    assert!(presence.online_users().is_empty());
}

#[tokio::test]
async fn test_edit_notifies_receiver_with_new_text() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ConversationStore::new(dir.path()).await.unwrap());
    let presence = Arc::new(PresenceRegistry::new());
    let svc = MessageService::new(store, Dispatcher::new(presence.clone()));

    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    let sent = svc.send(&alice, &bob, "draft").await.unwrap();

    let (tx, mut bob_rx) = mpsc::unbounded_channel();
    presence.register(bob.clone(), Channel::new(tx));
    // skip the presence snapshot
    assert!(matches!(
        bob_rx.recv().await.unwrap(),
        RealtimeEvent::GetOnlineUsers { .. }
    ));

    svc.edit_entry(&alice, &bob, &sent.thread_id, &sent.entry.id, "final")
        .await
        .unwrap();

    match bob_rx.recv().await.unwrap() {
        RealtimeEvent::UpdateMessage { entry, .. } => assert_eq!(entry.text, "final"),
        other => panic!("expected updateMessage, got {:?}", other),
    }
}
