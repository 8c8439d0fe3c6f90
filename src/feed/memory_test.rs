use super::*;
use crate::feed::MessageKind;
use tokio::time::{Duration, timeout};

async fn next_snapshot(stream: &mut SnapshotStream) -> Vec<Message> {
    timeout(Duration::from_millis(200), stream.next())
        .await
        .expect("snapshot timed out")
        .expect("stream ended")
        .expect("snapshot error")
}

fn hello(sender: Uuid) -> NewMessage {
    NewMessage::text("hello", sender, "Alice").expect("non-empty")
}

#[tokio::test]
async fn subscribe_delivers_current_snapshot_first() {
    let store = InMemoryMessageStore::new();
    let account = Uuid::new_v4();
    store.append(account, hello(account)).await.unwrap();

    let mut stream = store.subscribe(account, 100).await.unwrap();
    let first = next_snapshot(&mut stream).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].text, "hello");
    assert_eq!(first[0].kind, MessageKind::Text);
}

#[tokio::test]
async fn append_pushes_full_snapshot() {
    let store = InMemoryMessageStore::new();
    let account = Uuid::new_v4();
    let mut stream = store.subscribe(account, 100).await.unwrap();
    assert!(next_snapshot(&mut stream).await.is_empty());

    let id1 = store.append(account, hello(account)).await.unwrap();
    let id2 = store.append(account, hello(account)).await.unwrap();
    assert_ne!(id1, id2);

    let _ = next_snapshot(&mut stream).await;
    let second = next_snapshot(&mut stream).await;
    assert_eq!(second.iter().map(|m| m.id.clone()).collect::<Vec<_>>(), [id1, id2]);
}

#[tokio::test]
async fn timestamps_strictly_increase() {
    let store = InMemoryMessageStore::new();
    let account = Uuid::new_v4();
    for _ in 0..5 {
        store.append(account, hello(account)).await.unwrap();
    }
    let snapshot = store.snapshot(account, 100).await.unwrap();
    let stamps: Vec<i64> = snapshot.iter().filter_map(|m| m.created_at).collect();
    assert_eq!(stamps.len(), 5);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn accounts_are_isolated() {
    let store = InMemoryMessageStore::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut stream_b = store.subscribe(b, 100).await.unwrap();
    let _ = next_snapshot(&mut stream_b).await;

    store.append(a, hello(a)).await.unwrap();

    assert_eq!(store.len(a), 1);
    assert_eq!(store.len(b), 0);
    assert!(
        timeout(Duration::from_millis(50), stream_b.next()).await.is_err(),
        "account b should not be notified"
    );
}

#[tokio::test]
async fn snapshot_is_capped_oldest_first() {
    let store = InMemoryMessageStore::new();
    let account = Uuid::new_v4();
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(store.append(account, hello(account)).await.unwrap());
    }
    let snapshot = store.snapshot(account, 2).await.unwrap();
    assert_eq!(snapshot.iter().map(|m| m.id.clone()).collect::<Vec<_>>(), ids[..2]);
}

#[tokio::test]
async fn rejected_appends_store_nothing() {
    let store = InMemoryMessageStore::new();
    let account = Uuid::new_v4();
    store.reject_appends(Some("permission-denied"));

    let err = store.append(account, hello(account)).await.unwrap_err();
    assert_eq!(err, StoreError::Write("permission-denied".into()));
    assert_eq!(store.len(account), 0);

    store.reject_appends(None);
    assert!(store.append(account, hello(account)).await.is_ok());
}

#[tokio::test]
async fn dropped_streams_are_pruned() {
    let store = InMemoryMessageStore::new();
    let account = Uuid::new_v4();
    let stream = store.subscribe(account, 100).await.unwrap();
    assert_eq!(store.subscriber_count(account), 1);

    drop(stream);
    assert_eq!(store.subscriber_count(account), 0);
    store.append(account, hello(account)).await.unwrap();
    assert_eq!(store.len(account), 1);
}

#[tokio::test]
async fn get_user_returns_registered_name() {
    let store = InMemoryMessageStore::new();
    let user = Uuid::new_v4();
    assert_eq!(store.get_user(user).await.unwrap(), None);

    store.insert_user(user, Some("Alice"));
    let record = store.get_user(user).await.unwrap().expect("user exists");
    assert_eq!(record.id, user);
    assert_eq!(record.name.as_deref(), Some("Alice"));
}
