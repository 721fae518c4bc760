/// Concurrent access tests
///
/// Many tasks driving one session manager at once: the close gate, schema
/// transaction sharing and open serialization.
/// Run with: cargo test --test concurrent_access_tests
use graph_session::{
    MemoryClient, Message, NotificationManager, RemoteSession, RemoteTransaction, SessionManager,
    SessionType,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn setup() -> (Arc<MemoryClient>, Arc<NotificationManager>, SessionManager) {
    let client = Arc::new(MemoryClient::with_databases(["db1", "db2"]));
    let notifications = Arc::new(NotificationManager::new());
    let manager = SessionManager::new(client.clone(), notifications.clone());
    (client, notifications, manager)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_close_tears_down_once() {
    let (client, _notifications, manager) = setup();
    manager.open("db1", SessionType::Schema).await;
    manager.open_or_get_schema_read_tx().await.unwrap();

    let num_tasks = 10;
    let barrier = Arc::new(Barrier::new(num_tasks));
    let mut handles = vec![];

    for _ in 0..num_tasks {
        let manager = manager.clone();
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            manager.close(None).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(client.stats().session_close_calls(), 1);
    assert_eq!(client.stats().transaction_close_calls(), 1);
    assert!(!manager.is_open());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_close_and_server_close_notify_once() {
    let (client, notifications, manager) = setup();
    manager.open("db1", SessionType::Data).await;
    let session = client.last_session().unwrap();

    let closer = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.close(Some(Message::SessionClosedOnServer)).await })
    };
    session.simulate_server_close();
    closer.await.unwrap();

    // Let the spawned server-close handler finish
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!manager.is_open());
    assert_eq!(notifications.messages(), vec![Message::SessionClosedOnServer]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_schema_reads_share_one_transaction() {
    let (client, _notifications, manager) = setup();
    client.set_latency(Duration::from_millis(20));
    manager.open("db1", SessionType::Schema).await;

    let num_tasks = 8;
    let barrier = Arc::new(Barrier::new(num_tasks));
    let mut handles = vec![];

    for _ in 0..num_tasks {
        let manager = manager.clone();
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut seen = vec![];
            for _ in 0..20 {
                seen.push(manager.open_or_get_schema_read_tx().await.unwrap());
            }
            seen
        }));
    }

    let mut all = vec![];
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    assert_eq!(client.stats().transactions_opened(), 1);
    assert!(all.iter().all(|tx| Arc::ptr_eq(tx, &all[0]) && tx.is_open()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opens_leave_one_live_session() {
    let (client, _notifications, manager) = setup();

    let mut handles = vec![];
    for task_id in 0..6 {
        let manager = manager.clone();
        let database = if task_id % 2 == 0 { "db1" } else { "db2" };

        handles.push(tokio::spawn(async move {
            manager.open(database, SessionType::Data).await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let live: Vec<_> = client
        .sessions()
        .into_iter()
        .filter(|session| session.is_open())
        .collect();
    assert_eq!(live.len(), 1);
    assert!(manager.is_open());
    assert_eq!(
        manager.database().as_deref(),
        Some(live[0].database())
    );
}
