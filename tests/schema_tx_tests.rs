/// Schema read transaction tests
///
/// Idle eviction timing runs on paused tokio time, so the 16 second timeout
/// is exercised without waiting for it.
/// Run with: cargo test --test schema_tx_tests
use futures::future::join_all;
use graph_session::{
    MemoryClient, NotificationManager, RemoteTransaction, SessionConfig, SessionError,
    SessionManager, SessionType,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

async fn open_schema_session(client: &Arc<MemoryClient>) -> SessionManager {
    let manager = SessionManager::new(client.clone(), Arc::new(NotificationManager::new()));
    assert!(manager.open("db1", SessionType::Schema).await);
    manager
}

#[tokio::test(start_paused = true)]
async fn test_eviction_lands_after_idle_timeout() {
    let client = Arc::new(MemoryClient::with_databases(["db1"]));
    let manager = open_schema_session(&client).await;

    let started = Instant::now();
    let tx = manager.open_or_get_schema_read_tx().await.unwrap();

    while tx.is_open() {
        sleep(Duration::from_millis(100)).await;
    }
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(16), "evicted after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(17), "evicted after {:?}", elapsed);
    assert!(!manager.has_schema_read_tx().await);
}

#[tokio::test(start_paused = true)]
async fn test_access_postpones_eviction() {
    let client = Arc::new(MemoryClient::with_databases(["db1"]));
    let manager = open_schema_session(&client).await;
    let tx = manager.open_or_get_schema_read_tx().await.unwrap();

    sleep(Duration::from_secs(10)).await;
    let same = manager.open_or_get_schema_read_tx().await.unwrap();
    assert!(Arc::ptr_eq(&tx, &same));

    // 20s after open, 10s after the last access
    sleep(Duration::from_secs(10)).await;
    assert!(tx.is_open());

    // Past 26s the touch at 10s has expired
    sleep(Duration::from_millis(6_100)).await;
    assert!(!tx.is_open());
    assert_eq!(client.stats().transactions_opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_transaction_after_eviction() {
    let client = Arc::new(MemoryClient::with_databases(["db1"]));
    let manager = open_schema_session(&client).await;
    let first = manager.open_or_get_schema_read_tx().await.unwrap();

    sleep(Duration::from_secs(17)).await;
    assert!(!first.is_open());

    let second = manager.open_or_get_schema_read_tx().await.unwrap();
    assert!(second.is_open());
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(client.stats().transactions_opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_custom_idle_timeout() {
    let client = Arc::new(MemoryClient::with_databases(["db1"]));
    let config = SessionConfig::new().schema_tx_idle_timeout(Duration::from_secs(2));
    let manager =
        SessionManager::with_config(client.clone(), Arc::new(NotificationManager::new()), config)
            .unwrap();
    manager.open("db1", SessionType::Schema).await;

    let tx = manager.open_or_get_schema_read_tx().await.unwrap();
    sleep(Duration::from_millis(2_100)).await;

    assert!(!tx.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_access_opens_one_transaction() {
    let client = Arc::new(MemoryClient::with_databases(["db1"]));
    // Latency is fixed per session when it opens
    client.set_latency(Duration::from_millis(50));
    let manager = open_schema_session(&client).await;

    let calls = (0..16).map(|_| {
        let manager = manager.clone();
        async move { manager.open_or_get_schema_read_tx().await.unwrap() }
    });
    let handles = join_all(calls).await;

    assert_eq!(client.stats().transactions_opened(), 1);
    assert!(handles.iter().all(|tx| Arc::ptr_eq(tx, &handles[0])));
}

#[tokio::test]
async fn test_session_replacement_closes_cached_transaction() {
    let client = Arc::new(MemoryClient::with_databases(["db1", "db2"]));
    let manager = open_schema_session(&client).await;
    let tx = manager.open_or_get_schema_read_tx().await.unwrap();

    manager.open("db2", SessionType::Schema).await;

    assert!(!tx.is_open());
    assert!(!manager.has_schema_read_tx().await);
}

#[tokio::test(start_paused = true)]
async fn test_no_schema_transaction_on_closing_session() {
    let client = Arc::new(MemoryClient::with_databases(["db1", "db2"]));
    client.set_close_latency(Duration::from_millis(100));
    let manager = open_schema_session(&client).await;
    let db1 = client.last_session().unwrap();

    let closer = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.close(None).await })
    };
    // Let the close reach the slow server round trip
    tokio::task::yield_now().await;

    assert_eq!(
        manager.open_or_get_schema_read_tx().await.err(),
        Some(SessionError::NotOpen)
    );
    assert!(closer.await.unwrap());
    assert!(!manager.has_schema_read_tx().await);
    assert!(db1.transactions().is_empty());

    manager.open("db2", SessionType::Schema).await;
    let tx = manager.open_or_get_schema_read_tx().await.unwrap();
    assert!(tx.is_open());
    assert_eq!(client.last_session().unwrap().transactions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_schema_transaction_opening_during_close_is_discarded() {
    let client = Arc::new(MemoryClient::with_databases(["db1"]));
    client.set_latency(Duration::from_millis(50));
    client.set_close_latency(Duration::from_millis(100));
    let manager = open_schema_session(&client).await;
    let db1 = client.last_session().unwrap();

    let reader = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.open_or_get_schema_read_tx().await })
    };
    // The reader is now waiting on the server for its transaction
    tokio::task::yield_now().await;
    manager.close(None).await;

    assert_eq!(reader.await.unwrap().err(), Some(SessionError::NotOpen));
    assert!(!manager.has_schema_read_tx().await);
    assert!(db1.transactions().iter().all(|tx| !tx.is_open()));
}
