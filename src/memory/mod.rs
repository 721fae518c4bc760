// ============================================================================
// In-memory client
// ============================================================================
//
// A process-local implementation of the client facade. Sessions and
// transactions are plain flags, so the lifecycle code can be exercised without
// a server: call counters, failure injection and server-side closes are all
// controllable from tests.
//
// ============================================================================

use crate::connection::config::ConnectionConfig;
use crate::core::{Result, SessionError, SessionType, TransactionOptions, TransactionType};
use crate::interface::{CloseCallback, Connector, GraphClient, RemoteSession, RemoteTransaction};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Call counters shared by a client and every handle it creates
#[derive(Debug, Default)]
pub struct MemoryStats {
    sessions_opened: AtomicUsize,
    session_close_calls: AtomicUsize,
    transactions_opened: AtomicUsize,
    transaction_close_calls: AtomicUsize,
}

impl MemoryStats {
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Number of `close()` calls on sessions, including repeated ones
    pub fn session_close_calls(&self) -> usize {
        self.session_close_calls.load(Ordering::SeqCst)
    }

    pub fn transactions_opened(&self) -> usize {
        self.transactions_opened.load(Ordering::SeqCst)
    }

    /// Number of `close()` calls on transactions, including repeated ones
    pub fn transaction_close_calls(&self) -> usize {
        self.transaction_close_calls.load(Ordering::SeqCst)
    }
}

/// Registered close callbacks, fired once on the first close
#[derive(Default)]
struct CloseListeners {
    callbacks: Mutex<Vec<CloseCallback>>,
}

impl CloseListeners {
    fn push(&self, callback: CloseCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(callback);
    }

    fn fire(&self) {
        // Callbacks run outside the lock so they may register more listeners
        let callbacks = std::mem::take(
            &mut *self
                .callbacks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for callback in callbacks {
            callback();
        }
    }
}

/// In-memory graph client
pub struct MemoryClient {
    databases: Mutex<BTreeSet<String>>,
    sessions: Mutex<Vec<Arc<MemorySession>>>,
    stats: Arc<MemoryStats>,
    latency: Mutex<Duration>,
    close_latency: Mutex<Duration>,
    fail_sessions: AtomicBool,
    sessions_start_closed: AtomicBool,
    fail_database_ops: AtomicBool,
    closed: AtomicBool,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(BTreeSet::new()),
            sessions: Mutex::new(Vec::new()),
            stats: Arc::new(MemoryStats::default()),
            latency: Mutex::new(Duration::ZERO),
            close_latency: Mutex::new(Duration::ZERO),
            fail_sessions: AtomicBool::new(false),
            sessions_start_closed: AtomicBool::new(false),
            fail_database_ops: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a client with the given databases already present
    pub fn with_databases<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        client
            .lock_databases()
            .extend(names.into_iter().map(Into::into));
        client
    }

    pub fn stats(&self) -> &Arc<MemoryStats> {
        &self.stats
    }

    /// Delay every session and transaction open by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    /// Delay every session `close()` by `latency`
    pub fn set_close_latency(&self, latency: Duration) {
        *self.close_latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    /// Make `session()` return an error
    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Make `session()` succeed with a handle that reports itself closed
    pub fn sessions_start_closed(&self, closed: bool) {
        self.sessions_start_closed.store(closed, Ordering::SeqCst);
    }

    /// Make database list/create/delete return errors
    pub fn fail_database_ops(&self, fail: bool) {
        self.fail_database_ops.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every session handed out so far, oldest first
    pub fn sessions(&self) -> Vec<Arc<MemorySession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn last_session(&self) -> Option<Arc<MemorySession>> {
        self.sessions().last().cloned()
    }

    fn lock_databases(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.databases.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn latency(&self) -> Duration {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_connected(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    fn check_database_ops(&self) -> Result<()> {
        if self.fail_database_ops.load(Ordering::SeqCst) {
            return Err(SessionError::Client("database operation rejected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphClient for MemoryClient {
    async fn session(
        &self,
        database: &str,
        session_type: SessionType,
    ) -> Result<Arc<dyn RemoteSession>> {
        self.check_connected()?;

        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(SessionError::Client("connection refused".into()));
        }

        if !self.lock_databases().contains(database) {
            return Err(SessionError::DatabaseNotFound(database.to_string()));
        }

        let session = Arc::new(MemorySession {
            id: Uuid::new_v4(),
            database: database.to_string(),
            session_type,
            open: AtomicBool::new(!self.sessions_start_closed.load(Ordering::SeqCst)),
            listeners: CloseListeners::default(),
            transactions: Mutex::new(Vec::new()),
            stats: Arc::clone(&self.stats),
            latency,
            close_latency: *self.close_latency.lock().unwrap_or_else(|p| p.into_inner()),
        });

        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::clone(&session));

        Ok(session)
    }

    async fn databases(&self) -> Result<Vec<String>> {
        self.check_connected()?;
        self.check_database_ops()?;
        Ok(self.lock_databases().iter().cloned().collect())
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        self.check_connected()?;
        self.check_database_ops()?;
        if !self.lock_databases().insert(name.to_string()) {
            return Err(SessionError::DatabaseExists(name.to_string()));
        }
        Ok(())
    }

    async fn delete_database(&self, name: &str) -> Result<()> {
        self.check_connected()?;
        self.check_database_ops()?;
        if !self.lock_databases().remove(name) {
            return Err(SessionError::DatabaseNotFound(name.to_string()));
        }

        // Sessions on a deleted database are closed by the server
        for session in self.sessions() {
            if session.database == name {
                session.simulate_server_close();
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for session in self.sessions() {
            session.shutdown();
        }
        Ok(())
    }
}

/// In-memory session handle
pub struct MemorySession {
    id: Uuid,
    database: String,
    session_type: SessionType,
    open: AtomicBool,
    listeners: CloseListeners,
    transactions: Mutex<Vec<Arc<MemoryTransaction>>>,
    stats: Arc<MemoryStats>,
    latency: Duration,
    close_latency: Duration,
}

impl MemorySession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Every transaction opened on this session, oldest first
    pub fn transactions(&self) -> Vec<Arc<MemoryTransaction>> {
        self.transactions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Close the session as the server would: listeners fire, transactions die
    pub fn simulate_server_close(&self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        self.listeners.fire();
        for transaction in self.transactions() {
            transaction.shutdown();
        }
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    fn database(&self) -> &str {
        &self.database
    }

    fn session_type(&self) -> SessionType {
        self.session_type
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn transaction(
        &self,
        transaction_type: TransactionType,
        options: Option<TransactionOptions>,
    ) -> Result<Arc<dyn RemoteTransaction>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if !self.is_open() {
            return Err(SessionError::Client("session is closed".into()));
        }

        let transaction = Arc::new(MemoryTransaction {
            id: Uuid::new_v4(),
            transaction_type,
            options,
            open: AtomicBool::new(true),
            listeners: CloseListeners::default(),
            stats: Arc::clone(&self.stats),
        });

        self.stats.transactions_opened.fetch_add(1, Ordering::SeqCst);
        self.transactions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::clone(&transaction));

        Ok(transaction)
    }

    fn on_close(&self, callback: CloseCallback) {
        self.listeners.push(callback);
    }

    async fn close(&self) -> Result<()> {
        self.stats.session_close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.close_latency.is_zero() {
            tokio::time::sleep(self.close_latency).await;
        }
        self.shutdown();
        Ok(())
    }
}

/// In-memory transaction handle
pub struct MemoryTransaction {
    id: Uuid,
    transaction_type: TransactionType,
    options: Option<TransactionOptions>,
    open: AtomicBool,
    listeners: CloseListeners,
    stats: Arc<MemoryStats>,
}

impl MemoryTransaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Close the transaction as the server would
    pub fn simulate_server_close(&self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.listeners.fire();
        }
    }
}

#[async_trait]
impl RemoteTransaction for MemoryTransaction {
    fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    fn options(&self) -> Option<&TransactionOptions> {
        self.options.as_ref()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn on_close(&self, callback: CloseCallback) {
        self.listeners.push(callback);
    }

    async fn close(&self) -> Result<()> {
        self.stats
            .transaction_close_calls
            .fetch_add(1, Ordering::SeqCst);
        self.shutdown();
        Ok(())
    }
}

/// Connector handing out a shared [`MemoryClient`]
pub struct MemoryConnector {
    client: Arc<MemoryClient>,
    refuse: AtomicBool,
}

impl MemoryConnector {
    pub fn new(client: Arc<MemoryClient>) -> Self {
        Self {
            client,
            refuse: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &Arc<MemoryClient> {
        &self.client
    }

    /// Make `connect()` fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn GraphClient>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Client(format!(
                "unable to reach {}",
                config.address
            )));
        }
        self.client.closed.store(false, Ordering::SeqCst);
        let client: Arc<dyn GraphClient> = self.client.clone();
        Ok(client)
    }
}
