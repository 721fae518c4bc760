use crate::connection::config::ConnectionConfig;
use crate::core::{Result, SessionType, TransactionOptions, TransactionType};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Callback fired when a remote handle is closed.
///
/// Implementations may invoke it from any thread, including transport
/// threads outside the async runtime.
pub type CloseCallback = Box<dyn Fn() + Send + Sync>;

/// Build a close callback that runs `task` on the current tokio runtime.
///
/// The callback never runs lifecycle code inline, so a driver firing it while
/// the caller holds one of our locks cannot deadlock.
///
/// Must be called from within a runtime.
pub(crate) fn spawning_callback<F, Fut>(task: F) -> CloseCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::current();
    Box::new(move || {
        runtime.spawn(task());
    })
}

/// A connected graph database client.
///
/// This trait is the seam between the session lifecycle code and the wire
/// driver. Production code wraps a real driver; tests use
/// [`MemoryClient`](crate::memory::MemoryClient).
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Open a session of the given type against a database.
    async fn session(
        &self,
        database: &str,
        session_type: SessionType,
    ) -> Result<Arc<dyn RemoteSession>>;

    /// Names of all databases on the server.
    async fn databases(&self) -> Result<Vec<String>>;

    async fn create_database(&self, name: &str) -> Result<()>;

    async fn delete_database(&self, name: &str) -> Result<()>;

    /// Close the client and every session it owns.
    async fn close(&self) -> Result<()>;
}

/// A server-side session scoped to one database.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn database(&self) -> &str;

    fn session_type(&self) -> SessionType;

    fn is_open(&self) -> bool;

    /// Open a transaction. `None` options use the server defaults.
    async fn transaction(
        &self,
        transaction_type: TransactionType,
        options: Option<TransactionOptions>,
    ) -> Result<Arc<dyn RemoteTransaction>>;

    /// Register a callback for when the session closes.
    fn on_close(&self, callback: CloseCallback);

    async fn close(&self) -> Result<()>;
}

/// A server-side transaction within a session.
#[async_trait]
pub trait RemoteTransaction: Send + Sync {
    fn transaction_type(&self) -> TransactionType;

    fn options(&self) -> Option<&TransactionOptions>;

    fn is_open(&self) -> bool;

    /// Register a callback for when the transaction closes.
    fn on_close(&self, callback: CloseCallback);

    async fn close(&self) -> Result<()>;
}

/// A factory for connected clients.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn GraphClient>>;
}
