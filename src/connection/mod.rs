pub mod config;

use crate::core::{AtomicState, Result, SessionError, SessionType};
use crate::interface::{Connector, GraphClient, RemoteSession};
use crate::notification::{Message, NotificationSink};
use crate::session::{SessionConfig, SessionManager};
use async_trait::async_trait;
use config::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, event};

/// Server connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionStatus::Connecting => write!(f, "CONNECTING"),
            ConnectionStatus::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Client handle that forwards to whichever client is currently connected.
///
/// The session manager is created once and keeps this handle across
/// reconnects.
struct SharedClient {
    current: AtomicState<Option<Arc<dyn GraphClient>>>,
}

impl SharedClient {
    fn get(&self) -> Result<Arc<dyn GraphClient>> {
        self.current.get().ok_or(SessionError::NotConnected)
    }
}

#[async_trait]
impl GraphClient for SharedClient {
    async fn session(
        &self,
        database: &str,
        session_type: SessionType,
    ) -> Result<Arc<dyn RemoteSession>> {
        self.get()?.session(database, session_type).await
    }

    async fn databases(&self) -> Result<Vec<String>> {
        self.get()?.databases().await
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        self.get()?.create_database(name).await
    }

    async fn delete_database(&self, name: &str) -> Result<()> {
        self.get()?.delete_database(name).await
    }

    async fn close(&self) -> Result<()> {
        match self.current.replace(None) {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

/// Connection to a server plus database management.
///
/// Owns the [`SessionManager`]; disconnecting closes the session first.
///
/// # Examples
///
/// ```ignore
/// let connection = ConnectionManager::new(connector, notifications);
/// connection.connect(ConnectionConfig::core("localhost:1729")).await;
/// connection.try_open_session("social").await;
/// ```
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    notifier: Arc<dyn NotificationSink>,
    client: Arc<SharedClient>,
    status: AtomicState<ConnectionStatus>,
    config: AtomicState<Option<ConnectionConfig>>,
    database_list: AtomicState<Vec<String>>,
    session: SessionManager,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, notifier: Arc<dyn NotificationSink>) -> Self {
        let client = Arc::new(SharedClient {
            current: AtomicState::new(None),
        });
        let session = SessionManager::new(client.clone(), Arc::clone(&notifier));
        Self::build(connector, notifier, client, session)
    }

    /// Create with a custom session configuration
    pub fn with_session_config(
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn NotificationSink>,
        session_config: SessionConfig,
    ) -> Result<Self> {
        let client = Arc::new(SharedClient {
            current: AtomicState::new(None),
        });
        let session =
            SessionManager::with_config(client.clone(), Arc::clone(&notifier), session_config)?;
        Ok(Self::build(connector, notifier, client, session))
    }

    fn build(
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn NotificationSink>,
        client: Arc<SharedClient>,
        session: SessionManager,
    ) -> Self {
        Self {
            connector,
            notifier,
            client,
            status: AtomicState::new(ConnectionStatus::Disconnected),
            config: AtomicState::new(None),
            database_list: AtomicState::new(Vec::new()),
            session,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn is_disconnected(&self) -> bool {
        self.status() == ConnectionStatus::Disconnected
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Configuration of the current connection
    pub fn config(&self) -> Option<ConnectionConfig> {
        self.config.get()
    }

    /// Database names as of the last refresh, sorted
    pub fn database_list(&self) -> Vec<String> {
        self.database_list.get()
    }

    pub fn subscribe_database_list(&self) -> watch::Receiver<Vec<String>> {
        self.database_list.subscribe()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Connect to a server. Only valid while disconnected.
    ///
    /// Failures are reported as notifications. Returns whether the
    /// connection is established afterwards.
    pub async fn connect(&self, config: ConnectionConfig) -> bool {
        if let Err(reason) = config.validate() {
            event!(Level::WARN, reason = %reason, "invalid connection configuration");
            self.notifier.user_error(Message::UnableToConnect {
                address: config.address.clone(),
            });
            return false;
        }

        if !self
            .status
            .compare_and_set(&ConnectionStatus::Disconnected, ConnectionStatus::Connecting)
        {
            return self.is_connected();
        }

        match self.connector.connect(&config).await {
            Ok(client) => {
                self.client.current.set(Some(client));
                event!(Level::INFO, url = %config.to_url(), "connected");
                self.config.set(Some(config));
                self.status.set(ConnectionStatus::Connected);
                self.refresh_database_list().await;
                true
            }
            Err(err) => {
                event!(Level::WARN, error = %err, address = %config.address, "connection failed");
                self.status.set(ConnectionStatus::Disconnected);
                self.notifier.user_error(Message::UnableToConnect {
                    address: config.address,
                });
                false
            }
        }
    }

    /// Close the session and the client. Returns whether this call
    /// disconnected.
    pub async fn disconnect(&self) -> bool {
        if !self.is_connected() {
            return false;
        }

        self.session.close(None).await;

        let Some(client) = self.client.current.replace(None) else {
            return false;
        };
        if let Err(err) = client.close().await {
            event!(Level::WARN, error = %err, "failed to close client");
        }

        self.database_list.set(Vec::new());
        self.config.set(None);
        self.status.set(ConnectionStatus::Disconnected);
        event!(Level::INFO, "disconnected");
        true
    }

    /// Reload the database list from the server
    pub async fn refresh_database_list(&self) -> bool {
        match self.client.databases().await {
            Ok(mut names) => {
                names.sort();
                self.database_list.set(names);
                true
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "database list refresh failed");
                self.notifier.user_error(Message::FailedToRefreshDatabases);
                false
            }
        }
    }

    /// Create a database and run `on_success` once it exists.
    ///
    /// Blank names are ignored.
    pub async fn try_create_database<F>(&self, name: &str, on_success: F) -> bool
    where
        F: FnOnce(),
    {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        if self.database_list().iter().any(|existing| existing == name) {
            self.notifier.user_error(Message::DatabaseAlreadyExists {
                database: name.to_string(),
            });
            return false;
        }

        match self.client.create_database(name).await {
            Ok(()) => {
                event!(Level::INFO, database = %name, "database created");
                self.refresh_database_list().await;
                on_success();
                true
            }
            Err(SessionError::DatabaseExists(_)) => {
                self.refresh_database_list().await;
                self.notifier.user_error(Message::DatabaseAlreadyExists {
                    database: name.to_string(),
                });
                false
            }
            Err(err) => {
                event!(Level::WARN, error = %err, database = %name, "database creation failed");
                self.notifier.user_error(Message::FailedToCreateDatabase {
                    database: name.to_string(),
                });
                false
            }
        }
    }

    /// Delete a database, closing the session first if it is open on it
    pub async fn try_delete_database(&self, name: &str) -> bool {
        if self.session.database().as_deref() == Some(name) {
            self.session.close(None).await;
        }

        match self.client.delete_database(name).await {
            Ok(()) => {
                event!(Level::INFO, database = %name, "database deleted");
                self.refresh_database_list().await;
                true
            }
            Err(err) => {
                event!(Level::WARN, error = %err, database = %name, "database deletion failed");
                self.notifier.user_error(Message::FailedToDeleteDatabase {
                    database: name.to_string(),
                });
                false
            }
        }
    }

    /// Open a session on `database`, keeping the current session type
    pub async fn try_open_session(&self, database: &str) -> bool {
        let session_type = self.session.session_type();
        self.try_open_session_with_type(database, session_type).await
    }

    pub async fn try_open_session_with_type(
        &self,
        database: &str,
        session_type: SessionType,
    ) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.session.open(database, session_type).await
    }
}
