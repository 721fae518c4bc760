// ============================================================================
// Session Manager
// ============================================================================
//
// Open, share and close the single live session.
//
// ============================================================================

use super::config::SessionConfig;
use super::schema_tx::SchemaReadTxSlot;
use crate::core::{
    AtomicState, Result, SessionError, SessionType, TransactionOptions, TransactionType,
};
use crate::interface::{GraphClient, RemoteSession, RemoteTransaction, spawning_callback};
use crate::notification::{Message, NotificationSink};
use crate::transaction::TransactionManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, Level, event, info_span};

/// Callback run each time a session opens successfully
pub type OpenCallback = Arc<dyn Fn() + Send + Sync>;

/// The session in use, tagged with the open attempt that produced it
#[derive(Clone)]
pub(super) struct LiveSession {
    pub(super) generation: u64,
    pub(super) handle: Arc<dyn RemoteSession>,
}

pub(super) struct Inner {
    pub(super) client: Arc<dyn GraphClient>,
    pub(super) notifier: Arc<dyn NotificationSink>,
    pub(super) config: SessionConfig,
    session_type: AtomicState<SessionType>,
    is_open: AtomicState<bool>,
    session: AtomicState<Option<LiveSession>>,
    /// Bumped on every open attempt and when teardown starts. A session whose
    /// generation is behind is being torn down: stale server-close callbacks
    /// back off and no new transaction is opened on it.
    session_generation: AtomicU64,
    open_gate: Mutex<()>,
    on_open: StdMutex<Vec<OpenCallback>>,
    pub(super) schema_tx: SchemaReadTxSlot,
    transactions: TransactionManager,
}

/// Owns at most one live session against the server.
///
/// All state is behind an `Arc`; clones are handles to the same manager.
/// Expected failures (server unreachable, session closed remotely) are
/// reported through the notification sink, never returned from `open` or
/// `close`.
///
/// # Examples
///
/// ```ignore
/// let manager = SessionManager::new(client, notifications);
/// manager.open("social", SessionType::Schema).await;
/// let tx = manager.open_or_get_schema_read_tx().await?;
/// manager.close(None).await;
/// ```
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager with the default configuration
    pub fn new(client: Arc<dyn GraphClient>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self::build(client, notifier, SessionConfig::default())
    }

    /// Create a manager with a custom configuration
    pub fn with_config(
        client: Arc<dyn GraphClient>,
        notifier: Arc<dyn NotificationSink>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate().map_err(SessionError::Config)?;
        Ok(Self::build(client, notifier, config))
    }

    fn build(
        client: Arc<dyn GraphClient>,
        notifier: Arc<dyn NotificationSink>,
        config: SessionConfig,
    ) -> Self {
        let transactions = TransactionManager::new(Arc::clone(&notifier));
        Self {
            inner: Arc::new(Inner {
                client,
                notifier,
                session_type: AtomicState::new(config.default_session_type),
                config,
                is_open: AtomicState::new(false),
                session: AtomicState::new(None),
                session_generation: AtomicU64::new(0),
                open_gate: Mutex::new(()),
                on_open: StdMutex::new(Vec::new()),
                schema_tx: SchemaReadTxSlot::new(),
                transactions,
            }),
        }
    }

    pub(super) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub(super) fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Whether `generation` still names the session in use
    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.inner.session_generation.load(Ordering::SeqCst) == generation
    }

    /// The session, unless teardown has started
    pub(super) fn live_session(&self) -> Option<LiveSession> {
        self.inner
            .session
            .get()
            .filter(|live| self.is_current(live.generation))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open.get()
    }

    pub fn session_type(&self) -> SessionType {
        self.inner.session_type.get()
    }

    pub fn is_schema(&self) -> bool {
        self.session_type().is_schema()
    }

    pub fn is_data(&self) -> bool {
        self.session_type().is_data()
    }

    /// Name of the database the current session is scoped to
    pub fn database(&self) -> Option<String> {
        self.inner
            .session
            .get()
            .map(|live| live.handle.database().to_string())
    }

    pub fn subscribe_open(&self) -> watch::Receiver<bool> {
        self.inner.is_open.subscribe()
    }

    pub fn subscribe_type(&self) -> watch::Receiver<SessionType> {
        self.inner.session_type.subscribe()
    }

    /// Manager of the user-facing transaction of this session
    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.inner.transactions
    }

    /// Register a callback run after every successful open, before the
    /// manager reports itself open. Callbacks run in registration order on
    /// the opening task, so they must be quick and idempotent.
    pub fn on_open<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .on_open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(callback));
    }

    /// Open a session on `database`, replacing the current one.
    ///
    /// A no-op when already open on the same database with the same type.
    /// Failures are reported to the notification sink and leave the manager
    /// closed. Returns whether a session is open afterwards.
    ///
    /// Not cancel-safe: dropping the future midway can leave the previous
    /// session unclosed on the server. Drive it to completion.
    pub async fn open(&self, database: &str, session_type: SessionType) -> bool {
        let _gate = self.inner.open_gate.lock().await;

        if self.is_open()
            && self.session_type() == session_type
            && self.database().as_deref() == Some(database)
        {
            return true;
        }

        let span = info_span!("session.open", database = %database, session_type = %session_type);
        self.open_replacing(database, session_type)
            .instrument(span)
            .await
    }

    async fn open_replacing(&self, database: &str, session_type: SessionType) -> bool {
        self.close(None).await;

        let generation = self.inner.session_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = match self.inner.client.session(database, session_type).await {
            Ok(session) => session,
            Err(err) => {
                self.fail_open(database, session_type, Some(&err));
                return false;
            }
        };

        self.watch_session_close(&session, generation);

        if !session.is_open() {
            close_session_quietly(&session).await;
            self.fail_open(database, session_type, None);
            return false;
        }

        self.inner.session.set(Some(LiveSession {
            generation,
            handle: Arc::clone(&session),
        }));
        self.inner.session_type.set(session_type);
        for callback in self.on_open_callbacks() {
            callback();
        }
        self.inner.is_open.set(true);
        event!(Level::INFO, generation, "session opened");

        // A server close racing the steps above found the flag still false
        if !session.is_open() {
            self.close(Some(Message::SessionClosedOnServer)).await;
            return false;
        }
        true
    }

    fn on_open_callbacks(&self) -> Vec<OpenCallback> {
        self.inner
            .on_open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn watch_session_close(&self, session: &Arc<dyn RemoteSession>, generation: u64) {
        let weak = self.downgrade();
        session.on_close(spawning_callback(move || {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(manager) = SessionManager::upgrade(&weak) {
                    manager.closed_on_server(generation).await;
                }
            }
        }));
    }

    async fn closed_on_server(&self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        self.close(Some(Message::SessionClosedOnServer)).await;
    }

    fn fail_open(&self, database: &str, session_type: SessionType, cause: Option<&SessionError>) {
        self.inner.is_open.set(false);
        self.inner.session.set(None);

        let failure = SessionError::SessionOpenFailure {
            session_type,
            database: database.to_string(),
        };
        match cause {
            Some(cause) => event!(Level::WARN, error = %failure, cause = %cause, "session open failed"),
            None => event!(Level::WARN, error = %failure, "session reported closed after open"),
        }

        self.inner.notifier.user_error(Message::FailedToOpenSession {
            session_type,
            database: database.to_string(),
        });
    }

    /// Open a transaction on the current session.
    ///
    /// Returns `Ok(None)` when no session is open or the session is closing.
    /// `None` options use the server defaults.
    pub async fn transaction(
        &self,
        transaction_type: TransactionType,
        options: Option<TransactionOptions>,
    ) -> Result<Option<Arc<dyn RemoteTransaction>>> {
        let Some(live) = self.live_session() else {
            return Ok(None);
        };
        live.handle
            .transaction(transaction_type, options)
            .await
            .map(Some)
    }

    /// Open the user-facing transaction, replacing any previous one
    pub async fn begin_transaction(
        &self,
        transaction_type: TransactionType,
        options: Option<TransactionOptions>,
    ) -> Result<Arc<dyn RemoteTransaction>> {
        let live = self.live_session().ok_or(SessionError::NotOpen)?;
        let handle = self
            .inner
            .transactions
            .open(&live.handle, transaction_type, options)
            .await?;

        // Teardown started while the transaction was opening
        if !self.is_current(live.generation) {
            self.inner.transactions.close().await;
            return Err(SessionError::NotOpen);
        }
        Ok(handle)
    }

    /// Close the current session.
    ///
    /// Only the first of any concurrent callers tears down; the rest are
    /// no-ops. `message` is reported after teardown. Returns whether this
    /// call performed the teardown.
    ///
    /// Not cancel-safe: once the gate is won, dropping the future can leave
    /// the session handle unclosed.
    pub async fn close(&self, message: Option<Message>) -> bool {
        if !self.inner.is_open.compare_and_set(&true, false) {
            return false;
        }
        // Retire the session before any await so nothing new is opened on it
        self.inner.session_generation.fetch_add(1, Ordering::SeqCst);

        let span = info_span!("session.close");
        async {
            self.evict_schema_read_tx(None).await;
            self.inner.transactions.close().await;
            if let Some(live) = self.inner.session.get() {
                close_session_quietly(&live.handle).await;
            }
            self.inner.session.set(None);
            event!(Level::INFO, "session closed");
        }
        .instrument(span)
        .await;

        if let Some(message) = message {
            self.inner.notifier.user_error(message);
        }
        true
    }
}

async fn close_session_quietly(session: &Arc<dyn RemoteSession>) {
    if let Err(err) = session.close().await {
        event!(Level::WARN, error = %err, database = session.database(), "failed to close session");
    }
}
