// ============================================================================
// Transaction Manager
// ============================================================================

use crate::core::{AtomicState, Result, TransactionOptions, TransactionType};
use crate::interface::{RemoteSession, RemoteTransaction, spawning_callback};
use crate::notification::{Message, NotificationSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{Level, event};

/// The user transaction currently held, tagged so that stale close
/// callbacks from an earlier transaction can be told apart.
struct ActiveTransaction {
    generation: u64,
    handle: Arc<dyn RemoteTransaction>,
}

struct Inner {
    current: Mutex<Option<ActiveTransaction>>,
    is_open: AtomicState<bool>,
    transaction_type: AtomicState<Option<TransactionType>>,
    generation: AtomicU64,
    notifier: Arc<dyn NotificationSink>,
}

/// Owns the single user-facing transaction of a session.
///
/// Opening a new transaction closes the previous one. Cloning yields another
/// handle to the same state.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<Inner>,
}

impl TransactionManager {
    pub fn new(notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: Mutex::new(None),
                is_open: AtomicState::new(false),
                transaction_type: AtomicState::new(None),
                generation: AtomicU64::new(0),
                notifier,
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open.get()
    }

    /// Type of the open transaction, if any
    pub fn transaction_type(&self) -> Option<TransactionType> {
        self.inner.transaction_type.get()
    }

    pub fn subscribe_open(&self) -> tokio::sync::watch::Receiver<bool> {
        self.inner.is_open.subscribe()
    }

    /// The open transaction, if any
    pub async fn current(&self) -> Option<Arc<dyn RemoteTransaction>> {
        self.inner
            .current
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.handle))
    }

    /// Open a transaction on `session`, closing the previous one first
    pub async fn open(
        &self,
        session: &Arc<dyn RemoteSession>,
        transaction_type: TransactionType,
        options: Option<TransactionOptions>,
    ) -> Result<Arc<dyn RemoteTransaction>> {
        let mut current = self.inner.current.lock().await;

        if let Some(previous) = current.take() {
            self.inner.is_open.set(false);
            self.inner.transaction_type.set(None);
            close_quietly(&previous.handle).await;
        }

        let handle = session.transaction(transaction_type, options).await?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let weak = Arc::downgrade(&self.inner);
        handle.on_close(spawning_callback(move || {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    TransactionManager { inner }.closed_on_server(generation).await;
                }
            }
        }));

        *current = Some(ActiveTransaction {
            generation,
            handle: Arc::clone(&handle),
        });
        self.inner.transaction_type.set(Some(transaction_type));
        self.inner.is_open.set(true);

        event!(Level::DEBUG, %transaction_type, generation, "user transaction opened");
        Ok(handle)
    }

    /// Close the open transaction. Only the first of concurrent callers acts.
    pub async fn close(&self) {
        if !self.inner.is_open.compare_and_set(&true, false) {
            return;
        }

        let previous = self.inner.current.lock().await.take();
        self.inner.transaction_type.set(None);
        if let Some(previous) = previous {
            close_quietly(&previous.handle).await;
            event!(Level::DEBUG, generation = previous.generation, "user transaction closed");
        }
    }

    async fn closed_on_server(&self, generation: u64) {
        let mut current = self.inner.current.lock().await;
        let is_current = current
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if !is_current || !self.inner.is_open.compare_and_set(&true, false) {
            return;
        }

        current.take();
        drop(current);
        self.inner.transaction_type.set(None);
        self.inner.notifier.user_error(Message::TransactionClosedOnServer);
    }
}

async fn close_quietly(handle: &Arc<dyn RemoteTransaction>) {
    if let Err(err) = handle.close().await {
        event!(Level::WARN, error = %err, "failed to close transaction");
    }
}
