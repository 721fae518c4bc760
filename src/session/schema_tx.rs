// ============================================================================
// Schema Read Transaction Cache
// ============================================================================
//
// Type browsing and autocompletion read the schema constantly, so one read
// transaction is kept open and shared. It is closed once nobody has touched it
// for the configured idle timeout, when the session closes, or when the
// server closes it. It never outlives the session it was opened on.
//
// ============================================================================

use super::manager::SessionManager;
use crate::core::{Result, SessionError, TransactionOptions, TransactionType};
use crate::interface::{RemoteTransaction, spawning_callback};
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{Level, event};

pub(super) struct SchemaReadTx {
    generation: u64,
    /// Generation of the session the transaction was opened on
    session_generation: u64,
    handle: Arc<dyn RemoteTransaction>,
}

/// Slot holding at most one schema read transaction, plus its access clock.
///
/// The access time is kept outside the slot lock so the idle task can read it
/// without contending with callers.
pub(super) struct SchemaReadTxSlot {
    slot: Mutex<Option<SchemaReadTx>>,
    /// Milliseconds since `epoch` at the last access
    last_access: AtomicU64,
    epoch: Instant,
    generation: AtomicU64,
}

impl SchemaReadTxSlot {
    pub(super) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            last_access: AtomicU64::new(0),
            epoch: Instant::now(),
            generation: AtomicU64::new(0),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self) {
        self.last_access.store(self.now_millis(), Ordering::SeqCst);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_access.load(Ordering::SeqCst);
        Duration::from_millis(self.now_millis().saturating_sub(last))
    }
}

/// Outcome of one idle check
enum IdleCheck {
    Evicted,
    /// The transaction this task watched is gone
    Superseded,
    Active { remaining: Duration },
}

impl SessionManager {
    /// Return the shared schema read transaction, opening it if needed.
    ///
    /// Every call counts as an access and postpones idle eviction. Concurrent
    /// first calls open exactly one transaction.
    pub async fn open_or_get_schema_read_tx(&self) -> Result<Arc<dyn RemoteTransaction>> {
        let mut slot = self.inner.schema_tx.slot.lock().await;
        self.inner.schema_tx.touch();

        match slot.take() {
            Some(cached) if self.is_current(cached.session_generation) => {
                let handle = Arc::clone(&cached.handle);
                *slot = Some(cached);
                return Ok(handle);
            }
            Some(stale) => {
                close_quietly(&stale.handle).await;
                event!(
                    Level::DEBUG,
                    generation = stale.generation,
                    "stale schema read transaction dropped"
                );
            }
            None => {}
        }
        self.install_schema_read_tx(&mut slot).await
    }

    /// Replace the cached schema read transaction with a fresh one, so that
    /// schema changes committed elsewhere become visible.
    ///
    /// Does nothing and returns `Ok(None)` when nothing is cached.
    pub async fn reset_schema_read_tx(&self) -> Result<Option<Arc<dyn RemoteTransaction>>> {
        let mut slot = self.inner.schema_tx.slot.lock().await;
        let Some(previous) = slot.take() else {
            return Ok(None);
        };

        close_quietly(&previous.handle).await;
        event!(Level::DEBUG, generation = previous.generation, "schema read transaction reset");

        self.inner.schema_tx.touch();
        self.install_schema_read_tx(&mut slot).await.map(Some)
    }

    /// Whether a schema read transaction is currently cached
    pub async fn has_schema_read_tx(&self) -> bool {
        self.inner.schema_tx.slot.lock().await.is_some()
    }

    /// Close and clear the cached transaction.
    ///
    /// With `Some(generation)` only that transaction is evicted; a newer one is
    /// left alone.
    pub(super) async fn evict_schema_read_tx(&self, generation: Option<u64>) -> bool {
        let mut slot = self.inner.schema_tx.slot.lock().await;
        let matches = match (slot.as_ref(), generation) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(cached), Some(generation)) => cached.generation == generation,
        };
        if !matches {
            return false;
        }

        if let Some(evicted) = slot.take() {
            close_quietly(&evicted.handle).await;
            event!(Level::DEBUG, generation = evicted.generation, "schema read transaction closed");
        }
        true
    }

    async fn install_schema_read_tx(
        &self,
        slot: &mut Option<SchemaReadTx>,
    ) -> Result<Arc<dyn RemoteTransaction>> {
        let options =
            TransactionOptions::new().transaction_timeout(self.inner.config.schema_tx_server_timeout);

        let live = self.live_session().ok_or(SessionError::NotOpen)?;

        // Opened under the slot lock: there is never a losing speculative
        // transaction to clean up
        let handle = live
            .handle
            .transaction(TransactionType::Read, Some(options))
            .await?;

        // Session teardown started while the transaction was opening
        if !self.is_current(live.generation) {
            close_quietly(&handle).await;
            return Err(SessionError::NotOpen);
        }

        let generation = self.inner.schema_tx.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let weak = self.downgrade();
        handle.on_close(spawning_callback(move || {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(manager) = SessionManager::upgrade(&weak) {
                    manager.evict_schema_read_tx(Some(generation)).await;
                }
            }
        }));

        *slot = Some(SchemaReadTx {
            generation,
            session_generation: live.generation,
            handle: Arc::clone(&handle),
        });
        self.spawn_idle_eviction(generation);

        event!(Level::DEBUG, generation, "schema read transaction opened");
        Ok(handle)
    }

    /// One task per installed transaction. It sleeps without holding the slot
    /// lock and recomputes the remaining wait from the last access each time
    /// it wakes.
    fn spawn_idle_eviction(&self, generation: u64) {
        let weak = self.downgrade();
        let idle_timeout = self.inner.config.schema_tx_idle_timeout;

        tokio::spawn(async move {
            let mut wait = idle_timeout;
            loop {
                tokio::time::sleep(wait).await;

                let Some(manager) = SessionManager::upgrade(&weak) else {
                    break;
                };
                match manager.evict_if_idle(generation, idle_timeout).await {
                    IdleCheck::Evicted | IdleCheck::Superseded => break,
                    IdleCheck::Active { remaining } => wait = remaining,
                }
            }
        });
    }

    async fn evict_if_idle(&self, generation: u64, idle_timeout: Duration) -> IdleCheck {
        let mut slot = self.inner.schema_tx.slot.lock().await;
        if !slot
            .as_ref()
            .is_some_and(|cached| cached.generation == generation)
        {
            return IdleCheck::Superseded;
        }

        let idle = self.inner.schema_tx.idle_for();
        if idle < idle_timeout {
            return IdleCheck::Active {
                remaining: idle_timeout - idle,
            };
        }

        if let Some(evicted) = slot.take() {
            close_quietly(&evicted.handle).await;
        }
        event!(
            Level::DEBUG,
            generation,
            idle_ms = idle.as_millis() as u64,
            "schema read transaction evicted after inactivity"
        );
        IdleCheck::Evicted
    }
}

async fn close_quietly(handle: &Arc<dyn RemoteTransaction>) {
    if let Err(err) = handle.close().await {
        event!(Level::WARN, error = %err, "failed to close schema read transaction");
    }
}
