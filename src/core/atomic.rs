// ============================================================================
// Atomic observable state
// ============================================================================
//
// Single-value holder. Mutations serialize through one mutex per instance;
// reads load an atomic pointer and never wait on a writer. Observers
// subscribe to changes instead of polling.
//
// ============================================================================

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Thread-safe value holder with `set` and `compare_and_set`.
///
/// `compare_and_set` is the primitive used for exactly-once transitions
/// (e.g. a session closing once no matter how many callers race to close it).
pub struct AtomicState<T> {
    value: ArcSwap<T>,
    write: Mutex<()>,
    sender: watch::Sender<T>,
}

impl<T: Clone> AtomicState<T> {
    pub fn new(value: T) -> Self {
        let (sender, _) = watch::channel(value.clone());
        Self {
            value: ArcSwap::from_pointee(value),
            write: Mutex::new(()),
            sender,
        }
    }

    /// Lock-free snapshot of the current value
    pub fn get(&self) -> T {
        T::clone(&self.value.load())
    }

    /// Replace the value unconditionally
    pub fn set(&self, value: T) {
        let _write = self.lock_write();
        self.store(value);
    }

    /// Replace the value, returning the previous one
    pub fn replace(&self, value: T) -> T {
        let _write = self.lock_write();
        let previous = self.value.load_full();
        self.store(value);
        T::clone(&previous)
    }

    /// Observe changes to the value
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Publish to readers first, then wake observers. Caller holds the write
    /// lock.
    fn store(&self, value: T) {
        self.value.store(Arc::new(value.clone()));
        self.sender.send_replace(value);
    }

    fn lock_write(&self) -> MutexGuard<'_, ()> {
        self.write.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + PartialEq> AtomicState<T> {
    /// Replace the value with `new` iff it currently equals `expected`.
    ///
    /// Returns true when the swap happened. Observers are only notified on
    /// a successful swap.
    pub fn compare_and_set(&self, expected: &T, new: T) -> bool {
        let _write = self.lock_write();
        if *self.value.load_full() != *expected {
            return false;
        }
        self.store(new);
        true
    }
}

impl<T: Clone + Default> Default for AtomicState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicState")
            .field("value", &**self.value.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_and_get() {
        let state = AtomicState::new(1);
        state.set(5);
        assert_eq!(state.get(), 5);
        assert_eq!(state.replace(7), 5);
        assert_eq!(state.get(), 7);
    }

    #[test]
    fn test_reads_do_not_wait_for_writers() {
        let state = AtomicState::new(3);

        // A writer mid-update holds the write lock
        let _write = state.lock_write();
        assert_eq!(state.get(), 3);
        assert_eq!(format!("{:?}", state), "AtomicState { value: 3 }");
    }

    #[test]
    fn test_compare_and_set() {
        let state = AtomicState::new(false);

        assert!(!state.compare_and_set(&true, false));
        assert!(!state.get());

        assert!(state.compare_and_set(&false, true));
        assert!(state.get());

        // Second identical transition loses
        assert!(!state.compare_and_set(&false, true));
    }

    #[test]
    fn test_compare_and_set_uses_value_equality() {
        let state = AtomicState::new(Some("db1".to_string()));
        let expected = Some(String::from("db1"));

        assert!(state.compare_and_set(&expected, None));
        assert_eq!(state.get(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let state = AtomicState::new(0u32);
        let mut rx = state.subscribe();

        state.set(3);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 3);

        // Failed swaps do not wake observers
        assert!(!state.compare_and_set(&0, 9));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_compare_and_set_wins_once() {
        let state = Arc::new(AtomicState::new(true));
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..32 {
            let state = Arc::clone(&state);
            let winners = Arc::clone(&winners);
            handles.push(tokio::spawn(async move {
                if state.compare_and_set(&true, false) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(!state.get());
    }
}
