// ============================================================================
// Session Management Module
// ============================================================================
//
// One live session per manager, shared by every UI action. Opening a
// different database or session type closes the previous session first.
// A single schema read transaction is cached on top of the session and
// closed after a period of inactivity.
//
// Concurrency:
// - The open flag is an AtomicState; its true -> false compare-and-set is the
//   only gate into session teardown.
// - The schema read transaction slot has its own lock, held only for slot
//   decisions. Session open/close never run under it.
// - Server-side close callbacks hop onto the runtime and go through the same
//   close path as the UI.
//
// ============================================================================

pub mod config;
pub mod manager;
mod schema_tx;

pub use config::{ONE_HOUR, SCHEMA_TX_IDLE_TIMEOUT, SessionConfig};
pub use manager::{OpenCallback, SessionManager};
