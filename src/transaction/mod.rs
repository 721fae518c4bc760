// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Tracks the user-facing transaction of the current session. The session
// manager closes it during session teardown; a server-side close clears it
// and raises a notification.
//
// ============================================================================

pub mod manager;

pub use manager::TransactionManager;
