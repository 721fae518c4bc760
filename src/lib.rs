// ============================================================================
// Graph Session Library
// ============================================================================
//
// Client-side session state for a graph database IDE: one live session per
// connection, a cached schema read transaction with idle eviction, the
// user-facing transaction, and user notifications.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod interface;
pub mod memory;
pub mod notification;
pub mod session;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{
    AtomicState, Result, SessionError, SessionType, TransactionOptions, TransactionType,
};

// Re-export the driver seam
pub use crate::interface::{CloseCallback, Connector, GraphClient, RemoteSession, RemoteTransaction};

// Re-export state managers
pub use crate::connection::{ConnectionManager, ConnectionStatus, config::ConnectionConfig};
pub use crate::notification::{
    Message, Notification, NotificationLevel, NotificationManager, NotificationSink,
};
pub use crate::session::{SessionConfig, SessionManager};
pub use crate::transaction::TransactionManager;

// Re-export the in-memory driver
pub use crate::memory::{MemoryClient, MemoryConnector, MemorySession, MemoryStats, MemoryTransaction};
