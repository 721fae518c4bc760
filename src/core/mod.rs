pub mod atomic;
pub mod error;
pub mod types;

pub use atomic::AtomicState;
pub use error::{Result, SessionError};
pub use types::{SessionType, TransactionOptions, TransactionType};
