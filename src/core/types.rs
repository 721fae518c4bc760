use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of server-side session.
///
/// Schema sessions allow schema writes; data sessions allow data writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Schema,
    #[default]
    Data,
}

impl SessionType {
    pub fn is_schema(&self) -> bool {
        matches!(self, SessionType::Schema)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, SessionType::Data)
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::Schema => write!(f, "schema"),
            SessionType::Data => write!(f, "data"),
        }
    }
}

/// Kind of transaction opened within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Read,
    Write,
    Schema,
}

impl TransactionType {
    pub fn is_read(&self) -> bool {
        matches!(self, TransactionType::Read)
    }

    pub fn is_write(&self) -> bool {
        !self.is_read()
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Read => write!(f, "read"),
            TransactionType::Write => write!(f, "write"),
            TransactionType::Schema => write!(f, "schema"),
        }
    }
}

/// Per-transaction overrides passed through to the server.
///
/// Unset fields fall back to the server defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    /// Server-side transaction timeout in milliseconds
    pub transaction_timeout_millis: Option<u64>,

    /// Enable rule inference for reads
    pub infer: Option<bool>,

    /// Attach explanations to inferred answers
    pub explain: Option<bool>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server-side transaction timeout
    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout_millis = Some(timeout.as_millis() as u64);
        self
    }

    pub fn infer(mut self, infer: bool) -> Self {
        self.infer = Some(infer);
        self
    }

    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = Some(explain);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.transaction_timeout_millis.map(Duration::from_millis)
    }
}
