use crate::core::SessionType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-facing message raised by the connection and session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    UnableToConnect { address: String },
    FailedToOpenSession { session_type: SessionType, database: String },
    SessionClosedOnServer,
    TransactionClosedOnServer,
    FailedToRefreshDatabases,
    FailedToCreateDatabase { database: String },
    DatabaseAlreadyExists { database: String },
    FailedToDeleteDatabase { database: String },
}

impl Message {
    /// Stable code, usable for lookups and tests independent of wording
    pub fn code(&self) -> &'static str {
        match self {
            Message::UnableToConnect { .. } => "CNX01",
            Message::FailedToOpenSession { .. } => "CNX02",
            Message::SessionClosedOnServer => "CNX03",
            Message::TransactionClosedOnServer => "CNX04",
            Message::FailedToRefreshDatabases => "CNX05",
            Message::FailedToCreateDatabase { .. } => "CNX06",
            Message::DatabaseAlreadyExists { .. } => "CNX07",
            Message::FailedToDeleteDatabase { .. } => "CNX08",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.code())?;
        match self {
            Message::UnableToConnect { address } => {
                write!(f, "Unable to connect to server at '{}'.", address)
            }
            Message::FailedToOpenSession {
                session_type,
                database,
            } => write!(
                f,
                "Failed to open {} session to database '{}'.",
                session_type, database
            ),
            Message::SessionClosedOnServer => write!(f, "Session has been closed on the server."),
            Message::TransactionClosedOnServer => {
                write!(f, "Transaction has been closed on the server.")
            }
            Message::FailedToRefreshDatabases => write!(f, "Failed to refresh the database list."),
            Message::FailedToCreateDatabase { database } => {
                write!(f, "Failed to create database '{}'.", database)
            }
            Message::DatabaseAlreadyExists { database } => {
                write!(f, "Database '{}' already exists.", database)
            }
            Message::FailedToDeleteDatabase { database } => {
                write!(f, "Failed to delete database '{}'.", database)
            }
        }
    }
}
