use super::SessionType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Client error: {0}")]
    Client(String),

    #[error("No session is open")]
    NotOpen,

    #[error("Not connected to a server")]
    NotConnected,

    #[error("Failed to open {session_type} session to database '{database}'")]
    SessionOpenFailure {
        session_type: SessionType,
        database: String,
    },

    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Database '{0}' already exists")]
    DatabaseExists(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
