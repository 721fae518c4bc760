use crate::core::SessionType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Idle time after which the cached schema read transaction is closed
pub const SCHEMA_TX_IDLE_TIMEOUT: Duration = Duration::from_secs(16);

/// Server-side timeout requested for the cached schema read transaction
pub const ONE_HOUR: Duration = Duration::from_secs(60 * 60);

/// Session manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Close the cached schema read transaction after this much inactivity
    pub schema_tx_idle_timeout: Duration,

    /// Server-side transaction timeout for the schema read transaction
    pub schema_tx_server_timeout: Duration,

    /// Session type reported before any session has been opened
    pub default_session_type: SessionType,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            schema_tx_idle_timeout: SCHEMA_TX_IDLE_TIMEOUT,
            schema_tx_server_timeout: ONE_HOUR,
            default_session_type: SessionType::Data,
        }
    }

    /// Set schema transaction idle timeout
    pub fn schema_tx_idle_timeout(mut self, timeout: Duration) -> Self {
        self.schema_tx_idle_timeout = timeout;
        self
    }

    /// Set schema transaction server-side timeout
    pub fn schema_tx_server_timeout(mut self, timeout: Duration) -> Self {
        self.schema_tx_server_timeout = timeout;
        self
    }

    /// Set the initial session type
    pub fn default_session_type(mut self, session_type: SessionType) -> Self {
        self.default_session_type = session_type;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_tx_idle_timeout.is_zero() {
            return Err("schema_tx_idle_timeout must be > 0".to_string());
        }

        // The server must not expire the transaction before we stop using it
        if self.schema_tx_server_timeout < self.schema_tx_idle_timeout {
            return Err(
                "schema_tx_server_timeout cannot be shorter than schema_tx_idle_timeout"
                    .to_string(),
            );
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.schema_tx_idle_timeout, Duration::from_secs(16));
        assert_eq!(config.schema_tx_server_timeout, Duration::from_secs(3600));
        assert_eq!(config.default_session_type, SessionType::Data);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let zero = SessionConfig::new().schema_tx_idle_timeout(Duration::ZERO);
        assert!(zero.validate().is_err());

        let inverted = SessionConfig::new()
            .schema_tx_idle_timeout(Duration::from_secs(60))
            .schema_tx_server_timeout(Duration::from_secs(30));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"default_session_type":"schema"}"#).unwrap();

        assert_eq!(config.default_session_type, SessionType::Schema);
        assert_eq!(config.schema_tx_idle_timeout, SCHEMA_TX_IDLE_TIMEOUT);
    }
}
