/// Session tuning knobs
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Result, SyncError};

/// Limits and timeouts for one editing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local operations allowed to await acknowledgment at once
    pub max_in_flight: usize,
    /// Applied operations retained for rebasing late arrivals and undo
    pub max_history: usize,
    /// Undo groups retained per participant
    pub undo_limit: usize,
    /// Seconds without a heartbeat before a collaborator is marked inactive
    pub heartbeat_timeout_secs: u64,
    /// Seconds an inactive collaborator is kept before removal
    pub grace_period_secs: u64,
    /// Conflicts kept for inspection; 0 disables recording
    pub conflict_log_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            max_history: 4096,
            undo_limit: 200,
            heartbeat_timeout_secs: 30,
            grace_period_secs: 300,
            conflict_log_capacity: 64,
        }
    }
}

impl SessionConfig {
    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_period_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(SyncError::Validation(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.max_history == 0 {
            return Err(SyncError::Validation(
                "max_history must be at least 1".to_string(),
            ));
        }
        if self.undo_limit == 0 {
            return Err(SyncError::Validation(
                "undo_limit must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_timeout_secs > i64::MAX as u64 || self.grace_period_secs > i64::MAX as u64
        {
            return Err(SyncError::Validation("timeout out of range".to_string()));
        }
        Ok(())
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| SyncError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json_str(r#"{ "max_in_flight": 8 }"#).unwrap();
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.max_history, 4096);
        assert_eq!(config.heartbeat_timeout(), chrono::Duration::seconds(30));
        assert_eq!(config.grace_period(), chrono::Duration::seconds(300));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let err = SessionConfig::from_json_str(r#"{ "max_in_flight": 0 }"#).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = SessionConfig::from_json_str(r#"{ "undo_limit": 0 }"#).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = SessionConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, SyncError::Serialization(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("textsync-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "undo_limit": 3 }"#).unwrap();

        let config = tokio_test::block_on(SessionConfig::load(&path)).unwrap();
        assert_eq!(config.undo_limit, 3);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("textsync-missing-{}.json", uuid::Uuid::new_v4()));
        let err = tokio_test::block_on(SessionConfig::load(&path)).unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
