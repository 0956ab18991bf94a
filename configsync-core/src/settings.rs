/// Sync settings
///
/// Timing and capacity knobs for the coordinator and projector. Hosts load
/// them from a JSON file; every field is optional and falls back to the
/// defaults in `configsync_protocol::limits`.

use crate::error::{Result, SyncError};
use configsync_protocol::limits::{
    CONFIG_TTL_MS, DEFAULT_DEBOUNCE_MS, DEFAULT_NOTIFICATION_CAPACITY, DEFAULT_RETRY_INTERVAL_MS,
    DELETED_MESSAGE_PLACEHOLDER,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Coalescing window for bursts of modifications (default: 1000)
    pub debounce_ms: u64,
    /// Delay between attempts of a failed push cycle (default: 1000)
    pub retry_interval_ms: u64,
    /// Attempts per cycle; `None` retries until success
    pub max_retries: Option<u32>,
    /// Swarm TTL for stored config blobs (default: 30 days)
    pub config_ttl_ms: i64,
    /// Notification bus capacity (default: 256)
    pub notification_capacity: usize,
    /// Body written over messages deleted for everyone
    pub deleted_message_placeholder: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_retries: None,
            config_ttl_ms: CONFIG_TTL_MS,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            deleted_message_placeholder: String::from(DELETED_MESSAGE_PLACEHOLDER),
        }
    }
}

impl SyncSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: SyncSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(SyncError::InvalidSettings("debounce_ms must be > 0".into()));
        }
        if self.retry_interval_ms == 0 {
            return Err(SyncError::InvalidSettings(
                "retry_interval_ms must be > 0".into(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(SyncError::InvalidSettings(
                "notification_capacity must be > 0".into(),
            ));
        }
        if self.config_ttl_ms <= 0 {
            return Err(SyncError::InvalidSettings("config_ttl_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}
