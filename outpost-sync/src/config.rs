use std::time::Duration;

use outpost_core::FilterKey;

use crate::cache::CacheTtl;
use crate::errors::{StoreError, StoreResult};

/// Settings the engine is constructed with. Everything has a sensible
/// default except the database URL.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub cache_ttl: CacheTtl,
    /// Filter used until a persisted choice exists.
    pub active_filter: FilterKey,
    /// Bound on every remote call; elapsing counts as a connectivity failure.
    pub remote_timeout: Duration,
    /// Replay attempts per queued change before it is dead-lettered.
    pub max_replay_attempts: u32,
    /// Extra whole-drain retries (with exponential backoff) when the remote
    /// is unreachable right after a reconnect.
    pub drain_retry_limit: usize,
}

impl SyncConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.database_url.is_empty() {
            return Err(StoreError::Configuration(
                "database_url must be set".to_string(),
            ));
        }
        if self.remote_timeout.is_zero() {
            return Err(StoreError::Configuration(
                "remote_timeout must be non-zero".to_string(),
            ));
        }
        if self.max_replay_attempts == 0 {
            return Err(StoreError::Configuration(
                "max_replay_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            cache_ttl: CacheTtl::Minutes5,
            active_filter: FilterKey::Today,
            remote_timeout: Duration::from_secs(10),
            max_replay_attempts: 5,
            drain_retry_limit: 3,
        }
    }
}
