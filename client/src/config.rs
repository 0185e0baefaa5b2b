//! Tunables for the synchronization client.

use shared::TURN_DURATION_SECS;
use std::time::Duration;

pub const DEFAULT_SYNC_WAIT: Duration = Duration::from_millis(1500);
pub const DEFAULT_STALE_TICK_TIMEOUT: Duration = Duration::from_millis(3500);
pub const DEFAULT_LOCAL_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(4);
pub const DEFAULT_CORRELATION_CAPACITY: usize = 100;
pub const DEFAULT_CORRELATION_RETENTION: Duration = Duration::from_secs(60);
pub const DEFAULT_INVITE_PATH_PREFIX: &str = "/join/";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a reconnect waits for an unsolicited `SyncedState` push
    /// before requesting a snapshot explicitly.
    pub sync_wait: Duration,
    /// Online countdowns revert to empty if no refresh arrives in this window.
    pub stale_tick_timeout: Duration,
    /// Turn length used when the server resumes a countdown without a value.
    pub turn_duration_secs: u32,
    pub local_tick: Duration,
    pub status_ttl: Duration,
    pub correlation_capacity: usize,
    pub correlation_retention: Duration,
    /// Path prefix of the share link a creator hands out, e.g. `/join/ABCD`.
    pub invite_path_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sync_wait: DEFAULT_SYNC_WAIT,
            stale_tick_timeout: DEFAULT_STALE_TICK_TIMEOUT,
            turn_duration_secs: TURN_DURATION_SECS,
            local_tick: DEFAULT_LOCAL_TICK,
            status_ttl: DEFAULT_STATUS_TTL,
            correlation_capacity: DEFAULT_CORRELATION_CAPACITY,
            correlation_retention: DEFAULT_CORRELATION_RETENTION,
            invite_path_prefix: DEFAULT_INVITE_PATH_PREFIX.to_string(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_sync_wait(mut self, wait: Duration) -> Self {
        self.sync_wait = wait;
        self
    }

    #[must_use]
    pub fn with_turn_duration(mut self, secs: u32) -> Self {
        self.turn_duration_secs = secs.max(1);
        self
    }

    #[must_use]
    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_invite_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.invite_path_prefix = prefix.into();
        self
    }
}
