//! Correlator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rpc::protocol::RequestId;

/// Largest id handed out before the sequence restarts at 1.
pub const DEFAULT_ID_CEILING: RequestId = 2_000_000_000;

/// Tuning knobs for a [`Correlator`](crate::Correlator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Wait applied by `call` and `send(.., true)`
    pub default_timeout_ms: u64,

    /// How many unmatched messages are kept before the oldest is evicted
    pub skip_buffer_capacity: usize,

    pub id_ceiling: RequestId,

    /// Return `Error::Protocol` for matched responses carrying `error`
    /// instead of handing them back as ordinary results.
    pub strict_errors: bool,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
            skip_buffer_capacity: 1024,
            id_ceiling: DEFAULT_ID_CEILING,
            strict_errors: false,
        }
    }
}

impl CorrelatorConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_skip_buffer_capacity(mut self, capacity: usize) -> Self {
        self.skip_buffer_capacity = capacity;
        self
    }

    pub fn with_id_ceiling(mut self, ceiling: RequestId) -> Self {
        self.id_ceiling = ceiling;
        self
    }

    pub fn with_strict_errors(mut self, strict: bool) -> Self {
        self.strict_errors = strict;
        self
    }

    /// Clamp values that would make the correlator unusable.
    pub(crate) fn normalized(mut self) -> Self {
        self.skip_buffer_capacity = self.skip_buffer_capacity.max(1);
        self.id_ceiling = self.id_ceiling.max(1);
        self
    }
}
