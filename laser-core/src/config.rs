use crate::history::HISTORY_CAPACITY;
use crate::reconnect::{FixedBackoff, NoReconnect, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_POWER_LIMIT: f64 = 1000.0;
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// Session-scoped settings, usually read from the `session:` section of the
/// console configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound (mW) for operator power input; local only, never sent to hardware.
    pub power_limit: f64,
    pub history_capacity: usize,
    /// Buffer of the change-notification channel; slow subscribers lag past it.
    pub events_capacity: usize,
    pub reconnect: ReconnectConf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            power_limit: DEFAULT_POWER_LIMIT,
            history_capacity: HISTORY_CAPACITY,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            reconnect: ReconnectConf::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectConf {
    #[default]
    Never,
    Fixed { delay_ms: u64, max_attempts: u32 },
}

impl ReconnectConf {
    pub fn policy(&self) -> Arc<dyn ReconnectPolicy> {
        match *self {
            ReconnectConf::Never => Arc::new(NoReconnect),
            ReconnectConf::Fixed { delay_ms, max_attempts } => Arc::new(FixedBackoff {
                delay: Duration::from_millis(delay_ms),
                max_attempts,
            }),
        }
    }
}
