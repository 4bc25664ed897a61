//! Stream reconnection strategies.
//!
//! The console does not reconnect on its own: the default policy is
//! [`NoReconnect`]. A session may opt into [`FixedBackoff`] through its
//! configuration.

use std::fmt;
use std::time::Duration;

pub trait ReconnectPolicy: Send + Sync + fmt::Debug {
    /// Delay before reconnection attempt `attempt` (1-based) after the stream
    /// was lost, or `None` to leave the stream closed.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Same delay before every attempt; `max_attempts == 0` means unlimited.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy for FixedBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts != 0 && attempt > self.max_attempts {
            return None;
        }
        Some(self.delay)
    }
}
