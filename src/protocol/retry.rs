//! Reconnect policy and retry state.
//!
//! Three failure classes, three policies:
//!
//! - network failures back off exponentially (5 s doubling to a 600 s cap,
//!   snapping back to 5 s once a connection had been fully established),
//! - framing failures retry immediately against a small bounded budget,
//! - version mismatches never retry; they divert into the update pipeline.
//!
//! The policy only computes decisions; the session owns the single pending
//! timer and cancels it on shutdown or manual reconnect.

use std::time::Duration;

use crate::config::RetryConfig;

/// Default initial reconnect delay in seconds.
pub const DEFAULT_BASE_DELAY_SECS: u64 = 5;
/// Default reconnect delay cap in seconds.
pub const DEFAULT_MAX_DELAY_SECS: u64 = 600;
/// Default immediate-retry budget for framing errors.
pub const DEFAULT_FRAMING_RETRIES: u32 = 3;

/// Current retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Delay the next network-failure retry will wait.
    pub retry_secs: u64,
    /// Remaining immediate retries for framing errors.
    pub framing_left: u32,
}

/// Decision for a framing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingDecision {
    /// Budget remains: reconnect immediately, `left` tries remain after this.
    RetryNow {
        /// Tries left after this one.
        left: u32,
    },
    /// Budget exhausted: stay down and surface the error.
    GiveUp,
}

/// Reconnect policy: owns [`RetryState`], computes per-class decisions.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base_secs: u64,
    max_secs: u64,
    framing_budget: u32,
    state: RetryState,
}

impl ReconnectPolicy {
    /// Create a policy from config.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_secs: config.base_delay_secs,
            max_secs: config.max_delay_secs,
            framing_budget: config.framing_retries,
            state: RetryState {
                retry_secs: config.base_delay_secs,
                framing_left: config.framing_retries,
            },
        }
    }

    /// Current retry bookkeeping.
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Delay before the next reconnect after a network-level failure.
    ///
    /// A connection that had ever been fully established resets the ladder;
    /// otherwise the returned delay is the current rung and the next rung
    /// doubles, capped at the configured maximum.
    pub fn network_delay(&mut self, was_established: bool) -> Duration {
        if was_established {
            self.state.retry_secs = self.base_secs;
        }
        let delay = self.state.retry_secs;
        self.state.retry_secs = (self.state.retry_secs * 2).min(self.max_secs);
        Duration::from_secs(delay)
    }

    /// Consume one framing retry, if any remain.
    pub fn framing_retry(&mut self) -> FramingDecision {
        if self.state.framing_left > 1 {
            self.state.framing_left -= 1;
            FramingDecision::RetryNow {
                left: self.state.framing_left,
            }
        } else {
            self.state.framing_left = 0;
            FramingDecision::GiveUp
        }
    }

    /// Reset to base values (successful connect or manual reconnect).
    pub fn reset(&mut self) {
        self.state.retry_secs = self.base_secs;
        self.state.framing_left = self.framing_budget;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_from_fresh() {
        // 5, 10, 20, 40, 80, 160, 320, 600, 600, ...
        let mut policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..9)
            .map(|_| policy.network_delay(false).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 320, 600, 600]);
    }

    #[test]
    fn backoff_resets_after_established_connection() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..6 {
            policy.network_delay(false);
        }
        // A connection that made it to ready snaps back to the base delay
        assert_eq!(policy.network_delay(true).as_secs(), 5);
        assert_eq!(policy.network_delay(false).as_secs(), 10);
    }

    #[test]
    fn backoff_reset_on_manual_reconnect() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..4 {
            policy.network_delay(false);
        }
        policy.reset();
        assert_eq!(policy.network_delay(false).as_secs(), 5);
    }

    #[test]
    fn framing_budget_is_bounded() {
        let mut policy = ReconnectPolicy::default();
        assert_eq!(policy.framing_retry(), FramingDecision::RetryNow { left: 2 });
        assert_eq!(policy.framing_retry(), FramingDecision::RetryNow { left: 1 });
        assert_eq!(policy.framing_retry(), FramingDecision::GiveUp);
        assert_eq!(policy.framing_retry(), FramingDecision::GiveUp);
    }

    #[test]
    fn framing_budget_restored_by_reset() {
        let mut policy = ReconnectPolicy::default();
        policy.framing_retry();
        policy.framing_retry();
        policy.reset();
        assert_eq!(policy.framing_retry(), FramingDecision::RetryNow { left: 2 });
    }

    #[test]
    fn custom_config_values() {
        let config = RetryConfig {
            base_delay_secs: 1,
            max_delay_secs: 4,
            framing_retries: 1,
        };
        let mut policy = ReconnectPolicy::new(&config);
        assert_eq!(policy.network_delay(false).as_secs(), 1);
        assert_eq!(policy.network_delay(false).as_secs(), 2);
        assert_eq!(policy.network_delay(false).as_secs(), 4);
        assert_eq!(policy.network_delay(false).as_secs(), 4);
        assert_eq!(policy.framing_retry(), FramingDecision::GiveUp);
    }
}
