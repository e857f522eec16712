//! Retry and polling budgets.

use std::time::Duration;

/// Exponential backoff for remote commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based), doubling from the
    /// initial delay and capped at `max_delay`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1 << exp)
            .min(self.max_delay)
    }
}

/// Fixed-cadence polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub ticks: u32,
    pub interval: Duration,
}

impl PollBudget {
    /// Allocation polling: 180 ticks at 1s.
    pub const ALLOCATION: Self = Self {
        ticks: 180,
        interval: Duration::from_secs(1),
    };

    /// Backend readiness polling: 120 ticks at 1s.
    pub const READINESS: Self = Self {
        ticks: 120,
        interval: Duration::from_secs(1),
    };
}

/// Ticks to wait for a join URL after the port is already listening.
pub const JOIN_URL_GRACE_TICKS: u32 = 10;

/// Lines of scheduler log shown when no node is assigned.
pub const ALLOCATION_LOG_LINES: usize = 40;

/// Lines of launcher/backend log shown when readiness fails.
pub const BACKEND_LOG_LINES: usize = 40;
