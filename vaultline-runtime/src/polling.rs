//! Bounded polling of engine operations
//!
//! The invoking process blocks while the engine works. Polls start at
//! `interval` and back off geometrically up to `max_interval`; once
//! `timeout` has elapsed the wait is abandoned and the engine job is left
//! running.

use crate::metrics::POLL_WAIT_SECONDS;
use crate::{Error, Result};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use vaultline_core::{Engine, HandleKind, OperationHandle, StatusReport};

/// Poll cadence and overall deadline
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first re-poll
    pub interval: Duration,

    /// Upper bound on the delay between polls
    pub max_interval: Duration,

    /// Multiplier applied to the delay after each RUNNING answer
    pub backoff_multiplier: f64,

    /// Give up waiting after this long
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            backoff_multiplier: 1.5,
            timeout: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl PollPolicy {
    /// Fixed cadence, no backoff
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff_multiplier: 1.0,
            timeout,
        }
    }

    /// Delay to wait after `attempt` RUNNING answers (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0);
        let delay = self.interval.as_secs_f64() * multiplier.powi(attempt.min(64) as i32);
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }
}

/// Poll the engine until the operation reaches a terminal state.
///
/// Returns `Error::Timeout` when the deadline passes first. Engine errors
/// during a poll end the wait immediately.
pub async fn poll_until_terminal(
    engine: &dyn Engine,
    handle: &OperationHandle,
    policy: &PollPolicy,
) -> Result<StatusReport> {
    let kind = match handle.kind {
        HandleKind::Backup => "backup",
        HandleKind::Restore => "restore",
    };
    debug!(
        label = %handle.label,
        kind,
        timeout_secs = policy.timeout.as_secs(),
        "Starting to poll engine operation"
    );

    let started = Instant::now();
    let result = timeout(policy.timeout, async {
        let mut attempt: u32 = 0;
        loop {
            let report = engine.poll_status(handle).await?;
            if report.state.is_terminal() {
                info!(
                    label = %handle.label,
                    state = report.state.as_str(),
                    polls = attempt + 1,
                    "Engine operation reached terminal state"
                );
                return Ok::<_, Error>(report);
            }

            let delay = policy.calculate_delay(attempt);
            if attempt % 10 == 9 {
                info!(label = %handle.label, polls = attempt + 1, "Engine operation still running");
            }
            debug!(label = %handle.label, delay_ms = delay.as_millis() as u64, "Engine operation running");
            sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    })
    .await;

    POLL_WAIT_SECONDS
        .with_label_values(&[kind])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(report) => report,
        Err(_) => {
            warn!(
                label = %handle.label,
                waited_secs = policy.timeout.as_secs(),
                "Engine operation did not finish in time; it is left running for operator follow-up"
            );
            Err(Error::Timeout {
                label: handle.label.clone(),
                waited_secs: policy.timeout.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(21600));
        assert_eq!(policy.calculate_delay(0), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy::default();
        assert_eq!(policy.calculate_delay(1), Duration::from_secs_f64(7.5));
        assert_eq!(policy.calculate_delay(20), Duration::from_secs(30));
        assert_eq!(policy.calculate_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = PollPolicy::fixed(Duration::from_millis(10), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(policy.calculate_delay(7), Duration::from_millis(10));
    }
}
