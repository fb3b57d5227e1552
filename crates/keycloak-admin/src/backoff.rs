//! Rate-limit pacing for admin requests
//!
//! The admin API answers bursts with `429`, usually naming a
//! `Retry-After`. Rather than counting retries, each request carries a
//! wait budget: every delay is paid out of the budget, and a wait the
//! budget cannot cover surfaces the rate-limit error to the caller
//! immediately. Sleeping for less than the server asked would only earn
//! another 429, so there is no point trimming a delay to fit.
//!
//! Server-specified waits are honored exactly and leave the synthesized
//! progression untouched; when the server names nothing, delays start
//! small and double.

use std::time::Duration;

/// Pacing configuration, applied per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total time one request may spend waiting out rate limits
    pub wait_budget: Duration,
    /// First synthesized delay when the server names no `Retry-After`
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            wait_budget: Duration::from_secs(90),
            base_delay: Duration::from_millis(500),
        }
    }
}

impl BackoffPolicy {
    /// Begin pacing one request
    pub fn start(&self) -> Backoff {
        Backoff {
            remaining: self.wait_budget,
            synthesized: self.base_delay,
        }
    }
}

/// Pacing state for a single request
#[derive(Debug)]
pub struct Backoff {
    remaining: Duration,
    synthesized: Duration,
}

impl Backoff {
    /// The delay to wait before the next attempt, or `None` when the
    /// budget cannot cover it and the caller should give up.
    pub fn next_delay(&mut self, retry_after: Option<u64>) -> Option<Duration> {
        let wanted = match retry_after {
            Some(seconds) => Duration::from_secs(seconds),
            None => self.synthesized,
        };

        if wanted > self.remaining {
            return None;
        }

        self.remaining -= wanted;
        if retry_after.is_none() {
            self.synthesized *= 2;
        }
        Some(wanted)
    }

    /// Budget left for this request
    pub fn remaining(&self) -> Duration {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(budget_secs: u64, base_millis: u64) -> BackoffPolicy {
        BackoffPolicy {
            wait_budget: Duration::from_secs(budget_secs),
            base_delay: Duration::from_millis(base_millis),
        }
    }

    #[test]
    fn default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.wait_budget, Duration::from_secs(90));
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn synthesized_delays_double_until_budget_runs_out() {
        let mut pacing = policy(10, 1000).start();

        assert_eq!(pacing.next_delay(None), Some(Duration::from_secs(1)));
        assert_eq!(pacing.next_delay(None), Some(Duration::from_secs(2)));
        assert_eq!(pacing.next_delay(None), Some(Duration::from_secs(4)));
        // 3s left cannot cover the wanted 8s
        assert_eq!(pacing.next_delay(None), None);
        assert_eq!(pacing.remaining(), Duration::from_secs(3));
    }

    #[test]
    fn retry_after_is_honored_exactly() {
        let mut pacing = policy(30, 500).start();

        assert_eq!(pacing.next_delay(Some(10)), Some(Duration::from_secs(10)));
        assert_eq!(pacing.remaining(), Duration::from_secs(20));

        // A server-named wait leaves the synthesized progression alone
        assert_eq!(pacing.next_delay(None), Some(Duration::from_millis(500)));
    }

    #[test]
    fn uncoverable_retry_after_fails_without_spending_budget() {
        let mut pacing = policy(5, 500).start();

        assert_eq!(pacing.next_delay(Some(10)), None);
        assert_eq!(pacing.remaining(), Duration::from_secs(5));

        // The budget is still usable for smaller waits
        assert_eq!(pacing.next_delay(Some(2)), Some(Duration::from_secs(2)));
    }

    #[test]
    fn zero_budget_never_waits() {
        let mut pacing = policy(0, 500).start();
        assert_eq!(pacing.next_delay(None), None);
        assert_eq!(pacing.next_delay(Some(1)), None);
    }
}
