use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Constant delay between attempts.
    #[default]
    Fixed,
    /// Doubles the delay after each failed attempt, capped at `max`.
    Exponential { max: Duration },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JitterMode {
    #[default]
    None,
    Equal,
    Full,
}

impl JitterMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(JitterMode::None),
            "equal" => Some(JitterMode::Equal),
            "full" => Some(JitterMode::Full),
            _ => None,
        }
    }
}

/// Bounded retry budget for one service: whichever of `max_attempts` or
/// `timeout` is reached first ends the retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub backoff: Backoff,
    pub jitter: JitterMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, DEFAULT_INTERVAL, DEFAULT_TIMEOUT)
    }
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, interval: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            timeout,
            backoff: Backoff::Fixed,
            jitter: JitterMode::None,
        }
    }

    /// Derives the attempt count from a timeout and an interval, the way the
    /// shell scripts expressed budgets (`60s` every `2s` is 30 attempts).
    pub fn from_timeout(timeout: Duration, interval: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            let ratio = timeout.as_millis() / interval.as_millis().max(1);
            u32::try_from(ratio).unwrap_or(u32::MAX).max(1)
        };
        Self::fixed(attempts, interval, timeout)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    ///
    /// `attempts` is the number of attempts made so far and `elapsed` is the time
    /// since the first attempt started.
    pub fn next_delay(&self, attempts: u32, elapsed: Duration) -> Option<Duration> {
        if attempts >= self.max_attempts() {
            return None;
        }
        if elapsed >= self.timeout {
            return None;
        }

        let delay = self.compute_backoff(attempts);
        let delay = match self.jitter {
            JitterMode::None => delay,
            JitterMode::Equal => jitter_between(delay.mul_f64(0.5), delay),
            JitterMode::Full => jitter_between(Duration::ZERO, delay),
        };

        // The last sleep never carries the next attempt past the timeout.
        Some(delay.min(self.timeout - elapsed))
    }

    fn compute_backoff(&self, attempts: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max } => {
                if self.interval.is_zero() {
                    return Duration::ZERO;
                }
                let exponent = attempts.saturating_sub(1).min(16);
                let factor = 1u32 << exponent;
                let delay = self.interval.saturating_mul(factor);
                std::cmp::min(delay, max)
            }
        }
    }
}

pub fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let min_secs = min.as_secs_f64();
    let span = max.as_secs_f64() - min_secs;
    let sample = rng.gen::<f64>() * span + min_secs;
    Duration::from_secs_f64(sample)
}

/// Sleeps for `duration`; returns `true` when `shutdown` fired first.
pub async fn sleep_with_shutdown(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_stops_at_max_attempts() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(
            policy.next_delay(1, Duration::ZERO),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            policy.next_delay(4, Duration::from_secs(6)),
            Some(Duration::from_secs(2))
        );
        assert_eq!(policy.next_delay(5, Duration::from_secs(8)), None);
    }

    #[test]
    fn timeout_ceiling_applies_before_attempts_run_out() {
        let policy = RetryPolicy::fixed(100, Duration::from_secs(1), Duration::from_secs(3));
        assert!(policy.next_delay(2, Duration::from_millis(2_999)).is_some());
        assert_eq!(policy.next_delay(3, Duration::from_secs(3)), None);
    }

    #[test]
    fn last_delay_is_cut_to_the_remaining_budget() {
        let policy = RetryPolicy::fixed(100, Duration::from_secs(3), Duration::from_secs(10));
        assert_eq!(
            policy.next_delay(4, Duration::from_secs(9)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(policy.next_delay(5, Duration::from_secs(10)), None);
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy::fixed(10, Duration::from_millis(100), Duration::from_secs(60))
            .with_backoff(Backoff::Exponential {
                max: Duration::from_millis(350),
            });
        let delays: Vec<_> = (1..=4)
            .map(|attempt| policy.next_delay(attempt, Duration::ZERO).unwrap())
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
            ]
        );
    }

    #[test]
    fn full_jitter_stays_within_interval() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500), Duration::from_secs(5))
            .with_jitter(JitterMode::Full);
        for _ in 0..32 {
            let delay = policy.next_delay(1, Duration::ZERO).unwrap();
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[test]
    fn from_timeout_matches_script_budgets() {
        let database = RetryPolicy::from_timeout(Duration::from_secs(60), Duration::from_secs(2));
        let cache = RetryPolicy::from_timeout(Duration::from_secs(30), Duration::from_secs(1));
        let api = RetryPolicy::from_timeout(Duration::from_secs(60), Duration::from_secs(3));
        assert_eq!(database.max_attempts, 30);
        assert_eq!(cache.max_attempts, 30);
        assert_eq!(api.max_attempts, 20);
    }

    #[test]
    fn zero_attempts_still_allows_one_try() {
        let policy = RetryPolicy::fixed(0, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.next_delay(1, Duration::ZERO), None);
    }
}
