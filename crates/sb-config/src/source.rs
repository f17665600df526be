//! Configuration source
//!
//! The core fetches the configuration once per page load. The source may fail
//! or time out; attempts are retried on a fixed delay schedule and exhaustion
//! falls back to an empty configuration, which leaves the page unfiltered.

use std::future::Future;
use std::time::Duration;

use crate::error::ConfigError;
use crate::record::RawConfig;

/// Anything that can supply the configuration.
pub trait ConfigSource {
    fn fetch(&self) -> impl Future<Output = Result<RawConfig, ConfigError>>;
}

/// Timer used between attempts.
pub trait Sleep {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()>;
}

/// Bounded retry schedule: one attempt more than there are delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&[50, 100, 200, 300, 500, 500, 500, 500, 500])
    }
}

impl RetryPolicy {
    pub fn from_millis(delays: &[u64]) -> Self {
        Self {
            delays: delays.iter().copied().map(Duration::from_millis).collect(),
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Delay after the failed attempt `attempt` (1-based), None when exhausted.
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        attempt.checked_sub(1).and_then(|i| self.delays.get(i)).copied()
    }
}

/// What a load produced.
#[derive(Debug)]
pub struct LoadOutcome {
    pub config: RawConfig,
    /// Attempts made, including the successful one
    pub attempts: usize,
    /// True when every attempt failed and the empty configuration is used
    pub fell_back: bool,
    pub last_error: Option<ConfigError>,
}

/// Fetch with bounded retries. Never fails: exhaustion yields the empty
/// configuration.
pub async fn load_with_retry<S, T>(source: &S, sleeper: &T, policy: &RetryPolicy) -> LoadOutcome
where
    S: ConfigSource,
    T: Sleep,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match source.fetch().await {
            Ok(config) => {
                if attempt > 1 {
                    log::info!("configuration loaded after {} attempts", attempt);
                }
                return LoadOutcome {
                    config,
                    attempts: attempt,
                    fell_back: false,
                    last_error: None,
                };
            }
            Err(e) => match policy.delay_after(attempt) {
                Some(delay) => {
                    log::debug!("configuration attempt {} failed ({}), retrying in {:?}", attempt, e, delay);
                    sleeper.sleep(delay).await;
                }
                None => {
                    log::warn!(
                        "configuration unavailable after {} attempts ({}), filtering disabled",
                        attempt,
                        e
                    );
                    return LoadOutcome {
                        config: RawConfig::default(),
                        attempts: attempt,
                        fell_back: true,
                        last_error: Some(e),
                    };
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use crate::record::RuleRecord;

    struct FlakySource {
        failures: usize,
        calls: Cell<usize>,
    }

    impl ConfigSource for FlakySource {
        async fn fetch(&self) -> Result<RawConfig, ConfigError> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if call <= self.failures {
                return Err(ConfigError::Transport(format!("attempt {call} refused")));
            }
            Ok(RawConfig {
                rules: vec![RuleRecord {
                    name: Some("remote".into()),
                    ..RuleRecord::default()
                }],
                ..RawConfig::default()
            })
        }
    }

    #[derive(Default)]
    struct RecordingSleep {
        delays: RefCell<Vec<Duration>>,
    }

    impl Sleep for RecordingSleep {
        async fn sleep(&self, delay: Duration) {
            self.delays.borrow_mut().push(delay);
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 10);
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_after(9), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(10), None);
        assert_eq!(policy.delay_after(0), None);
    }

    #[tokio::test]
    async fn test_succeeds_on_sixth_attempt() {
        let source = FlakySource {
            failures: 5,
            calls: Cell::new(0),
        };
        let sleeper = RecordingSleep::default();
        let outcome = load_with_retry(&source, &sleeper, &RetryPolicy::default()).await;

        assert_eq!(outcome.attempts, 6);
        assert!(!outcome.fell_back);
        assert!(outcome.last_error.is_none());
        assert_eq!(outcome.config.rules[0].name.as_deref(), Some("remote"));
        assert_eq!(
            *sleeper.delays.borrow(),
            [50, 100, 200, 300, 500].map(Duration::from_millis).to_vec()
        );
    }

    #[tokio::test]
    async fn test_exhaustion_falls_back_to_empty() {
        let source = FlakySource {
            failures: usize::MAX,
            calls: Cell::new(0),
        };
        let sleeper = RecordingSleep::default();
        let outcome = load_with_retry(&source, &sleeper, &RetryPolicy::default()).await;

        assert_eq!(outcome.attempts, 10);
        assert!(outcome.fell_back);
        assert_eq!(outcome.config, RawConfig::default());
        assert!(matches!(outcome.last_error, Some(ConfigError::Transport(_))));
        assert_eq!(sleeper.delays.borrow().len(), 9);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let source = FlakySource {
            failures: 1,
            calls: Cell::new(0),
        };
        let outcome = load_with_retry(&source, &RecordingSleep::default(), &RetryPolicy::none()).await;
        assert!(outcome.fell_back);
        assert_eq!(source.calls.get(), 1);
    }
}
