//! Fixed-interval polling with an optional overall budget.
//!
//! Both job measurement modes are configurations of [`Poller`]: the
//! cold-start mode polls the log store every 2s for at most 300s, the
//! total-time mode polls execution status every 5s with no budget.

use std::time::Duration;

use tracing::debug;

use crate::errors::{BenchError, Result};
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub interval: Duration,
    /// Overall wall-clock budget. `None` polls until the condition holds.
    pub budget: Option<Duration>,
}

impl Poller {
    pub fn new(interval: Duration, budget: Option<Duration>) -> Self {
        Self { interval, budget }
    }

    /// Call `check` until it yields a value, sleeping `interval` between calls.
    ///
    /// The budget is checked before every attempt, so a timeout is reported
    /// only once the full budget has elapsed. An error from `check` ends the
    /// poll immediately.
    pub fn poll<T, F>(&self, what: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        let timer = Timer::start();
        let mut attempt: u32 = 0;

        loop {
            if let Some(budget) = self.budget
                && timer.elapsed() >= budget
            {
                return Err(BenchError::PollTimeout {
                    what: what.to_string(),
                    waited: timer.elapsed(),
                });
            }

            attempt += 1;
            if let Some(value) = check()? {
                debug!(what, attempt, elapsed = ?timer.elapsed(), "poll condition met");
                return Ok(value);
            }

            debug!(what, attempt, interval = ?self.interval, "poll condition not met, sleeping");
            std::thread::sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn returns_first_value() {
        let poller = Poller::new(Duration::from_millis(1), Some(Duration::from_secs(5)));
        let result = poller.poll("immediate", || Ok(Some(7))).unwrap();
        assert_eq!(result, 7);
    }

    #[test]
    fn keeps_polling_until_ready() {
        let poller = Poller::new(Duration::from_millis(1), None);
        let mut calls = 0;
        let result = poller
            .poll("third call", || {
                calls += 1;
                Ok((calls == 3).then_some(calls))
            })
            .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn times_out_after_budget_not_before() {
        let budget = Duration::from_millis(60);
        let poller = Poller::new(Duration::from_millis(10), Some(budget));
        let start = Instant::now();
        let result: Result<()> = poller.poll("never", || Ok(None));
        let waited = start.elapsed();

        match result {
            Err(BenchError::PollTimeout { what, .. }) => assert_eq!(what, "never"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(waited >= budget, "returned after {waited:?}, budget {budget:?}");
    }

    #[test]
    fn error_stops_polling() {
        let poller = Poller::new(Duration::from_millis(1), None);
        let mut calls = 0;
        let result: Result<()> = poller.poll("failing", || {
            calls += 1;
            Err(BenchError::ControlPlane {
                detail: "boom".to_string(),
            })
        });
        assert!(matches!(result, Err(BenchError::ControlPlane { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_budget_checks_nothing() {
        let poller = Poller::new(Duration::from_millis(1), Some(Duration::ZERO));
        let mut calls = 0;
        let result: Result<()> = poller.poll("zero", || {
            calls += 1;
            Ok(Some(()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 0);
    }
}
