// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Generic retry engine with cancellable delays.
//
// Policy decides the spacing between attempts; the predicate decides
// whether an error is worth another attempt at all. Severity only changes
// how loudly exhaustion is reported, never whether we retry.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use preiswerk_core::error::{DriverError, Result};

use crate::breaker::{CircuitBreaker, CircuitError};

/// Hard cap on any single backoff delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Spacing of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// One attempt, no delay.
    NoRetry,
    /// Constant delay between attempts.
    FixedRetry,
    /// `initial * 2^(attempt-1)`, capped at [`BACKOFF_CAP`].
    ExponentialBackoff,
    /// Delegated to the breaker; the fixed delay applies if it ever loops.
    CircuitBreaker,
}

/// How loudly to report exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Routine,
    Elevated,
    Critical,
}

/// Per-call retry configuration.
#[derive(Debug, Clone)]
pub struct ErrorConfig {
    pub policy: RetryPolicy,
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub severity: Severity,
    /// Delegate the whole attempt sequence through the circuit breaker
    /// instead of looping here.
    pub use_circuit_breaker: bool,
}

impl ErrorConfig {
    /// Optimistic bounded retries for unclassifiable errors.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            policy: RetryPolicy::NoRetry,
            max_retries,
            initial_delay: Duration::ZERO,
            severity: Severity::Routine,
            use_circuit_breaker: false,
        }
    }

    /// Exponential backoff for transient device trouble.
    pub fn backoff(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            policy: RetryPolicy::ExponentialBackoff,
            max_retries,
            initial_delay,
            severity: Severity::Elevated,
            use_circuit_breaker: false,
        }
    }
}

/// Delay before the retry following attempt number `attempt` (1-based).
pub fn delay_for(policy: RetryPolicy, initial: Duration, attempt: u32) -> Duration {
    match policy {
        RetryPolicy::NoRetry => Duration::ZERO,
        RetryPolicy::FixedRetry | RetryPolicy::CircuitBreaker => initial,
        RetryPolicy::ExponentialBackoff => {
            let factor = 1u32 << (attempt - 1).min(10);
            initial.saturating_mul(factor).min(BACKOFF_CAP)
        }
    }
}

/// Run `op` under the retry policy.
///
/// The delay between attempts races against the cancellation token, so a
/// cancelled job stops mid-backoff instead of waiting it out. When the
/// attempts run out the final error is re-raised, wrapped with the attempt
/// count if more than one attempt was made.
pub async fn run<'a, T, F, P>(
    config: &ErrorConfig,
    breaker: Option<&CircuitBreaker>,
    cancel: &CancellationToken,
    mut retry_if: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> BoxFuture<'a, Result<T>>,
    P: FnMut(&DriverError) -> bool,
{
    if config.use_circuit_breaker {
        if let Some(breaker) = breaker {
            // The breaker is the backoff; no extra loop on top of it.
            return breaker.execute(op).await.map_err(|e| match e {
                CircuitError::Open { retry_after } => DriverError::CircuitOpen { retry_after },
                CircuitError::Inner(inner) => inner,
            });
        }
    }

    let attempts = config.max_retries + 1;
    for attempt in 1..=attempts {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt == attempts {
            report_exhaustion(config.severity, attempt, &err);
            if attempts == 1 {
                return Err(err);
            }
            return Err(DriverError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        if !retry_if(&err) {
            debug!(attempt, error = %err, "retry predicate declined");
            return Err(err);
        }

        let delay = delay_for(config.policy, config.initial_delay, attempt);
        debug!(attempt, delay_ms = delay.as_millis(), error = %err, "scheduling retry");

        if delay.is_zero() {
            if cancel.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
        } else {
            tokio::select! {
                () = cancel.cancelled() => return Err(DriverError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    unreachable!("loop always returns on the final attempt")
}

fn report_exhaustion(severity: Severity, attempts: u32, err: &DriverError) {
    match severity {
        Severity::Routine => debug!(attempts, error = %err, "retries exhausted"),
        Severity::Elevated => warn!(attempts, error = %err, "retries exhausted"),
        Severity::Critical => error!(attempts, error = %err, "retries exhausted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn flaky(calls: Arc<AtomicU32>, succeed_on: u32) -> impl FnMut() -> BoxFuture<'static, Result<u32>> {
        move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(n)
                } else {
                    Err(DriverError::Send {
                        detail: "device busy".into(),
                    })
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = ErrorConfig {
            policy: RetryPolicy::FixedRetry,
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            severity: Severity::Routine,
            use_circuit_breaker: false,
        };
        let cancel = CancellationToken::new();

        let result = run(&config, None, &cancel, |_| true, flaky(Arc::clone(&calls), 3)).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn predicate_stops_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = ErrorConfig::backoff(5, Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let result = run(&config, None, &cancel, |_| false, flaky(Arc::clone(&calls), 99)).await;
        assert!(matches!(result, Err(DriverError::Send { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = ErrorConfig::immediate(2);
        let cancel = CancellationToken::new();

        let result = run(&config, None, &cancel, |_| true, flaky(Arc::clone(&calls), 99)).await;
        match result {
            Err(DriverError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, DriverError::Send { .. }));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_returns_raw_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = ErrorConfig::immediate(0);
        let cancel = CancellationToken::new();

        let result = run(&config, None, &cancel, |_| true, flaky(Arc::clone(&calls), 99)).await;
        assert!(matches!(result, Err(DriverError::Send { .. })));
    }

    #[test]
    fn exponential_delays_double_and_cap() {
        let initial = Duration::from_millis(100);
        assert_eq!(
            delay_for(RetryPolicy::ExponentialBackoff, initial, 1),
            Duration::from_millis(100)
        );
        assert_eq!(
            delay_for(RetryPolicy::ExponentialBackoff, initial, 2),
            Duration::from_millis(200)
        );
        assert_eq!(
            delay_for(RetryPolicy::ExponentialBackoff, initial, 3),
            Duration::from_millis(400)
        );
        assert_eq!(
            delay_for(RetryPolicy::ExponentialBackoff, Duration::from_secs(20), 3),
            BACKOFF_CAP
        );
        assert_eq!(
            delay_for(RetryPolicy::NoRetry, initial, 4),
            Duration::ZERO
        );
        assert_eq!(delay_for(RetryPolicy::FixedRetry, initial, 4), initial);
    }

    #[tokio::test]
    async fn cancellation_shortens_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = ErrorConfig {
            policy: RetryPolicy::FixedRetry,
            max_retries: 3,
            initial_delay: Duration::from_secs(5),
            severity: Severity::Routine,
            use_circuit_breaker: false,
        };
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = run(&config, None, &cancel, |_| true, flaky(Arc::clone(&calls), 99)).await;
        assert!(matches!(result, Err(DriverError::Cancelled)));
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "cancel should cut the 5s backoff short"
        );
    }

    #[tokio::test]
    async fn breaker_delegation_makes_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = ErrorConfig {
            policy: RetryPolicy::CircuitBreaker,
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            severity: Severity::Routine,
            use_circuit_breaker: true,
        };
        let breaker = CircuitBreaker::new(3, 1, Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let result = run(
            &config,
            Some(&breaker),
            &cancel,
            |_| true,
            flaky(Arc::clone(&calls), 99),
        )
        .await;

        assert!(matches!(result, Err(DriverError::Send { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.consecutive_failures(), 1);
    }
}
