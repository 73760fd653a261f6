// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Circuit breaker guarding the transport.
//
// If the printer is repeatedly failing, stop hammering it with commands
// that will just time out. Short-circuit immediately instead, and after a
// cooldown let a single probe through to test recovery. All transitions
// use compare-and-swap so concurrent jobs can never double-probe.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use preiswerk_core::config::DriverConfig;
use preiswerk_core::types::CircuitState;

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Why a guarded operation did not produce a value.
#[derive(Debug)]
pub enum CircuitError<E> {
    /// The circuit is open; the operation was never invoked.
    Open { retry_after: Duration },
    /// The operation ran and failed; bookkeeping is already done.
    Inner(E),
}

/// State machine over `Closed | Open | HalfOpen` with atomic transitions.
///
/// One breaker guards one transport; it is shared by every job that
/// touches that transport.
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    /// Only meaningful while half-open.
    consecutive_successes: AtomicU32,
    /// Milliseconds since `created`, so the timestamp fits in an atomic.
    last_failure_ms: AtomicU64,
    /// True while a half-open probe is in flight.
    probe_in_flight: AtomicBool,
    created: Instant,
    failure_threshold: u32,
    success_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            created: Instant::now(),
            failure_threshold,
            success_threshold,
            open_timeout,
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(
            config.failure_threshold,
            config.success_threshold,
            config.open_timeout,
        )
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            OPEN => CircuitState::Open,
            HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Operator escape hatch: force `Closed` and zero all counters.
    pub fn reset(&self) {
        self.state.store(CLOSED, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.consecutive_successes.store(0, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        info!("circuit breaker reset by operator");
    }

    /// Run `op` under the breaker's supervision.
    ///
    /// While open and inside the cooldown the operation is never invoked.
    /// Once the cooldown elapses exactly one caller wins the half-open
    /// probe; the rest keep failing fast until the probe completes.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Only the caller that set the probe flag may clear it; a slow
        // closed-state caller finishing late must not release an active
        // probe.
        let mut is_probe = false;

        match self.state.load(Ordering::Acquire) {
            OPEN => {
                let elapsed = self.since_last_failure();
                if elapsed < self.open_timeout {
                    debug!(
                        remaining_ms = (self.open_timeout - elapsed).as_millis(),
                        "circuit open — blocking request"
                    );
                    return Err(CircuitError::Open {
                        retry_after: self.open_timeout - elapsed,
                    });
                }
                // Cooldown over: exactly one caller flips to half-open.
                if self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return Err(CircuitError::Open {
                        retry_after: Duration::ZERO,
                    });
                }
                self.consecutive_successes.store(0, Ordering::Release);
                self.probe_in_flight.store(true, Ordering::Release);
                is_probe = true;
                info!("circuit half-open — probe allowed");
            }
            HALF_OPEN => {
                // One probe at a time.
                if self
                    .probe_in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return Err(CircuitError::Open {
                        retry_after: Duration::ZERO,
                    });
                }
                is_probe = true;
            }
            _ => {}
        }

        let outcome = op().await;
        if is_probe {
            self.probe_in_flight.store(false, Ordering::Release);
        }

        match outcome {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);

        if self.state.load(Ordering::Acquire) == HALF_OPEN {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes >= self.success_threshold
                && self
                    .state
                    .compare_exchange(HALF_OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                self.consecutive_successes.store(0, Ordering::Release);
                info!("printer recovered — circuit closed");
            }
        }
    }

    fn on_failure(&self) {
        self.last_failure_ms
            .store(self.created.elapsed().as_millis() as u64, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        match self.state.load(Ordering::Acquire) {
            HALF_OPEN => {
                self.consecutive_successes.store(0, Ordering::Release);
                if self
                    .state
                    .compare_exchange(HALF_OPEN, OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    warn!("probe failed — circuit reopened");
                }
            }
            CLOSED if failures >= self.failure_threshold => {
                if self
                    .state
                    .compare_exchange(CLOSED, OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    warn!(failures, "failure threshold reached — circuit opened");
                }
            }
            _ => {}
        }
    }

    fn since_last_failure(&self) -> Duration {
        let last = Duration::from_millis(self.last_failure_ms.load(Ordering::Acquire));
        self.created.elapsed().saturating_sub(last)
    }
}
