// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Driver tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persistent driver configuration.
///
/// These are engine knobs, not per-label settings — see
/// [`PrinterSettings`](crate::types::PrinterSettings) for those.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Pause after each accepted write so the device can process the command.
    pub settle_delay: Duration,
    /// Bound on every read so a silent device cannot hang a status query.
    pub read_timeout: Duration,
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes again.
    pub success_threshold: u32,
    /// How long an open circuit blocks before allowing a probe.
    pub open_timeout: Duration,
    /// Retry attempts after the first failure of a print round.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt up to the cap.
    pub initial_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(50),
            read_timeout: Duration::from_millis(500),
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}
