// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure classification and recovery strategy selection.
//
// The structured error kind decides the category wherever possible; the
// lowercase substring heuristics are only a fallback for variants that
// wrap opaque detail strings from the OS or the serial layer.

use std::io::ErrorKind;

use tracing::debug;

use preiswerk_core::error::DriverError;
use preiswerk_core::types::{DeviceStatus, FailureCategory, RecoveryStrategy};

/// Map an error to a failure category.
pub fn classify(err: &DriverError) -> FailureCategory {
    match err {
        DriverError::RetriesExhausted { last, .. } => classify(last),

        // Connectivity and busy-device conditions are expected to pass.
        DriverError::NotConnected
        | DriverError::ShortWrite { .. }
        | DriverError::Device(DeviceStatus::Busy)
        | DriverError::Device(DeviceStatus::Offline) => FailureCategory::Transient,

        // Misconfiguration and depleted consumables need a human.
        DriverError::PortNotFound(_)
        | DriverError::InvalidBaud(_)
        | DriverError::InvalidRequest(_)
        | DriverError::Device(DeviceStatus::OutOfPaper)
        | DriverError::Device(DeviceStatus::OutOfInk) => FailureCategory::Permanent,

        DriverError::Io(io) => classify_io_kind(io.kind()),

        // Opaque detail strings: fall back to message heuristics.
        DriverError::Connect { detail, .. }
        | DriverError::Send { detail }
        | DriverError::Internal(detail) => classify_message(detail),

        // Guard-rail errors are not device faults; the orchestrator
        // surfaces them directly, but classify them sanely anyway.
        DriverError::CircuitOpen { .. }
        | DriverError::Cancelled
        | DriverError::AlreadyPrinting => FailureCategory::Permanent,

        DriverError::Device(_) => FailureCategory::Unknown,
    }
}

fn classify_io_kind(kind: ErrorKind) -> FailureCategory {
    match kind {
        ErrorKind::TimedOut
        | ErrorKind::WouldBlock
        | ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::Interrupted => FailureCategory::Transient,
        ErrorKind::NotFound
        | ErrorKind::PermissionDenied
        | ErrorKind::InvalidInput
        | ErrorKind::Unsupported => FailureCategory::Permanent,
        _ => FailureCategory::Unknown,
    }
}

/// Substring heuristics over an error message, lowercased.
///
/// Inherited keyword list — brittle by nature, which is why it only runs
/// when no structured kind is available.
fn classify_message(detail: &str) -> FailureCategory {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("busy")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("offline")
        || lower.contains("disconnect")
        || lower.contains("unavailable")
        || lower.contains("temporarily")
    {
        return FailureCategory::Transient;
    }

    if lower.contains("not found")
        || lower.contains("no such")
        || lower.contains("invalid")
        || lower.contains("unsupported")
        || lower.contains("denied")
        || lower.contains("permission")
    {
        return FailureCategory::Permanent;
    }

    debug!(detail, "unrecognized failure message");
    FailureCategory::Unknown
}

/// Pure mapping from category to recovery strategy.
pub fn strategy_for(category: FailureCategory) -> RecoveryStrategy {
    match category {
        FailureCategory::Transient => RecoveryStrategy::RetryWithBackoff,
        FailureCategory::Permanent => RecoveryStrategy::ManualIntervention,
        // Optimistic: unknown errors are often transient, so try again a
        // couple of times without waiting.
        FailureCategory::Unknown => RecoveryStrategy::RetryImmediate,
    }
}

/// Full routing decision for one failed print round.
///
/// Adds the structured special cases on top of [`strategy_for`]: a lost
/// link warrants a reconnect rather than blind retries, and the guard-rail
/// errors surface immediately.
pub fn recovery_for(err: &DriverError) -> RecoveryStrategy {
    match err.root() {
        DriverError::CircuitOpen { .. }
        | DriverError::Cancelled
        | DriverError::AlreadyPrinting
        | DriverError::InvalidRequest(_) => RecoveryStrategy::FailFast,

        DriverError::NotConnected | DriverError::Device(DeviceStatus::Offline) => {
            RecoveryStrategy::Reconnect
        }

        other => strategy_for(classify(other)),
    }
}
