// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error taxonomy for the driver.
//
// Every failure the driver can hit is a structured variant here. The failure
// classifier keys off the variant first and only falls back to message text
// when a variant wraps an opaque detail string.

use std::time::Duration;

use thiserror::Error;

use crate::types::DeviceStatus;

/// Top-level error type for all driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    // -- Connection --
    #[error("cannot open port {port}: {detail}")]
    Connect { port: String, detail: String },

    #[error("no matching port found for {0}")]
    PortNotFound(String),

    #[error("unsupported baud rate: {0}")]
    InvalidBaud(u32),

    #[error("transport is not connected")]
    NotConnected,

    // -- Write path --
    #[error("write failed: {detail}")]
    Send { detail: String },

    #[error("short write: {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },

    // -- Device condition --
    #[error("device reported: {0}")]
    Device(DeviceStatus),

    // -- Guard rails --
    #[error("circuit open — retry in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    #[error("print job cancelled")]
    Cancelled,

    #[error("another print job is already running")]
    AlreadyPrinting,

    // -- Caller input --
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // -- Retry bookkeeping --
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DriverError>,
    },

    // -- Anything the OS hands us directly --
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("print task failed: {0}")]
    Internal(String),
}

impl DriverError {
    /// The error from the final attempt, unwrapping retry bookkeeping.
    pub fn root(&self) -> &DriverError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DriverError>;
