// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Preiswerk Driver — TSPL encoding, serial transport, and fault-tolerant
// print orchestration for retail label printers.  This crate bridges between
// the domain types defined in `preiswerk-core` and the physical device.

pub mod breaker;
pub mod classify;
pub mod diagnostics;
pub mod encoder;
pub mod orchestrator;
pub mod retry;
pub mod transport;

pub use breaker::{CircuitBreaker, CircuitError};
pub use orchestrator::{PrintJobHandle, PrintOrchestrator};
pub use retry::{ErrorConfig, RetryPolicy};
pub use transport::{SerialTransport, Transport};
