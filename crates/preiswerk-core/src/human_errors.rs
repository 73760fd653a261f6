// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for shop staff.
//
// The driver's errors are technical; the person at the till just needs to
// know what to check. Every variant maps to plain English plus a concrete
// suggestion, with a severity that drives how the UI presents it.

use crate::error::DriverError;
use crate::types::DeviceStatus;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Busy device, timeout — the driver can retry automatically.
    Transient,
    /// Staff must do something (load paper, replace ribbon, plug in cable).
    ActionRequired,
    /// Cannot be fixed by retrying or swapping paper — wrong configuration.
    Permanent,
}

/// A plain-English error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Summary shown as a heading.
    pub message: String,
    /// What the operator should try (shown as body text).
    pub suggestion: String,
    /// Whether the system should auto-retry.
    pub retriable: bool,
    /// Severity level (drives icon/colour in the UI).
    pub severity: Severity,
}

/// Convert a `DriverError` into something the person at the till can act on.
pub fn humanize_error(err: &DriverError) -> HumanError {
    match err.root() {
        DriverError::Connect { port, .. } => HumanError {
            message: "The label printer couldn't be reached.".into(),
            suggestion: format!(
                "Check that the printer is plugged in and turned on, then try again. (Port: {port})"
            ),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        DriverError::PortNotFound(port) => HumanError {
            message: "No printer was found on this port.".into(),
            suggestion: format!(
                "Make sure the printer cable is connected, or pick a different port in the settings. (Looked for: {port})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DriverError::InvalidBaud(baud) => HumanError {
            message: "The printer connection speed is set wrong.".into(),
            suggestion: format!(
                "Open the printer settings and pick one of the supported speeds. ({baud} is not supported)"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        DriverError::NotConnected => HumanError {
            message: "The printer isn't connected yet.".into(),
            suggestion: "Connect to the printer from the settings screen, then print again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DriverError::Send { .. } | DriverError::ShortWrite { .. } => HumanError {
            message: "Sending to the printer was interrupted.".into(),
            suggestion: "Check the cable, then print the sticker again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        DriverError::Device(status) => humanize_device_status(*status),

        DriverError::CircuitOpen { retry_after } => HumanError {
            message: "The printer is having repeated trouble.".into(),
            suggestion: format!(
                "We've paused printing to let it recover. Try again in {} seconds.",
                retry_after.as_secs().max(1)
            ),
            retriable: false,
            severity: Severity::Transient,
        },

        DriverError::Cancelled => HumanError {
            message: "Printing was cancelled.".into(),
            suggestion: "Nothing else was printed. Start the job again when ready.".into(),
            retriable: false,
            severity: Severity::Transient,
        },

        DriverError::AlreadyPrinting => HumanError {
            message: "A sticker is already printing.".into(),
            suggestion: "Wait for the current job to finish, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        DriverError::InvalidRequest(detail) => HumanError {
            message: "This sticker can't be printed as entered.".into(),
            suggestion: format!("Check the item details and try again. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        DriverError::Io(_) | DriverError::Internal(_) => HumanError {
            message: "Something went wrong while printing.".into(),
            suggestion: "Try again. If it keeps happening, unplug the printer and plug it back in.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        // root() never returns this variant, but the match must be total.
        DriverError::RetriesExhausted { .. } => HumanError {
            message: "Printing failed after several tries.".into(),
            suggestion: "Check the printer, then start the job again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

/// Canned remediation hints for device conditions.
pub fn humanize_device_status(status: DeviceStatus) -> HumanError {
    match status {
        DeviceStatus::Ready => HumanError {
            message: "The printer is ready.".into(),
            suggestion: "No action needed.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        DeviceStatus::Busy => HumanError {
            message: "The printer is busy.".into(),
            suggestion: "Wait a moment and try again — it's finishing another sticker.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        DeviceStatus::OutOfPaper => HumanError {
            message: "The printer is out of labels.".into(),
            suggestion: "Load a new roll of label stock, close the cover, then print again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        DeviceStatus::OutOfInk => HumanError {
            message: "The printer is out of ink or ribbon.".into(),
            suggestion: "Replace the ribbon cartridge, then print again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        DeviceStatus::Offline => HumanError {
            message: "The printer is offline.".into(),
            suggestion: "Check the power and cable, then reconnect from the settings screen.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        DeviceStatus::Unknown => HumanError {
            message: "The printer sent a response we don't understand.".into(),
            suggestion: "Turn the printer off and on again. If this keeps happening, the model may need calibration.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
