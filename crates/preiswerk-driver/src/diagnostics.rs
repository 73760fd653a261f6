// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end printer diagnostics.
//
// Runs a sequence of checks: port enumeration → connection → device status
// → label rendering → optional test sticker. Stops at the first failure and
// provides a human-readable diagnosis with actionable guidance.

use rust_decimal::Decimal;

use preiswerk_core::human_errors::{humanize_device_status, humanize_error};
use preiswerk_core::types::{DeviceStatus, LabelRequest};

use crate::encoder;
use crate::orchestrator::PrintOrchestrator;

/// Result of a single diagnostic step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Step name shown to the user.
    pub name: String,
    /// Whether the step passed.
    pub passed: bool,
    /// Human-readable detail of what was tested.
    pub detail: String,
    /// What to do if the step failed.
    pub fix: Option<String>,
}

impl StepResult {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
            fix: None,
        }
    }

    fn fail(name: &str, detail: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
            fix: Some(fix.into()),
        }
    }
}

/// Full diagnostic report.
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    /// The sequential step results.
    pub steps: Vec<StepResult>,
    /// The step that failed (if any).
    pub failed_step: Option<usize>,
    /// Overall summary.
    pub summary: String,
    /// Port the checks ran against.
    pub port: String,
}

impl DiagnosticReport {
    fn fail_at(mut self, index: usize, summary: impl Into<String>) -> Self {
        self.failed_step = Some(index);
        self.summary = summary.into();
        self
    }
}

/// Run the diagnostic pipeline against a printer.
///
/// Each step depends on the previous one succeeding. Returns as soon as a
/// step fails, with guidance for the user. With `print_test_label` set the
/// final step pushes one small sticker through the full pipeline.
pub async fn run_diagnostics(
    orchestrator: &PrintOrchestrator,
    print_test_label: bool,
) -> DiagnosticReport {
    let settings = orchestrator.settings();
    let mut report = DiagnosticReport {
        steps: Vec::new(),
        failed_step: None,
        summary: String::new(),
        port: settings.port.clone(),
    };

    // Step 1: ports exist at all.
    let ports = check_ports(orchestrator, &settings.port);
    report.steps.push(ports.clone());
    if !ports.passed {
        return report.fail_at(0, "No serial ports found on this machine.");
    }

    // Step 2: the link can be (or already is) opened.
    let connection = check_connection(orchestrator).await;
    report.steps.push(connection.clone());
    if !connection.passed {
        let summary = connection.detail.clone();
        return report.fail_at(1, summary);
    }

    // Step 3: the device answers the status query sensibly.
    let status = check_status(orchestrator).await;
    report.steps.push(status.clone());
    if !status.passed {
        let summary = status.detail.clone();
        return report.fail_at(2, summary);
    }

    // Step 4: the current settings produce a valid label.
    let render = check_render(orchestrator);
    report.steps.push(render.clone());
    if !render.passed {
        return report.fail_at(3, "Label layout failed with the current settings.");
    }

    // Step 5 (optional): one real sticker through the whole pipeline.
    if print_test_label {
        let test = send_test_label(orchestrator).await;
        report.steps.push(test.clone());
        if !test.passed {
            return report.fail_at(4, "Test sticker couldn't be printed.");
        }
    }

    report.summary = "Everything looks good! Your label printer is ready.".into();
    report
}

/// Generate a shareable text summary for sending to a tech-savvy helper.
pub fn generate_help_summary(report: &DiagnosticReport) -> String {
    let now = chrono::Utc::now().format("%d %b %Y, %l:%M %p");
    let mut text = format!("Label Printer Report\nDate: {now}\n");
    text.push_str(&format!("Port: {}\n\n", report.port));

    if let Some(idx) = report.failed_step {
        let step = &report.steps[idx];
        text.push_str(&format!("FAILED AT: Step {} — {}\n", idx + 1, step.name));
        text.push_str(&format!("What happened: {}\n", step.detail));
        if let Some(ref fix) = step.fix {
            text.push_str(&format!("What to do: {fix}\n"));
        }
    } else {
        text.push_str("All checks passed. Printer is working.\n");
    }

    text
}

// -- Step implementations ---------------------------------------------------

fn check_ports(orchestrator: &PrintOrchestrator, configured: &str) -> StepResult {
    let ports = orchestrator.list_ports();
    if ports.is_empty() {
        return StepResult::fail(
            "Port Check",
            "No serial ports found on this machine.",
            "Plug the printer's USB cable in, then run diagnostics again.",
        );
    }

    if ports.iter().any(|p| p.eq_ignore_ascii_case(configured)) {
        StepResult::pass(
            "Port Check",
            format!("Found {} port(s); '{configured}' is available.", ports.len()),
        )
    } else {
        StepResult::fail(
            "Port Check",
            format!("The configured port '{configured}' is not in the list: {ports:?}."),
            "Pick one of the listed ports in the printer settings, or use 'USB' to auto-detect.",
        )
    }
}

async fn check_connection(orchestrator: &PrintOrchestrator) -> StepResult {
    if orchestrator.is_open().await {
        return StepResult::pass("Connection", "The printer link is already open.");
    }

    match orchestrator.open().await {
        Ok(()) => StepResult::pass("Connection", "Opened the printer link successfully."),
        Err(e) => {
            let human = humanize_error(&e);
            StepResult::fail(
                "Connection",
                human.message,
                human.suggestion,
            )
        }
    }
}

async fn check_status(orchestrator: &PrintOrchestrator) -> StepResult {
    let status = orchestrator.query_status().await;
    match status {
        DeviceStatus::Ready => StepResult::pass("Printer Status", "Printer reports ready."),
        DeviceStatus::Busy => StepResult::pass(
            "Printer Status",
            "Printer is busy with another job; it will accept yours next.",
        ),
        // Unknown is tolerated: plenty of firmware never answers ~HS.
        DeviceStatus::Unknown => StepResult::pass(
            "Printer Status",
            "Printer didn't answer the status query; this is common and usually harmless.",
        ),
        DeviceStatus::OutOfPaper | DeviceStatus::OutOfInk | DeviceStatus::Offline => {
            let human = humanize_device_status(status);
            StepResult::fail("Printer Status", human.message, human.suggestion)
        }
    }
}

fn check_render(orchestrator: &PrintOrchestrator) -> StepResult {
    let settings = orchestrator.settings();
    match encoder::render(&test_label(), &settings) {
        Ok(commands) => StepResult::pass(
            "Label Layout",
            format!("Rendered a test label ({} commands).", commands.len()),
        ),
        Err(e) => {
            let human = humanize_error(&e);
            StepResult::fail("Label Layout", human.message, human.suggestion)
        }
    }
}

async fn send_test_label(orchestrator: &PrintOrchestrator) -> StepResult {
    match orchestrator.print_and_wait(test_label(), 1).await {
        Ok(()) => StepResult::pass(
            "Test Sticker",
            "Test sticker sent — one label should be coming out now.",
        ),
        Err(e) => {
            let human = humanize_error(&e);
            StepResult::fail(
                "Test Sticker",
                human.message,
                human.suggestion,
            )
        }
    }
}

fn test_label() -> LabelRequest {
    LabelRequest {
        item: "Test Sticker".into(),
        supplier: "Diagnostics".into(),
        price: Some(Decimal::new(0, 2)),
        copies: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_summary_names_the_failed_step() {
        let report = DiagnosticReport {
            steps: vec![
                StepResult::pass("Port Check", "ok"),
                StepResult::fail(
                    "Connection",
                    "Couldn't open the port.",
                    "Check the cable.",
                ),
            ],
            failed_step: Some(1),
            summary: "Couldn't open the port.".into(),
            port: "COM3".into(),
        };

        let text = generate_help_summary(&report);
        assert!(text.contains("FAILED AT: Step 2 — Connection"));
        assert!(text.contains("Check the cable."));
        assert!(text.contains("Port: COM3"));
    }

    #[test]
    fn help_summary_reports_success() {
        let report = DiagnosticReport {
            steps: vec![StepResult::pass("Port Check", "ok")],
            failed_step: None,
            summary: "Everything looks good!".into(),
            port: "USB".into(),
        };

        let text = generate_help_summary(&report);
        assert!(text.contains("All checks passed."));
    }

    #[test]
    fn test_label_is_valid() {
        assert!(test_label().validate().is_ok());
    }
}
