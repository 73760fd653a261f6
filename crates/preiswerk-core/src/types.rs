// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Preiswerk label printer driver.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DriverError, Result};

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serial line speeds supported by the label printers we drive.
///
/// The firmware rejects anything outside this set, so the type makes
/// unsupported rates unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::B9600 => 9_600,
            Self::B19200 => 19_200,
            Self::B38400 => 38_400,
            Self::B57600 => 57_600,
            Self::B115200 => 115_200,
        }
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self::B9600
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = DriverError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            9_600 => Ok(Self::B9600),
            19_200 => Ok(Self::B19200),
            38_400 => Ok(Self::B38400),
            57_600 => Ok(Self::B57600),
            115_200 => Ok(Self::B115200),
            other => Err(DriverError::InvalidBaud(other)),
        }
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Immutable printer configuration snapshot used for one print operation.
///
/// Replacing the settings takes effect on the *next* operation only — a job
/// already running keeps the snapshot it started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterSettings {
    /// Port identifier, e.g. `/dev/ttyUSB0`, `COM3`, or the synthetic `USB`.
    pub port: String,
    pub baud: BaudRate,
    /// Label stock width in millimetres (1–1000).
    pub paper_width_mm: u32,
    /// Label stock height in millimetres (1–1000).
    pub paper_height_mm: u32,
    /// Print density / darkness (0–15).
    pub density: u8,
    /// Print speed step (1–6).
    pub speed: u8,
    /// Head resolution in dots per inch (100–600).
    pub dpi: u32,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            port: "USB".into(),
            baud: BaudRate::B9600,
            paper_width_mm: 50,
            paper_height_mm: 30,
            density: 8,
            speed: 3,
            dpi: 203,
        }
    }
}

impl PrinterSettings {
    /// Check every field against the ranges the printer firmware accepts.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(DriverError::InvalidRequest("port is empty".into()));
        }
        if !(1..=1000).contains(&self.paper_width_mm) {
            return Err(DriverError::InvalidRequest(format!(
                "paper width {} mm outside 1–1000",
                self.paper_width_mm
            )));
        }
        if !(1..=1000).contains(&self.paper_height_mm) {
            return Err(DriverError::InvalidRequest(format!(
                "paper height {} mm outside 1–1000",
                self.paper_height_mm
            )));
        }
        if self.density > 15 {
            return Err(DriverError::InvalidRequest(format!(
                "density {} outside 0–15",
                self.density
            )));
        }
        if !(1..=6).contains(&self.speed) {
            return Err(DriverError::InvalidRequest(format!(
                "speed {} outside 1–6",
                self.speed
            )));
        }
        if !(100..=600).contains(&self.dpi) {
            return Err(DriverError::InvalidRequest(format!(
                "resolution {} dpi outside 100–600",
                self.dpi
            )));
        }
        Ok(())
    }
}

/// Maximum unit price a sticker can carry.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(99_999_999, 0, 0, false, 2);

/// One price sticker to print. Pure value object — no identity, no storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRequest {
    pub item: String,
    pub supplier: String,
    /// Unit price. `None` renders as zero on the sticker.
    pub price: Option<Decimal>,
    /// Number of identical stickers (≥ 1).
    pub copies: u32,
}

impl LabelRequest {
    pub fn new(item: impl Into<String>, supplier: impl Into<String>, price: Decimal) -> Self {
        Self {
            item: item.into(),
            supplier: supplier.into(),
            price: Some(price),
            copies: 1,
        }
    }

    /// Reject malformed requests before any command is produced.
    pub fn validate(&self) -> Result<()> {
        if self.item.trim().is_empty() {
            return Err(DriverError::InvalidRequest("item name is empty".into()));
        }
        if self.supplier.trim().is_empty() {
            return Err(DriverError::InvalidRequest("supplier name is empty".into()));
        }
        if let Some(price) = self.price {
            if price.is_sign_negative() {
                return Err(DriverError::InvalidRequest(format!(
                    "price {price} is negative"
                )));
            }
            if price > MAX_UNIT_PRICE {
                return Err(DriverError::InvalidRequest(format!(
                    "price {price} exceeds {MAX_UNIT_PRICE}"
                )));
            }
            if price.normalize().scale() > 2 {
                return Err(DriverError::InvalidRequest(format!(
                    "price {price} has more than 2 decimal places"
                )));
            }
        }
        if self.copies == 0 {
            return Err(DriverError::InvalidRequest("copy count is zero".into()));
        }
        Ok(())
    }
}

/// State of the physical link, owned exclusively by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Best-effort device condition parsed from a `~HS` status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Ready,
    Busy,
    OutOfPaper,
    OutOfInk,
    /// Not connected — reported without touching the device.
    Offline,
    /// Response was missing or unrecognized.
    Unknown,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::OutOfPaper => "out of paper",
            Self::OutOfInk => "out of ink",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation — requests pass through.
    Closed,
    /// Too many failures — requests are blocked. Cooldown timer running.
    Open,
    /// Cooldown expired — probe requests allowed to test recovery.
    HalfOpen,
}

/// How a failure is expected to behave, derived per error and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCategory {
    /// Busy device, timeout, dropped link — expected to self-resolve.
    Transient,
    /// Bad configuration, unsupported request — needs operator intervention.
    Permanent,
    /// Nothing recognizable — treated optimistically.
    Unknown,
}

/// What the driver should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStrategy {
    /// Small bounded retry count, no delay between attempts.
    RetryImmediate,
    /// Exponential backoff between attempts.
    RetryWithBackoff,
    /// Close and reopen the transport, then try once more.
    Reconnect,
    /// Surface the error immediately.
    FailFast,
    /// No automatic recovery — log and propagate to the operator.
    ManualIntervention,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn default_settings_are_valid() {
        PrinterSettings::default().validate().expect("valid");
    }

    #[test]
    fn settings_reject_out_of_range_fields() {
        let mut s = PrinterSettings::default();
        s.paper_width_mm = 0;
        assert!(s.validate().is_err());

        let mut s = PrinterSettings::default();
        s.density = 16;
        assert!(s.validate().is_err());

        let mut s = PrinterSettings::default();
        s.speed = 7;
        assert!(s.validate().is_err());

        let mut s = PrinterSettings::default();
        s.dpi = 99;
        assert!(s.validate().is_err());
    }

    #[test]
    fn baud_rate_round_trips_through_u32() {
        for baud in [
            BaudRate::B9600,
            BaudRate::B19200,
            BaudRate::B38400,
            BaudRate::B57600,
            BaudRate::B115200,
        ] {
            assert_eq!(BaudRate::try_from(baud.as_u32()).unwrap(), baud);
        }
        assert!(matches!(
            BaudRate::try_from(4_800),
            Err(DriverError::InvalidBaud(4_800))
        ));
    }

    #[test]
    fn request_rejects_negative_price() {
        let mut req = LabelRequest::new("Milk", "Dairy Co", Decimal::new(250, 2));
        req.price = Some(Decimal::new(-1, 2));
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_rejects_too_many_decimals() {
        let mut req = LabelRequest::new("Milk", "Dairy Co", Decimal::new(250, 2));
        req.price = Some(Decimal::new(12_345, 3)); // 12.345
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_allows_trailing_zero_scale() {
        let mut req = LabelRequest::new("Milk", "Dairy Co", Decimal::new(250, 2));
        req.price = Some(Decimal::new(2_500_0, 4).normalize()); // 2.50
        req.validate().expect("2.50 is fine");
    }

    #[test]
    fn request_rejects_zero_copies_and_blank_names() {
        let mut req = LabelRequest::new("Milk", "Dairy Co", Decimal::ONE);
        req.copies = 0;
        assert!(req.validate().is_err());

        let req = LabelRequest::new("  ", "Dairy Co", Decimal::ONE);
        assert!(req.validate().is_err());
    }

    #[test]
    fn missing_price_is_valid() {
        let mut req = LabelRequest::new("Milk", "Dairy Co", Decimal::ONE);
        req.price = None;
        req.validate().expect("missing price renders as zero");
    }
}
