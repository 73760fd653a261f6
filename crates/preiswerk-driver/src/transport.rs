// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial transport for TSPL label printers.
//
// Owns the physical link and nothing else: port enumeration, open/close,
// raw writes, and the best-effort status query. Retry policy and job
// sequencing live in the orchestrator.

use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, Parity, SerialPortType, StopBits};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use preiswerk_core::config::DriverConfig;
use preiswerk_core::error::{DriverError, Result};
use preiswerk_core::types::{BaudRate, ConnectionState, DeviceStatus};

/// Synthetic port id meaning "first USB-class printer we can find".
pub const USB_AUTO_PORT: &str = "USB";

/// Status query line sent to the device.
const STATUS_QUERY: &[u8] = b"~HS\r\n";

/// Common identifiers offered when enumeration fails outright.
const FALLBACK_PORTS: &[&str] = &["/dev/ttyUSB0", "/dev/ttyS0", "COM1", "COM3"];

/// The seam between the orchestrator and the physical device.
///
/// `SerialTransport` is the production implementation; tests substitute
/// their own to exercise the orchestrator without hardware.
#[async_trait]
pub trait Transport: Send {
    /// The transport's own view of the link. Does not probe the device.
    fn connection_state(&self) -> ConnectionState;

    fn is_open(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    fn open(&mut self, port: &str, baud: BaudRate) -> Result<()>;

    /// Idempotent; a no-op when already closed.
    fn close(&mut self);

    /// Write one command to the device.
    ///
    /// Fails with [`DriverError::Cancelled`] if the token is set before the
    /// write starts; a write already in flight is never interrupted.
    async fn send(&mut self, bytes: &[u8], cancel: &CancellationToken) -> Result<()>;

    /// Best-effort device condition. `Offline` without touching the device
    /// when the link is closed, `Unknown` when the response is unrecognized.
    fn query_status(&mut self) -> DeviceStatus;
}

/// A label printer on a serial or USB-serial link (8N1 framing).
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    state: ConnectionState,
    settle_delay: Duration,
    read_timeout: Duration,
}

impl SerialTransport {
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            port: None,
            state: ConnectionState::Disconnected,
            settle_delay: config.settle_delay,
            read_timeout: config.read_timeout,
        }
    }

    /// Enumerate serial-capable devices, plus the synthetic `USB` entry.
    ///
    /// Falls back to a fixed list of common identifiers when enumeration
    /// fails, so callers always get a non-empty, best-effort list.
    pub fn list_ports() -> Vec<String> {
        let mut ports: Vec<String> = match serialport::available_ports() {
            Ok(found) => found.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!(error = %e, "port enumeration failed, using fallback list");
                Vec::new()
            }
        };

        if ports.is_empty() {
            ports = FALLBACK_PORTS.iter().map(|s| s.to_string()).collect();
        }

        ports.push(USB_AUTO_PORT.to_string());
        ports
    }

    /// Scan enumerated ports for the first USB-class printer.
    fn find_usb_port() -> Result<String> {
        let ports = serialport::available_ports()
            .map_err(|e| DriverError::PortNotFound(format!("{USB_AUTO_PORT} ({e})")))?;

        for info in ports {
            let name_match = info.port_name.to_lowercase().contains("usb");
            let desc_match = match &info.port_type {
                SerialPortType::UsbPort(usb) => {
                    let product = usb.product.as_deref().unwrap_or("").to_lowercase();
                    product.contains("usb") || product.contains("printer")
                }
                _ => false,
            };
            if name_match || desc_match {
                debug!(port = %info.port_name, "auto-detected USB printer port");
                return Ok(info.port_name);
            }
        }

        Err(DriverError::PortNotFound(USB_AUTO_PORT.into()))
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Open the port with 8 data bits, 1 stop bit, no parity, and a bounded
    /// read timeout. The builder applies the whole configuration before the
    /// handle is handed over, so a failed open leaks nothing.
    #[instrument(skip(self))]
    fn open(&mut self, port: &str, baud: BaudRate) -> Result<()> {
        self.close();
        self.state = ConnectionState::Connecting;

        let path = if port.eq_ignore_ascii_case(USB_AUTO_PORT) {
            match Self::find_usb_port() {
                Ok(p) => p,
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(e);
                }
            }
        } else {
            port.to_string()
        };

        let opened = serialport::new(&path, baud.as_u32())
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .timeout(self.read_timeout)
            .open();

        match opened {
            Ok(handle) => {
                info!(port = %path, baud = %baud, "serial port open");
                self.port = Some(handle);
                self.state = ConnectionState::Open;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(DriverError::Connect {
                    port: path,
                    detail: e.to_string(),
                })
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("serial port closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn send(&mut self, bytes: &[u8], cancel: &CancellationToken) -> Result<()> {
        let port = self.port.as_mut().ok_or(DriverError::NotConnected)?;

        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }

        let written = port.write(bytes).map_err(|e| DriverError::Send {
            detail: e.to_string(),
        })?;
        if written != bytes.len() {
            return Err(DriverError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        port.flush().map_err(|e| DriverError::Send {
            detail: e.to_string(),
        })?;

        debug!(bytes = written, "command written");

        // Let the device chew on the command before the next one arrives.
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }

    #[instrument(skip(self))]
    fn query_status(&mut self) -> DeviceStatus {
        let Some(port) = self.port.as_mut() else {
            return DeviceStatus::Offline;
        };

        if port.write_all(STATUS_QUERY).and_then(|()| port.flush()).is_err() {
            warn!("status query write failed");
            return DeviceStatus::Unknown;
        }

        let mut buf = [0u8; 32];
        match port.read(&mut buf) {
            Ok(n) if n > 0 => parse_status(&buf[..n]),
            Ok(_) => DeviceStatus::Unknown,
            Err(e) => {
                debug!(error = %e, "status read failed or timed out");
                DeviceStatus::Unknown
            }
        }
    }
}

/// Map a raw status response to a device condition.
///
/// The code table is a simplified, non-standard guess at the device
/// protocol — calibrate against real hardware before trusting it.
fn parse_status(raw: &[u8]) -> DeviceStatus {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c.is_control());

    let code = match trimmed.parse::<u8>() {
        Ok(code) => code,
        // Some firmware replies with a single raw byte instead of ASCII.
        Err(_) if raw.len() == 1 => raw[0],
        Err(_) => return DeviceStatus::Unknown,
    };

    match code {
        0 => DeviceStatus::Ready,
        1 => DeviceStatus::Busy,
        2 => DeviceStatus::OutOfPaper,
        3 => DeviceStatus::OutOfInk,
        _ => DeviceStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preiswerk_core::config::DriverConfig;

    #[test]
    fn list_ports_always_offers_usb_and_is_non_empty() {
        let ports = SerialTransport::list_ports();
        assert!(!ports.is_empty());
        assert_eq!(ports.last().map(String::as_str), Some(USB_AUTO_PORT));
    }

    #[test]
    fn closed_transport_reports_offline_without_io() {
        let mut t = SerialTransport::new(&DriverConfig::default());
        assert_eq!(t.query_status(), DeviceStatus::Offline);
        assert!(!t.is_open());
    }

    #[test]
    fn close_is_idempotent() {
        let mut t = SerialTransport::new(&DriverConfig::default());
        t.close();
        t.close();
        assert_eq!(t.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_on_closed_transport_fails_fast() {
        let mut t = SerialTransport::new(&DriverConfig::default());
        let cancel = CancellationToken::new();
        let err = t.send(b"CLS\r\n", &cancel).await.unwrap_err();
        assert!(matches!(err, DriverError::NotConnected));
    }

    #[test]
    fn status_codes_parse_to_conditions() {
        assert_eq!(parse_status(b"0\r\n"), DeviceStatus::Ready);
        assert_eq!(parse_status(b"1"), DeviceStatus::Busy);
        assert_eq!(parse_status(b"2\r\n"), DeviceStatus::OutOfPaper);
        assert_eq!(parse_status(b"3"), DeviceStatus::OutOfInk);
        assert_eq!(parse_status(b"9"), DeviceStatus::Unknown);
        assert_eq!(parse_status(b"garbage"), DeviceStatus::Unknown);
        assert_eq!(parse_status(&[0x02]), DeviceStatus::OutOfPaper);
    }
}
