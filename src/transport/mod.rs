//! Host transports that carry wheel reports.
//!
//! A transport is the collaborator at the far end of a [`TransportSender`]:
//! it takes one report per call and either delivers it or fails right away.
//! Link status flows the other way, into
//! [`LinkCoordinator::on_transport_status`].
//!
//! [`TransportSender`]: crate::dispatch::TransportSender
//! [`LinkCoordinator::on_transport_status`]: crate::link::LinkCoordinator::on_transport_status

pub mod bridge;
#[cfg(unix)]
pub mod bridge_socket;
#[cfg(target_os = "linux")]
pub mod hid_gadget;
pub mod report;
pub mod setup;

use crate::link::TransportKind;
pub use report::WheelReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Wired link through the Linux USB HID gadget function.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WiredSettings {
    pub enabled: bool,
    pub device: PathBuf,
    /// UDC name under `/sys/class/udc`; empty picks the first controller found.
    pub udc: String,
    pub state_poll_ms: u64,
}

impl Default for WiredSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            device: PathBuf::from("/dev/hidg0"),
            udc: String::new(),
            state_poll_ms: 100,
        }
    }
}

/// Wireless link provided by an external stack (e.g. a BLE HID-over-GATT
/// daemon) attached through a Unix socket.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WirelessSettings {
    pub enabled: bool,
    pub name: String,
    pub socket: PathBuf,
    /// Reports buffered for the stack before sends report busy.
    pub report_buffer: usize,
}

impl Default for WirelessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "ble".to_string(),
            socket: PathBuf::from("/run/scroller/wireless.sock"),
            report_buffer: 8,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport busy, previous report still pending")]
    Busy,

    #[error("Transport disconnected: {0}")]
    Disconnected(String),

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to initialize transport: {0}")]
    InitializationError(String),
}

pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TransportKind;

    /// Attempts delivery exactly once. Must not block for longer than a device write.
    fn send_scroll_report(&self, report: &WheelReport) -> Result<(), TransportError>;

    /// Asks the link to come back after the user moved the wheel while idle:
    /// advertising for wireless links, remote wakeup for wired ones.
    fn request_wakeup(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
