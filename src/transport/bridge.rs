//! Channel-backed transport for link stacks living outside this process,
//! such as a BLE HID-over-GATT daemon.
//!
//! The [`BridgeTransport`] half is handed to the runtime; the [`BridgeLink`]
//! half stays with the stack, which drains reports from it, waits for wakeup
//! requests and, once bound, reports status changes and host feature reports
//! back into the core.

use super::{Transport, TransportError, WheelReport};
use crate::link::{ControlAction, LinkBinding, LinkError, TransportKind};
use crate::scroll::{FeatureOutcome, FeatureReportError};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Bridge link is not bound to a running scroller")]
    Unbound,

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Feature report error: {0}")]
    Feature(#[from] FeatureReportError),
}

/// Something the core wants the link stack to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    Report(WheelReport),
    WakeupRequested,
}

pub fn bridge(
    name: impl Into<String>,
    kind: TransportKind,
    capacity: usize,
) -> (BridgeTransport, BridgeLink) {
    let (report_tx, report_rx) = mpsc::channel(capacity.max(1));
    let wakeup = Arc::new(Notify::new());
    (
        BridgeTransport {
            name: name.into(),
            kind,
            reports: report_tx,
            wakeup: wakeup.clone(),
        },
        BridgeLink {
            reports: report_rx,
            wakeup,
            binding: None,
        },
    )
}

pub struct BridgeTransport {
    name: String,
    kind: TransportKind,
    reports: mpsc::Sender<WheelReport>,
    wakeup: Arc<Notify>,
}

impl Transport for BridgeTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn send_scroll_report(&self, report: &WheelReport) -> Result<(), TransportError> {
        self.reports.try_send(*report).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Busy,
            mpsc::error::TrySendError::Closed(_) => {
                TransportError::Disconnected(format!("{} bridge closed", self.name))
            }
        })
    }

    fn request_wakeup(&self) -> Result<(), TransportError> {
        debug!("Wakeup requested on {}", self.name);
        self.wakeup.notify_one();
        Ok(())
    }
}

pub struct BridgeLink {
    reports: mpsc::Receiver<WheelReport>,
    wakeup: Arc<Notify>,
    binding: Option<LinkBinding>,
}

impl BridgeLink {
    /// Connects the link to its registered transport in a running scroller.
    pub fn bind(&mut self, binding: LinkBinding) {
        debug!("Bridge link bound to {}", binding.transport());
        self.binding = Some(binding);
    }

    pub fn binding(&self) -> Option<&LinkBinding> {
        self.binding.as_ref()
    }

    /// Feeds a raw status code from the link stack to the coordinator.
    pub fn report_status(&self, code: u8) -> Result<Vec<ControlAction>, BridgeError> {
        Ok(self.bound()?.on_status(code)?)
    }

    pub fn on_feature_write(
        &self,
        report_id: u8,
        payload: &[u8],
    ) -> Result<FeatureOutcome, BridgeError> {
        Ok(self.bound()?.on_feature_write(report_id, payload)?)
    }

    pub fn read_feature(&self, report_id: u8) -> Result<Vec<u8>, BridgeError> {
        Ok(self.bound()?.read_feature(report_id)?)
    }

    fn bound(&self) -> Result<&LinkBinding, BridgeError> {
        self.binding.as_ref().ok_or(BridgeError::Unbound)
    }

    /// Next report or wakeup request; `None` once the transport half is gone.
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        tokio::select! {
            report = self.reports.recv() => report.map(BridgeEvent::Report),
            _ = self.wakeup.notified() => Some(BridgeEvent::WakeupRequested),
        }
    }

    /// Throws away reports nobody collected, e.g. before a new stack attaches.
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.reports.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    pub async fn next_report(&mut self) -> Option<WheelReport> {
        self.reports.recv().await
    }

    pub fn try_next_report(&mut self) -> Option<WheelReport> {
        self.reports.try_recv().ok()
    }

    /// Resolves once the core asks the link to wake up (e.g. restart advertising).
    pub async fn wakeup_requested(&self) {
        self.wakeup.notified().await
    }
}
