//! Suspend/resume for long-running workers.
//!
//! A worker holds a [`RunGate`] and parks on it while closed; the
//! coordinator holds the matching [`GateControl`]. Parking never drops the
//! worker's own state, so resuming needs no re-initialisation.

use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
#[error("gate controller dropped")]
pub struct GateDropped;

pub fn run_gate(open: bool) -> (GateControl, RunGate) {
    let (tx, rx) = watch::channel(open);
    (GateControl { tx }, RunGate { rx })
}

#[derive(Debug)]
pub struct GateControl {
    tx: watch::Sender<bool>,
}

impl GateControl {
    /// Returns `true` when the gate was open and is now closed.
    pub fn suspend(&self) -> bool {
        self.set(false)
    }

    /// Returns `true` when the gate was closed and is now open.
    pub fn resume(&self) -> bool {
        self.set(true)
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    fn set(&self, open: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == open {
                false
            } else {
                *current = open;
                true
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunGate {
    rx: watch::Receiver<bool>,
}

impl RunGate {
    pub fn is_open(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn opened(&mut self) -> Result<(), GateDropped> {
        self.rx
            .wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| GateDropped)
    }

    pub async fn closed(&mut self) -> Result<(), GateDropped> {
        self.rx
            .wait_for(|open| !*open)
            .await
            .map(|_| ())
            .map_err(|_| GateDropped)
    }
}
