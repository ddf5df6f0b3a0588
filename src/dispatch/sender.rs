use super::queue::StepConsumer;
use crate::link::{RunGate, TransportId};
use crate::scroll::ScrollStep;
use crate::transport::{Transport, WheelReport};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SenderStats {
    pub sent: u64,
    pub failed: u64,
    /// Steps found queued when the sender resumed; they predate the resume.
    pub discarded: u64,
}

/// Drains one transport's queue into that transport while its gate is open.
pub struct TransportSender {
    id: TransportId,
    transport: Arc<dyn Transport>,
    queue: StepConsumer,
    gate: RunGate,
    report: WheelReport,
    stats: SenderStats,
}

impl TransportSender {
    pub fn new(
        id: TransportId,
        transport: Arc<dyn Transport>,
        queue: StepConsumer,
        gate: RunGate,
    ) -> Self {
        Self {
            id,
            transport,
            queue,
            gate,
            report: WheelReport::default(),
            stats: SenderStats::default(),
        }
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Runs until the queue or the gate controller goes away.
    pub async fn run(mut self) -> SenderStats {
        info!("Sender for {} ({}) started", self.transport.name(), self.id);
        loop {
            if !self.gate.is_open() {
                debug!(
                    "Sender for {} parked (sent {}, failed {})",
                    self.id, self.stats.sent, self.stats.failed
                );
                if self.gate.opened().await.is_err() {
                    break;
                }
                let stale = self.discard_queued();
                debug!("Sender for {} resumed, {} stale step(s) discarded", self.id, stale);
            }

            tokio::select! {
                biased;
                closed = self.gate.closed() => {
                    if closed.is_err() {
                        break;
                    }
                }
                step = self.queue.next() => match step {
                    Some(step) => {
                        self.deliver(step);
                    }
                    None => break,
                },
            }
        }
        info!(
            "Sender for {} stopped after {} reports ({} failed)",
            self.id, self.stats.sent, self.stats.failed
        );
        self.stats
    }

    fn discard_queued(&mut self) -> u64 {
        let mut stale = 0;
        while self.queue.try_next().is_some() {
            stale += 1;
        }
        self.stats.discarded += stale;
        stale
    }

    /// One attempt per step; a failed report is gone.
    pub fn deliver(&mut self, step: ScrollStep) -> bool {
        self.report.set_step(step);
        match self.transport.send_scroll_report(&self.report) {
            Ok(()) => {
                self.stats.sent += 1;
                true
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(
                    "Dropped report {} on {}: {}",
                    step,
                    self.transport.name(),
                    e
                );
                false
            }
        }
    }
}
