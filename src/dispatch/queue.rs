//! Bounded step hand-off between the sampler and one transport sender.

use crate::scroll::ScrollStep;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

pub const DEFAULT_QUEUE_CAPACITY: usize = 2;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DispatchSettings {
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Queue full; the offered step was discarded.
    Dropped,
    /// Consumer is gone.
    Closed,
}

pub fn dispatch_queue(label: impl Into<String>, capacity: usize) -> (StepProducer, StepConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        StepProducer {
            tx,
            label: label.into(),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        StepConsumer { rx },
    )
}

#[derive(Debug, Clone)]
pub struct StepProducer {
    tx: mpsc::Sender<ScrollStep>,
    label: String,
    dropped: Arc<AtomicU64>,
}

impl StepProducer {
    /// Never waits. A full queue keeps what it already holds and the new step is lost.
    pub fn offer(&self, step: ScrollStep) -> Enqueue {
        match self.tx.try_send(step) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(step)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("{} queue full, dropped step {}", self.label, step);
                Enqueue::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct StepConsumer {
    rx: mpsc::Receiver<ScrollStep>,
}

impl StepConsumer {
    /// Waits for the next step; `None` once every producer is gone.
    pub async fn next(&mut self) -> Option<ScrollStep> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<ScrollStep> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn step(n: i16) -> ScrollStep {
        ScrollStep::new(n).unwrap()
    }

    #[test]
    fn full_queue_drops_the_offered_step() {
        let (producer, mut consumer) = dispatch_queue("usb", DEFAULT_QUEUE_CAPACITY);

        assert_eq!(producer.offer(step(1)), Enqueue::Queued);
        assert_eq!(producer.offer(step(2)), Enqueue::Queued);
        assert_eq!(producer.offer(step(3)), Enqueue::Dropped);
        assert_eq!(producer.offer(step(4)), Enqueue::Dropped);
        assert_eq!(producer.dropped(), 2);

        assert_eq!(consumer.try_next(), Some(step(1)));
        assert_eq!(consumer.try_next(), Some(step(2)));
        assert_eq!(consumer.try_next(), None);
    }

    #[test]
    fn closed_consumer_is_reported() {
        let (producer, consumer) = dispatch_queue("ble", 2);
        drop(consumer);
        assert_eq!(producer.offer(step(1)), Enqueue::Closed);
        assert_eq!(producer.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consumer_waits_for_data() {
        let (producer, mut consumer) = dispatch_queue("usb", 2);
        let reader = tokio::spawn(async move { consumer.next().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        producer.offer(step(-5));
        assert_eq!(reader.await.unwrap(), Some(step(-5)));
    }
}
