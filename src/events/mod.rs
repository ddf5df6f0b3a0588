//! Application-wide publish/subscribe bus.
//!
//! Built on a `tokio::sync::broadcast` channel: every subscriber sees every
//! event and filters by [`EventKind`]. Emitting never blocks; a subscriber
//! that falls behind loses the oldest events and logs how many.

use crate::link::{LinkState, TransportId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    /// The idle monitor saw the wheel move.
    Motion,
    /// A transport became deliverable again.
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    LinkStateChanged {
        transport: TransportId,
        state: LinkState,
    },
    /// No transport can deliver reports; enter the low-power window.
    PowerDown,
    WakeUp {
        source: WakeSource,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LinkStateChanged,
    PowerDown,
    WakeUp,
}

impl AppEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AppEvent::LinkStateChanged { .. } => EventKind::LinkStateChanged,
            AppEvent::PowerDown => EventKind::PowerDown,
            AppEvent::WakeUp { .. } => EventKind::WakeUp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: AppEvent) {
        debug!("Event {:?}", event);
        if self.tx.send(event).is_err() {
            debug!("No subscribers for {:?}", event.kind());
        }
    }

    /// Subscribes to the given kinds. Only events emitted after this call are seen.
    pub fn subscribe(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            kinds: kinds.to_vec(),
        }
    }

    /// Runs `handler` on its own task for every matching event until the bus closes.
    pub fn subscribe_with<F>(&self, kinds: &[EventKind], mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(AppEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe(kinds);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        })
    }
}

pub struct EventSubscription {
    rx: broadcast::Receiver<AppEvent>,
    kinds: Vec<EventKind>,
}

impl EventSubscription {
    /// Next matching event, or `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Event subscriber lagged, {} events lost", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn subscribers_only_see_their_kinds() {
        let bus = EventBus::default();
        let mut wakes = bus.subscribe(&[EventKind::WakeUp]);

        bus.emit(AppEvent::PowerDown);
        bus.emit(AppEvent::WakeUp {
            source: WakeSource::Motion,
        });

        assert_eq!(
            wakes.recv().await,
            Some(AppEvent::WakeUp {
                source: WakeSource::Motion
            })
        );
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit(AppEvent::PowerDown);
    }

    #[tokio::test]
    async fn handler_runs_for_each_event_until_bus_closes() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let task = bus.subscribe_with(&[EventKind::PowerDown], move |event| {
            sink.lock().unwrap().push(event);
        });

        bus.emit(AppEvent::PowerDown);
        bus.emit(AppEvent::PowerDown);
        drop(bus);
        task.await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
