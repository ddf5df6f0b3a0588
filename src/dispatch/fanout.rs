use super::queue::{Enqueue, StepProducer};
use crate::link::{LinkStateCell, TransportId};
use crate::scroll::ScrollStep;
use std::sync::Arc;
use tracing::debug;

struct Outlet {
    transport: TransportId,
    link: Arc<LinkStateCell>,
    producer: StepProducer,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub queued: usize,
    pub dropped: usize,
    pub skipped: usize,
}

/// Copies every step into the queue of each transport that can deliver it.
#[derive(Default)]
pub struct StepFanout {
    outlets: Vec<Outlet>,
}

impl StepFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, transport: TransportId, link: Arc<LinkStateCell>, producer: StepProducer) {
        self.outlets.push(Outlet {
            transport,
            link,
            producer,
        });
    }

    pub fn dispatch(&self, step: ScrollStep) -> FanoutReport {
        let mut report = FanoutReport::default();
        for outlet in &self.outlets {
            if !outlet.link.is_deliverable() {
                report.skipped += 1;
                continue;
            }
            match outlet.producer.offer(step) {
                Enqueue::Queued => report.queued += 1,
                Enqueue::Dropped => report.dropped += 1,
                Enqueue::Closed => {
                    debug!("{} sender gone, step {} not queued", outlet.transport, step);
                    report.dropped += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::queue::dispatch_queue;
    use crate::link::{LinkState, TransportKind, WiredLinkState, WirelessLinkState};

    fn cell(state: LinkState) -> Arc<LinkStateCell> {
        Arc::new(LinkStateCell::new(state))
    }

    #[test]
    fn only_deliverable_links_receive_steps() {
        let usb_link = cell(LinkState::Wired(WiredLinkState::Configured));
        let ble_link = cell(LinkState::initial(TransportKind::Wireless));
        let (usb_tx, mut usb_rx) = dispatch_queue("usb", 2);
        let (ble_tx, mut ble_rx) = dispatch_queue("ble", 2);

        let mut fanout = StepFanout::new();
        fanout.attach(TransportId::from_index(0), usb_link, usb_tx);
        fanout.attach(TransportId::from_index(1), ble_link.clone(), ble_tx);

        let step = ScrollStep::new(2).unwrap();
        assert_eq!(
            fanout.dispatch(step),
            FanoutReport {
                queued: 1,
                dropped: 0,
                skipped: 1
            }
        );

        ble_link.store(LinkState::Wireless(WirelessLinkState::Connected));
        fanout.dispatch(step);
        let report = fanout.dispatch(step);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.queued, 1);

        assert_eq!(usb_rx.try_next(), Some(step));
        assert_eq!(usb_rx.try_next(), Some(step));
        assert_eq!(usb_rx.try_next(), None);
        assert_eq!(ble_rx.try_next(), Some(step));
    }
}
