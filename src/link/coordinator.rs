use super::gate::{run_gate, GateControl, RunGate};
use super::state::{
    LinkMachine, LinkState, LinkStateCell, LinkStatus, Transition, WiredStatus, WirelessStatus,
};
use crate::events::{AppEvent, EventBus, WakeSource};
use crate::scroll::SharedScrollConfig;
use crate::transport::Transport;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u8);

impl TransportId {
    #[cfg(test)]
    pub(crate) fn from_index(index: u8) -> Self {
        Self(index)
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Status for unregistered {0}")]
    UnknownTransport(TransportId),

    #[error("Unhandled status code {code} on {transport}")]
    UnknownStatus { transport: TransportId, code: u8 },

    #[error("Too many transports registered")]
    RegistryFull,
}

/// Side effects carried out for one status callback, in the order applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    ResetScroll,
    ResumeSampler,
    ResumeSender(TransportId),
    SuspendSender(TransportId),
    SuspendSampler,
    EnterIdle,
    ExitIdle,
}

/// What a transport's workers need after registration.
#[derive(Debug)]
pub struct Registration {
    pub id: TransportId,
    pub gate: RunGate,
    pub state: Arc<LinkStateCell>,
}

struct LinkSlot {
    id: TransportId,
    transport: Arc<dyn Transport>,
    machine: LinkMachine,
    cell: Arc<LinkStateCell>,
    sender: GateControl,
}

struct Links {
    slots: Vec<LinkSlot>,
    idle: bool,
}

impl Links {
    fn any_deliverable(&self) -> bool {
        self.slots.iter().any(|slot| slot.machine.state().is_deliverable())
    }
}

/// Owns every transport's link state and decides who runs.
///
/// Status callbacks may arrive from any thread. Each one is applied under a
/// single lock so the resulting suspend/resume decisions see a consistent
/// view of all links; other components only ever read [`LinkStateCell`]
/// snapshots.
pub struct LinkCoordinator {
    links: Mutex<Links>,
    scroll: SharedScrollConfig,
    bus: EventBus,
    sampler: GateControl,
}

impl LinkCoordinator {
    pub fn new(scroll: SharedScrollConfig, bus: EventBus, sampler: GateControl) -> Self {
        // Nothing is deliverable until a transport says so.
        sampler.suspend();
        Self {
            links: Mutex::new(Links {
                slots: Vec::new(),
                idle: false,
            }),
            scroll,
            bus,
            sampler,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Links> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, transport: Arc<dyn Transport>) -> Result<Registration, LinkError> {
        let mut links = self.lock();
        let id = u8::try_from(links.slots.len())
            .map(TransportId)
            .map_err(|_| LinkError::RegistryFull)?;
        let kind = transport.kind();
        let machine = LinkMachine::new(kind);
        let cell = Arc::new(LinkStateCell::new(machine.state()));
        let (sender, gate) = run_gate(false);

        info!("Registered {} as {} ({:?})", transport.name(), id, kind);
        links.slots.push(LinkSlot {
            id,
            transport,
            machine,
            cell: cell.clone(),
            sender,
        });

        Ok(Registration {
            id,
            gate,
            state: cell,
        })
    }

    /// Enters the low-power window if no link is deliverable yet. Call once
    /// every transport is registered and the idle monitor is subscribed.
    pub fn start(&self) -> Vec<ControlAction> {
        let mut links = self.lock();
        let mut actions = Vec::new();
        if !links.any_deliverable() {
            self.enter_idle(&mut links, &mut actions);
        }
        actions
    }

    /// Applies a raw status code from a transport's link stack.
    pub fn on_transport_status(
        &self,
        transport: TransportId,
        code: u8,
    ) -> Result<Vec<ControlAction>, LinkError> {
        let mut links = self.lock();
        let Some(index) = links.slots.iter().position(|slot| slot.id == transport) else {
            warn!("Status {} for unregistered {}", code, transport);
            return Err(LinkError::UnknownTransport(transport));
        };
        let kind = links.slots[index].transport.kind();
        let Some(status) = LinkStatus::decode(kind, code) else {
            warn!("Unhandled {:?} status code {} on {}", kind, code, transport);
            return Err(LinkError::UnknownStatus { transport, code });
        };

        let mut actions = Vec::new();
        if status.is_reset() {
            self.scroll.reset();
            actions.push(ControlAction::ResetScroll);
        }

        let transition = links.slots[index].machine.apply(status);
        match transition {
            Transition::NotApplicable => {
                debug!("{:?} does not affect {}", status, transport);
            }
            Transition::Unchanged(state) => {
                debug!("{} already {}", transport, state);
            }
            Transition::Changed { from, to } => {
                links.slots[index].cell.store(to);
                info!("{} state: {} -> {}", transport, from, to);
                self.bus.emit(AppEvent::LinkStateChanged {
                    transport,
                    state: to,
                });

                match (from.is_deliverable(), to.is_deliverable()) {
                    (false, true) => self.enter_deliverable(&mut links, index, &mut actions),
                    (true, false) => self.leave_deliverable(&mut links, index, &mut actions),
                    _ => {}
                }
            }
        }

        Ok(actions)
    }

    pub fn on_wired_status(
        &self,
        transport: TransportId,
        status: WiredStatus,
    ) -> Result<Vec<ControlAction>, LinkError> {
        self.on_transport_status(transport, status.code())
    }

    pub fn on_wireless_status(
        &self,
        transport: TransportId,
        status: WirelessStatus,
    ) -> Result<Vec<ControlAction>, LinkError> {
        self.on_transport_status(transport, status.code())
    }

    fn enter_deliverable(&self, links: &mut Links, index: usize, actions: &mut Vec<ControlAction>) {
        if self.sampler.resume() {
            actions.push(ControlAction::ResumeSampler);
        }
        let slot = &links.slots[index];
        if slot.sender.resume() {
            actions.push(ControlAction::ResumeSender(slot.id));
        }
        if links.idle {
            links.idle = false;
            actions.push(ControlAction::ExitIdle);
            self.bus.emit(AppEvent::WakeUp {
                source: WakeSource::Link,
            });
        }
    }

    // Sender is suspended before the sampler.
    fn leave_deliverable(&self, links: &mut Links, index: usize, actions: &mut Vec<ControlAction>) {
        let slot = &links.slots[index];
        if slot.sender.suspend() {
            actions.push(ControlAction::SuspendSender(slot.id));
        }
        if links.any_deliverable() {
            return;
        }
        if self.sampler.suspend() {
            actions.push(ControlAction::SuspendSampler);
        }
        self.enter_idle(links, actions);
    }

    fn enter_idle(&self, links: &mut Links, actions: &mut Vec<ControlAction>) {
        if links.idle {
            return;
        }
        links.idle = true;
        actions.push(ControlAction::EnterIdle);
        info!("No transport deliverable, powering down");
        self.bus.emit(AppEvent::PowerDown);
    }

    /// Reacts to a wake event. Motion asks every link that cannot deliver to
    /// come back; returns how many links were asked.
    pub fn on_wake_up(&self, source: WakeSource) -> usize {
        if source != WakeSource::Motion {
            return 0;
        }

        let sleeping: Vec<Arc<dyn Transport>> = {
            let mut links = self.lock();
            links.idle = false;
            links
                .slots
                .iter()
                .filter(|slot| !slot.machine.state().is_deliverable())
                .map(|slot| slot.transport.clone())
                .collect()
        };

        info!("Wheel moved while idle, waking {} link(s)", sleeping.len());
        for transport in &sleeping {
            if let Err(e) = transport.request_wakeup() {
                warn!("Failed to wake {}: {}", transport.name(), e);
            }
        }
        sleeping.len()
    }

    /// Re-enters the low-power window after a wake that no link answered.
    pub fn rearm_idle(&self) -> bool {
        let mut links = self.lock();
        if links.idle || links.any_deliverable() {
            return false;
        }
        let mut actions = Vec::new();
        self.enter_idle(&mut links, &mut actions);
        true
    }

    pub fn link_state(&self, transport: TransportId) -> Option<LinkState> {
        self.lock()
            .slots
            .iter()
            .find(|slot| slot.id == transport)
            .map(|slot| slot.cell.load())
    }

    pub fn any_deliverable(&self) -> bool {
        self.lock().any_deliverable()
    }

    pub fn is_idle(&self) -> bool {
        self.lock().idle
    }

    pub fn sampler_running(&self) -> bool {
        self.sampler.is_open()
    }

    pub fn sender_running(&self, transport: TransportId) -> Option<bool> {
        self.lock()
            .slots
            .iter()
            .find(|slot| slot.id == transport)
            .map(|slot| slot.sender.is_open())
    }
}
