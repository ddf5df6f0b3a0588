//! Transport link tracking: which links can deliver reports right now, and
//! which workers should be running because of it.

pub mod binding;
pub mod coordinator;
pub mod gate;
pub mod state;

pub use binding::LinkBinding;
pub use coordinator::{ControlAction, LinkCoordinator, LinkError, Registration, TransportId};
pub use gate::{run_gate, GateControl, GateDropped, RunGate};
pub use state::{
    LinkMachine, LinkState, LinkStateCell, LinkStatus, Transition, TransportKind, WiredLinkState,
    WiredStatus, WirelessLinkState, WirelessStatus,
};
