//! Scroll-wheel core: turns a wrapping angular sensor into HID wheel detents
//! and delivers them over every transport link that can currently carry them.
//!
//! ```text
//! AngularSensor -> Sampler -> ScrollAccumulator -> StepFanout -> queue -> TransportSender -> Transport
//!                     ^                                                          ^
//!                     +---------------- LinkCoordinator (RunGate) ---------------+
//!                                            |
//!                                   EventBus (PowerDown / WakeUp) <-> IdleWakeMonitor
//! ```

pub mod config;
pub mod dispatch;
pub mod events;
pub mod idle;
pub mod link;
pub mod runtime;
pub mod sampler;
pub mod scroll;
pub mod sensor;
pub mod transport;

pub use runtime::{ScrollerError, ScrollerHandle};
