//! Step delivery: one bounded queue and one sender per transport, all fed
//! by the same sampler output.

pub mod fanout;
pub mod queue;
pub mod sender;

pub use fanout::{FanoutReport, StepFanout};
pub use queue::{dispatch_queue, DispatchSettings, Enqueue, StepConsumer, StepProducer};
pub use sender::{SenderStats, TransportSender};
