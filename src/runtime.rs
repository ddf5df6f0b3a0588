//! Scroller Handle - wires the sampler, per-transport senders, link
//! coordinator and idle monitor together and owns their tasks.

use crate::dispatch::{dispatch_queue, DispatchSettings, StepFanout, TransportSender};
use crate::events::{AppEvent, EventBus, EventKind, EventSubscription, WakeSource};
use crate::idle::{Dormant, IdleSettings, IdleWakeMonitor};
use crate::link::{run_gate, LinkBinding, LinkCoordinator, LinkError, TransportId};
use crate::sampler::{Priming, Sampler, SamplerSettings};
use crate::scroll::{FeatureReportHandler, ResolutionSettings, ScrollAccumulator, SharedScrollConfig};
use crate::sensor::AngularSensor;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Settings for everything [`ScrollerHandle::spawn`] starts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScrollerSettings {
    pub sampler: SamplerSettings,
    pub resolution: ResolutionSettings,
    pub dispatch: DispatchSettings,
    pub idle: IdleSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum ScrollerError {
    #[error("Link error: {0}")]
    LinkError(#[from] LinkError),
}

/// Handle to a running scroller.
///
/// Every worker is a tokio task owned by the handle:
/// 1. **Sampler**: reads the sensor and fans steps out to the queues
/// 2. **Senders**: one per transport, each draining its own queue
/// 3. **Idle monitor**: polls for a wake gesture while nothing is deliverable
/// 4. **Wake listener**: turns motion wakes into link wakeup requests
///
/// A link stack reports status and host feature reports for its own
/// transport through the [`LinkBinding`] from [`ScrollerHandle::binding`].
///
/// With no transports at all the sampler simply stays parked and the idle
/// monitor keeps watching for a wake gesture.
pub struct ScrollerHandle {
    coordinator: Arc<LinkCoordinator>,
    features: FeatureReportHandler,
    scroll: SharedScrollConfig,
    transports: Vec<TransportId>,
    tasks: Vec<JoinHandle<()>>,
}

impl ScrollerHandle {
    /// Registers `transports` in order and starts all workers. Must be called
    /// from within a tokio runtime.
    pub fn spawn(
        settings: ScrollerSettings,
        sensor: Arc<dyn AngularSensor>,
        transports: Vec<Arc<dyn Transport>>,
    ) -> Result<Self, ScrollerError> {
        if transports.is_empty() {
            warn!("No transport available, wheel motion will only be watched for wake-up");
        }
        debug!("Spawning scroller with settings: {:?}", settings);

        let bus = EventBus::default();
        let scroll = SharedScrollConfig::new(settings.resolution.clone());
        let (sampler_control, sampler_gate) = run_gate(false);
        let coordinator = Arc::new(LinkCoordinator::new(
            scroll.clone(),
            bus.clone(),
            sampler_control,
        ));

        let mut tasks = Vec::new();
        let mut fanout = StepFanout::new();
        let mut ids = Vec::new();
        for transport in transports {
            let registration = coordinator.register(transport.clone())?;
            let (producer, consumer) =
                dispatch_queue(transport.name(), settings.dispatch.queue_capacity);
            fanout.attach(registration.id, registration.state.clone(), producer);

            let sender = TransportSender::new(registration.id, transport, consumer, registration.gate);
            tasks.push(tokio::spawn(async move {
                sender.run().await;
            }));
            ids.push(registration.id);
        }

        // Subscriptions must exist before the coordinator's first PowerDown.
        let monitor = IdleWakeMonitor::<Dormant>::create(
            sensor.clone(),
            bus.clone(),
            bus.subscribe(&[EventKind::PowerDown, EventKind::WakeUp]),
            settings.idle.clone(),
        );
        tasks.push(tokio::spawn(async move {
            monitor.run().await;
        }));

        let rearm_after = Duration::from_millis(settings.idle.rearm_after_ms);
        tasks.push(tokio::spawn(run_wake_listener(
            coordinator.clone(),
            bus.subscribe(&[EventKind::WakeUp]),
            rearm_after,
        )));

        let sampler = Sampler::<Priming>::create(
            sensor,
            ScrollAccumulator::new(scroll.clone()),
            fanout,
            sampler_gate,
            settings.sampler.clone(),
        )
        .prime();
        tasks.push(tokio::spawn(async move {
            sampler.run().await;
        }));

        coordinator.start();
        info!("Scroller running with {} transport(s)", ids.len());

        Ok(Self {
            coordinator,
            features: FeatureReportHandler::new(scroll.clone()),
            scroll,
            transports: ids,
            tasks,
        })
    }

    pub fn coordinator(&self) -> &Arc<LinkCoordinator> {
        &self.coordinator
    }

    pub fn feature_reports(&self) -> &FeatureReportHandler {
        &self.features
    }

    pub fn scroll_config(&self) -> &SharedScrollConfig {
        &self.scroll
    }

    /// Inbound entry point for the link stack driving `transport`.
    pub fn binding(&self, transport: TransportId) -> Option<LinkBinding> {
        self.transports.contains(&transport).then(|| {
            LinkBinding::new(transport, self.coordinator.clone(), self.features.clone())
        })
    }

    /// Transport ids in registration order.
    pub fn transports(&self) -> &[TransportId] {
        &self.transports
    }

    pub async fn shutdown(self) {
        info!("Shutting down scroller");
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

// Re-enters idle if a motion wake is not followed by any link coming back.
async fn run_wake_listener(
    coordinator: Arc<LinkCoordinator>,
    mut wakes: EventSubscription,
    rearm_after: Duration,
) {
    let mut rearm_at: Option<Instant> = None;
    loop {
        let event = match rearm_at {
            Some(deadline) => {
                tokio::select! {
                    event = wakes.recv() => event,
                    _ = sleep_until(deadline) => {
                        rearm_at = None;
                        if coordinator.rearm_idle() {
                            info!("No link answered the wake-up, powering down again");
                        }
                        continue;
                    }
                }
            }
            None => wakes.recv().await,
        };

        match event {
            Some(AppEvent::WakeUp {
                source: WakeSource::Motion,
            }) => {
                coordinator.on_wake_up(WakeSource::Motion);
                rearm_at = Some(Instant::now() + rearm_after);
            }
            Some(_) => {}
            None => break,
        }
    }
}
