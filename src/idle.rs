//! Idle/wake monitor.
//!
//! Dormant until the coordinator announces a power-down. While watching it
//! polls the sensor at a low rate and emits a motion wake-up once the wheel
//! has moved further than the threshold from where it rested.

use crate::events::{AppEvent, EventBus, EventSubscription, WakeSource};
use crate::sensor::{AngularSample, AngularSensor};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct IdleSettings {
    pub initial_delay_ms: u64,
    pub period_ms: u64,
    /// Minimum movement, in sensor counts, that counts as a wake gesture.
    pub threshold: u32,
    /// How long a motion wake may go unanswered before powering down again.
    pub rearm_after_ms: u64,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            period_ms: 1000,
            threshold: 10,
            rearm_after_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleBaseline {
    Unset,
    Set(AngularSample),
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Event bus closed")]
    BusClosed,
}

#[state]
#[derive(Debug, Clone)]
pub enum MonitorState {
    Dormant,
    Watching,
}

#[machine]
pub struct IdleWakeMonitor<S: MonitorState> {
    sensor: Arc<dyn AngularSensor>,
    bus: EventBus,
    events: EventSubscription,
    settings: IdleSettings,
    baseline: IdleBaseline,
    wakes: u64,
}

impl<S: MonitorState> IdleWakeMonitor<S> {
    pub fn baseline(&self) -> IdleBaseline {
        self.baseline
    }

    pub fn wakes(&self) -> u64 {
        self.wakes
    }
}

impl IdleWakeMonitor<Dormant> {
    /// `events` must carry at least `PowerDown` and `WakeUp`.
    pub fn create(
        sensor: Arc<dyn AngularSensor>,
        bus: EventBus,
        events: EventSubscription,
        settings: IdleSettings,
    ) -> Self {
        debug!("Creating idle monitor with settings: {:?}", settings);
        Self::new(sensor, bus, events, settings, IdleBaseline::Unset, 0)
    }

    pub async fn await_power_down(mut self) -> Result<IdleWakeMonitor<Watching>, MonitorError> {
        loop {
            match self.events.recv().await {
                Some(AppEvent::PowerDown) => break,
                Some(_) => continue,
                None => return Err(MonitorError::BusClosed),
            }
        }

        self.baseline = match self.sensor.read_low_power_sample() {
            Ok(sample) => IdleBaseline::Set(sample),
            Err(e) => {
                warn!("No idle baseline yet, taking it on first poll: {}", e);
                IdleBaseline::Unset
            }
        };
        info!("Entering low-power window, baseline {:?}", self.baseline);
        Ok(self.transition())
    }

    /// Alternates between dormant and watching until the bus goes away.
    pub async fn run(self) -> u64 {
        let mut dormant = self;
        loop {
            let watching = match dormant.await_power_down().await {
                Ok(watching) => watching,
                Err(e) => {
                    info!("Idle monitor stopped: {}", e);
                    return 0;
                }
            };
            dormant = match watching.watch().await {
                Ok(dormant) => dormant,
                Err(e) => {
                    info!("Idle monitor stopped: {}", e);
                    return 0;
                }
            };
        }
    }
}

impl IdleWakeMonitor<Watching> {
    pub async fn watch(mut self) -> Result<IdleWakeMonitor<Dormant>, MonitorError> {
        let start = Instant::now() + Duration::from_millis(self.settings.initial_delay_ms);
        let period = Duration::from_millis(self.settings.period_ms.max(1));
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(AppEvent::WakeUp { source }) => {
                        debug!("Leaving low-power window ({:?})", source);
                        break;
                    }
                    Some(_) => {}
                    None => return Err(MonitorError::BusClosed),
                },
                _ = ticker.tick() => {
                    if self.poll() {
                        self.wakes += 1;
                        info!("Wake-up motion detected");
                        self.bus.emit(AppEvent::WakeUp {
                            source: WakeSource::Motion,
                        });
                        break;
                    }
                }
            }
        }

        self.baseline = IdleBaseline::Unset;
        Ok(self.transition())
    }

    /// One low-power read. Returns whether the wheel moved past the threshold.
    fn poll(&mut self) -> bool {
        let current = match self.sensor.read_low_power_sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Sensor not ready during idle poll, retrying: {}", e);
                return false;
            }
        };

        match self.baseline {
            IdleBaseline::Unset => {
                debug!("Idle baseline set to {}", current);
                self.baseline = IdleBaseline::Set(current);
                false
            }
            IdleBaseline::Set(baseline) => baseline.distance(current) > self.settings.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::sensor::scripted::{ScriptedReading, ScriptedSensor};
    use tokio::time::{sleep, timeout};

    fn spawn_monitor(sensor: Arc<ScriptedSensor>, bus: &EventBus) -> tokio::task::JoinHandle<u64> {
        let monitor = IdleWakeMonitor::create(
            sensor,
            bus.clone(),
            bus.subscribe(&[EventKind::PowerDown, EventKind::WakeUp]),
            IdleSettings::default(),
        );
        tokio::spawn(monitor.run())
    }

    async fn next_wake(wakes: &mut EventSubscription, within: Duration) -> Option<AppEvent> {
        timeout(within, wakes.recv()).await.ok().flatten()
    }

    #[tokio::test(start_paused = true)]
    async fn wakes_only_past_threshold_then_stops_polling() {
        let bus = EventBus::default();
        let sensor = Arc::new(ScriptedSensor::resting(100));
        let mut wakes = bus.subscribe(&[EventKind::WakeUp]);
        let task = spawn_monitor(sensor.clone(), &bus);

        bus.emit(AppEvent::PowerDown);
        sleep(Duration::from_millis(600)).await;
        assert_eq!(sensor.reads(), 2);

        sensor.set_position(105);
        assert_eq!(next_wake(&mut wakes, Duration::from_millis(1000)).await, None);

        sensor.set_position(111);
        assert_eq!(
            next_wake(&mut wakes, Duration::from_millis(1000)).await,
            Some(AppEvent::WakeUp {
                source: WakeSource::Motion
            })
        );

        let reads = sensor.reads();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(sensor.reads(), reads);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn bus_not_ready_is_retried_and_baseline_taken_late() {
        let bus = EventBus::default();
        let sensor = Arc::new(ScriptedSensor::new([
            ScriptedReading::Fail,
            ScriptedReading::Fail,
            ScriptedReading::Sample(4090),
        ]));
        let mut wakes = bus.subscribe(&[EventKind::WakeUp]);
        let task = spawn_monitor(sensor.clone(), &bus);

        bus.emit(AppEvent::PowerDown);
        sleep(Duration::from_millis(1600)).await;
        assert_eq!(sensor.reads(), 3);

        // Eight counts across the zero crossing is not a gesture
        sensor.set_position(2);
        assert_eq!(next_wake(&mut wakes, Duration::from_millis(1000)).await, None);

        sensor.set_position(30);
        assert!(next_wake(&mut wakes, Duration::from_millis(1000)).await.is_some());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn link_wake_ends_window_and_next_power_down_restarts_it() {
        let bus = EventBus::default();
        let sensor = Arc::new(ScriptedSensor::resting(0));
        let task = spawn_monitor(sensor.clone(), &bus);

        bus.emit(AppEvent::PowerDown);
        sleep(Duration::from_millis(600)).await;
        bus.emit(AppEvent::WakeUp {
            source: WakeSource::Link,
        });
        sleep(Duration::from_millis(10)).await;
        let reads = sensor.reads();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(sensor.reads(), reads);

        bus.emit(AppEvent::PowerDown);
        sleep(Duration::from_secs(2)).await;
        assert!(sensor.reads() > reads + 1);
        task.abort();
    }
}
