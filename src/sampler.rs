//! Sensor sampler: the only producer of scroll steps.
//!
//! Each tick reads one absolute sample, turns the wrap-corrected difference
//! to the previous sample into steps through the shared accumulator, and
//! fans non-zero steps out to every deliverable transport.

use crate::dispatch::StepFanout;
use crate::link::RunGate;
use crate::scroll::{ScrollAccumulator, ScrollStep};
use crate::sensor::{AngularSample, AngularSensor};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SamplerSettings {
    pub period_ms: u64,
    /// Seconds between statistics log lines; 0 disables them.
    pub stats_interval_s: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            period_ms: 5,
            stats_interval_s: 30,
        }
    }
}

impl SamplerSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub read_failures: u64,
    pub steps: i64,
    pub dispatched: u64,
    pub dropped: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Priming,
    Sampling,
}

#[machine]
pub struct Sampler<S: SamplerState> {
    sensor: Arc<dyn AngularSensor>,
    accumulator: ScrollAccumulator,
    fanout: StepFanout,
    gate: RunGate,
    settings: SamplerSettings,

    // Last good sample; cleared whenever the sampler is parked
    previous: Option<AngularSample>,
    stats: SamplerStats,
    read_failing: bool,
    last_stats: DateTime<Local>,
}

impl<S: SamplerState> Sampler<S> {
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Whether the most recent sensor read failed.
    pub fn sensor_failing(&self) -> bool {
        self.read_failing
    }
}

impl Sampler<Priming> {
    pub fn create(
        sensor: Arc<dyn AngularSensor>,
        accumulator: ScrollAccumulator,
        fanout: StepFanout,
        gate: RunGate,
        settings: SamplerSettings,
    ) -> Self {
        debug!("Creating sampler with settings: {:?}", settings);
        Self::new(
            sensor,
            accumulator,
            fanout,
            gate,
            settings,
            None,
            SamplerStats::default(),
            false,
            Local::now(),
        )
    }

    /// Takes the reference sample the first delta is measured from.
    pub fn prime(mut self) -> Sampler<Sampling> {
        match self.sensor.read_angular_sample() {
            Ok(sample) => {
                info!("Sampler primed at position {}", sample);
                self.previous = Some(sample);
            }
            Err(e) => {
                warn!("Initial sensor read failed, priming on first tick: {}", e);
                self.stats.read_failures += 1;
                self.read_failing = true;
            }
        }
        self.transition()
    }
}

impl Sampler<Sampling> {
    /// Samples every period while the gate is open; returns once the gate
    /// controller is dropped.
    pub async fn run(mut self) -> SamplerStats {
        let mut ticker = interval(self.settings.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Sampler running every {:?}", self.settings.period());

        loop {
            if !self.gate.is_open() {
                debug!("Sampler parked");
                if self.gate.opened().await.is_err() {
                    break;
                }
                // Motion made while parked was never deliverable.
                self.previous = None;
                ticker.reset();
                debug!("Sampler resumed");
            }

            tokio::select! {
                biased;
                closed = self.gate.closed() => {
                    if closed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            self.tick();
            self.log_stats_if_due();
        }

        info!("Sampler stopped: {:?}", self.stats);
        self.stats
    }

    /// One sampling cycle. Returns the steps produced, if any.
    pub fn tick(&mut self) -> Option<ScrollStep> {
        self.stats.ticks += 1;
        let current = match self.sensor.read_angular_sample() {
            Ok(sample) => {
                if self.read_failing {
                    self.read_failing = false;
                    info!(
                        "Sensor reads recovered ({} failures so far)",
                        self.stats.read_failures
                    );
                }
                sample
            }
            Err(e) => {
                self.stats.read_failures += 1;
                if self.read_failing {
                    debug!("Sensor read failed again: {}", e);
                } else {
                    self.read_failing = true;
                    error!("Sensor read failed, skipping cycles until it recovers: {}", e);
                }
                return None;
            }
        };

        let Some(previous) = self.previous.replace(current) else {
            return None;
        };

        let steps = self.accumulator.accumulate_motion(previous.delta_to(current));
        let step = ScrollStep::new(steps)?;

        let report = self.fanout.dispatch(step);
        self.stats.steps += step.get() as i64;
        self.stats.dispatched += report.queued as u64;
        self.stats.dropped += report.dropped as u64;
        Some(step)
    }

    fn log_stats_if_due(&mut self) {
        if self.settings.stats_interval_s == 0 {
            return;
        }
        let now = Local::now();
        let elapsed = now.signed_duration_since(self.last_stats).num_seconds();
        if elapsed < self.settings.stats_interval_s as i64 {
            return;
        }
        info!(
            "Sampler stats: {} ticks, {} steps, {} queued, {} dropped, {} read failures",
            self.stats.ticks,
            self.stats.steps,
            self.stats.dispatched,
            self.stats.dropped,
            self.stats.read_failures
        );
        self.last_stats = now;
    }
}
