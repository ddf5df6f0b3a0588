//! Replayable sensor used for bench runs without hardware and in tests.

use super::{AngularSample, AngularSensor, SensorError};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
pub enum ScriptedReading {
    Sample(u16),
    Fail,
}

/// Plays back a list of readings, then keeps returning the last good sample.
#[derive(Debug)]
pub struct ScriptedSensor {
    inner: Mutex<ScriptState>,
}

#[derive(Debug)]
struct ScriptState {
    pending: VecDeque<ScriptedReading>,
    last: AngularSample,
    reads: usize,
}

impl ScriptedSensor {
    pub fn new(readings: impl IntoIterator<Item = ScriptedReading>) -> Self {
        Self {
            inner: Mutex::new(ScriptState {
                pending: readings.into_iter().collect(),
                last: AngularSample::new(0),
                reads: 0,
            }),
        }
    }

    pub fn from_samples(samples: impl IntoIterator<Item = u16>) -> Self {
        Self::new(samples.into_iter().map(ScriptedReading::Sample))
    }

    /// Sensor that rests at `position` forever.
    pub fn resting(position: u16) -> Self {
        Self::from_samples([position])
    }

    /// Moves the resting position; takes effect once the script is exhausted.
    pub fn set_position(&self, position: u16) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.clear();
        state.last = AngularSample::new(position);
    }

    pub fn reads(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reads
    }
}

impl AngularSensor for ScriptedSensor {
    fn read_angular_sample(&self) -> Result<AngularSample, SensorError> {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.reads += 1;
        match state.pending.pop_front() {
            Some(ScriptedReading::Sample(raw)) => {
                state.last = AngularSample::new(raw);
                Ok(state.last)
            }
            Some(ScriptedReading::Fail) => {
                Err(SensorError::BusNotReady("scripted failure".to_string()))
            }
            None => Ok(state.last),
        }
    }
}
