//! Absolute angular position sensing and wraparound arithmetic.

#[cfg(target_os = "linux")]
pub mod as5600;
pub mod scripted;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of distinct positions per revolution (12-bit magnetic encoder).
pub const WRAP: i32 = 4096;

const HALF_WRAP: i32 = WRAP / 2;

/// A single absolute position reading in `[0, WRAP)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AngularSample(u16);

impl AngularSample {
    /// Builds a sample, folding out-of-range raw values back onto the circle.
    pub fn new(raw: u16) -> Self {
        Self((raw as i32).rem_euclid(WRAP) as u16)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Signed delta `self - later`, corrected so its magnitude never exceeds half a turn.
    pub fn delta_to(self, later: AngularSample) -> i32 {
        wrap_delta(self.0 as i32 - later.0 as i32)
    }

    /// Shortest angular distance between two samples.
    pub fn distance(self, other: AngularSample) -> u32 {
        self.delta_to(other).unsigned_abs()
    }
}

impl fmt::Display for AngularSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Assumes the sensor moved less than half a turn between the two readings.
pub fn wrap_delta(raw_delta: i32) -> i32 {
    if raw_delta > HALF_WRAP {
        raw_delta - WRAP
    } else if raw_delta < -HALF_WRAP {
        raw_delta + WRAP
    } else {
        raw_delta
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    As5600,
    Simulated,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct As5600Settings {
    pub bus: u8,
    pub address: u16,
}

impl Default for As5600Settings {
    fn default() -> Self {
        Self {
            bus: 1,
            address: 0x36,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SensorSettings {
    pub kind: SensorKind,
    /// Resting position reported by the simulated sensor.
    pub simulated_position: u16,
    pub as5600: As5600Settings,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            kind: SensorKind::As5600,
            simulated_position: 0,
            as5600: As5600Settings::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor bus not ready: {0}")]
    BusNotReady(String),

    #[error("Failed to read sensor: {0}")]
    ReadError(String),

    #[error("Failed to initialize sensor: {0}")]
    InitializationError(String),
}

/// Source of absolute angular samples.
///
/// Implementations handle their own interior locking; the sampler and the
/// idle monitor share one sensor through an `Arc`.
pub trait AngularSensor: Send + Sync {
    fn read_angular_sample(&self) -> Result<AngularSample, SensorError>;

    /// Reading used while the device sits in its low-power window.
    fn read_low_power_sample(&self) -> Result<AngularSample, SensorError> {
        self.read_angular_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_delta_leaves_small_deltas_alone() {
        assert_eq!(wrap_delta(0), 0);
        assert_eq!(wrap_delta(57), 57);
        assert_eq!(wrap_delta(-57), -57);
        assert_eq!(wrap_delta(HALF_WRAP), HALF_WRAP);
        assert_eq!(wrap_delta(-HALF_WRAP), -HALF_WRAP);
    }

    #[test]
    fn wrap_delta_corrects_zero_crossing() {
        // 4090 read before, 10 read after the tick
        let before = AngularSample::new(4090);
        let after = AngularSample::new(10);
        assert_eq!(4090 - 10, 4080);
        assert_eq!(before.delta_to(after), -16);
        assert_eq!(after.delta_to(before), 16);
    }

    #[test]
    fn corrected_magnitude_is_bounded_for_every_pair() {
        for before in (0..WRAP as u16).step_by(61) {
            for after in (0..WRAP as u16).step_by(67) {
                let delta = AngularSample::new(before).delta_to(AngularSample::new(after));
                assert!(delta.abs() <= HALF_WRAP, "{before} -> {after} gave {delta}");
            }
        }
        for raw in -HALF_WRAP..=HALF_WRAP {
            assert!(wrap_delta(raw).abs() <= HALF_WRAP);
        }
    }

    #[test]
    fn samples_fold_onto_the_circle() {
        assert_eq!(AngularSample::new(4096).value(), 0);
        assert_eq!(AngularSample::new(4100).value(), 4);
        assert_eq!(AngularSample::new(17).distance(AngularSample::new(4090)), 23);
    }
}
