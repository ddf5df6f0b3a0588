use super::config::SharedScrollConfig;
use std::fmt;
use tracing::warn;

// Turning the wheel "down" lowers the sensor angle; hosts expect negative wheel values for that.
const INVERT_DIRECTION: bool = true;

/// A non-zero number of whole wheel detents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollStep(i16);

impl ScrollStep {
    /// `None` for zero, which is never worth reporting.
    pub fn new(steps: i16) -> Option<Self> {
        (steps != 0).then_some(Self(steps))
    }

    pub fn get(self) -> i16 {
        self.0
    }
}

impl fmt::Display for ScrollStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Converts angular deltas into whole steps against the shared divisor,
/// carrying the remainder between calls.
#[derive(Debug, Clone)]
pub struct ScrollAccumulator {
    config: SharedScrollConfig,
}

impl ScrollAccumulator {
    pub fn new(config: SharedScrollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SharedScrollConfig {
        &self.config
    }

    /// Applies the direction convention to a wrap-corrected sensor delta and accumulates it.
    pub fn accumulate_motion(&self, sensor_delta: i32) -> i16 {
        let delta = if INVERT_DIRECTION {
            sensor_delta.saturating_neg()
        } else {
            sensor_delta
        };
        self.accumulate(delta)
    }

    /// Adds a scroll-direction delta and returns the whole steps it completes.
    ///
    /// Division truncates toward zero, so the remainder keeps the sign of the
    /// accumulated motion and `|remainder| < divisor` holds afterwards.
    pub fn accumulate(&self, delta: i32) -> i16 {
        let steps = {
            let mut config = self.config.lock();
            config.accumulator = config.accumulator.saturating_add(delta);
            let steps = config.accumulator / config.divisor;
            config.accumulator %= config.divisor;
            steps
        };

        match i16::try_from(steps) {
            Ok(steps) => steps,
            Err(_) => {
                let clamped = if steps > 0 { i16::MAX } else { i16::MIN };
                warn!("Scroll steps {} exceed report range, clamped to {}", steps, clamped);
                clamped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scroll::config::{Resolution, ResolutionSettings, COARSE_DIVISOR};

    fn accumulator() -> ScrollAccumulator {
        ScrollAccumulator::new(SharedScrollConfig::new(ResolutionSettings::default()))
    }

    // Small deterministic generator so the property checks need no extra crates.
    fn deltas(seed: u64, count: usize, span: i32) -> Vec<i32> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) as i32).rem_euclid(2 * span + 1) - span
            })
            .collect()
    }

    #[test]
    fn partial_steps_carry_over() {
        let acc = accumulator();
        let steps: Vec<i16> = [50, 80, 30].into_iter().map(|d| acc.accumulate(d)).collect();
        assert_eq!(steps, vec![0, 1, 0]);
        assert_eq!(acc.config().snapshot().accumulator, 40);
    }

    #[test]
    fn divisor_change_keeps_remainder() {
        let acc = accumulator();
        acc.accumulate(40);
        assert_eq!(acc.config().snapshot().accumulator, 40);

        acc.config().set_resolution(Resolution::Fine);
        assert_eq!(acc.accumulate(5), 45);
        assert_eq!(acc.config().snapshot().accumulator, 0);
    }

    #[test]
    fn motion_is_inverted_before_accumulating() {
        let acc = accumulator();
        acc.config().set_resolution(Resolution::Fine);
        assert_eq!(acc.accumulate_motion(-16), 16);
        assert_eq!(acc.accumulate_motion(7), -7);
    }

    #[test]
    fn remainder_stays_below_divisor() {
        for (seed, span) in [(1, 300), (7, 2048), (42, 5)] {
            let acc = accumulator();
            for delta in deltas(seed, 500, span) {
                acc.accumulate(delta);
                let config = acc.config().snapshot();
                assert!(config.accumulator.abs() < config.divisor);
            }
        }

        let acc = accumulator();
        for delta in deltas(3, 500, 300).into_iter().map(i32::abs) {
            acc.accumulate(delta);
            let config = acc.config().snapshot();
            assert!((0..config.divisor).contains(&config.accumulator));
        }
    }

    #[test]
    fn no_motion_is_lost() {
        let acc = accumulator();
        acc.accumulate(33);
        let initial = acc.config().snapshot().accumulator;
        let input = deltas(11, 1000, 2048);

        let steps: i64 = input.iter().map(|d| acc.accumulate(*d) as i64).sum();
        let last = acc.config().snapshot().accumulator as i64;
        let total: i64 = input.iter().map(|d| *d as i64).sum();

        assert_eq!(steps * COARSE_DIVISOR as i64 + last - initial as i64, total);
    }

    #[test]
    fn oversized_step_counts_are_clamped() {
        let acc = accumulator();
        acc.config().set_resolution(Resolution::Fine);
        assert_eq!(acc.accumulate(40_000), i16::MAX);
        assert_eq!(acc.accumulate(-40_000), i16::MIN);
        assert_eq!(acc.config().snapshot().accumulator, 0);
    }

    #[test]
    fn zero_steps_are_not_reportable() {
        assert!(ScrollStep::new(0).is_none());
        assert_eq!(ScrollStep::new(-3).map(ScrollStep::get), Some(-3));
    }
}
