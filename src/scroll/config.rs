use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Divisor used when the host has not negotiated high-resolution scrolling.
pub const COARSE_DIVISOR: i32 = 120;
/// Divisor used once the host enables the resolution multiplier.
pub const FINE_DIVISOR: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Coarse,
    Fine,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ResolutionSettings {
    pub coarse_divisor: i32,
    pub fine_divisor: i32,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            coarse_divisor: COARSE_DIVISOR,
            fine_divisor: FINE_DIVISOR,
        }
    }
}

impl ResolutionSettings {
    pub fn divisor_for(&self, resolution: Resolution) -> i32 {
        match resolution {
            Resolution::Coarse => self.coarse_divisor,
            Resolution::Fine => self.fine_divisor,
        }
    }
}

/// Fractional scroll remainder plus the divisor it is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollConfig {
    pub accumulator: i32,
    pub divisor: i32,
}

/// Mutex-guarded [`ScrollConfig`] shared by the accumulator and the feature
/// report handler. The guard is never held across an await point.
#[derive(Debug, Clone)]
pub struct SharedScrollConfig {
    inner: Arc<Mutex<ScrollConfig>>,
    resolutions: ResolutionSettings,
}

impl SharedScrollConfig {
    pub fn new(resolutions: ResolutionSettings) -> Self {
        let initial = ScrollConfig {
            accumulator: 0,
            divisor: resolutions.coarse_divisor,
        };
        Self {
            inner: Arc::new(Mutex::new(initial)),
            resolutions,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ScrollConfig> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ScrollConfig {
        *self.lock()
    }

    pub fn resolutions(&self) -> &ResolutionSettings {
        &self.resolutions
    }

    pub fn resolution(&self) -> Resolution {
        if self.lock().divisor == self.resolutions.fine_divisor {
            Resolution::Fine
        } else {
            Resolution::Coarse
        }
    }

    /// Switches the divisor. The pending remainder is kept.
    pub(crate) fn set_resolution(&self, resolution: Resolution) -> i32 {
        let divisor = self.resolutions.divisor_for(resolution);
        self.lock().divisor = divisor;
        debug!("Scroll divisor set to {} ({:?})", divisor, resolution);
        divisor
    }

    /// Drops any partial step and returns to coarse resolution.
    pub fn reset(&self) {
        let mut config = self.lock();
        config.accumulator = 0;
        config.divisor = self.resolutions.coarse_divisor;
        debug!("Scroll state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_coarse_with_empty_accumulator() {
        let shared = SharedScrollConfig::new(ResolutionSettings::default());
        assert_eq!(
            shared.snapshot(),
            ScrollConfig {
                accumulator: 0,
                divisor: COARSE_DIVISOR
            }
        );
        assert_eq!(shared.resolution(), Resolution::Coarse);
    }

    #[test]
    fn resolution_change_keeps_remainder_and_reset_clears_it() {
        let shared = SharedScrollConfig::new(ResolutionSettings::default());
        shared.lock().accumulator = 40;

        assert_eq!(shared.set_resolution(Resolution::Fine), FINE_DIVISOR);
        assert_eq!(shared.snapshot().accumulator, 40);
        assert_eq!(shared.resolution(), Resolution::Fine);

        shared.reset();
        assert_eq!(
            shared.snapshot(),
            ScrollConfig {
                accumulator: 0,
                divisor: COARSE_DIVISOR
            }
        );
    }
}
