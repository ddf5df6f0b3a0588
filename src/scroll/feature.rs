//! Host feature reports: the resolution multiplier and the scroll-state reset.

use super::config::{Resolution, SharedScrollConfig};
use crate::transport::report::{RESET_FEATURE_ID, RESOLUTION_FEATURE_ID};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeatureReportError {
    #[error("Feature report {0} carried no payload")]
    EmptyPayload(u8),

    #[error("Unknown feature report id {0}")]
    UnknownReport(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureOutcome {
    ResolutionChanged { resolution: Resolution, divisor: i32 },
    ScrollReset,
}

/// Sole writer of the divisor in [`SharedScrollConfig`].
#[derive(Debug, Clone)]
pub struct FeatureReportHandler {
    config: SharedScrollConfig,
}

impl FeatureReportHandler {
    pub fn new(config: SharedScrollConfig) -> Self {
        Self { config }
    }

    /// Handles a SET_REPORT(feature) from the host.
    ///
    /// Malformed or unknown reports leave the scroll state untouched; the
    /// error is logged here and returned for the transport to inspect.
    pub fn on_feature_write(
        &self,
        report_id: u8,
        payload: &[u8],
    ) -> Result<FeatureOutcome, FeatureReportError> {
        debug!("Feature write on report {}: {:?}", report_id, payload);
        match report_id {
            RESOLUTION_FEATURE_ID => {
                let Some(&multiplier) = payload.first() else {
                    warn!("Ignoring resolution feature write without payload");
                    return Err(FeatureReportError::EmptyPayload(report_id));
                };
                let resolution = if multiplier > 0 {
                    Resolution::Fine
                } else {
                    Resolution::Coarse
                };
                let divisor = self.config.set_resolution(resolution);
                info!("Host selected {:?} scroll resolution", resolution);
                Ok(FeatureOutcome::ResolutionChanged {
                    resolution,
                    divisor,
                })
            }
            RESET_FEATURE_ID => {
                self.config.reset();
                info!("Host reset scroll state");
                Ok(FeatureOutcome::ScrollReset)
            }
            other => {
                warn!("Ignoring write to unknown feature report {}", other);
                Err(FeatureReportError::UnknownReport(other))
            }
        }
    }

    /// Handles a GET_REPORT(feature): the resolution multiplier reads back as 0 or 1.
    pub fn read_feature(&self, report_id: u8) -> Result<Vec<u8>, FeatureReportError> {
        match report_id {
            RESOLUTION_FEATURE_ID => {
                let multiplier = match self.config.resolution() {
                    Resolution::Coarse => 0,
                    Resolution::Fine => 1,
                };
                Ok(vec![multiplier])
            }
            other => {
                warn!("Host read unknown feature report {}", other);
                Err(FeatureReportError::UnknownReport(other))
            }
        }
    }
}
