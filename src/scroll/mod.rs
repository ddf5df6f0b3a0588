pub mod accumulator;
pub mod config;
pub mod feature;

pub use accumulator::{ScrollAccumulator, ScrollStep};
pub use config::{
    Resolution, ResolutionSettings, ScrollConfig, SharedScrollConfig, COARSE_DIVISOR,
    FINE_DIVISOR,
};
pub use feature::{FeatureOutcome, FeatureReportError, FeatureReportHandler};
