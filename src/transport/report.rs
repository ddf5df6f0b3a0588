//! HID report identifiers and the wheel input report.

use crate::scroll::ScrollStep;

pub const WHEEL_REPORT_ID: u8 = 0x01;
pub const RESOLUTION_FEATURE_ID: u8 = 0x02;
pub const RESET_FEATURE_ID: u8 = 0x03;

pub const WHEEL_REPORT_LEN: usize = 3;

/// Input report `{ report_id, wheel }`, wheel as little-endian i16 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelReport {
    pub report_id: u8,
    pub wheel: i16,
}

impl Default for WheelReport {
    fn default() -> Self {
        Self {
            report_id: WHEEL_REPORT_ID,
            wheel: 0,
        }
    }
}

impl WheelReport {
    pub fn from_step(step: ScrollStep) -> Self {
        Self {
            report_id: WHEEL_REPORT_ID,
            wheel: step.get(),
        }
    }

    pub fn set_step(&mut self, step: ScrollStep) {
        self.wheel = step.get();
    }

    pub fn to_bytes(&self) -> [u8; WHEEL_REPORT_LEN] {
        let [lo, hi] = self.wheel.to_le_bytes();
        [self.report_id, lo, hi]
    }
}

/// Splits a host report into its id and payload. Empty buffers carry nothing.
pub fn split_report(bytes: &[u8]) -> Option<(u8, &[u8])> {
    bytes.split_first().map(|(&report_id, payload)| (report_id, payload))
}
