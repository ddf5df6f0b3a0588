//! AS5600 magnetic rotary encoder on the Raspberry Pi I2C bus.

use super::{AngularSample, AngularSensor, As5600Settings, SensorError};
use rppal::i2c::I2c;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

const REG_STATUS: u8 = 0x0B;
const REG_ANGLE_HIGH: u8 = 0x0E;
const STATUS_MAGNET_DETECTED: u8 = 0x20;
const ANGLE_MASK: u16 = 0x0FFF;

pub struct As5600 {
    i2c: Mutex<I2c>,
}

impl As5600 {
    pub fn open(settings: &As5600Settings) -> Result<Self, SensorError> {
        debug!(
            "Opening AS5600 on i2c bus {} at {:#04x}",
            settings.bus, settings.address
        );
        let mut i2c = I2c::with_bus(settings.bus)
            .map_err(|e| SensorError::InitializationError(e.to_string()))?;
        i2c.set_slave_address(settings.address)
            .map_err(|e| SensorError::InitializationError(e.to_string()))?;

        let mut status = [0u8; 1];
        i2c.write_read(&[REG_STATUS], &mut status)
            .map_err(|e| SensorError::InitializationError(e.to_string()))?;
        if status[0] & STATUS_MAGNET_DETECTED == 0 {
            warn!("AS5600 reports no magnet, readings will be noise");
        } else {
            info!("AS5600 ready, magnet detected");
        }

        Ok(Self {
            i2c: Mutex::new(i2c),
        })
    }
}

impl AngularSensor for As5600 {
    fn read_angular_sample(&self) -> Result<AngularSample, SensorError> {
        let i2c = self.i2c.lock().unwrap_or_else(PoisonError::into_inner);
        let mut angle = [0u8; 2];
        i2c.write_read(&[REG_ANGLE_HIGH], &mut angle)
            .map_err(|e| SensorError::ReadError(e.to_string()))?;
        let raw = u16::from_be_bytes(angle) & ANGLE_MASK;
        Ok(AngularSample::new(raw))
    }
}
