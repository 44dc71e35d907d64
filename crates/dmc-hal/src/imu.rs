//! Inertial measurement unit.

use crate::HalError;

/// Raw IMU reading: gyro in rad/s, accelerometer in m/s².
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuReading {
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
}

pub trait ImuSensor: Send {
    /// Read the latest sample, or `Ok(None)` if none is ready.
    fn read(&mut self) -> Result<Option<ImuReading>, HalError>;
}
