//! `dmc-hal` – device adapter contracts.
//!
//! The control node only ever talks to these traits, so physical drivers can
//! be swapped for the simulated ones in [`sim`] without touching the loops.
//!
//! | Trait | Contract |
//! |---|---|
//! | [`MotorActuator`] | `write(pulse widths)`, `release()` |
//! | [`ImuSensor`] | `read() -> Option<ImuReading>` |
//! | [`CameraSensor`] | `read_frame() -> Option<CapturedFrame>` |
//! | [`H264Source`] | `read_chunk() -> Option<bytes>`, `close()` |
//! | [`RangeSensor`] | `read() -> Option<Vec<RangePoint>>` |
//! | [`DisplayDevice`] | `show_text(str)`, `show_bitmap(bytes)` |
//!
//! Returning `Ok(None)` ("no data this tick") is a normal outcome; `Err` is
//! reserved for device faults, which callers log and survive.

pub mod camera;
pub mod display;
pub mod h264;
pub mod imu;
pub mod motor;
pub mod range;
pub mod sim;

pub use camera::{CameraFormat, CameraSensor, CapturedFrame};
pub use display::DisplayDevice;
pub use h264::{H264Format, H264Source};
pub use imu::{ImuReading, ImuSensor};
pub use motor::MotorActuator;
pub use range::RangeSensor;
pub use sim::{HardwareSet, SimHardware, SimProbes};

use dmc_types::NodeError;
use thiserror::Error;

/// Errors raised by device adapters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HalError {
    #[error("{component}: {details}")]
    Device { component: String, details: String },

    #[error("{0} is not available")]
    Unavailable(String),

    #[error("{component}: invalid bitmap of {got} bytes (expected {expected})")]
    BitmapSize {
        component: String,
        expected: usize,
        got: usize,
    },
}

impl HalError {
    pub fn device(component: impl Into<String>, details: impl Into<String>) -> Self {
        HalError::Device {
            component: component.into(),
            details: details.into(),
        }
    }
}

impl From<HalError> for NodeError {
    fn from(err: HalError) -> Self {
        let component = match &err {
            HalError::Device { component, .. } | HalError::BitmapSize { component, .. } => {
                component.clone()
            }
            HalError::Unavailable(component) => component.clone(),
        };
        NodeError::HardwareFault {
            component,
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hal_error_maps_to_hardware_fault() {
        let err: NodeError = HalError::device("imu", "i2c nack").into();
        match err {
            NodeError::HardwareFault { component, details } => {
                assert_eq!(component, "imu");
                assert!(details.contains("i2c nack"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
