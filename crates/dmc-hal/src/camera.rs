//! Camera capture contract.

use crate::HalError;

/// Capture format a camera was opened with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// One JPEG-encoded frame plus the timing the driver measured.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
    /// Monotonic time the driver started reading the sensor.
    pub capture_start_mono_ms: u64,
    /// Monotonic time the raw frame was available.
    pub capture_end_mono_ms: u64,
    /// Time spent encoding to JPEG, when the driver encodes itself.
    pub encode_ms: Option<u64>,
}

/// A camera that yields JPEG frames.
pub trait CameraSensor: Send {
    fn format(&self) -> CameraFormat;

    /// Capture the next frame, or `Ok(None)` if no frame is available.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::Device`] if the device is disconnected.
    fn read_frame(&mut self) -> Result<Option<CapturedFrame>, HalError>;
}
