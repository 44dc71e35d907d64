//! H.264 encoder stream contract.

use crate::HalError;

/// Stream parameters the encoder was started with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct H264Format {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Target bitrate in bit/s; `0` leaves it to the encoder.
    pub bitrate: u32,
}

/// An encoder producing an Annex B byte stream in arbitrary chunks.
///
/// Chunks do not line up with frames; consumers forward them in order.
pub trait H264Source: Send {
    fn format(&self) -> H264Format;

    /// Wait briefly for the next chunk. `Ok(None)` means nothing arrived in
    /// time.
    ///
    /// # Errors
    ///
    /// [`HalError::Unavailable`] once the encoder has exited; the stream is
    /// over and later calls keep failing. [`HalError::Device`] for a failed
    /// read that may recover.
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, HalError>;

    /// Stop the encoder.
    fn close(&mut self) {}
}
