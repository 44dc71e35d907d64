//! Small monochrome display (OLED).

use crate::HalError;

/// A `width x height` monochrome display.
///
/// Bitmaps are mono1 buffers: `width * height / 8` bytes, each byte holding
/// eight vertically stacked pixels of one column (LSB on top).
pub trait DisplayDevice: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Render multi-line text with the device's own font.
    fn show_text(&mut self, text: &str) -> Result<(), HalError>;

    /// Blit a full-screen mono1 buffer.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::BitmapSize`] when `buffer` does not match the
    /// display geometry.
    fn show_bitmap(&mut self, buffer: &[u8]) -> Result<(), HalError>;

    /// Blank the panel. Defaults to showing empty text.
    fn clear(&mut self) -> Result<(), HalError> {
        self.show_text("")
    }

    /// Expected mono1 buffer length for this display.
    fn buffer_len(&self) -> usize {
        (self.width() as usize) * (self.height() as usize) / 8
    }
}
