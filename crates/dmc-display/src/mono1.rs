//! Packed monochrome (mono1) buffers.
//!
//! Layout matches SSD1306 page order: byte `x + (y / 8) * width` holds the
//! eight pixels of column `x` in page `y / 8`, bit `y % 8` with the LSB on top.

use crate::DisplayError;
use crate::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

/// Height of one text line: glyph plus one row of spacing.
pub const LINE_HEIGHT: u32 = GLYPH_HEIGHT + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Result<Self, DisplayError> {
        if width == 0 || height == 0 || height % 8 != 0 {
            return Err(DisplayError::Geometry { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn buffer_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) / 8
    }

    /// Reject buffers whose length does not match this geometry.
    pub fn check(&self, buffer: &[u8]) -> Result<(), DisplayError> {
        let expected = self.buffer_len();
        if buffer.len() != expected {
            return Err(DisplayError::BitmapSize {
                expected,
                got: buffer.len(),
            });
        }
        Ok(())
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            width: 128,
            height: 32,
        }
    }
}

/// An owned mono1 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mono1 {
    geometry: Geometry,
    data: Vec<u8>,
}

impl Mono1 {
    pub fn blank(geometry: Geometry) -> Self {
        Self {
            geometry,
            data: vec![0; geometry.buffer_len()],
        }
    }

    pub fn from_bytes(geometry: Geometry, bytes: &[u8]) -> Result<Self, DisplayError> {
        geometry.check(bytes)?;
        Ok(Self {
            geometry,
            data: bytes.to_vec(),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn index(&self, x: u32, y: u32) -> Option<(usize, u8)> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        let idx = x as usize + (y / 8) as usize * self.geometry.width as usize;
        Some((idx, 1u8 << (y % 8)))
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        self.index(x, y)
            .is_some_and(|(idx, bit)| self.data[idx] & bit != 0)
    }

    /// Set one pixel. Out-of-bounds coordinates are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, on: bool) {
        if let Some((idx, bit)) = self.index(x, y) {
            if on {
                self.data[idx] |= bit;
            } else {
                self.data[idx] &= !bit;
            }
        }
    }

    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, on: bool) {
        for yy in y..y.saturating_add(h).min(self.geometry.height) {
            for xx in x..x.saturating_add(w).min(self.geometry.width) {
                self.set_pixel(xx, yy, on);
            }
        }
    }

    /// Draw one glyph with its top-left corner at `(x, y)`.
    pub fn draw_char(&mut self, x: u32, y: u32, c: char, on: bool) {
        for (col, bits) in font::glyph(c).iter().enumerate() {
            for row in 0..GLYPH_HEIGHT {
                if bits & (1 << row) != 0 {
                    self.set_pixel(x + col as u32, y + row, on);
                }
            }
        }
    }

    /// Draw a single line of text; characters past the right edge are dropped.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, on: bool) {
        let mut cx = x;
        for c in text.chars() {
            if cx + GLYPH_WIDTH > self.geometry.width {
                break;
            }
            self.draw_char(cx, y, c, on);
            cx += ADVANCE;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Text rasterizer for a fixed display geometry.
///
/// Holding one is the capability to render text into bitmaps; renderers
/// without it fall back to device text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRaster {
    geometry: Geometry,
}

impl TextRaster {
    pub fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Draw `lines` over `base` (or a blank frame), starting `offset_y` rows
    /// down. Lines that would start below the panel are skipped.
    pub fn text_overlay<S: AsRef<str>>(
        &self,
        base: Option<&[u8]>,
        lines: &[S],
        offset_x: u32,
        offset_y: u32,
    ) -> Vec<u8> {
        let mut img = base
            .and_then(|b| Mono1::from_bytes(self.geometry, b).ok())
            .unwrap_or_else(|| Mono1::blank(self.geometry));
        let mut y = offset_y;
        for line in lines {
            if y >= self.geometry.height {
                break;
            }
            img.draw_text(offset_x, y, line.as_ref(), true);
            y += LINE_HEIGHT;
        }
        img.into_bytes()
    }

    /// A list with row `selected` drawn inverted (dark text on a lit bar).
    pub fn menu<S: AsRef<str>>(&self, lines: &[S], selected: usize) -> Vec<u8> {
        let mut img = Mono1::blank(self.geometry);
        let mut y = 0;
        for (idx, line) in lines.iter().enumerate() {
            if y >= self.geometry.height {
                break;
            }
            let highlighted = idx == selected;
            if highlighted {
                img.fill_rect(0, y, self.geometry.width, LINE_HEIGHT, true);
            }
            img.draw_text(1, y, line.as_ref(), !highlighted);
            y += LINE_HEIGHT;
        }
        img.into_bytes()
    }

    /// Rows needed to place `n` lines flush with the bottom edge.
    pub fn bottom_offset(&self, n: usize) -> u32 {
        self.geometry
            .height
            .saturating_sub(LINE_HEIGHT * n as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> Geometry {
        Geometry::new(128, 32).unwrap()
    }

    #[test]
    fn geometry_requires_height_multiple_of_eight() {
        assert!(Geometry::new(128, 30).is_err());
        assert!(Geometry::new(0, 32).is_err());
        assert_eq!(geom().buffer_len(), 512);
        assert_eq!(Geometry::default(), geom());
    }

    #[test]
    fn pixel_layout_is_page_ordered_lsb_top() {
        let mut img = Mono1::blank(geom());
        img.set_pixel(3, 0, true);
        img.set_pixel(3, 9, true);
        let bytes = img.as_bytes();
        assert_eq!(bytes[3], 0b0000_0001);
        assert_eq!(bytes[3 + 128], 0b0000_0010);
        assert!(img.pixel(3, 9));
        assert!(!img.pixel(4, 9));
    }

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut img = Mono1::blank(geom());
        img.set_pixel(500, 500, true);
        assert!(img.as_bytes().iter().all(|b| *b == 0));
        assert!(!img.pixel(500, 0));
    }

    #[test]
    fn from_bytes_checks_length() {
        assert_eq!(
            Mono1::from_bytes(geom(), &[0; 100]),
            Err(DisplayError::BitmapSize {
                expected: 512,
                got: 100
            })
        );
    }

    #[test]
    fn draw_char_copies_glyph_columns() {
        let mut img = Mono1::blank(geom());
        img.draw_char(0, 0, 'I', true);
        assert_eq!(&img.as_bytes()[..5], font::glyph('I'));
    }

    #[test]
    fn text_overlay_keeps_base_pixels() {
        let raster = TextRaster::new(geom());
        let mut base = Mono1::blank(geom());
        base.set_pixel(127, 31, true);
        let out = raster.text_overlay(Some(base.as_bytes()), &["L:+0.10"], 0, 16);
        let out = Mono1::from_bytes(geom(), &out).unwrap();
        assert!(out.pixel(127, 31));
        assert!((0..128).any(|x| (16..24).any(|y| out.pixel(x, y))));
        assert!((0..128).all(|x| (0..16).all(|y| !out.pixel(x, y))));
    }

    #[test]
    fn menu_inverts_selected_row() {
        let raster = TextRaster::new(geom());
        let out = raster.menu(&["CALIB", "WIFI"], 1);
        let img = Mono1::from_bytes(geom(), &out).unwrap();
        // Far-right column of the selected bar is lit, the other row is dark.
        assert!(img.pixel(127, LINE_HEIGHT));
        assert!(!img.pixel(127, 0));
    }

    #[test]
    fn bottom_offset_places_lines_flush() {
        let raster = TextRaster::new(geom());
        assert_eq!(raster.bottom_offset(2), 16);
        assert_eq!(raster.bottom_offset(10), 0);
    }
}
