//! `dmc-display` – what the robot shows on its OLED.
//!
//! Three layers of display intent compete for the panel and exactly one wins
//! on every tick, strictly in this order:
//!
//! | Layer | Source | Lifetime |
//! |---|---|---|
//! | Override | `oled/cmd`, `oled/image/mono1` | `override_s` after receipt |
//! | Transition | mode change with mode-switch frames loaded | until the frames run out |
//! | Mode | [`ModeManager`] registry | until the next mode change |
//!
//! # Modules
//!
//! - [`mono1`] – packed monochrome buffers and the built-in text rasterizer.
//! - [`font`] – 5x7 column-major glyphs.
//! - [`assets`] – `.bin` image and frame-directory loading, [`FrameSequence`].
//! - [`modes`] – [`ModeRenderer`], [`ModeManager`] and the built-in modes.
//! - [`controller`] – [`DisplayController`], the priority state machine.

pub mod assets;
pub mod controller;
pub mod font;
pub mod modes;
pub mod mono1;

pub use assets::{AssetPaths, DisplayAssets, FrameSequence};
pub use controller::{DisplayConfig, DisplayController, DisplayLayer};
pub use modes::{Handoff, MenuSnapshot, ModeManager, ModeRenderer, RenderInput, SETTINGS_ITEMS};
pub use mono1::{Geometry, Mono1, TextRaster};

use dmc_hal::{DisplayDevice, HalError};
use thiserror::Error;

/// One full-screen frame for the display device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayFrame {
    /// Multi-line text rendered by the device's own font.
    Text(String),
    /// A mono1 buffer of exactly `width * height / 8` bytes.
    Bitmap(Vec<u8>),
}

impl DisplayFrame {
    pub fn text(s: impl Into<String>) -> Self {
        DisplayFrame::Text(s.into())
    }

    /// Push the frame to `device`.
    pub fn write_to(&self, device: &mut dyn DisplayDevice) -> Result<(), HalError> {
        match self {
            DisplayFrame::Text(text) => device.show_text(text),
            DisplayFrame::Bitmap(buffer) => device.show_bitmap(buffer),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DisplayError {
    #[error("invalid display geometry {width}x{height}: height must be a positive multiple of 8")]
    Geometry { width: u32, height: u32 },

    #[error("mono1 payload is {got} bytes, display expects {expected}")]
    BitmapSize { expected: usize, got: usize },
}

/// Failures while loading display assets from disk.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error("{path}: {details}")]
    Io { path: String, details: String },

    #[error("{path}: mono1 asset is {got} bytes, expected {expected}")]
    Size {
        path: String,
        expected: usize,
        got: usize,
    },

    #[error("{0}: only raw .bin mono1 assets are supported")]
    UnsupportedFormat(String),

    #[error("{0}: not a directory")]
    NotADirectory(String),

    #[error("{0}: no frames found")]
    NoFrames(String),
}
