//! Display assets: single images and frame-sequence animations.
//!
//! Assets are raw mono1 dumps (`.bin`) sized for the configured display.
//! Anything that fails to load is logged and treated as absent; the
//! renderers that would have used it fall back to text.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::AssetError;
use crate::mono1::Geometry;

// ────────────────────────────────────────────────────────────────────────────
// Frame sequence
// ────────────────────────────────────────────────────────────────────────────

/// Minimum playback rate; lower configured rates are raised to this.
pub const MIN_FPS: f64 = 0.1;

/// A timed list of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    frames: Vec<Vec<u8>>,
    fps: f64,
    looping: bool,
}

impl FrameSequence {
    pub fn new(frames: Vec<Vec<u8>>, fps: f64, looping: bool) -> Self {
        let fps = if fps.is_finite() { fps.max(MIN_FPS) } else { MIN_FPS };
        Self {
            frames,
            fps,
            looping,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Frame to show at `now_ms` for playback started at `start_ms`, and
    /// whether a one-shot sequence has finished.
    ///
    /// A finished one-shot keeps returning its last frame. An empty sequence
    /// returns `(None, true)`.
    pub fn frame_at(&self, now_ms: u64, start_ms: u64) -> (Option<&[u8]>, bool) {
        let Some(last) = self.frames.last() else {
            return (None, true);
        };
        let frame_ms = 1000.0 / self.fps;
        let index = (now_ms.saturating_sub(start_ms) as f64 / frame_ms).floor() as usize;
        if self.looping {
            return (Some(self.frames[index % self.frames.len()].as_slice()), false);
        }
        match self.frames.get(index) {
            Some(frame) => (Some(frame.as_slice()), false),
            None => (Some(last.as_slice()), true),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loaders
// ────────────────────────────────────────────────────────────────────────────

fn is_bin(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bin"))
}

/// Load one raw mono1 image.
pub fn load_mono1(path: &Path, geometry: Geometry) -> Result<Vec<u8>, AssetError> {
    let shown = path.display().to_string();
    if !is_bin(path) {
        return Err(AssetError::UnsupportedFormat(shown));
    }
    let data = fs::read(path).map_err(|e| AssetError::Io {
        path: shown.clone(),
        details: e.to_string(),
    })?;
    let expected = geometry.buffer_len();
    if data.len() != expected {
        return Err(AssetError::Size {
            path: shown,
            expected,
            got: data.len(),
        });
    }
    Ok(data)
}

/// Load every `.bin` file in `dir`, in filename order.
pub fn load_frames_dir(dir: &Path, geometry: Geometry) -> Result<Vec<Vec<u8>>, AssetError> {
    let shown = dir.display().to_string();
    if !dir.is_dir() {
        return Err(if dir.exists() {
            AssetError::NotADirectory(shown)
        } else {
            AssetError::Io {
                path: shown,
                details: "frames dir not found".to_string(),
            }
        });
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| AssetError::Io {
            path: shown.clone(),
            details: e.to_string(),
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut frames = Vec::with_capacity(entries.len());
    for path in entries {
        if !is_bin(&path) {
            debug!(path = %path.display(), "skipping non-.bin frame");
            continue;
        }
        frames.push(load_mono1(&path, geometry)?);
    }
    if frames.is_empty() {
        return Err(AssetError::NoFrames(shown));
    }
    Ok(frames)
}

// ────────────────────────────────────────────────────────────────────────────
// Configured asset set
// ────────────────────────────────────────────────────────────────────────────

/// Where the display's optional assets live and how they play.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPaths {
    pub boot_image: Option<PathBuf>,
    pub motor_image: Option<PathBuf>,
    pub welcome_frames_dir: Option<PathBuf>,
    pub welcome_fps: f64,
    pub welcome_loop: bool,
    pub mode_switch_frames_dir: Option<PathBuf>,
    pub mode_switch_fps: f64,
    pub eyes_frames_dir: Option<PathBuf>,
    pub eyes_fps: f64,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            boot_image: None,
            motor_image: None,
            welcome_frames_dir: None,
            welcome_fps: 10.0,
            welcome_loop: false,
            mode_switch_frames_dir: None,
            mode_switch_fps: 20.0,
            eyes_frames_dir: None,
            eyes_fps: 8.0,
        }
    }
}

/// Assets that actually loaded. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayAssets {
    pub boot: Option<Vec<u8>>,
    pub motor: Option<Vec<u8>>,
    pub welcome: Option<FrameSequence>,
    pub mode_switch: Option<FrameSequence>,
    pub eyes: Option<FrameSequence>,
}

impl DisplayAssets {
    /// Load whatever `paths` names, logging and skipping failures.
    pub fn load(paths: &AssetPaths, geometry: Geometry) -> Self {
        let image = |name: &str, path: &Option<PathBuf>| {
            let path = path.as_deref()?;
            load_mono1(path, geometry)
                .inspect_err(|e| warn!(asset = name, error = %e, "failed to load oled asset"))
                .ok()
        };
        let frames = |name: &str, dir: &Option<PathBuf>, fps: f64, looping: bool| {
            let dir = dir.as_deref()?;
            match load_frames_dir(dir, geometry) {
                Ok(frames) => {
                    info!(asset = name, frames = frames.len(), "loaded oled frames");
                    Some(FrameSequence::new(frames, fps, looping))
                }
                Err(e) => {
                    warn!(asset = name, error = %e, "failed to load oled frames");
                    None
                }
            }
        };
        Self {
            boot: image("boot_image", &paths.boot_image),
            motor: image("motor_image", &paths.motor_image),
            welcome: frames(
                "welcome_frames_dir",
                &paths.welcome_frames_dir,
                paths.welcome_fps,
                paths.welcome_loop,
            ),
            mode_switch: frames(
                "mode_switch_frames_dir",
                &paths.mode_switch_frames_dir,
                paths.mode_switch_fps,
                false,
            ),
            eyes: frames("eyes_frames_dir", &paths.eyes_frames_dir, paths.eyes_fps, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> Geometry {
        Geometry::new(16, 8).unwrap()
    }

    fn seq(n: u8, looping: bool) -> FrameSequence {
        FrameSequence::new((0..n).map(|i| vec![i; 16]).collect(), 10.0, looping)
    }

    #[test]
    fn one_shot_reports_done_and_holds_last_frame() {
        let s = seq(3, false);
        assert_eq!(s.frame_at(1000, 1000), (Some(&[0u8; 16][..]), false));
        assert_eq!(s.frame_at(1250, 1000).0.map(|f| f[0]), Some(2));
        let (frame, done) = s.frame_at(1300, 1000);
        assert!(done);
        assert_eq!(frame.map(|f| f[0]), Some(2));
    }

    #[test]
    fn looping_sequence_wraps() {
        let s = seq(3, true);
        let (frame, done) = s.frame_at(350, 0);
        assert!(!done);
        assert_eq!(frame.map(|f| f[0]), Some(0));
    }

    #[test]
    fn empty_sequence_is_immediately_done() {
        let s = FrameSequence::new(Vec::new(), 10.0, false);
        assert_eq!(s.frame_at(0, 0), (None, true));
    }

    #[test]
    fn fps_is_floored() {
        let s = FrameSequence::new(vec![vec![0; 16], vec![1; 16]], 0.0, false);
        // At 0.1 fps each frame lasts 10 s.
        assert_eq!(s.frame_at(9_999, 0).0.map(|f| f[0]), Some(0));
        assert_eq!(s.frame_at(10_050, 0).0.map(|f| f[0]), Some(1));
    }

    #[test]
    fn start_after_now_shows_first_frame() {
        let s = seq(3, false);
        assert_eq!(s.frame_at(0, 500).0.map(|f| f[0]), Some(0));
    }

    #[test]
    fn load_mono1_checks_extension_and_size() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("boot.bin");
        fs::write(&good, [0xAAu8; 16])?;
        assert_eq!(load_mono1(&good, geom())?, vec![0xAA; 16]);

        let short = dir.path().join("short.bin");
        fs::write(&short, [0u8; 4])?;
        assert!(matches!(
            load_mono1(&short, geom()),
            Err(AssetError::Size { expected: 16, got: 4, .. })
        ));

        let png = dir.path().join("boot.png");
        fs::write(&png, [0u8; 16])?;
        assert!(matches!(load_mono1(&png, geom()), Err(AssetError::UnsupportedFormat(_))));
        Ok(())
    }

    #[test]
    fn frames_dir_is_sorted_and_skips_other_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("002.bin"), [2u8; 16])?;
        fs::write(dir.path().join("001.bin"), [1u8; 16])?;
        fs::write(dir.path().join("readme.txt"), b"notes")?;
        let frames = load_frames_dir(dir.path(), geom())?;
        assert_eq!(frames, vec![vec![1u8; 16], vec![2u8; 16]]);
        Ok(())
    }

    #[test]
    fn frames_dir_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            load_frames_dir(dir.path(), geom()),
            Err(AssetError::NoFrames(_))
        ));
        let missing = dir.path().join("missing");
        assert!(matches!(load_frames_dir(&missing, geom()), Err(AssetError::Io { .. })));
        let file = dir.path().join("file.bin");
        fs::write(&file, [0u8; 16])?;
        assert!(matches!(load_frames_dir(&file, geom()), Err(AssetError::NotADirectory(_))));
        Ok(())
    }

    #[test]
    fn missing_assets_load_as_absent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("motor.bin"), [7u8; 16])?;
        let paths = AssetPaths {
            boot_image: Some(dir.path().join("nope.bin")),
            motor_image: Some(dir.path().join("motor.bin")),
            eyes_frames_dir: Some(dir.path().join("eyes")),
            ..AssetPaths::default()
        };
        let assets = DisplayAssets::load(&paths, geom());
        assert!(assets.boot.is_none());
        assert_eq!(assets.motor, Some(vec![7u8; 16]));
        assert!(assets.eyes.is_none());
        assert!(assets.welcome.is_none());
        Ok(())
    }
}
