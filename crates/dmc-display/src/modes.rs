//! UI modes: the renderer contract, the built-in modes and [`ModeManager`].
//!
//! A mode is a named [`ModeRenderer`]. Renderers are pure: they turn a
//! [`RenderInput`] snapshot into a [`DisplayFrame`] and never touch the
//! device. Asset-backed modes take their assets as `Option`s at construction
//! and fall back to plain text when one is missing.

use std::collections::HashMap;
use std::sync::Arc;

use dmc_types::{MotorCommand, is_actively_commanded};

use crate::DisplayFrame;
use crate::assets::{DisplayAssets, FrameSequence};
use crate::mono1::TextRaster;

pub const MODE_LEGACY: &str = "legacy";
pub const MODE_WELCOME: &str = "welcome";
pub const MODE_DRIVE: &str = "drive";
pub const MODE_SETTINGS: &str = "settings";

/// Settings menu entries, in menu order.
pub const SETTINGS_ITEMS: [&str; 6] = ["CALIB", "WIFI", "GIT PULL", "BRANCH", "SHUTDOWN", "REBOOT"];

const SETTINGS_PAGE_SIZE: usize = 2;

// ────────────────────────────────────────────────────────────────────────────
// Renderer contract
// ────────────────────────────────────────────────────────────────────────────

/// Settings menu state as seen by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSnapshot {
    pub items: Arc<[String]>,
    pub selected: usize,
}

impl MenuSnapshot {
    pub fn selected_item(&self) -> Option<&str> {
        self.items.get(self.selected).map(String::as_str)
    }

    /// The page holding the selection and the selection's row on that page.
    pub fn page(&self, page_size: usize) -> (&[String], usize) {
        if self.items.is_empty() || page_size == 0 {
            return (&[], 0);
        }
        let selected = self.selected.min(self.items.len() - 1);
        let start = (selected / page_size) * page_size;
        let end = (start + page_size).min(self.items.len());
        (&self.items[start..end], selected - start)
    }
}

/// Everything a mode may look at when drawing one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub now_ms: u64,
    pub last_cmd: Option<&'a MotorCommand>,
    pub last_cmd_ms: Option<u64>,
    pub deadman_ms: u64,
    /// When the current mode became active.
    pub mode_entered_ms: u64,
    pub menu: &'a MenuSnapshot,
}

/// A mode may ask the controller to move on by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    DefaultMode,
    Mode(String),
}

pub trait ModeRenderer: Send + Sync {
    fn render(&self, input: &RenderInput<'_>) -> DisplayFrame;

    /// Checked after each render; `Some` requests a mode change.
    fn handoff(&self, _input: &RenderInput<'_>) -> Option<Handoff> {
        None
    }
}

impl<F> ModeRenderer for F
where
    F: Fn(&RenderInput<'_>) -> DisplayFrame + Send + Sync,
{
    fn render(&self, input: &RenderInput<'_>) -> DisplayFrame {
        self(input)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in modes
// ────────────────────────────────────────────────────────────────────────────

/// Boot image while idle, motor image while driven.
pub struct LegacyMode {
    robot_id: String,
    boot: Option<Vec<u8>>,
    motor: Option<Vec<u8>>,
}

impl LegacyMode {
    pub fn new(robot_id: impl Into<String>, boot: Option<Vec<u8>>, motor: Option<Vec<u8>>) -> Self {
        Self {
            robot_id: robot_id.into(),
            boot,
            motor,
        }
    }
}

impl ModeRenderer for LegacyMode {
    fn render(&self, input: &RenderInput<'_>) -> DisplayFrame {
        let driving = is_actively_commanded(
            input.last_cmd,
            input.last_cmd_ms,
            input.deadman_ms,
            input.now_ms,
        );
        let (image, label) = if driving {
            (&self.motor, "MOTOR")
        } else {
            (&self.boot, "READY")
        };
        match image {
            Some(buf) => DisplayFrame::Bitmap(buf.clone()),
            None => DisplayFrame::Text(format!("{}\n{label}", self.robot_id)),
        }
    }
}

/// Welcome animation; a finished one-shot hands off to the default mode.
pub struct WelcomeMode {
    robot_id: String,
    frames: Option<FrameSequence>,
}

impl WelcomeMode {
    pub fn new(robot_id: impl Into<String>, frames: Option<FrameSequence>) -> Self {
        Self {
            robot_id: robot_id.into(),
            frames: frames.filter(|f| !f.is_empty()),
        }
    }
}

impl ModeRenderer for WelcomeMode {
    fn render(&self, input: &RenderInput<'_>) -> DisplayFrame {
        let frame = self
            .frames
            .as_ref()
            .and_then(|seq| seq.frame_at(input.now_ms, input.mode_entered_ms).0);
        match frame {
            Some(buf) => DisplayFrame::Bitmap(buf.to_vec()),
            None => DisplayFrame::Text(format!("{}\nWELCOME", self.robot_id)),
        }
    }

    fn handoff(&self, input: &RenderInput<'_>) -> Option<Handoff> {
        let seq = self.frames.as_ref()?;
        let (_, done) = seq.frame_at(input.now_ms, input.mode_entered_ms);
        (done && !seq.is_looping()).then_some(Handoff::DefaultMode)
    }
}

/// Live wheel speeds over the looping eyes animation.
pub struct DriveMode {
    eyes: Option<FrameSequence>,
    raster: Option<TextRaster>,
}

impl DriveMode {
    pub fn new(eyes: Option<FrameSequence>, raster: Option<TextRaster>) -> Self {
        Self {
            eyes: eyes.filter(|f| !f.is_empty()),
            raster,
        }
    }
}

fn speed_lines(cmd: Option<&MotorCommand>) -> [String; 2] {
    let (v_l, v_r) = cmd.map_or((0.0, 0.0), |c| (c.v_left, c.v_right));
    [format!("L:{v_l:+.2}"), format!("R:{v_r:+.2}")]
}

impl ModeRenderer for DriveMode {
    fn render(&self, input: &RenderInput<'_>) -> DisplayFrame {
        let lines = speed_lines(input.last_cmd);
        if let (Some(eyes), Some(raster)) = (&self.eyes, &self.raster) {
            let (frame, _) = eyes.frame_at(input.now_ms, input.mode_entered_ms);
            let offset_y = raster.bottom_offset(lines.len());
            return DisplayFrame::Bitmap(raster.text_overlay(frame, &lines, 0, offset_y));
        }
        DisplayFrame::Text(lines.join("\n"))
    }
}

/// Two-row pages of the settings menu with the selection highlighted.
pub struct SettingsMode {
    raster: Option<TextRaster>,
}

impl SettingsMode {
    pub fn new(raster: Option<TextRaster>) -> Self {
        Self { raster }
    }
}

impl ModeRenderer for SettingsMode {
    fn render(&self, input: &RenderInput<'_>) -> DisplayFrame {
        let (lines, local) = input.menu.page(SETTINGS_PAGE_SIZE);
        if let Some(raster) = &self.raster {
            return DisplayFrame::Bitmap(raster.menu(lines, local));
        }
        let text: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}{line}", if i == local { ">" } else { " " }))
            .collect();
        DisplayFrame::Text(text.join("\n"))
    }
}

/// Placeholder for a mode that exists before its real renderer does.
pub struct TemplateMode {
    label: String,
}

impl TemplateMode {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_uppercase(),
        }
    }
}

impl ModeRenderer for TemplateMode {
    fn render(&self, _input: &RenderInput<'_>) -> DisplayFrame {
        DisplayFrame::Text(format!("{}\nMODE", self.label))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ModeManager
// ────────────────────────────────────────────────────────────────────────────

/// Normalised mode key: trimmed, lowercase.
pub fn mode_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Registry of named modes, their cycle order and the settings menu cursor.
pub struct ModeManager {
    renderers: HashMap<String, Arc<dyn ModeRenderer>>,
    order: Vec<String>,
    items: Arc<[String]>,
    selected: usize,
}

impl Default for ModeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeManager {
    /// An empty registry with the standard settings menu.
    pub fn new() -> Self {
        Self {
            renderers: HashMap::new(),
            order: Vec::new(),
            items: SETTINGS_ITEMS.iter().map(|s| s.to_string()).collect(),
            selected: 0,
        }
    }

    /// A registry holding `legacy`, `welcome`, `drive` and `settings`.
    pub fn with_builtin_modes(
        robot_id: &str,
        assets: &DisplayAssets,
        raster: Option<TextRaster>,
    ) -> Self {
        let mut manager = Self::new();
        manager.register_mode(
            MODE_LEGACY,
            LegacyMode::new(robot_id, assets.boot.clone(), assets.motor.clone()),
        );
        manager.register_mode(MODE_WELCOME, WelcomeMode::new(robot_id, assets.welcome.clone()));
        manager.register_mode(MODE_DRIVE, DriveMode::new(assets.eyes.clone(), raster));
        manager.register_mode(MODE_SETTINGS, SettingsMode::new(raster));
        manager
    }

    /// Add or replace the renderer for `name`. New names join the end of the
    /// cycle order; replaced names keep their position.
    pub fn register_mode<R>(&mut self, name: &str, renderer: R)
    where
        R: ModeRenderer + 'static,
    {
        let key = match mode_key(name) {
            k if k.is_empty() => "custom".to_string(),
            k => k,
        };
        if !self.order.contains(&key) {
            self.order.push(key.clone());
        }
        self.renderers.insert(key, Arc::new(renderer));
    }

    /// Install a `<NAME>\nMODE` placeholder for `name`.
    pub fn register_template_mode(&mut self, name: &str) {
        let label = match name.trim() {
            "" => "custom",
            n => n,
        };
        self.register_mode(label, TemplateMode::new(label));
    }

    pub fn has_mode(&self, name: &str) -> bool {
        self.renderers.contains_key(&mode_key(name))
    }

    /// Modes in cycle order.
    pub fn list_modes(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Replace the cycle order. Unknown names are dropped; an order with no
    /// known names is ignored.
    pub fn set_mode_order<S: AsRef<str>>(&mut self, order: &[S]) {
        let mut cleaned: Vec<String> = Vec::new();
        for key in order.iter().map(|m| mode_key(m.as_ref())) {
            if self.renderers.contains_key(&key) && !cleaned.contains(&key) {
                cleaned.push(key);
            }
        }
        if !cleaned.is_empty() {
            self.order = cleaned;
        }
    }

    /// The mode `delta` steps away from `current` in cycle order. A current
    /// mode outside the order counts as the first entry.
    pub fn cycle_target(&self, current: &str, delta: i32) -> Option<String> {
        if self.order.is_empty() {
            return None;
        }
        let len = self.order.len() as i64;
        let idx = self.order.iter().position(|m| m == current).unwrap_or(0) as i64;
        let next = (idx + i64::from(delta)).rem_euclid(len) as usize;
        Some(self.order[next].clone())
    }

    /// The renderer for `name`, or a placeholder if none is registered.
    pub fn renderer(&self, name: &str) -> Arc<dyn ModeRenderer> {
        match self.renderers.get(&mode_key(name)) {
            Some(renderer) => Arc::clone(renderer),
            None => Arc::new(TemplateMode::new(name)),
        }
    }

    /// Move the menu cursor by `delta`, wrapping at both ends.
    pub fn step_settings_index(&mut self, delta: i32) {
        if self.items.is_empty() {
            return;
        }
        let len = self.items.len() as i64;
        self.selected = (self.selected as i64 + i64::from(delta)).rem_euclid(len) as usize;
    }

    /// Place the cursor at `index`, clamped into the menu.
    pub fn set_settings_index(&mut self, index: i64) {
        if self.items.is_empty() {
            return;
        }
        let max = self.items.len() as i64 - 1;
        self.selected = index.clamp(0, max) as usize;
    }

    pub fn settings_index(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> Option<String> {
        self.items.get(self.selected).cloned()
    }

    pub fn menu_snapshot(&self) -> MenuSnapshot {
        MenuSnapshot {
            items: Arc::clone(&self.items),
            selected: self.selected,
        }
    }
}
