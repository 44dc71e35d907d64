//! [`DisplayController`] – picks the one layer that owns the panel each tick.
//!
//! ```text
//!            override msg                      expiry (+ queued request)
//!   Mode ───────────────────▶ Override ──────────────────────────────▶ Mode / Transition
//!    │  ▲                                                                   │
//!    │  └──────────── frames exhausted ─────────── Transition ◀─────────────┘
//!    └── mode request (mode-switch frames loaded) ──────▲
//! ```
//!
//! Mode requests that arrive while an override is showing are parked as a
//! single pending target (latest wins) and applied at most once: on the
//! first render after the override expires, or dropped when a newer request
//! arrives first. Without mode-switch frames a request switches directly.
//!
//! All state sits behind one lock. [`DisplayController::render`] clones the
//! active renderer out and draws without holding it; device writes happen in
//! [`DisplayController::present`] after the lock is released.

use std::sync::{Mutex, MutexGuard};

use dmc_hal::{DisplayDevice, HalError};
use dmc_types::{MotorCommand, NavAction, NavCommand};
use tracing::{debug, info, warn};

use crate::assets::{AssetPaths, DisplayAssets, FrameSequence};
use crate::modes::{
    Handoff, MODE_LEGACY, MODE_SETTINGS, MODE_WELCOME, ModeManager, ModeRenderer, RenderInput,
    mode_key,
};
use crate::mono1::{Geometry, TextRaster};
use crate::{DisplayError, DisplayFrame};

/// Display behaviour as configured under `[oled]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// How long `oled/cmd` and `oled/image/mono1` payloads stay on screen.
    pub override_s: f64,
    pub default_mode: String,
    /// Start in `welcome` when welcome frames are available.
    pub welcome_on_boot: bool,
    /// Rasterize text into bitmaps instead of using the device font.
    pub bitmap_text: bool,
    pub template_modes: Vec<String>,
    pub mode_order: Vec<String>,
    pub assets: AssetPaths,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 32,
            override_s: 2.0,
            default_mode: MODE_LEGACY.to_string(),
            welcome_on_boot: true,
            bitmap_text: true,
            template_modes: Vec::new(),
            mode_order: Vec::new(),
            assets: AssetPaths::default(),
        }
    }
}

/// Which layer produced the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLayer {
    Override,
    Transition,
    Mode,
}

#[derive(Debug)]
struct Override {
    frame: DisplayFrame,
    expires_at_ms: u64,
}

#[derive(Debug)]
struct Transition {
    to: String,
    started_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct ModeRequest {
    mode: String,
    settings_index: Option<i64>,
}

struct DisplayState {
    manager: ModeManager,
    active: String,
    mode_entered_ms: u64,
    overlay: Option<Override>,
    transition: Option<Transition>,
    pending: Option<ModeRequest>,
    last_written: Option<DisplayFrame>,
}

impl DisplayState {
    fn override_active(&self, now_ms: u64) -> bool {
        self.overlay
            .as_ref()
            .is_some_and(|o| now_ms < o.expires_at_ms)
    }

    /// The mode the machine is heading for, including queued work.
    fn target(&self) -> &str {
        if let Some(p) = &self.pending {
            return &p.mode;
        }
        match &self.transition {
            Some(t) => &t.to,
            None => &self.active,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct DisplayController {
    geometry: Geometry,
    override_ms: u64,
    default_mode: String,
    transition_frames: Option<FrameSequence>,
    raster: Option<TextRaster>,
    state: Mutex<DisplayState>,
}

impl DisplayController {
    /// A controller showing `legacy` (or the first registered mode) with no
    /// transition frames and a two second override window.
    pub fn new(geometry: Geometry, manager: ModeManager, now_ms: u64) -> Self {
        let default_mode = resolve_default(&manager, MODE_LEGACY);
        Self {
            geometry,
            override_ms: 2_000,
            default_mode: default_mode.clone(),
            transition_frames: None,
            raster: None,
            state: Mutex::new(DisplayState {
                manager,
                active: default_mode,
                mode_entered_ms: now_ms,
                overlay: None,
                transition: None,
                pending: None,
                last_written: None,
            }),
        }
    }

    /// Build the full controller from `[oled]`: load assets, register the
    /// built-in and template modes, apply the cycle order.
    pub fn from_config(
        config: &DisplayConfig,
        robot_id: &str,
        now_ms: u64,
    ) -> Result<Self, DisplayError> {
        let geometry = Geometry::new(config.width, config.height)?;
        let assets = DisplayAssets::load(&config.assets, geometry);
        let raster = config.bitmap_text.then(|| TextRaster::new(geometry));

        let mut manager = ModeManager::with_builtin_modes(robot_id, &assets, raster);
        for name in &config.template_modes {
            if manager.has_mode(name) {
                debug!(mode = %name, "template mode already registered");
                continue;
            }
            manager.register_template_mode(name);
        }
        if !config.mode_order.is_empty() {
            manager.set_mode_order(&config.mode_order);
        }

        let welcome = config.welcome_on_boot && assets.welcome.is_some();
        let mut controller = Self::new(geometry, manager, now_ms)
            .with_override_s(config.override_s)
            .with_default_mode(&config.default_mode)
            .with_transition_frames(assets.mode_switch)
            .with_raster(raster);
        if welcome {
            controller = controller.with_initial_mode(MODE_WELCOME);
        }
        info!(
            mode = %controller.active_mode(),
            modes = ?controller.list_modes(),
            "display controller ready"
        );
        Ok(controller)
    }

    pub fn with_override_s(mut self, override_s: f64) -> Self {
        let secs = if override_s.is_finite() { override_s.max(0.0) } else { 0.0 };
        self.override_ms = (secs * 1000.0).round() as u64;
        self
    }

    /// Set the fallback mode and make it active. Unregistered names fall back
    /// to `legacy`.
    pub fn with_default_mode(mut self, name: &str) -> Self {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        let mode = resolve_default(&state.manager, name);
        state.active = mode.clone();
        self.default_mode = mode;
        self
    }

    /// Start in `name` instead of the default mode, if it is registered.
    pub fn with_initial_mode(mut self, name: &str) -> Self {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        if state.manager.has_mode(name) {
            state.active = mode_key(name);
        }
        self
    }

    pub fn with_transition_frames(mut self, frames: Option<FrameSequence>) -> Self {
        self.transition_frames = frames.filter(|f| !f.is_empty());
        self
    }

    pub fn with_raster(mut self, raster: Option<TextRaster>) -> Self {
        self.raster = raster;
        self
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn default_mode(&self) -> &str {
        &self.default_mode
    }

    pub fn active_mode(&self) -> String {
        lock(&self.state).active.clone()
    }

    pub fn list_modes(&self) -> Vec<String> {
        lock(&self.state).manager.list_modes()
    }

    pub fn settings_index(&self) -> usize {
        lock(&self.state).manager.settings_index()
    }

    /// Register a renderer after construction.
    pub fn register_mode<R>(&self, name: &str, renderer: R)
    where
        R: ModeRenderer + 'static,
    {
        lock(&self.state).manager.register_mode(name, renderer);
    }

    pub fn layer(&self, now_ms: u64) -> DisplayLayer {
        let state = lock(&self.state);
        if state.override_active(now_ms) {
            DisplayLayer::Override
        } else if state.transition.is_some() {
            DisplayLayer::Transition
        } else {
            DisplayLayer::Mode
        }
    }

    // ── Inputs ──────────────────────────────────────────────────────────────

    /// Show `text` until `now_ms + override_s`.
    pub fn on_text_override(&self, text: &str, now_ms: u64) {
        self.set_override(DisplayFrame::text(text), now_ms);
    }

    /// Show a raw mono1 buffer until `now_ms + override_s`. Buffers of the
    /// wrong size are rejected and leave the current override untouched.
    pub fn on_bitmap_override(&self, payload: &[u8], now_ms: u64) -> Result<(), DisplayError> {
        self.geometry.check(payload)?;
        self.set_override(DisplayFrame::Bitmap(payload.to_vec()), now_ms);
        Ok(())
    }

    fn set_override(&self, frame: DisplayFrame, now_ms: u64) {
        let expires_at_ms = now_ms.saturating_add(self.override_ms);
        lock(&self.state).overlay = Some(Override {
            frame,
            expires_at_ms,
        });
    }

    /// Ask for `mode`. Unknown names are logged and ignored (`false`).
    pub fn request_mode(&self, mode: &str, settings_index: Option<i64>, now_ms: u64) -> bool {
        let mut state = lock(&self.state);
        if !state.manager.has_mode(mode) {
            warn!(mode = %mode, "unknown oled mode requested");
            return false;
        }
        let request = ModeRequest {
            mode: mode_key(mode),
            settings_index,
        };
        self.submit(&mut state, request, now_ms);
        true
    }

    /// Move `delta` steps through the cycle order from the current target.
    pub fn cycle_mode(&self, delta: i32, now_ms: u64) -> Option<String> {
        let mut state = lock(&self.state);
        let target = state.manager.cycle_target(state.target(), delta)?;
        let request = ModeRequest {
            mode: target.clone(),
            settings_index: None,
        };
        self.submit(&mut state, request, now_ms);
        Some(target)
    }

    /// Apply a navigation input. Returns the highlighted settings label when
    /// `select` is pressed in settings mode.
    pub fn on_nav(&self, nav: NavCommand, now_ms: u64) -> Option<String> {
        match nav.action {
            NavAction::Cycle => {
                self.cycle_mode(nav.delta, now_ms);
                None
            }
            NavAction::Step => {
                lock(&self.state).manager.step_settings_index(nav.delta);
                None
            }
            NavAction::Select => {
                let state = lock(&self.state);
                if state.active != MODE_SETTINGS {
                    debug!(mode = %state.active, "select ignored outside settings");
                    return None;
                }
                state.manager.selected_item()
            }
        }
    }

    fn submit(&self, state: &mut DisplayState, request: ModeRequest, now_ms: u64) {
        if state.override_active(now_ms) {
            debug!(mode = %request.mode, "mode request queued behind override");
            state.pending = Some(request);
            return;
        }
        // The override may have expired without a render retiring it; the
        // request parked behind it is superseded by this one.
        state.overlay = None;
        if let Some(stale) = state.pending.take() {
            debug!(stale = %stale.mode, mode = %request.mode, "queued mode request superseded");
        }
        self.apply(state, request, now_ms);
    }

    fn apply(&self, state: &mut DisplayState, request: ModeRequest, now_ms: u64) {
        if let Some(index) = request.settings_index {
            state.manager.set_settings_index(index);
        }
        let current = match &state.transition {
            Some(t) => t.to.clone(),
            None => state.active.clone(),
        };
        if request.mode == current {
            return;
        }
        info!(from = %current, to = %request.mode, "oled mode change");
        if self.transition_frames.is_some() {
            state.transition = Some(Transition {
                to: request.mode,
                started_ms: now_ms,
            });
        } else {
            state.transition = None;
            state.active = request.mode;
            state.mode_entered_ms = now_ms;
        }
    }

    // ── Output ──────────────────────────────────────────────────────────────

    /// Produce the frame for `now_ms` from whichever layer owns the panel.
    pub fn render(
        &self,
        now_ms: u64,
        last_cmd: Option<&MotorCommand>,
        last_cmd_ms: Option<u64>,
        deadman_ms: u64,
    ) -> DisplayFrame {
        let (renderer, active, mode_entered_ms, menu) = {
            let mut state = lock(&self.state);
            if let Some(o) = &state.overlay {
                if now_ms < o.expires_at_ms {
                    return o.frame.clone();
                }
            }
            if state.overlay.take().is_some() {
                if let Some(request) = state.pending.take() {
                    self.apply(&mut state, request, now_ms);
                }
            }
            if let Some(frame) = self.render_transition(&mut state, now_ms) {
                return frame;
            }
            (
                state.manager.renderer(&state.active),
                state.active.clone(),
                state.mode_entered_ms,
                state.manager.menu_snapshot(),
            )
        };

        let input = RenderInput {
            now_ms,
            last_cmd,
            last_cmd_ms,
            deadman_ms,
            mode_entered_ms,
            menu: &menu,
        };
        let frame = renderer.render(&input);
        if let Some(handoff) = renderer.handoff(&input) {
            self.handoff(&active, handoff, now_ms);
        }
        frame
    }

    /// The transition frame for `now_ms`, finishing the transition on its
    /// last frame.
    fn render_transition(&self, state: &mut DisplayState, now_ms: u64) -> Option<DisplayFrame> {
        let transition = state.transition.as_ref()?;
        let Some(frames) = &self.transition_frames else {
            let to = transition.to.clone();
            state.transition = None;
            state.active = to;
            state.mode_entered_ms = now_ms;
            return None;
        };
        let (frame, done) = frames.frame_at(now_ms, transition.started_ms);
        let label = transition.to.to_uppercase();
        let out = match (&self.raster, frame) {
            (Some(raster), base) => {
                DisplayFrame::Bitmap(raster.text_overlay(base, &["MODE", label.as_str()], 0, 0))
            }
            (None, Some(base)) => DisplayFrame::Bitmap(base.to_vec()),
            (None, None) => DisplayFrame::Text(format!("MODE\n{label}")),
        };
        if done {
            if let Some(t) = state.transition.take() {
                state.active = t.to;
                state.mode_entered_ms = now_ms;
            }
        }
        Some(out)
    }

    fn handoff(&self, from: &str, handoff: Handoff, now_ms: u64) {
        let mut state = lock(&self.state);
        // Something else already moved the machine on.
        if state.active != from || state.transition.is_some() || state.pending.is_some() {
            return;
        }
        let mode = match handoff {
            Handoff::DefaultMode => self.default_mode.clone(),
            Handoff::Mode(name) if state.manager.has_mode(&name) => mode_key(&name),
            Handoff::Mode(name) => {
                warn!(mode = %name, "handoff to unknown mode ignored");
                return;
            }
        };
        let request = ModeRequest {
            mode,
            settings_index: None,
        };
        self.submit(&mut state, request, now_ms);
    }

    /// Write `frame` to `device` unless it equals the last successful write.
    /// Returns whether a write happened.
    pub fn present(
        &self,
        frame: DisplayFrame,
        device: &mut dyn DisplayDevice,
    ) -> Result<bool, HalError> {
        {
            let mut state = lock(&self.state);
            if state.last_written.as_ref() == Some(&frame) {
                return Ok(false);
            }
            state.last_written = Some(frame.clone());
        }
        if let Err(e) = frame.write_to(device) {
            lock(&self.state).last_written = None;
            return Err(e);
        }
        Ok(true)
    }
}

fn resolve_default(manager: &ModeManager, requested: &str) -> String {
    if manager.has_mode(requested) {
        return mode_key(requested);
    }
    let fallback = if manager.has_mode(MODE_LEGACY) {
        MODE_LEGACY.to_string()
    } else {
        manager
            .list_modes()
            .into_iter()
            .next()
            .unwrap_or_else(|| MODE_LEGACY.to_string())
    };
    if !requested.trim().is_empty() && mode_key(requested) != fallback {
        warn!(requested = %requested, fallback = %fallback, "default oled mode not registered");
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmc_hal::sim::{SimDisplay, SimScreen};

    fn geom() -> Geometry {
        Geometry::new(16, 8).unwrap()
    }

    fn controller() -> DisplayController {
        let manager = ModeManager::with_builtin_modes("rb1", &DisplayAssets::default(), None);
        DisplayController::new(geom(), manager, 0).with_override_s(2.0)
    }

    fn frame(c: &DisplayController, now_ms: u64) -> DisplayFrame {
        c.render(now_ms, None, None, 300)
    }

    fn text(s: &str) -> DisplayFrame {
        DisplayFrame::text(s)
    }

    #[test]
    fn starts_in_default_mode() {
        let c = controller();
        assert_eq!(c.active_mode(), "legacy");
        assert_eq!(frame(&c, 0), text("rb1\nREADY"));
        assert_eq!(c.layer(0), DisplayLayer::Mode);
    }

    #[test]
    fn unknown_default_falls_back_to_legacy() {
        let c = controller().with_default_mode("nope");
        assert_eq!(c.default_mode(), "legacy");
        assert_eq!(c.active_mode(), "legacy");
        let c = controller().with_default_mode("Drive");
        assert_eq!(c.active_mode(), "drive");
    }

    #[test]
    fn override_dominates_and_queued_mode_applies_once() {
        let c = controller();
        c.on_text_override("HI", 0);
        assert!(c.request_mode("drive", None, 500));

        assert_eq!(frame(&c, 1_000), text("HI"));
        assert_eq!(c.active_mode(), "legacy");
        assert_eq!(c.layer(1_999), DisplayLayer::Override);

        assert_eq!(frame(&c, 2_000), text("L:+0.00\nR:+0.00"));
        assert_eq!(c.active_mode(), "drive");

        // A later override expiring must not replay the old request.
        assert!(c.request_mode("settings", None, 3_000));
        c.on_text_override("AGAIN", 3_000);
        assert_eq!(frame(&c, 4_000), text("AGAIN"));
        assert_eq!(frame(&c, 5_000), text(">CALIB\n WIFI"));
        assert_eq!(c.active_mode(), "settings");
    }

    #[test]
    fn latest_queued_request_wins() {
        let c = controller();
        c.on_text_override("HI", 0);
        c.request_mode("drive", None, 100);
        c.request_mode("settings", Some(3), 200);
        assert_eq!(c.settings_index(), 0);
        frame(&c, 2_500);
        assert_eq!(c.active_mode(), "settings");
        assert_eq!(c.settings_index(), 3);
    }

    #[test]
    fn request_after_expiry_supersedes_queued_one() {
        let c = controller();
        c.on_text_override("HI", 0);
        assert!(c.request_mode("drive", None, 500));
        assert!(c.request_mode("settings", None, 2_050));
        assert_eq!(c.active_mode(), "settings");

        assert_eq!(frame(&c, 2_100), text(">CALIB\n WIFI"));
        assert_eq!(c.active_mode(), "settings");
        assert_eq!(frame(&c, 5_000), text(">CALIB\n WIFI"));
    }

    #[test]
    fn cycle_after_expiry_steps_from_queued_target() {
        let c = controller();
        let cycle = NavCommand {
            action: NavAction::Cycle,
            delta: 1,
        };
        c.on_text_override("HI", 0);
        c.on_nav(cycle, 100);
        assert_eq!(c.active_mode(), "legacy");

        // Not yet rendered after expiry: cycles on from the queued `welcome`.
        c.on_nav(cycle, 2_050);
        assert_eq!(c.active_mode(), "drive");
        assert_eq!(frame(&c, 2_100), text("L:+0.00\nR:+0.00"));
        assert_eq!(c.active_mode(), "drive");
    }

    #[test]
    fn bad_bitmap_leaves_override_untouched() {
        let c = controller();
        c.on_text_override("KEEP", 0);
        let err = c.on_bitmap_override(&[0xFF; 3], 100);
        assert_eq!(err, Err(DisplayError::BitmapSize { expected: 16, got: 3 }));
        assert_eq!(frame(&c, 500), text("KEEP"));
        assert_eq!(frame(&c, 2_000), text("rb1\nREADY"));

        assert!(c.on_bitmap_override(&[0xFF; 3], 3_000).is_err());
        assert_eq!(c.layer(3_000), DisplayLayer::Mode);

        c.on_bitmap_override(&[0x0F; 16], 3_000).unwrap();
        assert_eq!(frame(&c, 3_100), DisplayFrame::Bitmap(vec![0x0F; 16]));
    }

    #[test]
    fn request_without_transition_frames_switches_directly() {
        let c = controller();
        assert!(c.request_mode("DRIVE", None, 10));
        assert_eq!(c.layer(10), DisplayLayer::Mode);
        assert_eq!(c.active_mode(), "drive");
    }

    #[test]
    fn unknown_request_is_ignored() {
        let c = controller();
        assert!(!c.request_mode("warp", None, 0));
        assert_eq!(c.active_mode(), "legacy");
    }

    #[test]
    fn transition_plays_then_lands_on_target() {
        let frames = FrameSequence::new(vec![vec![1; 16], vec![2; 16]], 10.0, false);
        let c = controller().with_transition_frames(Some(frames));
        c.request_mode("drive", None, 1_000);
        assert_eq!(c.layer(1_000), DisplayLayer::Transition);

        assert_eq!(frame(&c, 1_050), DisplayFrame::Bitmap(vec![1; 16]));
        assert_eq!(frame(&c, 1_150), DisplayFrame::Bitmap(vec![2; 16]));
        assert_eq!(c.active_mode(), "legacy");

        // Last frame is shown on the tick that finishes the transition.
        assert_eq!(frame(&c, 1_200), DisplayFrame::Bitmap(vec![2; 16]));
        assert_eq!(c.active_mode(), "drive");
        assert_eq!(c.layer(1_200), DisplayLayer::Mode);
        assert_eq!(frame(&c, 1_250), text("L:+0.00\nR:+0.00"));
    }

    #[test]
    fn override_beats_transition() {
        let frames = FrameSequence::new(vec![vec![1; 16]; 10], 10.0, false);
        let c = controller().with_transition_frames(Some(frames));
        c.request_mode("drive", None, 0);
        c.on_text_override("HI", 100);
        assert_eq!(c.layer(200), DisplayLayer::Override);
        assert_eq!(frame(&c, 200), text("HI"));
    }

    #[test]
    fn welcome_hands_off_to_default() {
        let welcome = FrameSequence::new(vec![vec![9; 16]], 10.0, false);
        let assets = DisplayAssets {
            welcome: Some(welcome),
            ..DisplayAssets::default()
        };
        let manager = ModeManager::with_builtin_modes("rb1", &assets, None);
        let c = DisplayController::new(geom(), manager, 0)
            .with_default_mode("drive")
            .with_initial_mode("welcome");
        assert_eq!(c.active_mode(), "welcome");
        assert_eq!(frame(&c, 50), DisplayFrame::Bitmap(vec![9; 16]));
        assert_eq!(c.active_mode(), "welcome");
        assert_eq!(frame(&c, 100), DisplayFrame::Bitmap(vec![9; 16]));
        assert_eq!(c.active_mode(), "drive");
    }

    #[test]
    fn nav_cycles_steps_and_selects() {
        let c = controller();
        let cycle = NavCommand {
            action: NavAction::Cycle,
            delta: -1,
        };
        let step = NavCommand {
            action: NavAction::Step,
            delta: 2,
        };
        let select = NavCommand {
            action: NavAction::Select,
            delta: 1,
        };
        assert_eq!(c.on_nav(select, 0), None);
        c.on_nav(cycle, 0);
        assert_eq!(c.active_mode(), "settings");
        c.on_nav(step, 0);
        assert_eq!(c.on_nav(select, 0).as_deref(), Some("GIT PULL"));
    }

    #[test]
    fn nav_cycle_during_override_is_queued() {
        let c = controller();
        c.on_text_override("HI", 0);
        c.on_nav(
            NavCommand {
                action: NavAction::Cycle,
                delta: 1,
            },
            10,
        );
        c.on_nav(
            NavCommand {
                action: NavAction::Cycle,
                delta: 1,
            },
            20,
        );
        assert_eq!(c.active_mode(), "legacy");
        frame(&c, 2_000);
        assert_eq!(c.active_mode(), "drive");
    }

    #[test]
    fn present_skips_unchanged_frames() {
        let c = controller();
        let (mut display, probe) = SimDisplay::new(16, 8);
        assert!(c.present(text("A"), &mut display).unwrap());
        assert!(!c.present(text("A"), &mut display).unwrap());
        assert!(c.present(text("B"), &mut display).unwrap());
        assert_eq!(probe.write_count(), 2);
        assert_eq!(probe.screen(), SimScreen::Text("B".into()));

        assert!(c.present(DisplayFrame::Bitmap(vec![0; 3]), &mut display).is_err());
        assert!(c.present(text("B"), &mut display).unwrap());
    }

    #[test]
    fn from_config_boots_into_welcome() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("000.bin"), [1u8; 16])?;
        let config = DisplayConfig {
            width: 16,
            height: 8,
            default_mode: "drive".into(),
            template_modes: vec!["lights".into(), "drive".into()],
            mode_order: vec!["drive".into(), "lights".into(), "ghost".into()],
            assets: AssetPaths {
                welcome_frames_dir: Some(dir.path().to_path_buf()),
                ..AssetPaths::default()
            },
            ..DisplayConfig::default()
        };
        let c = DisplayController::from_config(&config, "rb1", 0)?;
        assert_eq!(c.active_mode(), "welcome");
        assert_eq!(c.default_mode(), "drive");
        assert_eq!(c.list_modes(), vec!["drive", "lights"]);
        Ok(())
    }

    #[test]
    fn from_config_rejects_bad_geometry() {
        let config = DisplayConfig {
            height: 30,
            ..DisplayConfig::default()
        };
        assert!(matches!(
            DisplayController::from_config(&config, "rb1", 0),
            Err(DisplayError::Geometry { .. })
        ));
    }
}
