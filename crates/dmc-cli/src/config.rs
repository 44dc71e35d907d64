//! Configuration vault – reads `config.toml` into a [`NodeConfig`].
//!
//! Every key is optional; missing keys take the defaults below. After
//! parsing, these environment variables override the file:
//!
//! | Variable | Config field |
//! |---|---|
//! | `DMC_ROBOT_ID` | `robot_id` |
//! | `DMC_NAMESPACE` | `namespace` |
//! | `DMC_DEADMAN_MS` | `motor.deadman_ms` |
//! | `DMC_BRIDGE_ADDR` | `transport.bridge_addr` |
//!
//! Unparsable numeric or address overrides are ignored with a warning.
//!
//! Outside dry-run, `trim` is then replaced by the value the motor
//! calibration wrote to `motor.calibration_file` (see [`apply_calibration`]).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use dmc_display::{AssetPaths, DisplayConfig};
use dmc_kernel::MotorConfig;
use dmc_runtime::{
    CameraConfig, CameraH264Config, HealthConfig, ImuConfig, LidarConfig, MotorLoopConfig, NodeConfig, OledConfig,
    SettingsConfig, TransportConfig,
};
use dmc_types::FrontStat;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {} not found", .0.display())]
    Missing(PathBuf),

    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// File layout
// ────────────────────────────────────────────────────────────────────────────

/// `config.toml` as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_robot_id")]
    pub robot_id: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub motor: MotorSection,
    #[serde(default)]
    pub imu: ImuSection,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub camera_h264: CameraH264Section,
    #[serde(default)]
    pub lidar: LidarSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub oled: OledSection,
    #[serde(default)]
    pub oled_settings: SettingsConfig,
}

fn default_robot_id() -> String {
    "rasp-zero-01".to_string()
}

fn default_namespace() -> String {
    dmc_types::DEFAULT_NAMESPACE.to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            robot_id: default_robot_id(),
            namespace: default_namespace(),
            transport: TransportSection::default(),
            motor: MotorSection::default(),
            imu: ImuSection::default(),
            camera: CameraSection::default(),
            camera_h264: CameraH264Section::default(),
            lidar: LidarSection::default(),
            health: HealthSection::default(),
            oled: OledSection::default(),
            oled_settings: SettingsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub bridge_addr: Option<SocketAddr>,
    pub capacity: usize,
}

impl Default for TransportSection {
    fn default() -> Self {
        let t = TransportConfig::default();
        Self {
            bridge_addr: t.bridge_addr,
            capacity: t.capacity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotorSection {
    pub deadman_ms: u32,
    pub deadband_pw: u32,
    pub neutral_pw: u32,
    pub gain_pw_per_mps: f64,
    pub trim: f64,
    pub max_speed_mps: f64,
    pub min_pw: u32,
    pub max_pw: u32,
    pub watchdog_hz: f64,
    pub telemetry_hz: f64,
    /// JSON written by the motor calibration, `{"trim": <f64>}`.
    pub calibration_file: Option<PathBuf>,
}

/// Where the motor calibration stores its result.
pub const DEFAULT_CALIBRATION_FILE: &str = "configs/motor_config.json";

impl Default for MotorSection {
    fn default() -> Self {
        let MotorLoopConfig {
            kernel,
            watchdog_hz,
            telemetry_hz,
        } = MotorLoopConfig::default();
        Self {
            deadman_ms: kernel.deadman_ms,
            deadband_pw: kernel.deadband_pw,
            neutral_pw: kernel.neutral_pw,
            gain_pw_per_mps: kernel.gain_pw_per_mps,
            trim: kernel.trim,
            max_speed_mps: kernel.max_speed_mps,
            min_pw: kernel.min_pw,
            max_pw: kernel.max_pw,
            watchdog_hz,
            telemetry_hz,
            calibration_file: Some(PathBuf::from(DEFAULT_CALIBRATION_FILE)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImuSection {
    pub enable: bool,
    pub publish_hz: f64,
}

impl Default for ImuSection {
    fn default() -> Self {
        let c = ImuConfig::default();
        Self {
            enable: c.enable,
            publish_hz: c.publish_hz,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub enable: bool,
    pub device: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub latest_only: bool,
}

impl Default for CameraSection {
    fn default() -> Self {
        let c = CameraConfig::default();
        Self {
            enable: c.enable,
            device: c.device,
            width: c.width,
            height: c.height,
            fps: c.fps,
            latest_only: c.latest_only,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraH264Section {
    pub enable: bool,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub bitrate: u32,
    pub chunk_bytes: usize,
}

impl Default for CameraH264Section {
    fn default() -> Self {
        let c = CameraH264Config::default();
        Self {
            enable: c.enable,
            width: c.width,
            height: c.height,
            fps: c.fps,
            bitrate: c.bitrate,
            chunk_bytes: c.chunk_bytes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LidarSection {
    pub enable: bool,
    pub port: String,
    pub publish_hz: f64,
    pub front_window_deg: f64,
    /// `"min"` or `"mean"`; anything else means mean.
    pub front_stat: String,
}

impl Default for LidarSection {
    fn default() -> Self {
        let c = LidarConfig::default();
        Self {
            enable: c.enable,
            port: c.port,
            publish_hz: c.publish_hz,
            front_window_deg: c.front_window_deg,
            front_stat: "mean".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub publish_hz: f64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            publish_hz: HealthConfig::default().publish_hz,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OledSection {
    pub width: u32,
    pub height: u32,
    pub max_hz: f64,
    pub override_s: f64,
    pub default_mode: String,
    pub boot_image: Option<PathBuf>,
    pub motor_image: Option<PathBuf>,
    pub welcome_frames_dir: Option<PathBuf>,
    pub welcome_fps: f64,
    pub welcome_loop: bool,
    pub welcome_on_boot: bool,
    pub mode_switch_frames_dir: Option<PathBuf>,
    pub mode_switch_fps: f64,
    pub eyes_frames_dir: Option<PathBuf>,
    pub eyes_fps: f64,
    pub bitmap_text: bool,
    pub template_modes: Vec<String>,
    pub mode_order: Vec<String>,
}

impl Default for OledSection {
    fn default() -> Self {
        let OledConfig { display, max_hz } = OledConfig::default();
        let assets = display.assets;
        Self {
            width: display.width,
            height: display.height,
            max_hz,
            override_s: display.override_s,
            default_mode: display.default_mode,
            boot_image: assets.boot_image,
            motor_image: assets.motor_image,
            welcome_frames_dir: assets.welcome_frames_dir,
            welcome_fps: assets.welcome_fps,
            welcome_loop: assets.welcome_loop,
            welcome_on_boot: display.welcome_on_boot,
            mode_switch_frames_dir: assets.mode_switch_frames_dir,
            mode_switch_fps: assets.mode_switch_fps,
            eyes_frames_dir: assets.eyes_frames_dir,
            eyes_fps: assets.eyes_fps,
            bitmap_text: display.bitmap_text,
            template_modes: display.template_modes,
            mode_order: display.mode_order,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loading
// ────────────────────────────────────────────────────────────────────────────

/// Load the configuration.
///
/// With `explicit = None` the default path is tried and a missing file
/// yields defaults plus a warning. A missing file named explicitly is an
/// error.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    if !path.exists() {
        if explicit.is_some() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        warn!(path = %path.display(), "config file not found; using defaults");
        let mut cfg = FileConfig::default();
        apply_env_overrides(&mut cfg);
        return Ok(cfg);
    }
    let mut cfg = load_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the file at `path` without applying environment overrides.
pub fn load_from(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `DMC_*` overrides from the process environment.
pub fn apply_env_overrides(cfg: &mut FileConfig) {
    let env: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with("DMC_"))
        .collect();
    apply_overrides(cfg, &env);
}

fn apply_overrides(cfg: &mut FileConfig, env: &HashMap<String, String>) {
    if let Some(v) = env.get("DMC_ROBOT_ID") {
        cfg.robot_id = v.clone();
    }
    if let Some(v) = env.get("DMC_NAMESPACE") {
        cfg.namespace = v.clone();
    }
    if let Some(v) = env.get("DMC_DEADMAN_MS") {
        match v.trim().parse::<u32>() {
            Ok(ms) => cfg.motor.deadman_ms = ms,
            Err(_) => warn!(value = %v, "ignoring invalid DMC_DEADMAN_MS"),
        }
    }
    if let Some(v) = env.get("DMC_BRIDGE_ADDR") {
        match v.trim().parse::<SocketAddr>() {
            Ok(addr) => cfg.transport.bridge_addr = Some(addr),
            Err(_) => warn!(value = %v, "ignoring invalid DMC_BRIDGE_ADDR"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Calibration {
    #[serde(default)]
    trim: Option<f64>,
}

/// Read the trim stored by the motor calibration. A missing file is not an
/// error; an unreadable or malformed one is logged and ignored.
pub fn load_calibrated_trim(path: &Path) -> Option<f64> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read motor calibration");
            return None;
        }
    };
    match serde_json::from_str::<Calibration>(&raw) {
        Ok(cal) => Some(cal.trim.filter(|t| t.is_finite()).unwrap_or(0.0)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed motor calibration");
            None
        }
    }
}

/// Replace `motor.trim` with the calibrated value, when one is stored.
pub fn apply_calibration(cfg: &mut FileConfig) {
    let Some(path) = cfg.motor.calibration_file.as_deref() else {
        return;
    };
    if let Some(trim) = load_calibrated_trim(path) {
        info!(path = %path.display(), trim, "motor trim from calibration");
        cfg.motor.trim = trim;
    }
}

impl FileConfig {
    /// Map the file layout onto the runtime's configuration types.
    pub fn into_node_config(self) -> NodeConfig {
        let m = self.motor;
        let o = self.oled;
        NodeConfig {
            robot_id: self.robot_id,
            namespace: self.namespace,
            transport: TransportConfig {
                bridge_addr: self.transport.bridge_addr,
                capacity: self.transport.capacity,
            },
            motor: MotorLoopConfig {
                kernel: MotorConfig {
                    deadman_ms: m.deadman_ms,
                    deadband_pw: m.deadband_pw,
                    neutral_pw: m.neutral_pw,
                    gain_pw_per_mps: m.gain_pw_per_mps,
                    trim: m.trim,
                    max_speed_mps: m.max_speed_mps,
                    min_pw: m.min_pw,
                    max_pw: m.max_pw,
                },
                watchdog_hz: m.watchdog_hz,
                telemetry_hz: m.telemetry_hz,
            },
            imu: ImuConfig {
                enable: self.imu.enable,
                publish_hz: self.imu.publish_hz,
            },
            camera: CameraConfig {
                enable: self.camera.enable,
                device: self.camera.device,
                width: self.camera.width,
                height: self.camera.height,
                fps: self.camera.fps,
                latest_only: self.camera.latest_only,
            },
            camera_h264: CameraH264Config {
                enable: self.camera_h264.enable,
                width: self.camera_h264.width,
                height: self.camera_h264.height,
                fps: self.camera_h264.fps,
                bitrate: self.camera_h264.bitrate,
                chunk_bytes: self.camera_h264.chunk_bytes.max(1),
            },
            lidar: LidarConfig {
                enable: self.lidar.enable,
                port: self.lidar.port,
                publish_hz: self.lidar.publish_hz,
                front_window_deg: self.lidar.front_window_deg,
                front_stat: FrontStat::parse_lenient(&self.lidar.front_stat),
            },
            health: HealthConfig {
                publish_hz: self.health.publish_hz,
            },
            oled: OledConfig {
                max_hz: o.max_hz,
                display: DisplayConfig {
                    width: o.width,
                    height: o.height,
                    override_s: o.override_s,
                    default_mode: o.default_mode,
                    welcome_on_boot: o.welcome_on_boot,
                    bitmap_text: o.bitmap_text,
                    template_modes: o.template_modes,
                    mode_order: o.mode_order,
                    assets: AssetPaths {
                        boot_image: o.boot_image,
                        motor_image: o.motor_image,
                        welcome_frames_dir: o.welcome_frames_dir,
                        welcome_fps: o.welcome_fps,
                        welcome_loop: o.welcome_loop,
                        mode_switch_frames_dir: o.mode_switch_frames_dir,
                        mode_switch_fps: o.mode_switch_fps,
                        eyes_frames_dir: o.eyes_frames_dir,
                        eyes_fps: o.eyes_fps,
                    },
                },
            },
            settings: self.oled_settings,
        }
    }
}
