//! `dmc-runtime` – runs the robot control node.
//!
//! Takes the pieces from the lower crates (session, devices, motor
//! controller, display controller) and drives them with one task per
//! periodic responsibility.
//!
//! # Modules
//!
//! - [`node`] – [`RobotNode`]: start-up wiring, inbound topic callbacks and
//!   ordered shutdown; [`HealthNode`] for the heartbeat-only process.
//! - [`loops`] – the periodic loops: motor watchdog and telemetry, IMU,
//!   camera (single loop or `latest_only` capture/publish pair), H.264
//!   stream, range sensor, health heartbeat and display render.
//! - [`settings_actions`] – [`SettingsActionRunner`]: per-label cooldown,
//!   command resolution, dry-run and detached execution for the settings
//!   menu.
//! - [`timing`] – [`Ticker`][timing::Ticker], a fixed-rate sleeper that
//!   wakes early on shutdown.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.
//!
//! # Safety
//!
//! The motor watchdog never depends on the session: with the transport gone
//! it keeps ticking and still stops the motors once the deadman expires.

pub mod loops;
pub mod node;
pub mod settings_actions;
pub mod telemetry;
pub mod timing;

pub use node::{
    CameraConfig, CameraH264Config, HealthConfig, HealthNode, ImuConfig, LidarConfig,
    MotorLoopConfig, NodeConfig, NodeOptions, OledConfig, RobotNode, TransportConfig,
};
pub use settings_actions::{ActionError, ActionOutcome, SettingsActionRunner, SettingsConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
