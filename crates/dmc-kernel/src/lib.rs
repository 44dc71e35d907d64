//! `dmc-kernel` – safety enforcement.
//!
//! It does not decide where the robot goes; it decides when it must stop.
//!
//! # Modules
//!
//! - [`motor_safety`] – [`MotorController`][motor_safety::MotorController]:
//!   owns the latest [`MotorCommand`][dmc_types::MotorCommand], enforces the
//!   deadman timeout on every watchdog tick and converts velocities to
//!   deadbanded pulse widths.
//! - [`throttle`] – [`LogThrottle`][throttle::LogThrottle]: rate limiter for
//!   log lines emitted from high-frequency paths.

pub mod motor_safety;
pub mod throttle;

pub use motor_safety::{CommandError, MotorConfig, MotorController, PulseMapper, Tick};
pub use throttle::LogThrottle;
