//! [`MotorController`] – deadman watchdog for the drive motors.
//!
//! Message callbacks hand every inbound command to
//! [`MotorController::on_command`]; the watchdog loop calls
//! [`MotorController::tick`] at a fixed rate. A tick either drives the wheels
//! from the latest command or, once `deadman_ms` has elapsed since that
//! command was accepted, writes the stop output.
//!
//! | Input | Effect on the deadline |
//! |---|---|
//! | valid command | replaces the previous one, deadline restarts |
//! | malformed / out-of-range command | rejected, deadline untouched |
//! | silence or transport loss | deadline runs out, stop is written |
//!
//! State lives behind one lock and the actuator behind another; the state
//! lock is never held while the actuator is written.

use std::sync::{Mutex, MutexGuard};

use dmc_hal::{HalError, MotorActuator};
use dmc_types::{MotorCommand, MotorTelemetry, NodeError, PulseWidths, decode_json};
use thiserror::Error;
use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Motor mapping and safety parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorConfig {
    /// Default stop latency, used when a command carries `deadman_ms = 0`.
    pub deadman_ms: u32,
    /// Pulse offsets within this distance of neutral collapse to neutral.
    pub deadband_pw: u32,
    pub neutral_pw: u32,
    pub gain_pw_per_mps: f64,
    /// Left/right balance in `[-1, 1]`; positive slows the left wheel.
    pub trim: f64,
    pub max_speed_mps: f64,
    pub min_pw: u32,
    pub max_pw: u32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            deadman_ms: 300,
            deadband_pw: 0,
            neutral_pw: 1500,
            gain_pw_per_mps: 500.0,
            trim: 0.0,
            max_speed_mps: 1.0,
            min_pw: 1000,
            max_pw: 2000,
        }
    }
}

/// Why a command was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("malformed motor command: {0}")]
    Malformed(#[from] NodeError),

    #[error("{side} velocity is not finite")]
    NonFinite { side: &'static str },

    #[error("{side} velocity {value} m/s exceeds limit {max} m/s")]
    OverSpeed {
        side: &'static str,
        value: f64,
        max: f64,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Velocity → pulse width
// ────────────────────────────────────────────────────────────────────────────

/// Converts wheel velocities to pulse widths. The right channel is mirrored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseMapper {
    neutral_pw: u32,
    gain: f64,
    trim: f64,
    min_pw: u32,
    max_pw: u32,
    deadband_pw: u32,
}

impl PulseMapper {
    pub fn from_config(config: &MotorConfig) -> Self {
        let (min_pw, max_pw) = if config.min_pw <= config.max_pw {
            (config.min_pw, config.max_pw)
        } else {
            (config.max_pw, config.min_pw)
        };
        Self {
            neutral_pw: config.neutral_pw.clamp(min_pw, max_pw),
            gain: config.gain_pw_per_mps,
            trim: config.trim.clamp(-1.0, 1.0),
            min_pw,
            max_pw,
            deadband_pw: config.deadband_pw,
        }
    }

    pub fn stop(&self) -> PulseWidths {
        PulseWidths::neutral(self.neutral_pw)
    }

    /// Clamped pulse widths before the deadband is applied.
    pub fn raw(&self, v_left: f64, v_right: f64) -> PulseWidths {
        let neutral = f64::from(self.neutral_pw);
        let left = neutral + v_left * (1.0 - self.trim) * self.gain;
        let right = neutral - v_right * (1.0 + self.trim) * self.gain;
        PulseWidths::new(self.clamp(left), self.clamp(right))
    }

    /// Collapse near-neutral channels to exactly neutral.
    pub fn apply_deadband(&self, raw: PulseWidths) -> PulseWidths {
        let collapse = |pw: u32| {
            if pw.abs_diff(self.neutral_pw) <= self.deadband_pw {
                self.neutral_pw
            } else {
                pw
            }
        };
        PulseWidths::new(collapse(raw.left_us), collapse(raw.right_us))
    }

    fn clamp(&self, pw: f64) -> u32 {
        pw.round()
            .clamp(f64::from(self.min_pw), f64::from(self.max_pw)) as u32
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one watchdog tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The latest command is still inside its window; these pulses were written.
    Drive(PulseWidths),
    /// No live command; the stop output was written.
    Stop,
    /// The deadman fired on this tick; the stop output was written.
    DeadmanStop,
}

#[derive(Debug, Default)]
struct MotorState {
    last_cmd: Option<MotorCommand>,
    last_cmd_ms: Option<u64>,
    stopped_by_deadman: bool,
    output: PulseWidths,
    raw: PulseWidths,
}

pub struct MotorController {
    config: MotorConfig,
    mapper: PulseMapper,
    state: Mutex<MotorState>,
    actuator: Mutex<Option<Box<dyn MotorActuator>>>,
    print_pw: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MotorController {
    pub fn new(config: MotorConfig, actuator: Box<dyn MotorActuator>) -> Self {
        let mapper = PulseMapper::from_config(&config);
        let stop = mapper.stop();
        Self {
            config,
            mapper,
            state: Mutex::new(MotorState {
                output: stop,
                raw: stop,
                ..MotorState::default()
            }),
            actuator: Mutex::new(Some(actuator)),
            print_pw: false,
        }
    }

    /// Log every actuator write at info level.
    pub fn with_print_pulsewidths(mut self, enabled: bool) -> Self {
        self.print_pw = enabled;
        self
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Deadman window of `cmd`, falling back to the configured default.
    pub fn effective_deadman_ms(&self, cmd: Option<&MotorCommand>) -> u64 {
        match cmd {
            Some(c) if c.deadman_ms > 0 => u64::from(c.deadman_ms),
            _ => u64::from(self.config.deadman_ms),
        }
    }

    /// Check a command against the speed limits.
    pub fn validate(&self, cmd: &MotorCommand) -> Result<(), CommandError> {
        for (side, value) in [("left", cmd.v_left), ("right", cmd.v_right)] {
            if !value.is_finite() {
                return Err(CommandError::NonFinite { side });
            }
            if value.abs() > self.config.max_speed_mps {
                return Err(CommandError::OverSpeed {
                    side,
                    value,
                    max: self.config.max_speed_mps,
                });
            }
        }
        Ok(())
    }

    /// Accept `cmd` as the latest command, received at `now_ms`.
    ///
    /// A rejected command leaves the previous command and its deadline in
    /// force.
    pub fn on_command(&self, cmd: MotorCommand, now_ms: u64) -> Result<(), CommandError> {
        self.validate(&cmd)?;
        let mut state = lock(&self.state);
        state.last_cmd = Some(cmd);
        state.last_cmd_ms = Some(now_ms);
        state.stopped_by_deadman = false;
        Ok(())
    }

    /// Decode a raw `motor/cmd` payload and hand it to [`Self::on_command`].
    pub fn on_payload(
        &self,
        topic: &str,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<MotorCommand, CommandError> {
        let cmd: MotorCommand = decode_json(topic, payload)?;
        self.on_command(cmd.clone(), now_ms)?;
        Ok(cmd)
    }

    /// Behave as if a zero-velocity command had just arrived, so the deadman
    /// path runs without any input.
    pub fn prime(&self, now_ms: u64) {
        let mut state = lock(&self.state);
        state.last_cmd = Some(MotorCommand::new(0.0, 0.0));
        state.last_cmd_ms = Some(now_ms);
        state.stopped_by_deadman = false;
    }

    /// One watchdog step at `now_ms`: decide the output, then write it.
    ///
    /// The returned [`Tick`] reports the decision even when the write
    /// itself failed; the write error is returned alongside.
    pub fn tick(&self, now_ms: u64) -> (Tick, Result<(), HalError>) {
        let (tick, output) = {
            let mut state = lock(&self.state);
            let deadman = self.effective_deadman_ms(state.last_cmd.as_ref());
            let live = match (&state.last_cmd, state.last_cmd_ms) {
                (Some(cmd), Some(at)) if now_ms.saturating_sub(at) < deadman => Some(cmd.clone()),
                _ => None,
            };
            match live {
                Some(cmd) => {
                    let raw = self.mapper.raw(cmd.v_left, cmd.v_right);
                    let output = self.mapper.apply_deadband(raw);
                    state.raw = raw;
                    state.output = output;
                    (Tick::Drive(output), output)
                }
                None => {
                    let stop = self.mapper.stop();
                    state.raw = stop;
                    state.output = stop;
                    let fired = state.last_cmd_ms.is_some() && !state.stopped_by_deadman;
                    if fired {
                        state.stopped_by_deadman = true;
                        warn!(deadman_ms = deadman, "deadman timeout -> motor stop");
                        (Tick::DeadmanStop, stop)
                    } else {
                        (Tick::Stop, stop)
                    }
                }
            }
        };
        (tick, self.write(output))
    }

    /// Whether the last tick stopped the motors because the deadman fired.
    pub fn stopped_by_deadman(&self) -> bool {
        lock(&self.state).stopped_by_deadman
    }

    /// The latest accepted command and the monotonic time it was accepted.
    pub fn last_command(&self) -> (Option<MotorCommand>, Option<u64>) {
        let state = lock(&self.state);
        (state.last_cmd.clone(), state.last_cmd_ms)
    }

    /// Telemetry snapshot stamped with wall-clock `ts_ms`.
    pub fn telemetry(&self, ts_ms: u64) -> MotorTelemetry {
        let state = lock(&self.state);
        MotorTelemetry::new(state.output, state.raw, state.last_cmd.as_ref(), ts_ms)
    }

    /// Write the stop output and release the actuator. Later calls are no-ops.
    pub fn shutdown(&self) -> Result<(), HalError> {
        let Some(mut actuator) = lock(&self.actuator).take() else {
            return Ok(());
        };
        let stop = self.mapper.stop();
        {
            let mut state = lock(&self.state);
            state.output = stop;
            state.raw = stop;
        }
        let written = actuator.write(stop);
        let released = actuator.release();
        info!("motor stopped and released");
        written.and(released)
    }

    fn write(&self, pulses: PulseWidths) -> Result<(), HalError> {
        let mut guard = lock(&self.actuator);
        let Some(actuator) = guard.as_mut() else {
            return Err(HalError::Unavailable("motor".to_string()));
        };
        if self.print_pw {
            info!(pw_l = pulses.left_us, pw_r = pulses.right_us, "motor pulsewidth");
        }
        actuator.write(pulses)
    }
}
