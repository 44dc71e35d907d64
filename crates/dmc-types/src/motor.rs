//! Motor command and telemetry payloads.

use serde::{Deserialize, Serialize};

/// Velocity unit carried by a [`MotorCommand`]. Only metres per second is
/// accepted; any other string fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpeedUnit {
    #[default]
    #[serde(rename = "mps")]
    Mps,
}

/// Differential-drive velocity command received on `motor/cmd`.
///
/// `deadman_ms` of `0` (or absent on the wire) means "use the node default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    #[serde(rename = "v_l")]
    pub v_left: f64,
    #[serde(rename = "v_r")]
    pub v_right: f64,
    #[serde(default)]
    pub unit: SpeedUnit,
    #[serde(default)]
    pub deadman_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_ms: Option<u64>,
}

impl MotorCommand {
    /// A command with both wheels at the given speeds and every optional
    /// field unset.
    pub fn new(v_left: f64, v_right: f64) -> Self {
        Self {
            v_left,
            v_right,
            unit: SpeedUnit::Mps,
            deadman_ms: 0,
            seq: None,
            ts_ms: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_deadman_ms(mut self, deadman_ms: u32) -> Self {
        self.deadman_ms = deadman_ms;
        self
    }
}

/// Pulse widths (microseconds) for the left and right drive channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PulseWidths {
    pub left_us: u32,
    pub right_us: u32,
}

impl PulseWidths {
    pub const fn new(left_us: u32, right_us: u32) -> Self {
        Self { left_us, right_us }
    }

    /// Both channels at `neutral_us`.
    pub const fn neutral(neutral_us: u32) -> Self {
        Self::new(neutral_us, neutral_us)
    }
}

/// Snapshot published on `motor/telemetry` at a fixed rate.
///
/// `pw_*_raw` carry the converted pulse widths before the deadband collapse;
/// `pw_l` / `pw_r` carry what was actually written to the actuator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorTelemetry {
    #[serde(rename = "pw_l")]
    pub output_left: u32,
    #[serde(rename = "pw_r")]
    pub output_right: u32,
    #[serde(rename = "pw_l_raw")]
    pub output_left_raw: u32,
    #[serde(rename = "pw_r_raw")]
    pub output_right_raw: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_v_l: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_v_r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_unit: Option<SpeedUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_deadman_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_ts_ms: Option<u64>,
    pub ts_ms: u64,
}

impl MotorTelemetry {
    pub fn new(
        output: PulseWidths,
        raw: PulseWidths,
        last_cmd: Option<&MotorCommand>,
        ts_ms: u64,
    ) -> Self {
        Self {
            output_left: output.left_us,
            output_right: output.right_us,
            output_left_raw: raw.left_us,
            output_right_raw: raw.right_us,
            cmd_v_l: last_cmd.map(|c| c.v_left),
            cmd_v_r: last_cmd.map(|c| c.v_right),
            cmd_unit: last_cmd.map(|c| c.unit),
            cmd_deadman_ms: last_cmd.map(|c| c.deadman_ms),
            cmd_seq: last_cmd.and_then(|c| c.seq),
            cmd_ts_ms: last_cmd.and_then(|c| c.ts_ms),
            ts_ms,
        }
    }

    /// The pulse widths that were written.
    pub fn output(&self) -> PulseWidths {
        PulseWidths::new(self.output_left, self.output_right)
    }
}

/// Velocity magnitude below which a wheel counts as stationary.
pub const MOVING_EPSILON_MPS: f64 = 1e-3;

/// Whether the robot is being actively driven right now.
///
/// There is no actuation feedback, so this is a heuristic over the last
/// command: it must still be inside its deadman window and ask at least one
/// wheel to move.
pub fn is_actively_commanded(
    last_cmd: Option<&MotorCommand>,
    last_cmd_ms: Option<u64>,
    deadman_ms: u64,
    now_ms: u64,
) -> bool {
    let (Some(cmd), Some(at)) = (last_cmd, last_cmd_ms) else {
        return false;
    };
    let fresh = now_ms.saturating_sub(at) <= deadman_ms;
    let moving = cmd.v_left.abs() > MOVING_EPSILON_MPS || cmd.v_right.abs() > MOVING_EPSILON_MPS;
    fresh && moving
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_decodes_with_defaults() {
        let cmd: MotorCommand = serde_json::from_str(r#"{"v_l":0.2,"v_r":-0.1}"#).unwrap();
        assert!((cmd.v_left - 0.2).abs() < f64::EPSILON);
        assert!((cmd.v_right + 0.1).abs() < f64::EPSILON);
        assert_eq!(cmd.unit, SpeedUnit::Mps);
        assert_eq!(cmd.deadman_ms, 0);
        assert!(cmd.seq.is_none());
    }

    #[test]
    fn command_missing_velocity_is_rejected() {
        assert!(serde_json::from_str::<MotorCommand>(r#"{"v_l":0.2,"deadman_ms":300}"#).is_err());
    }

    #[test]
    fn command_unknown_unit_is_rejected() {
        let raw = r#"{"v_l":0.2,"v_r":0.2,"unit":"rpm"}"#;
        assert!(serde_json::from_str::<MotorCommand>(raw).is_err());
    }

    #[test]
    fn actively_commanded_needs_fresh_nonzero_command() {
        let moving = MotorCommand::new(0.2, 0.0);
        let still = MotorCommand::new(0.0, 0.0);
        assert!(is_actively_commanded(Some(&moving), Some(1000), 300, 1200));
        assert!(!is_actively_commanded(Some(&moving), Some(1000), 300, 1301));
        assert!(!is_actively_commanded(Some(&still), Some(1000), 300, 1100));
        assert!(!is_actively_commanded(None, None, 300, 0));
    }

    #[test]
    fn telemetry_omits_command_fields_without_command() {
        let telemetry = MotorTelemetry::new(
            PulseWidths::neutral(1500),
            PulseWidths::neutral(1500),
            None,
            42,
        );
        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["pw_l"], 1500);
        assert_eq!(json["ts_ms"], 42);
        assert!(json.get("cmd_v_l").is_none());
    }

    #[test]
    fn telemetry_echoes_last_command() {
        let cmd = MotorCommand::new(0.3, 0.1).with_seq(7);
        let telemetry = MotorTelemetry::new(
            PulseWidths::new(1650, 1450),
            PulseWidths::new(1650, 1450),
            Some(&cmd),
            1,
        );
        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["cmd_seq"], 7);
        assert_eq!(json["cmd_unit"], "mps");
        assert_eq!(json["pw_r_raw"], 1450);
    }
}
