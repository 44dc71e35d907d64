//! `dmc-types` – shared vocabulary of the robot control node.
//!
//! Every payload that crosses the transport is defined here together with the
//! topic key builders and the node-wide error type.
//!
//! # Modules
//!
//! - [`clock`] – monotonic and wall-clock millisecond sources.
//! - [`motor`] – inbound [`MotorCommand`] and outbound [`MotorTelemetry`].
//! - [`oled`] – display override text, mode requests and navigation input.
//! - [`sensors`] – IMU, camera, range-sensor and health payloads.
//! - [`topics`] – [`TopicKeys`]: `<namespace>/<robot_id>/<component>/<direction>`.

pub mod clock;
pub mod motor;
pub mod oled;
pub mod sensors;
pub mod topics;

pub use clock::{monotonic_ms, wall_clock_ms};
pub use motor::{
    MotorCommand, MotorTelemetry, PulseWidths, SpeedUnit, is_actively_commanded,
};
pub use oled::{NavAction, NavCommand, OledModeRequest, OledText};
pub use sensors::{
    CameraMeta, FrontStat, H264Meta, HealthState, ImuSample, RangeFront, RangePoint, RangeScan,
};
pub use topics::{DEFAULT_NAMESPACE, TopicKeys};

use thiserror::Error;

/// Node-wide error type spanning payload decoding, transport and device faults.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Invalid payload on {topic}: {details}")]
    InvalidPayload { topic: String, details: String },

    #[error("Invalid robot_id {0:?}: must be non-empty and must not contain '/'")]
    InvalidRobotId(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

/// Decode a JSON object payload into `T`.
///
/// An empty payload is treated as `{}` so that messages made only of optional
/// fields still decode.
pub fn decode_json<T: serde::de::DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T, NodeError> {
    let payload: &[u8] = if payload.is_empty() { b"{}" } else { payload };
    serde_json::from_slice(payload).map_err(|e| NodeError::InvalidPayload {
        topic: topic.to_string(),
        details: e.to_string(),
    })
}

/// Encode `value` as compact JSON bytes.
pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, NodeError> {
    serde_json::to_vec(value).map_err(|e| NodeError::Serialization(e.to_string()))
}
