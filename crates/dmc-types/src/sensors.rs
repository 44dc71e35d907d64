//! Outbound sensor and health payloads.

use serde::{Deserialize, Serialize};

/// One IMU reading: gyro in rad/s, accelerometer in m/s².
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSample {
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub ts_ms: u64,
}

/// Per-frame camera metadata published next to the JPEG bytes.
///
/// The `*_mono_ms` fields are on the node's monotonic clock, the `*_ts_ms`
/// fields on the wall clock. `pipeline_ms` spans capture start to publish.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub seq: u64,
    pub ts_ms: u64,
    pub capture_ts_ms: u64,
    pub publish_ts_ms: u64,
    pub pipeline_ms: u64,
    pub capture_mono_ms: u64,
    pub publish_mono_ms: u64,
    pub capture_start_mono_ms: u64,
    pub capture_end_mono_ms: u64,
    pub read_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encode_ms: Option<u64>,
}

/// Metadata published after each H.264 chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct H264Meta {
    /// Always `"h264"`.
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub bitrate: u32,
    pub seq: u64,
    pub ts_ms: u64,
    /// Size of the chunk this entry describes.
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangePoint {
    pub angle_rad: f64,
    pub range_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
}

/// A full 2-D range scan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RangeScan {
    pub seq: u64,
    pub ts_ms: u64,
    pub points: Vec<RangePoint>,
}

/// Reduction applied to the points inside the front window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontStat {
    #[default]
    Mean,
    Min,
}

impl FrontStat {
    /// `"min"` selects [`FrontStat::Min`]; anything else is the mean.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("min") {
            FrontStat::Min
        } else {
            FrontStat::Mean
        }
    }
}

/// Distance straight ahead, derived from a [`RangeScan`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeFront {
    pub seq: u64,
    pub ts_ms: u64,
    pub window_deg: f64,
    pub stat: FrontStat,
    pub distance_m: f64,
    pub samples: usize,
}

impl RangeScan {
    /// Reduce the points within `±window_deg/2` of straight ahead.
    ///
    /// Returns `None` when no valid point (range > 0) falls in the window.
    pub fn front(&self, window_deg: f64, stat: FrontStat) -> Option<RangeFront> {
        let half = window_deg.abs() / 2.0;
        let ranges: Vec<f64> = self
            .points
            .iter()
            .filter(|p| p.range_m > 0.0 && p.range_m.is_finite())
            .filter(|p| p.angle_rad.to_degrees().abs() <= half)
            .map(|p| p.range_m)
            .collect();
        if ranges.is_empty() {
            return None;
        }
        let distance_m = match stat {
            FrontStat::Min => ranges.iter().copied().fold(f64::INFINITY, f64::min),
            FrontStat::Mean => ranges.iter().sum::<f64>() / ranges.len() as f64,
        };
        Some(RangeFront {
            seq: self.seq,
            ts_ms: self.ts_ms,
            window_deg,
            stat,
            distance_m,
            samples: ranges.len(),
        })
    }
}

/// Heartbeat published on `health/state`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    pub uptime_s: f64,
    pub ts_ms: u64,
}
