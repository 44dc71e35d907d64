//! Topic key builders.
//!
//! Every key has the shape `<namespace>/<robot_id>/<component>/<direction>`.

use crate::NodeError;

pub const DEFAULT_NAMESPACE: &str = "dmc_robo";

/// Resolved topic prefix for one robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicKeys {
    prefix: String,
}

impl TopicKeys {
    /// Build the key set for `robot_id` under `namespace`.
    ///
    /// `robot_id` must be non-empty and free of `/`. An empty namespace falls
    /// back to [`DEFAULT_NAMESPACE`].
    pub fn new(namespace: &str, robot_id: &str) -> Result<Self, NodeError> {
        let robot_id = robot_id.trim();
        if robot_id.is_empty() || robot_id.contains('/') {
            return Err(NodeError::InvalidRobotId(robot_id.to_string()));
        }
        let namespace = namespace.trim().trim_matches('/');
        let namespace = if namespace.is_empty() { DEFAULT_NAMESPACE } else { namespace };
        Ok(Self {
            prefix: format!("{namespace}/{robot_id}"),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}/{}", self.prefix, suffix)
    }

    pub fn motor_cmd(&self) -> String {
        self.key("motor/cmd")
    }

    pub fn motor_telemetry(&self) -> String {
        self.key("motor/telemetry")
    }

    pub fn imu_state(&self) -> String {
        self.key("imu/state")
    }

    pub fn oled_cmd(&self) -> String {
        self.key("oled/cmd")
    }

    pub fn oled_image_mono1(&self) -> String {
        self.key("oled/image/mono1")
    }

    pub fn oled_mode(&self) -> String {
        self.key("oled/mode")
    }

    pub fn oled_nav(&self) -> String {
        self.key("oled/nav")
    }

    pub fn camera_image_jpeg(&self) -> String {
        self.key("camera/image/jpeg")
    }

    pub fn camera_meta(&self) -> String {
        self.key("camera/meta")
    }

    pub fn camera_video_h264(&self) -> String {
        self.key("camera/video/h264")
    }

    pub fn camera_video_h264_meta(&self) -> String {
        self.key("camera/video/h264/meta")
    }

    pub fn rangesensor_scan(&self) -> String {
        self.key("rangesensor/scan")
    }

    pub fn rangesensor_front(&self) -> String {
        self.key("rangesensor/front")
    }

    pub fn health_state(&self) -> String {
        self.key("health/state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_namespace_robot_component_layout() {
        let keys = TopicKeys::new("dmc_robo", "rb1").unwrap();
        assert_eq!(keys.motor_cmd(), "dmc_robo/rb1/motor/cmd");
        assert_eq!(keys.oled_image_mono1(), "dmc_robo/rb1/oled/image/mono1");
        assert_eq!(keys.rangesensor_front(), "dmc_robo/rb1/rangesensor/front");
        assert_eq!(keys.camera_video_h264_meta(), "dmc_robo/rb1/camera/video/h264/meta");
        assert_eq!(keys.health_state(), "dmc_robo/rb1/health/state");
    }

    #[test]
    fn empty_namespace_uses_default() {
        let keys = TopicKeys::new("", "rb1").unwrap();
        assert_eq!(keys.prefix(), "dmc_robo/rb1");
    }

    #[test]
    fn invalid_robot_ids_are_rejected() {
        assert!(matches!(TopicKeys::new("ns", ""), Err(NodeError::InvalidRobotId(_))));
        assert!(matches!(TopicKeys::new("ns", "a/b"), Err(NodeError::InvalidRobotId(_))));
    }
}
