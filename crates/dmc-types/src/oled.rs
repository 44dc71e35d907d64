//! Display payloads: override text, mode requests and menu navigation.

use serde::{Deserialize, Serialize};

/// Text override received on `oled/cmd`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OledText {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_ms: Option<u64>,
}

/// Mode-change request received on `oled/mode`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OledModeRequest {
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_ms: Option<u64>,
}

/// What a navigation message asks the display to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavAction {
    /// Move through the mode order.
    Cycle,
    /// Move the settings-menu cursor.
    Step,
    /// Confirm the highlighted settings item.
    Select,
}

/// Navigation input received on `oled/nav`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavCommand {
    pub action: NavAction,
    #[serde(default = "default_delta")]
    pub delta: i32,
}

fn default_delta() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_request_accepts_optional_index() {
        let req: OledModeRequest =
            serde_json::from_str(r#"{"mode":"settings","settings_index":3}"#).unwrap();
        assert_eq!(req.mode, "settings");
        assert_eq!(req.settings_index, Some(3));
    }

    #[test]
    fn nav_delta_defaults_to_one() {
        let nav: NavCommand = serde_json::from_str(r#"{"action":"cycle"}"#).unwrap();
        assert_eq!(nav.action, NavAction::Cycle);
        assert_eq!(nav.delta, 1);
    }

    #[test]
    fn nav_rejects_unknown_action() {
        assert!(serde_json::from_str::<NavCommand>(r#"{"action":"jump"}"#).is_err());
    }
}
