use serde::{Deserialize, Serialize};

use crate::tracking::PlaneOrientation;

/// Which plane orientations the provider should look for.
///
/// Travels as an integer on the wire; unknown values mean `Disabled`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PlaneDetection {
    #[default]
    Disabled,
    Horizontal,
    Vertical,
    Both,
}

impl From<u8> for PlaneDetection {
    fn from(v: u8) -> Self {
        match v {
            1 => PlaneDetection::Horizontal,
            2 => PlaneDetection::Vertical,
            3 => PlaneDetection::Both,
            _ => PlaneDetection::Disabled,
        }
    }
}

impl From<PlaneDetection> for u8 {
    fn from(p: PlaneDetection) -> Self {
        match p {
            PlaneDetection::Disabled => 0,
            PlaneDetection::Horizontal => 1,
            PlaneDetection::Vertical => 2,
            PlaneDetection::Both => 3,
        }
    }
}

impl PlaneDetection {
    pub fn is_enabled(self) -> bool {
        self != PlaneDetection::Disabled
    }

    pub fn accepts(self, orientation: PlaneOrientation) -> bool {
        matches!(
            (self, orientation),
            (PlaneDetection::Both, _)
                | (PlaneDetection::Horizontal, PlaneOrientation::Horizontal)
                | (PlaneDetection::Vertical, PlaneOrientation::Vertical)
        )
    }
}

/// Detection and interaction flags sent by the host with `init`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub face_mesh: bool,
    pub plane_detection_config: PlaneDetection,
    pub show_feature_points: bool,
    pub show_planes: bool,
    pub custom_plane_texture_path: Option<String>,
    pub show_world_origin: bool,
    pub handle_taps: bool,
    pub handle_rotation: bool,
    pub handle_pans: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            face_mesh: true,
            plane_detection_config: PlaneDetection::Disabled,
            show_feature_points: false,
            show_planes: false,
            custom_plane_texture_path: None,
            show_world_origin: false,
            handle_taps: true,
            handle_rotation: false,
            handle_pans: false,
        }
    }
}

impl SessionConfig {
    /// Whether tapped nodes may become selected for gesture transforms.
    pub fn gestures_enabled(&self) -> bool {
        self.handle_rotation || self.handle_pans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_detection_from_wire() {
        assert_eq!(PlaneDetection::from(0), PlaneDetection::Disabled);
        assert_eq!(PlaneDetection::from(3), PlaneDetection::Both);
        assert_eq!(PlaneDetection::from(9), PlaneDetection::Disabled);
    }

    #[test]
    fn test_plane_detection_accepts() {
        assert!(PlaneDetection::Both.accepts(PlaneOrientation::Vertical));
        assert!(PlaneDetection::Horizontal.accepts(PlaneOrientation::Horizontal));
        assert!(!PlaneDetection::Horizontal.accepts(PlaneOrientation::Vertical));
        assert!(!PlaneDetection::Disabled.accepts(PlaneOrientation::Horizontal));
    }

    #[test]
    fn test_config_camel_case_with_defaults() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{"showFeaturePoints": true, "planeDetectionConfig": 1, "handlePans": true}"#,
        )
        .unwrap();
        assert!(cfg.show_feature_points);
        assert_eq!(cfg.plane_detection_config, PlaneDetection::Horizontal);
        assert!(cfg.face_mesh);
        assert!(cfg.gestures_enabled());
    }
}
