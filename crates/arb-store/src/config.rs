//! `arb.toml`: bridge cadence, default session flags and the simulated
//! provider's setup.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use arb_core::{SessionConfig, SimulationConfig};

use crate::error::{Result, StoreError};

pub const MAX_FRAME_RATE_HZ: u32 = 240;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub frame_rate_hz: u32,
    pub snapshot_timeout_ms: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            frame_rate_hz: 30,
            snapshot_timeout_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bridge: BridgeSection,
    pub session: SessionConfig,
    pub simulation: SimulationConfig,
}

impl BridgeConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let hz = self.bridge.frame_rate_hz;
        if !(1..=MAX_FRAME_RATE_HZ).contains(&hz) {
            return Err(StoreError::InvalidData(format!(
                "bridge.frame_rate_hz must be within 1..={MAX_FRAME_RATE_HZ}, got {hz}"
            )));
        }
        if self.bridge.snapshot_timeout_ms == 0 {
            return Err(StoreError::InvalidData(
                "bridge.snapshot_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.bridge.frame_rate_hz))
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge.snapshot_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_core::PlaneDetection;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load(&dir.path().join("arb.toml")).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.bridge.frame_rate_hz, 30);
    }

    #[test]
    fn test_parse_all_sections() {
        let config = BridgeConfig::parse(
            r#"
            [bridge]
            frame_rate_hz = 60

            [session]
            showFeaturePoints = true
            planeDetectionConfig = 3

            [simulation]
            seed = 7
            cloud_latency_frames = 5

            [[simulation.cloud_anchors]]
            id = "desk"
            position = [0.0, -0.5, -1.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.bridge.frame_rate_hz, 60);
        assert_eq!(config.bridge.snapshot_timeout_ms, 2000);
        assert!(config.session.show_feature_points);
        assert_eq!(config.session.plane_detection_config, PlaneDetection::Both);
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.cloud_anchors.len(), 1);
        assert_eq!(config.simulation.cloud_anchors[0].rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.frame_interval(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn test_frame_rate_bounds() {
        assert!(BridgeConfig::parse("[bridge]\nframe_rate_hz = 0\n").is_err());
        assert!(BridgeConfig::parse("[bridge]\nframe_rate_hz = 241\n").is_err());
        assert!(BridgeConfig::parse("[bridge]\nframe_rate_hz = 240\n").is_ok());
    }

    #[test]
    fn test_bad_toml_reports_error() {
        let err = BridgeConfig::parse("[bridge\n").unwrap_err();
        assert!(matches!(err, StoreError::Toml(_)));
    }
}
