use serde::{Deserialize, Serialize};

use crate::quaternion::Quaternion;

/// Position plus orientation of something tracked in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f64; 3],
    pub rotation: Quaternion,
}

impl Pose {
    pub fn new(position: [f64; 3], rotation: Quaternion) -> Self {
        Self {
            position,
            rotation: rotation.renormalize_if_drifted(),
        }
    }

    pub fn identity() -> Self {
        Self {
            position: [0.0; 3],
            rotation: Quaternion::identity(),
        }
    }

    pub fn from_position(position: [f64; 3]) -> Self {
        Self::new(position, Quaternion::identity())
    }

    /// Euclidean distance between the two positions.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        let dx = self.position[0] - other.position[0];
        let dy = self.position[1] - other.position[1];
        let dz = self.position[2] - other.position[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Translation equal, rotation equal up to sign.
    pub fn approx_eq(&self, other: &Pose, tol: f64) -> bool {
        self.position
            .iter()
            .zip(other.position.iter())
            .all(|(a, b)| (a - b).abs() <= tol)
            && self.rotation.same_rotation(other.rotation, tol)
    }
}

/// A pose with per-axis scale, the full content of a wire matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub pose: Pose,
    pub scale: [f64; 3],
}

impl Transform {
    pub fn new(pose: Pose, scale: [f64; 3]) -> Self {
        Self { pose, scale }
    }
}

impl From<Pose> for Transform {
    fn from(pose: Pose) -> Self {
        Self {
            pose,
            scale: [1.0; 3],
        }
    }
}
