//! Flat 16-element column-major matrix <-> [`Pose`] / [`Transform`].
//!
//! Element `(row, col)` lives at index `col * 4 + row`. The translation is
//! the last column; the upper-left 3x3 block carries rotation times scale.

use crate::constants::{DETERMINANT_EPSILON, MATRIX_LEN};
use crate::error::{ArError, Result};
use crate::pose::{Pose, Transform};
use crate::quaternion::{Matrix3, Quaternion};

/// Encode a pose as a unit-scale wire matrix.
pub fn encode(pose: &Pose) -> [f64; MATRIX_LEN] {
    encode_transform(&Transform::from(*pose))
}

/// Encode a pose with scale as a wire matrix.
pub fn encode_transform(transform: &Transform) -> [f64; MATRIX_LEN] {
    let r = transform.pose.rotation.to_rotation_matrix();
    let mut out = [0.0; MATRIX_LEN];
    for col in 0..3 {
        for row in 0..3 {
            out[col * 4 + row] = r[row][col] * transform.scale[col];
        }
    }
    out[12] = transform.pose.position[0];
    out[13] = transform.pose.position[1];
    out[14] = transform.pose.position[2];
    out[15] = 1.0;
    out
}

/// Decode a wire matrix into a pose, discarding scale.
pub fn decode(values: &[f64]) -> Result<Pose> {
    decode_transform(values).map(|t| t.pose)
}

/// Decode a wire matrix into translation, rotation and scale.
///
/// Column norms give the scale; the remaining block is orthonormalized
/// (Gram-Schmidt) before conversion so sensor drift in the matrix never
/// produces a non-unit quaternion. Reflections are folded into a negative
/// x scale.
pub fn decode_transform(values: &[f64]) -> Result<Transform> {
    if values.len() != MATRIX_LEN {
        return Err(ArError::MalformedTransform(format!(
            "expected {MATRIX_LEN} values, got {}",
            values.len()
        )));
    }
    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return Err(ArError::MalformedTransform(format!(
            "non-finite value at index {idx}"
        )));
    }

    let mut cols = [[0.0; 3]; 3];
    for (c, col) in cols.iter_mut().enumerate() {
        for (r, v) in col.iter_mut().enumerate() {
            *v = values[c * 4 + r];
        }
    }

    let det = dot(cols[0], cross(cols[1], cols[2]));
    if det.abs() < DETERMINANT_EPSILON {
        return Err(ArError::MalformedTransform(format!(
            "rotation block is not invertible (det = {det:e})"
        )));
    }

    let mut scale = [length(cols[0]), length(cols[1]), length(cols[2])];
    if det < 0.0 {
        scale[0] = -scale[0];
        cols[0] = [-cols[0][0], -cols[0][1], -cols[0][2]];
    }

    let x = normalized(cols[0]);
    let y_raw = sub(cols[1], mul(x, dot(x, cols[1])));
    let y = normalized(y_raw);
    let z = cross(x, y);

    let m: Matrix3 = [
        [x[0], y[0], z[0]],
        [x[1], y[1], z[1]],
        [x[2], y[2], z[2]],
    ];
    let rotation = Quaternion::from_rotation_matrix(&m).renormalize_if_drifted();

    Ok(Transform {
        pose: Pose {
            position: [values[12], values[13], values[14]],
            rotation,
        },
        scale,
    })
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn mul(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn length(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

fn normalized(a: [f64; 3]) -> [f64; 3] {
    let len = length(a);
    [a[0] / len, a[1] / len, a[2] / len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    fn arb_pose() -> impl Strategy<Value = Pose> {
        (
            prop::array::uniform3(-100.0f64..100.0),
            prop::array::uniform4(-1.0f64..1.0),
        )
            .prop_filter("rotation needs a non-zero quaternion", |(_, q)| {
                q.iter().map(|v| v * v).sum::<f64>() > 1e-3
            })
            .prop_map(|(position, q)| Pose::new(position, Quaternion::new(q[0], q[1], q[2], q[3])))
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(pose in arb_pose()) {
            let decoded = decode(&encode(&pose)).unwrap();
            prop_assert_eq!(decoded.position, pose.position);
            prop_assert!(
                decoded.rotation.same_rotation(pose.rotation, 1e-9),
                "rotation mismatch: {:?} vs {:?}", decoded.rotation, pose.rotation
            );
        }

        #[test]
        fn scale_survives_roundtrip(
            pose in arb_pose(),
            scale in prop::array::uniform3(0.1f64..10.0),
        ) {
            let t = decode_transform(&encode_transform(&Transform::new(pose, scale))).unwrap();
            for i in 0..3 {
                prop_assert!((t.scale[i] - scale[i]).abs() < 1e-9);
            }
            prop_assert!(t.pose.rotation.same_rotation(pose.rotation, 1e-9));
        }
    }

    #[test]
    fn test_identity_layout() {
        let m = encode(&Pose::from_position([1.0, 2.0, 3.0]));
        assert_eq!(
            m,
            [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                1.0, 2.0, 3.0, 1.0,
            ]
        );
    }

    #[test]
    fn test_column_major_rotation() {
        // 90° about Z: first column is the image of +X, i.e. +Y
        let pose = Pose::new([0.0; 3], Quaternion::from_axis_angle([0.0, 0.0, 1.0], FRAC_PI_2));
        let m = encode(&pose);
        assert_relative_eq!(m[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(m[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(m[4], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = decode(&[0.0; 12]).unwrap_err();
        assert!(matches!(err, ArError::MalformedTransform(_)));
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_singular_block_rejected() {
        let mut m = encode(&Pose::identity());
        // Collapse the z column
        m[8] = 0.0;
        m[9] = 0.0;
        m[10] = 0.0;
        let err = decode(&m).unwrap_err();
        assert!(matches!(err, ArError::MalformedTransform(msg) if msg.contains("invertible")));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut m = encode(&Pose::identity());
        m[13] = f64::NAN;
        assert!(decode(&m).is_err());
    }

    #[test]
    fn test_drifted_block_is_orthonormalized() {
        let mut m = encode(&Pose::identity());
        // Small shear a noisy sensor could introduce
        m[4] = 0.01;
        let pose = decode(&m).unwrap();
        assert!((pose.rotation.norm() - 1.0).abs() < 1e-12);
        assert!(pose.rotation.angular_distance(Quaternion::identity()) < 0.02);
    }

    #[test]
    fn test_reflection_folds_into_scale() {
        let mut m = encode(&Pose::identity());
        m[0] = -1.0;
        let t = decode_transform(&m).unwrap();
        assert_relative_eq!(t.scale[0], -1.0, epsilon = 1e-12);
        assert!(t.pose.rotation.same_rotation(Quaternion::identity(), 1e-12));
    }
}
