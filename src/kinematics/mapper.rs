//! mapper.rs
//! Capture space (left-handed, Y-up) to robot space (right-handed, Z-up).
//!
//! This is the only place a basis change happens. Everything downstream of
//! [`CoordinateMapper`] treats poses as robot-space.
//!
//! Order of operations:
//! 1. basis change on position (`C·p`) and orientation (`C·R·Cᵀ`)
//! 2. uniform scale on position
//! 3. rotation offset pre-multiplied (world frame)
//! 4. position offset added

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};

use crate::capture::pose::{BoneMap, Pose, normalize_or_identity};
use crate::config::MapperConfig;

/// Capture-to-robot basis: x_r = z_c, y_r = -x_c, z_r = y_c. Determinant -1
/// (it flips handedness), so orientations go through conjugation rather than
/// a plain product.
#[rustfmt::skip]
fn capture_to_robot() -> Matrix3<f32> {
    Matrix3::new(
         0.0, 0.0, 1.0,
        -1.0, 0.0, 0.0,
         0.0, 1.0, 0.0,
    )
}

pub fn position_to_robot(p: &Vector3<f32>) -> Vector3<f32> {
    Vector3::new(p.z, -p.x, p.y)
}

pub fn orientation_to_robot(q: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    let c = capture_to_robot();
    let r = c * q.to_rotation_matrix().into_inner() * c.transpose();
    // C·R·Cᵀ is orthonormal with det +1 for orthonormal C and proper R
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r))
}

/// Maps one pose. `rotation_offset` is pre-multiplied onto the converted
/// orientation; `position_offset` is added after scaling.
pub fn map_pose(
    pose: &Pose,
    scale: f32,
    apply_coord_transform: bool,
    position_offset: &Vector3<f32>,
    rotation_offset: &UnitQuaternion<f32>,
) -> Pose {
    let (mut position, mut orientation) = if apply_coord_transform {
        (position_to_robot(&pose.position), orientation_to_robot(&pose.orientation))
    } else {
        (pose.position, pose.orientation)
    };

    if scale != 1.0 {
        position *= scale;
    }
    orientation = normalize_or_identity((rotation_offset * orientation).into_inner());
    position += position_offset;

    Pose::new(position, orientation)
}

/// [`map_pose`] bound to a fixed configuration.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    scale: f32,
    apply_coord_transform: bool,
    position_offset: Vector3<f32>,
    rotation_offset: UnitQuaternion<f32>,
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self::new(&MapperConfig::default())
    }
}

impl CoordinateMapper {
    pub fn new(cfg: &MapperConfig) -> Self {
        let [x, y, z, w] = cfg.rotation_offset;
        Self {
            scale: cfg.scale,
            apply_coord_transform: cfg.apply_coord_transform,
            position_offset: Vector3::from(cfg.position_offset),
            rotation_offset: normalize_or_identity(Quaternion::new(w, x, y, z)),
        }
    }

    pub fn map(&self, pose: &Pose) -> Pose {
        map_pose(
            pose,
            self.scale,
            self.apply_coord_transform,
            &self.position_offset,
            &self.rotation_offset,
        )
    }

    /// Maps every bone, keeping the names.
    pub fn map_bones(&self, bones: &BoneMap) -> BoneMap {
        bones
            .iter()
            .map(|(name, pose)| (name.clone(), self.map(pose)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-5;

    fn close(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        (a - b).norm() < EPS
    }

    #[test]
    fn axes_permute_as_documented() {
        // capture forward (+z) is robot forward (+x); capture up (+y) is robot up (+z)
        assert!(close(&position_to_robot(&Vector3::new(0.0, 0.0, 1.0)), &Vector3::x()));
        assert!(close(&position_to_robot(&Vector3::new(0.0, 1.0, 0.0)), &Vector3::z()));
        assert!(close(&position_to_robot(&Vector3::new(1.0, 0.0, 0.0)), &-Vector3::y()));
    }

    #[test]
    fn orientation_follows_the_same_basis_change() {
        // rotating a capture vector then converting must equal converting
        // both the rotation and the vector
        let q = UnitQuaternion::from_euler_angles(0.3, -0.7, 1.1);
        let v = Vector3::new(0.2, -0.5, 0.9);
        let lhs = position_to_robot(&(q * v));
        let rhs = orientation_to_robot(&q) * position_to_robot(&v);
        assert!(close(&lhs, &rhs));
    }

    #[test]
    fn conversion_preserves_composition() {
        let a = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let b = UnitQuaternion::from_euler_angles(-0.4, 0.5, -0.6);
        let lhs = orientation_to_robot(&(a * b));
        let rhs = orientation_to_robot(&a) * orientation_to_robot(&b);
        assert!(lhs.angle_to(&rhs) < 1e-4);
    }

    #[test]
    fn scale_then_offsets() {
        let pose = Pose::new(Vector3::new(0.0, 0.0, 1.0), UnitQuaternion::identity());
        let rot = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let out = map_pose(&pose, 2.0, true, &Vector3::new(0.0, 0.0, 0.5), &rot);
        // (0,0,1) -> (1,0,0) -> scaled (2,0,0) -> +offset
        assert!(close(&out.position, &Vector3::new(2.0, 0.0, 0.5)));
        assert!(out.orientation.angle_to(&rot) < 1e-5);
    }

    #[test]
    fn rotation_offset_is_world_frame() {
        let local = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.4);
        let offset = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.9);
        let pose = Pose::new(Vector3::zeros(), local);
        let out = map_pose(&pose, 1.0, false, &Vector3::zeros(), &offset);
        assert!(out.orientation.angle_to(&(offset * local)) < 1e-5);
        assert!(out.orientation.angle_to(&(local * offset)) > 1e-3);
    }

    #[test]
    fn mapper_maps_whole_bone_map() {
        let mapper = CoordinateMapper::new(&MapperConfig {
            scale: 0.5,
            ..MapperConfig::default()
        });
        let mut bones = BoneMap::new();
        bones.insert("leftHand".into(), Pose::new(Vector3::new(2.0, 4.0, 6.0), UnitQuaternion::identity()));
        let mapped = mapper.map_bones(&bones);
        let hand = mapped.get("leftHand").expect("kept name");
        assert!(close(&hand.position, &Vector3::new(3.0, -1.0, 2.0)));
        assert!((hand.orientation.quaternion().norm() - 1.0).abs() < 1e-6);
    }
}
