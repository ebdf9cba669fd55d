//! pose.rs
//! Plain pose data shared by the store, mapper and solvers.

use std::collections::HashMap;
use std::time::Instant;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Position plus unit orientation. Orientation is normalized on every
/// construction path, so a `Pose` never carries a drifted quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn new(position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self { position, orientation }
    }

    /// Builds a pose from an arbitrary (possibly unnormalized) quaternion.
    /// Zero-length or non-finite rotations collapse to identity.
    pub fn from_raw(position: Vector3<f32>, rotation: Quaternion<f32>) -> Self {
        Self {
            position,
            orientation: normalize_or_identity(rotation),
        }
    }

    /// Plain data contract at the boundary: position xyz, rotation xyzw.
    pub fn from_arrays(position: [f32; 3], rotation_xyzw: [f32; 4]) -> Self {
        let [x, y, z, w] = rotation_xyzw;
        Self::from_raw(Vector3::from(position), Quaternion::new(w, x, y, z))
    }

    pub fn to_arrays(&self) -> ([f32; 3], [f32; 4]) {
        let q = self.orientation.quaternion();
        (
            [self.position.x, self.position.y, self.position.z],
            [q.i, q.j, q.k, q.w],
        )
    }
}

pub(crate) fn normalize_or_identity(q: Quaternion<f32>) -> UnitQuaternion<f32> {
    let finite = q.coords.iter().all(|c| c.is_finite());
    if !finite {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::try_new(q, 1e-12).unwrap_or_else(UnitQuaternion::identity)
}

/// One committed state of the capture stream. Immutable once published.
#[derive(Debug, Clone, Default)]
pub struct BoneSnapshot {
    /// Keyed by canonical (lower-camel) bone name.
    pub bones: HashMap<String, Pose>,
    pub root: Pose,
    pub blend_shapes: HashMap<String, f32>,
    /// Time of the last state-changing write, `None` before any.
    pub updated_at: Option<Instant>,
    /// Commit counter, strictly increasing per store.
    pub sequence: u64,
}

impl BoneSnapshot {
    pub fn bone(&self, name: &str) -> Option<&Pose> {
        self.bones.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

/// Bone map handed to the kinematics layer.
pub type BoneMap = HashMap<String, Pose>;
