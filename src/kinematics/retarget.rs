//! retarget.rs
//! Closed-form arm retargeting: shoulder yaw/pitch and elbow flex straight
//! from three bone positions, expressed in the chest's local frame.

use nalgebra::{UnitQuaternion, Vector3};

use crate::capture::bones;
use crate::capture::pose::BoneMap;
use crate::config::RetargetConfig;
use crate::control::bus::JointCommands;

pub const L_YAW: &str = "left_shoulder_yaw_joint";
pub const L_PITCH: &str = "left_shoulder_pitch_joint";
pub const L_ELBOW: &str = "left_elbow_joint";
pub const R_YAW: &str = "right_shoulder_yaw_joint";
pub const R_PITCH: &str = "right_shoulder_pitch_joint";
pub const R_ELBOW: &str = "right_elbow_joint";

/// Bone vectors shorter than this carry no direction.
const MIN_SEGMENT: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// (upper arm, lower arm, hand) canonical bone names.
    pub fn bones(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Side::Left => (bones::LEFT_UPPER_ARM, bones::LEFT_LOWER_ARM, bones::LEFT_HAND),
            Side::Right => (bones::RIGHT_UPPER_ARM, bones::RIGHT_LOWER_ARM, bones::RIGHT_HAND),
        }
    }

    /// (yaw, pitch, elbow) joint names.
    pub fn joints(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Side::Left => (L_YAW, L_PITCH, L_ELBOW),
            Side::Right => (R_YAW, R_PITCH, R_ELBOW),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub elbow: f32,
}

impl ArmAngles {
    pub fn write_into(&self, side: Side, out: &mut JointCommands) {
        let (yaw, pitch, elbow) = side.joints();
        out.insert(yaw.to_string(), self.yaw);
        out.insert(pitch.to_string(), self.pitch);
        out.insert(elbow.to_string(), self.elbow);
    }
}

#[derive(Debug, Clone)]
pub struct ArmRetargeter {
    elbow_sign_left: f32,
    elbow_sign_right: f32,
}

impl Default for ArmRetargeter {
    fn default() -> Self {
        Self::new(&RetargetConfig::default())
    }
}

impl ArmRetargeter {
    pub fn new(cfg: &RetargetConfig) -> Self {
        Self {
            elbow_sign_left: cfg.elbow_sign_left,
            elbow_sign_right: cfg.elbow_sign_right,
        }
    }

    /// Commands for both arms. A side with missing or degenerate bones is
    /// simply absent from the result.
    pub fn commands(&self, skeleton: &BoneMap) -> JointCommands {
        let mut out = JointCommands::new();
        for side in Side::BOTH {
            if let Some(angles) = self.solve_side(skeleton, side) {
                angles.write_into(side, &mut out);
            }
        }
        out
    }

    pub fn solve_side(&self, skeleton: &BoneMap, side: Side) -> Option<ArmAngles> {
        let (upper, lower, hand) = side.bones();
        let shoulder = skeleton.get(upper)?.position;
        let elbow = skeleton.get(lower)?.position;
        let wrist = skeleton.get(hand)?.position;
        // no chest bone means the chest frame is the world frame
        let chest = skeleton
            .get(bones::CHEST)
            .map(|p| p.orientation)
            .unwrap_or_else(UnitQuaternion::identity);

        let sign = match side {
            Side::Left => self.elbow_sign_left,
            Side::Right => self.elbow_sign_right,
        };
        angles_from_points(&shoulder, &elbow, &wrist, &chest, sign)
    }
}

/// Spherical decomposition of the chest-local upper-arm direction, plus the
/// unsigned angle between upper and lower arm scaled by `elbow_sign`.
pub fn angles_from_points(
    shoulder: &Vector3<f32>,
    elbow: &Vector3<f32>,
    wrist: &Vector3<f32>,
    chest: &UnitQuaternion<f32>,
    elbow_sign: f32,
) -> Option<ArmAngles> {
    let upper_dir = (elbow - shoulder).try_normalize(MIN_SEGMENT)?;
    let lower_dir = (wrist - elbow).try_normalize(MIN_SEGMENT)?;

    let local = chest.inverse_transform_vector(&upper_dir);
    let yaw = local.y.atan2(local.x);
    let pitch = local.z.atan2(local.x.hypot(local.y));
    let flex = upper_dir.dot(&lower_dir).clamp(-1.0, 1.0).acos();

    Some(ArmAngles {
        yaw,
        pitch,
        elbow: flex * elbow_sign,
    })
}
