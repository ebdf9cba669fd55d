//! arm_ik.rs
//! Per-frame IK command source for both arms.
//! - shoulder = upper-arm bone, target = hand bone (robot space)
//! - link lengths estimated from the captured bone distances every frame
//! - each side warm-starts from its previous solution

use nalgebra::Vector3;

use crate::capture::pose::BoneMap;
use crate::config::IkConfig;
use crate::control::bus::JointCommands;
use crate::kinematics::ik::{self, IkSolution};
use crate::kinematics::retarget::{ArmAngles, Side};

/// Cumulative counters across all solves since construction or reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IkDiagnostics {
    pub solves: u64,
    pub converged: u64,
    pub singular_steps: u64,
    pub large_steps: u64,
    /// Link lengths replaced by the fallback length.
    pub short_links: u64,
}

#[derive(Debug, Clone)]
pub struct ArmIkSource {
    cfg: IkConfig,
    warm_left: [f32; 3],
    warm_right: [f32; 3],
    diag: IkDiagnostics,
}

impl Default for ArmIkSource {
    fn default() -> Self {
        Self::new(IkConfig::default())
    }
}

impl ArmIkSource {
    pub fn new(cfg: IkConfig) -> Self {
        Self {
            cfg,
            warm_left: [0.0; 3],
            warm_right: [0.0; 3],
            diag: IkDiagnostics::default(),
        }
    }

    /// Commands for whichever arms have all three bones present.
    pub fn commands(&mut self, skeleton: &BoneMap) -> JointCommands {
        let mut out = JointCommands::new();
        for side in Side::BOTH {
            if let Some(sol) = self.solve_side(skeleton, side) {
                ArmAngles {
                    yaw: sol.yaw,
                    pitch: sol.pitch,
                    elbow: sol.elbow,
                }
                .write_into(side, &mut out);
            }
        }
        out
    }

    pub fn solve_side(&mut self, skeleton: &BoneMap, side: Side) -> Option<IkSolution> {
        let (upper, lower, hand) = side.bones();
        let shoulder = skeleton.get(upper)?.position;
        let elbow = skeleton.get(lower)?.position;
        let wrist = skeleton.get(hand)?.position;

        let link1 = self.link_length(&shoulder, &elbow);
        let link2 = self.link_length(&elbow, &wrist);

        let warm = match side {
            Side::Left => self.warm_left,
            Side::Right => self.warm_right,
        };
        let sol = ik::solve_with(&shoulder, &wrist, warm, link1, link2, &self.cfg);

        // a diverged solve must not poison the next frame's start
        let angles = sol.angles();
        if !angles.iter().all(|a| a.is_finite()) {
            return None;
        }
        match side {
            Side::Left => self.warm_left = angles,
            Side::Right => self.warm_right = angles,
        }

        self.diag.solves += 1;
        self.diag.converged += sol.converged as u64;
        self.diag.singular_steps += sol.singular_steps as u64;
        self.diag.large_steps += sol.large_steps as u64;
        Some(sol)
    }

    fn link_length(&mut self, a: &Vector3<f32>, b: &Vector3<f32>) -> f32 {
        let len = (b - a).norm();
        if !len.is_finite() || (len as f64) < self.cfg.min_link_length {
            self.diag.short_links += 1;
            self.cfg.fallback_link_length as f32
        } else {
            len
        }
    }

    pub fn warm_start(&self, side: Side) -> [f32; 3] {
        match side {
            Side::Left => self.warm_left,
            Side::Right => self.warm_right,
        }
    }

    pub fn diagnostics(&self) -> IkDiagnostics {
        self.diag
    }

    /// Forgets warm-start state; counters are kept.
    pub fn reset(&mut self) {
        self.warm_left = [0.0; 3];
        self.warm_right = [0.0; 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::bones;
    use crate::capture::pose::Pose;
    use crate::kinematics::retarget::{L_ELBOW, L_YAW, R_YAW};
    use nalgebra::UnitQuaternion;

    fn at(x: f32, y: f32, z: f32) -> Pose {
        Pose::new(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    fn left_arm(points: [[f32; 3]; 3]) -> BoneMap {
        let mut m = BoneMap::new();
        let [s, e, h] = points;
        m.insert(bones::LEFT_UPPER_ARM.into(), at(s[0], s[1], s[2]));
        m.insert(bones::LEFT_LOWER_ARM.into(), at(e[0], e[1], e[2]));
        m.insert(bones::LEFT_HAND.into(), at(h[0], h[1], h[2]));
        m
    }

    #[test]
    fn extended_arm_yields_zero_commands_for_present_side_only() {
        let mut src = ArmIkSource::default();
        let cmds = src.commands(&left_arm([[0.0, 0.0, 0.0], [0.3, 0.0, 0.0], [0.55, 0.0, 0.0]]));
        assert_eq!(cmds.len(), 3);
        assert!(cmds[L_YAW].abs() < 1e-3);
        assert!(cmds[L_ELBOW].abs() < 1e-3);
        assert!(!cmds.contains_key(R_YAW));
        assert_eq!(src.diagnostics().solves, 1);
        assert_eq!(src.diagnostics().converged, 1);
    }

    #[test]
    fn warm_start_carries_between_frames_and_resets() {
        let mut src = ArmIkSource::default();
        // arm pointing along +y: yaw should move toward +90°
        let skeleton = left_arm([[0.0, 0.0, 0.0], [0.0, 0.3, 0.0], [0.0, 0.3, 0.25]]);
        src.commands(&skeleton);
        let first = src.warm_start(Side::Left);
        assert_ne!(first, [0.0; 3]);
        assert_eq!(src.warm_start(Side::Right), [0.0; 3]);

        src.reset();
        assert_eq!(src.warm_start(Side::Left), [0.0; 3]);
    }

    #[test]
    fn coincident_bones_use_fallback_length() {
        let mut src = ArmIkSource::default();
        src.commands(&left_arm([[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.25, 0.0, 0.0]]));
        assert_eq!(src.diagnostics().short_links, 1);
    }
}
