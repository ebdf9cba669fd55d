//! rig.rs
//! What the host tells the bridge about its articulated model: a name, the
//! joints it can drive, and a capability set.

use crate::control::bus::JointLimit;
use crate::kinematics::retarget::{L_ELBOW, L_PITCH, L_YAW, R_ELBOW, R_PITCH, R_YAW};

#[derive(Debug, Clone, PartialEq)]
pub struct RigJoint {
    pub name: String,
    /// `None` means unlimited (±180° at the bus).
    pub limit: Option<JointLimit>,
}

impl RigJoint {
    pub fn new(name: impl Into<String>, limit: Option<JointLimit>) -> Self {
        Self {
            name: name.into(),
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Host can re-seat its physics state on controller restart.
    ResettablePhysics,
    /// Joints are addressed by name.
    NamedJoints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigDescriptor {
    pub name: String,
    pub joints: Vec<RigJoint>,
    pub capabilities: Vec<Capability>,
}

impl RigDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joints: Vec::new(),
            capabilities: vec![Capability::NamedJoints],
        }
    }

    pub fn with_joint(mut self, name: impl Into<String>, limit: Option<JointLimit>) -> Self {
        self.joints.push(RigJoint::new(name, limit));
        self
    }

    pub fn with_capability(mut self, cap: Capability) -> Self {
        if !self.capabilities.contains(&cap) {
            self.capabilities.push(cap);
        }
        self
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn joint(&self, name: &str) -> Option<&RigJoint> {
        self.joints.iter().find(|j| j.name == name)
    }

    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| j.name.as_str())
    }

    /// The six arm joints the solvers drive, unlimited.
    pub fn dual_arm(name: impl Into<String>) -> Self {
        [L_YAW, L_PITCH, L_ELBOW, R_YAW, R_PITCH, R_ELBOW]
            .into_iter()
            .fold(Self::new(name), |rig, joint| rig.with_joint(joint, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_arm_has_solver_joints() {
        let rig = RigDescriptor::dual_arm("demo");
        assert_eq!(rig.joints.len(), 6);
        assert!(rig.joint(L_ELBOW).is_some());
        assert!(rig.has(Capability::NamedJoints));
        assert!(!rig.has(Capability::ResettablePhysics));
    }

    #[test]
    fn capabilities_are_a_set() {
        let rig = RigDescriptor::new("r")
            .with_capability(Capability::ResettablePhysics)
            .with_capability(Capability::ResettablePhysics)
            .with_joint("neck", Some(JointLimit::new(-1.57, 1.57)));
        assert_eq!(rig.capabilities.len(), 2);
        assert_eq!(rig.joint_names().collect::<Vec<_>>(), vec!["neck"]);
    }
}
