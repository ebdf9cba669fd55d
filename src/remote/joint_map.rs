//! joint_map.rs
//! Robot joint name -> remote motor index and hardware range.
//!
//! The default table targets the DARwIn-OP model served by the simulator's
//! HTTP controller. It is kept exactly as the controller expects it; note that
//! the ankle pitch joints share motor indices with the knees (14/15).

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct JointMapping {
    /// Motor name on the remote side (informational).
    pub remote_name: String,
    pub index: u32,
    pub min: f32,
    pub max: f32,
}

impl JointMapping {
    pub fn new(remote_name: &str, index: u32, min: f32, max: f32) -> Self {
        Self {
            remote_name: remote_name.to_string(),
            index,
            min,
            max,
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JointMap {
    entries: HashMap<String, JointMapping>,
}

#[rustfmt::skip]
const DARWIN_OP: &[(&str, &str, u32, f32, f32)] = &[
    // arms
    ("l_sho_pitch",   "ShoulderL",  1, -1.57,  0.52),
    ("l_sho_roll",    "ArmUpperL",  3, -2.25,  0.77),
    ("l_el",          "ArmLowerL",  5, -1.57, -0.10),
    ("r_sho_pitch",   "ShoulderR",  0, -1.57,  0.52),
    ("r_sho_roll",    "ArmUpperR",  2, -0.68,  2.30),
    ("r_el",          "ArmLowerR",  4, -1.57, -0.10),
    // pelvis
    ("pelv_y_r",      "PelvYR",     6, -1.047, 1.047),
    ("pelv_y_l",      "PelvYL",     7, -0.69,  2.50),
    ("pelv_r",        "PelvR",      8, -1.01,  1.01),
    ("pelv_l",        "PelvL",      9, -0.35,  0.35),
    // legs
    ("l_hip_pitch",   "LegUpperL", 11, -2.50,  0.87),
    ("r_hip_pitch",   "LegUpperR", 10, -2.50,  0.87),
    ("l_hip_roll",    "LegLowerL", 13, -0.35,  0.35),
    ("r_hip_roll",    "LegLowerR", 12, -0.35,  0.35),
    ("l_knee",        "KneeL",     15, -0.1,   2.09),
    ("r_knee",        "KneeR",     14, -0.1,   2.09),
    ("l_ankle_pitch", "AnkleL",    15, -1.39,  1.22),
    ("r_ankle_pitch", "AnkleR",    14, -0.87,  0.87),
    ("l_ankle_roll",  "FootL",     17, -0.87,  0.87),
    ("r_ankle_roll",  "FootR",     16, -0.87,  0.87),
    // head
    ("neck",          "Neck",      18, -1.57,  1.57),
    ("head",          "Head",      19, -0.52,  0.52),
];

impl JointMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn darwin_op() -> Self {
        let mut map = Self::new();
        for &(joint, remote, index, min, max) in DARWIN_OP {
            map.insert(joint, JointMapping::new(remote, index, min, max));
        }
        map
    }

    pub fn insert(&mut self, joint: &str, mapping: JointMapping) {
        self.entries.insert(joint.to_string(), mapping);
    }

    /// Adds `alias -> mapping of target` for every pair whose target exists.
    /// Returns the aliases that pointed at unknown joints.
    pub fn with_aliases<'a, I>(mut self, aliases: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut unresolved = Vec::new();
        for (alias, target) in aliases {
            match self.entries.get(target).cloned() {
                Some(m) => {
                    self.entries.insert(alias.clone(), m);
                }
                None => unresolved.push(alias.clone()),
            }
        }
        (self, unresolved)
    }

    pub fn get(&self, joint: &str) -> Option<&JointMapping> {
        self.entries.get(joint)
    }

    pub fn motor_index(&self, joint: &str) -> Option<u32> {
        self.entries.get(joint).map(|m| m.index)
    }

    /// Sorted joint names.
    pub fn supported_joints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
