//! bones.rs
//! Standard humanoid bone identifiers accepted from the wire.

/// Humanoid bone set as sent by conformant VMC performers. Anything else is
/// dropped at ingestion.
pub const STANDARD_BONE_NAMES: &[&str] = &[
    "Hips", "Spine", "Chest", "UpperChest", "Neck", "Head",
    "LeftShoulder", "LeftUpperArm", "LeftLowerArm", "LeftHand",
    "RightShoulder", "RightUpperArm", "RightLowerArm", "RightHand",
    "LeftUpperLeg", "LeftLowerLeg", "LeftFoot", "LeftToes",
    "RightUpperLeg", "RightLowerLeg", "RightFoot", "RightToes",
    "LeftEye", "RightEye",
    "LeftThumbProximal", "LeftThumbIntermediate", "LeftThumbDistal",
    "LeftIndexProximal", "LeftIndexIntermediate", "LeftIndexDistal",
    "LeftMiddleProximal", "LeftMiddleIntermediate", "LeftMiddleDistal",
    "LeftRingProximal", "LeftRingIntermediate", "LeftRingDistal",
    "LeftLittleProximal", "LeftLittleIntermediate", "LeftLittleDistal",
    "RightThumbProximal", "RightThumbIntermediate", "RightThumbDistal",
    "RightIndexProximal", "RightIndexIntermediate", "RightIndexDistal",
    "RightMiddleProximal", "RightMiddleIntermediate", "RightMiddleDistal",
    "RightRingProximal", "RightRingIntermediate", "RightRingDistal",
    "RightLittleProximal", "RightLittleIntermediate", "RightLittleDistal",
];

pub fn is_standard_bone(name: &str) -> bool {
    STANDARD_BONE_NAMES.contains(&name)
}

/// "LeftUpperArm" -> "leftUpperArm", "Hips" -> "hips".
pub fn canonical_bone_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// canonical names read by the kinematics layer
pub const CHEST: &str = "chest";
pub const LEFT_UPPER_ARM: &str = "leftUpperArm";
pub const LEFT_LOWER_ARM: &str = "leftLowerArm";
pub const LEFT_HAND: &str = "leftHand";
pub const RIGHT_UPPER_ARM: &str = "rightUpperArm";
pub const RIGHT_LOWER_ARM: &str = "rightLowerArm";
pub const RIGHT_HAND: &str = "rightHand";
