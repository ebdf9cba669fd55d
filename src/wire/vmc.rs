//! vmc.rs
//! VMC (Virtual Motion Capture) address space on top of OSC.
//!
//! Only the performer-side addresses the bridge consumes are typed here;
//! everything else is classified as [`VmcEvent::Other`].

use nalgebra::{Quaternion, Vector3};

use crate::wire::osc::OscMessage;

pub const VMC_PREFIX: &str = "/VMC/Ext/";

pub const ROOT_POS: &str = "/VMC/Ext/Root/Pos";
pub const ROOT_POS_LOCAL: &str = "/VMC/Ext/Root/Pos/Local";
pub const BONE_POS: &str = "/VMC/Ext/Bone/Pos";
pub const BONE_POS_LOCAL: &str = "/VMC/Ext/Bone/Pos/Local";
pub const BLEND_VAL: &str = "/VMC/Ext/Blend/Val";
pub const BLEND_APPLY: &str = "/VMC/Ext/Blend/Apply";

/// Raw transform as carried on the wire: position xyz, quaternion xyzw.
/// Not normalized; the pose store does that on write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireTransform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

/// A decoded message mapped onto the state mutation it requests.
#[derive(Debug, Clone, PartialEq)]
pub enum VmcEvent {
    Root(WireTransform),
    Bone { name: String, transform: WireTransform },
    BlendValue { name: String, value: f32 },
    BlendApply,
    /// Known VMC address with unusable arguments, or an address outside the
    /// consumed set.
    Other,
}

impl VmcEvent {
    pub fn from_message(msg: &OscMessage) -> Self {
        match msg.address.as_str() {
            ROOT_POS | ROOT_POS_LOCAL => {
                // first arg is a placeholder name ("root")
                if msg.str_at(0).is_none() {
                    return VmcEvent::Other;
                }
                match read_transform(msg) {
                    Some(t) => VmcEvent::Root(t),
                    None => VmcEvent::Other,
                }
            }
            BONE_POS | BONE_POS_LOCAL => match (msg.str_at(0), read_transform(msg)) {
                (Some(name), Some(transform)) => VmcEvent::Bone {
                    name: name.to_owned(),
                    transform,
                },
                _ => VmcEvent::Other,
            },
            BLEND_VAL => match (msg.str_at(0), msg.f32_at(1)) {
                (Some(name), Some(value)) => VmcEvent::BlendValue {
                    name: name.to_owned(),
                    value,
                },
                _ => VmcEvent::Other,
            },
            BLEND_APPLY => VmcEvent::BlendApply,
            _ => VmcEvent::Other,
        }
    }
}

pub fn is_vmc_address(address: &str) -> bool {
    address.starts_with(VMC_PREFIX)
}

/// Args 1..=7: px py pz qx qy qz qw.
fn read_transform(msg: &OscMessage) -> Option<WireTransform> {
    let mut v = [0.0f32; 7];
    for (i, slot) in v.iter_mut().enumerate() {
        *slot = msg.f32_at(i + 1)?;
    }
    Some(WireTransform {
        position: Vector3::new(v[0], v[1], v[2]),
        // nalgebra takes (w, i, j, k)
        rotation: Quaternion::new(v[6], v[3], v[4], v[5]),
    })
}
