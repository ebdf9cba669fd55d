// Joint control: arbitration bus, rig description and the per-tick loop.

pub mod bus;
pub mod drive;
pub mod rig;

pub use bus::{JointCommands, JointControlBus, JointLimit, JointSink, Priority};
pub use drive::{ControlLoop, TickReport};
pub use rig::{Capability, RigDescriptor, RigJoint};
