// Capture side: pose data, the double-buffered store and the UDP listener
// that feeds it.

pub mod bones;
pub mod pose;
pub mod pose_store;
pub mod receiver;

pub use pose::{BoneMap, BoneSnapshot, Pose};
pub use pose_store::{PoseStore, StoreWriter};
pub use receiver::VmcReceiver;
