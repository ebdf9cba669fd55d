//! # vmc_bridge
//! Motion-capture to robot-joint bridge.
//!
//! ## Data path
//! - **capture:** UDP listener decoding VMC/OSC datagrams into a
//!   double-buffered bone store (wait-free readers).
//! - **kinematics:** capture-to-robot basis change, direct arm retargeting
//!   and a damped Newton-Raphson arm IK.
//! - **control:** priority/override bus with smoothing and joint limits,
//!   driven once per host tick by [`control::ControlLoop`].
//! - **remote:** optional rate-limited HTTP forwarding of joint targets to a
//!   simulator controller.
//!
//! The host owns the tick. Nothing on the control path blocks; slow or
//! failing I/O is counted and logged on background threads.

pub mod capture;
pub mod config;
pub mod control;
pub mod error;
pub mod kinematics;
pub mod remote;
pub mod utils;
pub mod wire;

pub use capture::{BoneSnapshot, PoseStore, VmcReceiver};
pub use config::BridgeConfig;
pub use control::{ControlLoop, JointControlBus, JointSink, Priority, RigDescriptor};
pub use remote::{Dispatcher, JointMap};
