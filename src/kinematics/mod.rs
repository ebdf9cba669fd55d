// Kinematics: capture-to-robot mapping and the two arm solvers.
// Everything past the mapper works in robot space.

pub mod arm_ik;
pub mod ik;
pub mod mapper;
pub mod retarget;

pub use arm_ik::{ArmIkSource, IkDiagnostics};
pub use ik::IkSolution;
pub use mapper::{CoordinateMapper, map_pose};
pub use retarget::{ArmRetargeter, Side};
