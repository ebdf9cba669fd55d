// Outbound side: joint table, HTTP client and the rate-limited dispatcher.

pub mod dispatcher;
pub mod http;
pub mod joint_map;

pub use dispatcher::Dispatcher;
pub use joint_map::{JointMap, JointMapping};
