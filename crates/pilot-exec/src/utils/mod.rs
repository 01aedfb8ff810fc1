mod limits;
pub use limits::attach_limits;

mod log;

mod group;
pub(crate) use group::{isolate_group, kill_group};
