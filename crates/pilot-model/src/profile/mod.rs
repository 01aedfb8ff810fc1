mod transport;
pub use transport::Transport;

mod limits;
pub use limits::ProcessLimits;

mod cluster;
pub use cluster::ClusterProfile;
