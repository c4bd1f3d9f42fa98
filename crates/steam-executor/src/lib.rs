pub mod error;
mod id;
pub mod protocol;
mod starter;
pub mod transport;

pub use id::LeaseId;
pub use starter::{
    ClusterLease, ClusterSnapshot, ClusterStatus, ExecutorStarter, ExecutorStarterOptions,
};
