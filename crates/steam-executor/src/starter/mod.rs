mod client;
mod core;
mod event;
mod handler;
mod options;
mod state;

use crate::id::LeaseIdGenerator;
use crate::starter::state::ClusterState;

pub use client::{ClusterLease, ExecutorStarter};
pub(crate) use event::ExecutorStarterEvent;
pub use options::ExecutorStarterOptions;
pub use state::{ClusterSnapshot, ClusterStatus};

/// The actor owning the lifecycle of the external cluster.
/// All state transitions happen while processing a single event,
/// so they are atomic with respect to each other.
pub(crate) struct ExecutorStarterActor {
    options: ExecutorStarterOptions,
    state: ClusterState,
    lease_id_generator: LeaseIdGenerator,
}
