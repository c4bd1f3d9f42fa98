use std::collections::HashMap;
use std::fmt;

use tokio::sync::oneshot;

use crate::error::{ExecutorError, ExecutorResult};
use crate::id::LeaseId;
use crate::protocol::response_id;
use crate::starter::ClusterLease;

pub enum ClusterState {
    /// No external cluster is tracked.
    Absent,
    /// A start request has been sent to Steam and its outcome is unknown.
    Starting(PendingStartRequest),
    Running(RunningCluster),
}

/// The single in-flight start request.
/// Every job requesting the cluster while it is starting waits on this request.
pub struct PendingStartRequest {
    pub request_id: String,
    pub waiters: Vec<StartWaiter>,
}

pub struct StartWaiter {
    pub job: String,
    pub result: oneshot::Sender<ExecutorResult<ClusterLease>>,
}

impl PendingStartRequest {
    pub fn new(request_id: String, waiter: StartWaiter) -> Self {
        Self {
            request_id,
            waiters: vec![waiter],
        }
    }

    pub fn matches_response(&self, id: &str) -> bool {
        response_id(&self.request_id) == id
    }

    /// Fail every waiting job with a fresh copy of the error.
    pub fn fail_all(self, error: impl Fn() -> ExecutorError) {
        for waiter in self.waiters {
            let _ = waiter.result.send(Err(error()));
        }
    }
}

pub struct RunningCluster {
    pub uri: String,
    /// The active leases and the jobs holding them.
    /// The size of this map is the active usage count of the cluster.
    pub leases: HashMap<LeaseId, String>,
}

impl RunningCluster {
    pub fn new(uri: String) -> Self {
        Self {
            uri,
            leases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Absent,
    Starting,
    Running,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterStatus::Absent => write!(f, "ABSENT"),
            ClusterStatus::Starting => write!(f, "STARTING"),
            ClusterStatus::Running => write!(f, "RUNNING"),
        }
    }
}

/// A point-in-time view of the cluster state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub status: ClusterStatus,
    pub uri: Option<String>,
    /// The number of jobs currently depending on the running cluster.
    pub usage: usize,
    pub pending_request_id: Option<String>,
    pub waiting_jobs: Vec<String>,
}

impl From<&ClusterState> for ClusterSnapshot {
    fn from(state: &ClusterState) -> Self {
        match state {
            ClusterState::Absent => Self {
                status: ClusterStatus::Absent,
                uri: None,
                usage: 0,
                pending_request_id: None,
                waiting_jobs: vec![],
            },
            ClusterState::Starting(pending) => Self {
                status: ClusterStatus::Starting,
                uri: None,
                usage: 0,
                pending_request_id: Some(pending.request_id.clone()),
                waiting_jobs: pending.waiters.iter().map(|w| w.job.clone()).collect(),
            },
            ClusterState::Running(cluster) => Self {
                status: ClusterStatus::Running,
                uri: Some(cluster.uri.clone()),
                usage: cluster.leases.len(),
                pending_request_id: None,
                waiting_jobs: vec![],
            },
        }
    }
}
