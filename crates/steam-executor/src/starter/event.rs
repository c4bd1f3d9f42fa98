use tokio::sync::oneshot;

use crate::error::ExecutorResult;
use crate::id::LeaseId;
use crate::protocol::SteamMessage;
use crate::starter::{ClusterLease, ClusterSnapshot};

pub enum ExecutorStarterEvent {
    RequestCluster {
        /// The key of the job requesting the cluster, used for logging.
        job: String,
        result: oneshot::Sender<ExecutorResult<ClusterLease>>,
    },
    ReleaseCluster {
        lease_id: LeaseId,
    },
    /// A message received from Steam.
    ReceiveMessage {
        message: SteamMessage,
    },
    /// Fired when the start request may have timed out.
    ProbePendingStart {
        request_id: String,
    },
    ObserveState {
        result: oneshot::Sender<ClusterSnapshot>,
    },
    Shutdown,
}
