use std::fmt;

use log::warn;
use steam_server::actor::{ActorHandle, ActorSystem};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;

use crate::error::{ExecutorError, ExecutorResult};
use crate::id::LeaseId;
use crate::protocol::SteamMessage;
use crate::starter::{
    ClusterSnapshot, ExecutorStarterActor, ExecutorStarterEvent, ExecutorStarterOptions,
};

/// The client of the executor starter used by jobs and by the Steam connection.
#[derive(Clone)]
pub struct ExecutorStarter {
    handle: ActorHandle<ExecutorStarterActor>,
}

impl ExecutorStarter {
    pub fn new(system: &mut ActorSystem, options: ExecutorStarterOptions) -> Self {
        Self {
            handle: system.spawn(options),
        }
    }

    /// Wait until the external cluster is usable and return a lease on it.
    ///
    /// Concurrent callers share a single start request sent to Steam.
    /// The lease must be held for as long as the job uses the cluster,
    /// since Steam is only allowed to stop the cluster when no lease is active.
    pub async fn request_cluster(&self, job: impl Into<String>) -> ExecutorResult<ClusterLease> {
        let (tx, rx) = oneshot::channel();
        self.handle
            .send(ExecutorStarterEvent::RequestCluster {
                job: job.into(),
                result: tx,
            })
            .await?;
        rx.await
            .map_err(|_| ExecutorError::internal("the executor starter has stopped"))?
    }

    /// Process a message received from Steam.
    pub async fn deliver(&self, message: SteamMessage) -> ExecutorResult<()> {
        self.handle
            .send(ExecutorStarterEvent::ReceiveMessage { message })
            .await?;
        Ok(())
    }

    /// Process a raw JSON message received from Steam.
    pub async fn deliver_text(&self, text: &str) -> ExecutorResult<()> {
        self.deliver(SteamMessage::from_json(text)?).await
    }

    pub async fn snapshot(&self) -> ExecutorResult<ClusterSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.handle
            .send(ExecutorStarterEvent::ObserveState { result: tx })
            .await?;
        rx.await
            .map_err(|_| ExecutorError::internal("the executor starter has stopped"))
    }

    /// Stop the executor starter and wait for it to complete.
    /// Jobs still waiting for the cluster fail.
    /// Calling this again, or concurrently, also succeeds.
    pub async fn shutdown(&self) -> ExecutorResult<()> {
        // The mailbox is closed only when the actor is already stopping.
        let _ = self.handle.send(ExecutorStarterEvent::Shutdown).await;
        self.handle.clone().wait_for_stop().await;
        Ok(())
    }
}

/// A job's usage of the running external cluster.
///
/// Dropping the lease releases it, so a failed or cancelled job does not keep the cluster alive.
/// The release is ordered before any message sent to the executor starter after the drop,
/// unless the mailbox is full, in which case it is sent in the background.
pub struct ClusterLease {
    id: LeaseId,
    uri: String,
    handle: Option<ActorHandle<ExecutorStarterActor>>,
}

impl ClusterLease {
    pub(crate) fn new(id: LeaseId, uri: String, handle: ActorHandle<ExecutorStarterActor>) -> Self {
        Self {
            id,
            uri,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> LeaseId {
        self.id
    }

    /// The address of the external cluster, e.g. `host:port`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Release the lease once the job no longer uses the cluster.
    pub async fn release(mut self) -> ExecutorResult<()> {
        if let Some(handle) = self.handle.take() {
            handle
                .send(ExecutorStarterEvent::ReleaseCluster { lease_id: self.id })
                .await?;
        }
        Ok(())
    }

    /// Discard a lease that was never handed to a job.
    pub(crate) fn forget(mut self) {
        self.handle = None;
    }
}

impl Drop for ClusterLease {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let lease_id = self.id;
        let message = match handle.try_send(ExecutorStarterEvent::ReleaseCluster { lease_id }) {
            Ok(()) | Err(TrySendError::Closed(_)) => return,
            Err(TrySendError::Full(message)) => message,
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _ = handle.send(message).await;
                });
            }
            Err(_) => {
                warn!("lease {lease_id} dropped outside of the runtime and cannot be released");
            }
        }
    }
}

impl fmt::Debug for ClusterLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterLease")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("released", &self.handle.is_none())
            .finish()
    }
}
