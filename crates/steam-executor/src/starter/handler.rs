use std::mem;

use log::{debug, info, warn};
use steam_server::actor::{ActorAction, ActorContext};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{ExecutorError, ExecutorResult};
use crate::id::{LeaseId, LeaseIdGenerator};
use crate::protocol::{response_id, StartStatus, SteamMessage};
use crate::starter::state::{ClusterState, PendingStartRequest, RunningCluster, StartWaiter};
use crate::starter::{ClusterLease, ClusterSnapshot, ExecutorStarterActor, ExecutorStarterEvent};

impl ExecutorStarterActor {
    pub(super) fn handle_request_cluster(
        &mut self,
        ctx: &mut ActorContext<Self>,
        job: String,
        result: oneshot::Sender<ExecutorResult<ClusterLease>>,
    ) -> ActorAction {
        let waiter = StartWaiter { job, result };
        match &mut self.state {
            ClusterState::Absent => {
                let request_id = Uuid::new_v4().to_string();
                if let Err(e) = self.send_message(SteamMessage::StartCluster {
                    id: request_id.clone(),
                }) {
                    let message = format!("failed to request cluster start: {e}");
                    let _ = waiter.result.send(Err(e));
                    return ActorAction::warn(message);
                }
                info!(
                    "job {} requested the external cluster, sent start request {request_id}",
                    waiter.job
                );
                ctx.send_with_delay(
                    ExecutorStarterEvent::ProbePendingStart {
                        request_id: request_id.clone(),
                    },
                    self.options().start_timeout,
                );
                self.state = ClusterState::Starting(PendingStartRequest::new(request_id, waiter));
            }
            ClusterState::Starting(pending) => {
                info!(
                    "job {} is waiting for the pending start request {}",
                    waiter.job, pending.request_id
                );
                pending.waiters.push(waiter);
            }
            ClusterState::Running(cluster) => {
                Self::grant_lease(ctx, &mut self.lease_id_generator, cluster, waiter);
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_release_cluster(&mut self, lease_id: LeaseId) -> ActorAction {
        let ClusterState::Running(cluster) = &mut self.state else {
            return ActorAction::warn(format!(
                "lease {lease_id} released while no external cluster is running"
            ));
        };
        match cluster.leases.remove(&lease_id) {
            Some(job) => {
                info!(
                    "job {job} released the external cluster, {} job(s) still using it",
                    cluster.leases.len()
                );
                ActorAction::Continue
            }
            None => ActorAction::warn(format!("lease {lease_id} not found")),
        }
    }

    pub(super) fn handle_receive_message(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: SteamMessage,
    ) -> ActorAction {
        debug!("received {} message {} from Steam", message.kind(), message.id());
        match message {
            SteamMessage::StartNotification {
                id,
                status,
                uri,
                reason,
            } => self.handle_start_notification(ctx, id, status, uri, reason),
            SteamMessage::StopNotification { id } => self.handle_stop_notification(id),
            x @ (SteamMessage::StartCluster { .. } | SteamMessage::StopConfirmation { .. }) => {
                ActorAction::warn(format!(
                    "unexpected {} message {} from Steam",
                    x.kind(),
                    x.id()
                ))
            }
        }
    }

    fn handle_start_notification(
        &mut self,
        ctx: &mut ActorContext<Self>,
        id: String,
        status: StartStatus,
        uri: Option<String>,
        reason: Option<String>,
    ) -> ActorAction {
        let pending = match mem::replace(&mut self.state, ClusterState::Absent) {
            ClusterState::Starting(pending) if pending.matches_response(&id) => pending,
            state => {
                // A late reply for an abandoned request must not affect the current state.
                self.state = state;
                info!("ignoring start notification {id} with status {status} for no pending request");
                return ActorAction::Continue;
            }
        };
        match status {
            StartStatus::Starting => {
                info!(
                    "Steam is starting the external cluster for request {}",
                    pending.request_id
                );
                self.state = ClusterState::Starting(pending);
            }
            StartStatus::Started => {
                let Some(uri) = uri else {
                    pending.fail_all(|| {
                        ExecutorError::StartFailed(
                            "missing cluster URI in start notification".to_string(),
                        )
                    });
                    return ActorAction::warn(format!("start notification {id} has no cluster URI"));
                };
                info!(
                    "external cluster started at {uri}, granting {} job(s)",
                    pending.waiters.len()
                );
                let mut cluster = RunningCluster::new(uri);
                for waiter in pending.waiters {
                    Self::grant_lease(ctx, &mut self.lease_id_generator, &mut cluster, waiter);
                }
                self.state = ClusterState::Running(cluster);
            }
            StartStatus::Failed => {
                let reason = reason.unwrap_or_else(|| "unknown reason".to_string());
                warn!(
                    "Steam failed to start the external cluster for request {}: {reason}",
                    pending.request_id
                );
                pending.fail_all(|| ExecutorError::StartFailed(reason.clone()));
            }
        }
        ActorAction::Continue
    }

    fn handle_stop_notification(&mut self, id: String) -> ActorAction {
        let allowed = match &self.state {
            ClusterState::Absent => {
                info!("no external cluster is tracked, allowing stop request {id}");
                true
            }
            ClusterState::Starting(pending) => {
                info!(
                    "external cluster is still starting for request {}, rejecting stop request {id}",
                    pending.request_id
                );
                false
            }
            ClusterState::Running(cluster) if cluster.leases.is_empty() => {
                info!(
                    "external cluster at {} is idle, allowing stop request {id}",
                    cluster.uri
                );
                true
            }
            ClusterState::Running(cluster) => {
                info!(
                    "external cluster at {} is used by {} job(s), rejecting stop request {id}",
                    cluster.uri,
                    cluster.leases.len()
                );
                false
            }
        };
        if let Err(e) = self.send_message(SteamMessage::StopConfirmation {
            id: response_id(&id),
            allowed,
        }) {
            return ActorAction::warn(format!("failed to confirm stop request {id}: {e}"));
        }
        if allowed {
            // The next request starts a fresh negotiation.
            self.state = ClusterState::Absent;
        }
        ActorAction::Continue
    }

    pub(super) fn handle_probe_pending_start(&mut self, request_id: String) -> ActorAction {
        match mem::replace(&mut self.state, ClusterState::Absent) {
            ClusterState::Starting(pending) if pending.request_id == request_id => {
                warn!(
                    "no response received from Steam for start request {request_id}, failing {} job(s)",
                    pending.waiters.len()
                );
                pending.fail_all(|| ExecutorError::StartTimedOut);
            }
            state => {
                debug!("start request {request_id} is no longer pending");
                self.state = state;
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_observe_state(
        &mut self,
        result: oneshot::Sender<ClusterSnapshot>,
    ) -> ActorAction {
        let _ = result.send(ClusterSnapshot::from(&self.state));
        ActorAction::Continue
    }

    /// Hand a lease on the running cluster to the waiting job.
    fn grant_lease(
        ctx: &mut ActorContext<Self>,
        lease_id_generator: &mut LeaseIdGenerator,
        cluster: &mut RunningCluster,
        waiter: StartWaiter,
    ) {
        let lease_id = match lease_id_generator.next() {
            Ok(x) => x,
            Err(e) => {
                let _ = waiter.result.send(Err(e));
                return;
            }
        };
        let lease = ClusterLease::new(lease_id, cluster.uri.clone(), ctx.handle().clone());
        cluster.leases.insert(lease_id, waiter.job.clone());
        if let Err(Ok(lease)) = waiter.result.send(Ok(lease)) {
            warn!("job {} is no longer waiting for the external cluster", waiter.job);
            cluster.leases.remove(&lease_id);
            lease.forget();
            return;
        }
        info!(
            "job {} is using the external cluster at {} with lease {lease_id}",
            waiter.job, cluster.uri
        );
    }
}
