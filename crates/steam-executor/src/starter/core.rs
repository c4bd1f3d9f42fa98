use std::mem;

use log::{debug, info};
use steam_server::actor::{Actor, ActorAction, ActorContext};

use crate::error::{ExecutorError, ExecutorResult};
use crate::id::LeaseIdGenerator;
use crate::protocol::SteamMessage;
use crate::starter::state::ClusterState;
use crate::starter::{ExecutorStarterActor, ExecutorStarterEvent, ExecutorStarterOptions};

impl Actor for ExecutorStarterActor {
    type Message = ExecutorStarterEvent;
    type Options = ExecutorStarterOptions;

    fn name() -> &'static str {
        "executor starter"
    }

    fn new(options: ExecutorStarterOptions) -> Self {
        Self {
            options,
            state: ClusterState::Absent,
            lease_id_generator: LeaseIdGenerator::default(),
        }
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction {
        match message {
            ExecutorStarterEvent::RequestCluster { job, result } => {
                self.handle_request_cluster(ctx, job, result)
            }
            ExecutorStarterEvent::ReleaseCluster { lease_id } => {
                self.handle_release_cluster(lease_id)
            }
            ExecutorStarterEvent::ReceiveMessage { message } => {
                self.handle_receive_message(ctx, message)
            }
            ExecutorStarterEvent::ProbePendingStart { request_id } => {
                self.handle_probe_pending_start(request_id)
            }
            ExecutorStarterEvent::ObserveState { result } => self.handle_observe_state(result),
            ExecutorStarterEvent::Shutdown => ActorAction::Stop,
        }
    }

    fn stop(mut self, _ctx: &mut ActorContext<Self>) {
        if let ClusterState::Starting(pending) = mem::replace(&mut self.state, ClusterState::Absent)
        {
            info!(
                "failing {} job(s) waiting for start request {}",
                pending.waiters.len(),
                pending.request_id
            );
            pending.fail_all(|| ExecutorError::internal("the executor starter has stopped"));
        }
    }
}

impl ExecutorStarterActor {
    pub(super) fn options(&self) -> &ExecutorStarterOptions {
        &self.options
    }

    /// Queue a message to be sent to Steam.
    /// Messages are delivered in the order they are queued.
    pub(super) fn send_message(&self, message: SteamMessage) -> ExecutorResult<()> {
        debug!("sending {} message {} to Steam", message.kind(), message.id());
        self.options()
            .outbox
            .send(message)
            .map_err(|_| ExecutorError::internal("the Steam connection is closed"))
    }
}
