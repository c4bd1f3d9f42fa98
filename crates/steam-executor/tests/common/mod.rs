//! Shared test utilities that let the tests play the role of Steam.

#![allow(dead_code)]

use std::time::Duration;

use steam_executor::error::ExecutorResult;
use steam_executor::protocol::{response_id, StartStatus, SteamMessage};
use steam_executor::transport::{outbox, SteamOutboxReceiver};
use steam_executor::{ClusterLease, ClusterSnapshot, ExecutorStarter, ExecutorStarterOptions};
use steam_server::actor::ActorSystem;
use tokio::task::JoinHandle;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestCluster {
    pub system: ActorSystem,
    pub starter: ExecutorStarter,
    pub steam: FakeSteam,
}

/// Start an executor starter connected to an in-memory Steam.
pub fn setup(start_timeout: Duration) -> TestCluster {
    let mut system = ActorSystem::new();
    let (tx, rx) = outbox();
    let starter = ExecutorStarter::new(&mut system, ExecutorStarterOptions::new(start_timeout, tx));
    let steam = FakeSteam {
        outbox: rx,
        starter: starter.clone(),
        next_stop_id: 1,
    };
    TestCluster {
        system,
        starter,
        steam,
    }
}

pub struct FakeSteam {
    outbox: SteamOutboxReceiver,
    starter: ExecutorStarter,
    next_stop_id: u64,
}

impl FakeSteam {
    pub async fn expect_message(&mut self) -> SteamMessage {
        tokio::time::timeout(WAIT_TIMEOUT, self.outbox.recv())
            .await
            .expect("timed out waiting for a message to Steam")
            .expect("the outbox is closed")
    }

    /// Wait for a start request and return its identifier.
    pub async fn expect_start_request(&mut self) -> String {
        match self.expect_message().await {
            SteamMessage::StartCluster { id } => id,
            other => panic!("expected start request, got {other:?}"),
        }
    }

    pub fn assert_no_message(&mut self) {
        if let Ok(message) = self.outbox.try_recv() {
            panic!("unexpected message to Steam: {message:?}");
        }
    }

    pub async fn notify_start(
        &self,
        request_id: &str,
        status: StartStatus,
        uri: Option<&str>,
        reason: Option<&str>,
    ) {
        self.starter
            .deliver(SteamMessage::StartNotification {
                id: response_id(request_id),
                status,
                uri: uri.map(|x| x.to_string()),
                reason: reason.map(|x| x.to_string()),
            })
            .await
            .unwrap();
    }

    pub async fn starting(&self, request_id: &str) {
        self.notify_start(request_id, StartStatus::Starting, None, None)
            .await;
    }

    pub async fn started(&self, request_id: &str, uri: &str) {
        self.notify_start(request_id, StartStatus::Started, Some(uri), None)
            .await;
    }

    pub async fn failed(&self, request_id: &str, reason: &str) {
        self.notify_start(request_id, StartStatus::Failed, None, Some(reason))
            .await;
    }

    /// Ask the executor starter to allow stopping the cluster and return the answer.
    pub async fn request_stop(&mut self) -> bool {
        let id = format!("stop-{}", self.next_stop_id);
        self.next_stop_id += 1;
        self.starter
            .deliver(SteamMessage::StopNotification { id: id.clone() })
            .await
            .unwrap();
        match self.expect_message().await {
            SteamMessage::StopConfirmation {
                id: confirmation_id,
                allowed,
            } => {
                assert_eq!(confirmation_id, response_id(&id));
                allowed
            }
            other => panic!("expected stop confirmation, got {other:?}"),
        }
    }
}

/// Request the cluster on behalf of a job in the background.
pub fn spawn_job(
    starter: &ExecutorStarter,
    job: &str,
) -> JoinHandle<ExecutorResult<ClusterLease>> {
    let starter = starter.clone();
    let job = job.to_string();
    tokio::spawn(async move { starter.request_cluster(job).await })
}

pub async fn join_job(job: JoinHandle<ExecutorResult<ClusterLease>>) -> ExecutorResult<ClusterLease> {
    tokio::time::timeout(WAIT_TIMEOUT, job)
        .await
        .expect("timed out waiting for the job")
        .expect("the job panicked")
}

/// Poll the executor starter until the snapshot satisfies the predicate.
pub async fn wait_for_snapshot(
    starter: &ExecutorStarter,
    predicate: impl Fn(&ClusterSnapshot) -> bool,
) -> ClusterSnapshot {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let snapshot = starter.snapshot().await.unwrap();
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for the cluster state")
}
