//! Tests for the cluster start and stop negotiation with Steam.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use common::{join_job, setup, spawn_job, wait_for_snapshot};
use steam_executor::error::ExecutorError;
use steam_executor::protocol::{StartStatus, SteamMessage};
use steam_executor::ClusterStatus;

const START_TIMEOUT: Duration = Duration::from_secs(60);

/// Two jobs requesting the cluster at the same time.
///
/// - Exactly one start request is sent to Steam
/// - Both jobs receive the same cluster URI
/// - Stopping is rejected until both jobs have finished
#[tokio::test]
async fn test_concurrent_jobs_share_one_start_request() {
    let mut cluster = setup(START_TIMEOUT);
    let starter = &cluster.starter;

    let job_a = spawn_job(starter, "job-a");
    let job_b = spawn_job(starter, "job-b");
    let snapshot = wait_for_snapshot(starter, |s| s.waiting_jobs.len() == 2).await;
    assert_eq!(snapshot.status, ClusterStatus::Starting);

    let request_id = cluster.steam.expect_start_request().await;
    cluster.steam.assert_no_message();
    assert_eq!(snapshot.pending_request_id.as_deref(), Some(request_id.as_str()));

    cluster.steam.starting(&request_id).await;
    cluster.steam.started(&request_id, "10.0.0.1:54321").await;

    let lease_a = join_job(job_a).await.unwrap();
    let lease_b = join_job(job_b).await.unwrap();
    assert_eq!(lease_a.uri(), "10.0.0.1:54321");
    assert_eq!(lease_b.uri(), "10.0.0.1:54321");
    assert_ne!(lease_a.id(), lease_b.id());
    cluster.steam.assert_no_message();

    let snapshot = starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Running);
    assert_eq!(snapshot.usage, 2);

    lease_a.release().await.unwrap();
    assert_eq!(starter.snapshot().await.unwrap().usage, 1);
    assert!(!cluster.steam.request_stop().await);

    lease_b.release().await.unwrap();
    assert_eq!(starter.snapshot().await.unwrap().usage, 0);
    assert!(cluster.steam.request_stop().await);

    let snapshot = starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Absent);
    assert_eq!(snapshot.uri, None);

    // A new job after the stop negotiates a fresh start.
    let job_c = spawn_job(starter, "job-c");
    let next_request_id = cluster.steam.expect_start_request().await;
    assert_ne!(next_request_id, request_id);
    cluster.steam.started(&next_request_id, "10.0.0.2:54321").await;
    let lease_c = join_job(job_c).await.unwrap();
    assert_eq!(lease_c.uri(), "10.0.0.2:54321");

    cluster.starter.shutdown().await.unwrap();
    cluster.system.join().await;
}

#[tokio::test]
async fn test_stop_is_allowed_when_no_cluster_is_tracked() {
    let mut cluster = setup(START_TIMEOUT);
    assert!(cluster.steam.request_stop().await);
    // Stopping nothing is idempotent.
    assert!(cluster.steam.request_stop().await);
    let snapshot = cluster.starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Absent);
    cluster.steam.assert_no_message();
}

#[tokio::test]
async fn test_stop_is_gated_by_usage() {
    let mut cluster = setup(START_TIMEOUT);
    let job = spawn_job(&cluster.starter, "job");
    let request_id = cluster.steam.expect_start_request().await;
    cluster.steam.started(&request_id, "host:1").await;
    let lease = join_job(job).await.unwrap();

    assert!(!cluster.steam.request_stop().await);
    let snapshot = cluster.starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Running);
    assert_eq!(snapshot.usage, 1);

    lease.release().await.unwrap();
    assert!(cluster.steam.request_stop().await);
    assert_eq!(
        cluster.starter.snapshot().await.unwrap().status,
        ClusterStatus::Absent
    );
}

#[tokio::test]
async fn test_stop_during_start_is_rejected() {
    let mut cluster = setup(START_TIMEOUT);
    let job = spawn_job(&cluster.starter, "job");
    let request_id = cluster.steam.expect_start_request().await;

    // Before any response from Steam.
    assert!(!cluster.steam.request_stop().await);

    cluster.steam.starting(&request_id).await;
    assert!(!cluster.steam.request_stop().await);

    // The rejected stop does not disturb the pending start.
    let snapshot = cluster.starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Starting);
    assert_eq!(snapshot.waiting_jobs, vec!["job".to_string()]);

    cluster.steam.started(&request_id, "host:1").await;
    let lease = join_job(job).await.unwrap();
    assert_eq!(lease.uri(), "host:1");
}

#[tokio::test]
async fn test_start_failure_is_delivered_to_all_jobs() {
    let mut cluster = setup(START_TIMEOUT);
    let job_a = spawn_job(&cluster.starter, "job-a");
    let job_b = spawn_job(&cluster.starter, "job-b");
    wait_for_snapshot(&cluster.starter, |s| s.waiting_jobs.len() == 2).await;
    let request_id = cluster.steam.expect_start_request().await;

    cluster.steam.failed(&request_id, "out of quota").await;

    for job in [job_a, job_b] {
        let error = join_job(job).await.unwrap_err();
        assert!(matches!(error, ExecutorError::StartFailed(ref reason) if reason == "out of quota"));
        assert_eq!(
            error.to_string(),
            "Failed to start external cluster: out of quota"
        );
    }
    assert_eq!(
        cluster.starter.snapshot().await.unwrap().status,
        ClusterStatus::Absent
    );

    // The starter does not retry by itself, a new request starts over.
    cluster.steam.assert_no_message();
    let _job = spawn_job(&cluster.starter, "job-c");
    let retry_request_id = cluster.steam.expect_start_request().await;
    assert_ne!(retry_request_id, request_id);
}

#[tokio::test]
async fn test_start_timeout_produces_distinct_error() {
    let mut cluster = setup(Duration::from_secs(2));
    let job = spawn_job(&cluster.starter, "job");
    let _request_id = cluster.steam.expect_start_request().await;

    let error = join_job(job).await.unwrap_err();
    assert!(matches!(error, ExecutorError::StartTimedOut));
    assert_eq!(error.to_string(), "No response received from Steam.");

    let snapshot = cluster.starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Absent);
    assert_eq!(snapshot.pending_request_id, None);
}

/// A late reply for a request that timed out.
///
/// - The first request times out and the state returns to absent
/// - The second job triggers a new start request with a new identifier
/// - A `started` reply for the first identifier does not satisfy the second job
/// - Only the reply for the second identifier resolves it
#[tokio::test]
async fn test_late_reply_after_timeout_is_ignored() {
    let mut cluster = setup(Duration::from_secs(2));
    let first_job = spawn_job(&cluster.starter, "job-1");
    let first_request_id = cluster.steam.expect_start_request().await;
    assert!(matches!(
        join_job(first_job).await,
        Err(ExecutorError::StartTimedOut)
    ));

    let second_job = spawn_job(&cluster.starter, "job-2");
    let second_request_id = cluster.steam.expect_start_request().await;
    assert_ne!(first_request_id, second_request_id);

    cluster.steam.started(&first_request_id, "stale:1").await;
    let snapshot = cluster.starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Starting);
    assert_eq!(
        snapshot.pending_request_id.as_deref(),
        Some(second_request_id.as_str())
    );
    assert!(!second_job.is_finished());

    cluster.steam.started(&second_request_id, "fresh:1").await;
    let lease = join_job(second_job).await.unwrap();
    assert_eq!(lease.uri(), "fresh:1");
}

#[tokio::test]
async fn test_timeout_probe_does_not_affect_later_requests() {
    let mut cluster = setup(Duration::from_millis(500));
    let job = spawn_job(&cluster.starter, "job-1");
    let request_id = cluster.steam.expect_start_request().await;
    cluster.steam.started(&request_id, "host:1").await;
    let lease = join_job(job).await.unwrap();

    // The probe scheduled for the completed request fires while the cluster is running.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let snapshot = cluster.starter.snapshot().await.unwrap();
    assert_eq!(snapshot.status, ClusterStatus::Running);
    assert_eq!(snapshot.usage, 1);
    drop(lease);
}

#[tokio::test]
async fn test_running_cluster_is_granted_without_messages() {
    let mut cluster = setup(START_TIMEOUT);
    let job = spawn_job(&cluster.starter, "job-1");
    let request_id = cluster.steam.expect_start_request().await;
    cluster.steam.started(&request_id, "host:1").await;
    let first = join_job(job).await.unwrap();

    let second = cluster.starter.request_cluster("job-2").await.unwrap();
    assert_eq!(second.uri(), "host:1");
    cluster.steam.assert_no_message();
    assert_eq!(cluster.starter.snapshot().await.unwrap().usage, 2);

    // A duplicate notification for the completed request is ignored.
    cluster.steam.started(&request_id, "other:1").await;
    let snapshot = cluster.starter.snapshot().await.unwrap();
    assert_eq!(snapshot.uri.as_deref(), Some("host:1"));
    assert_eq!(snapshot.usage, 2);

    first.release().await.unwrap();
    second.release().await.unwrap();
}

#[tokio::test]
async fn test_dropped_lease_is_released() {
    let mut cluster = setup(START_TIMEOUT);
    let job = spawn_job(&cluster.starter, "job");
    let request_id = cluster.steam.expect_start_request().await;
    cluster.steam.started(&request_id, "host:1").await;
    let lease = join_job(job).await.unwrap();
    assert_eq!(cluster.starter.snapshot().await.unwrap().usage, 1);

    // A job that fails without releasing the lease explicitly.
    drop(lease);
    assert_eq!(cluster.starter.snapshot().await.unwrap().usage, 0);
    assert!(cluster.steam.request_stop().await);
}

#[tokio::test]
async fn test_stop_right_after_dropping_the_last_lease_is_allowed() {
    let mut cluster = setup(START_TIMEOUT);
    let first = spawn_job(&cluster.starter, "first");
    let second = spawn_job(&cluster.starter, "second");
    let request_id = cluster.steam.expect_start_request().await;
    wait_for_snapshot(&cluster.starter, |s| s.waiting_jobs.len() == 2).await;
    cluster.steam.started(&request_id, "host:1").await;
    let first = join_job(first).await.unwrap();
    let second = join_job(second).await.unwrap();

    drop(first);
    assert!(!cluster.steam.request_stop().await);
    drop(second);
    assert!(cluster.steam.request_stop().await);
    assert_eq!(
        cluster.starter.snapshot().await.unwrap().status,
        ClusterStatus::Absent
    );
}

#[tokio::test]
async fn test_started_without_uri_fails() {
    let mut cluster = setup(START_TIMEOUT);
    let job = spawn_job(&cluster.starter, "job");
    let request_id = cluster.steam.expect_start_request().await;
    cluster
        .steam
        .notify_start(&request_id, StartStatus::Started, None, None)
        .await;
    assert!(matches!(
        join_job(job).await,
        Err(ExecutorError::StartFailed(_))
    ));
    assert_eq!(
        cluster.starter.snapshot().await.unwrap().status,
        ClusterStatus::Absent
    );
}

#[tokio::test]
async fn test_failure_without_reason() {
    let mut cluster = setup(START_TIMEOUT);
    let job = spawn_job(&cluster.starter, "job");
    let request_id = cluster.steam.expect_start_request().await;
    cluster
        .steam
        .notify_start(&request_id, StartStatus::Failed, None, None)
        .await;
    let error = join_job(job).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        "Failed to start external cluster: unknown reason"
    );
}

#[tokio::test]
async fn test_unexpected_messages_are_ignored() {
    let mut cluster = setup(START_TIMEOUT);
    cluster
        .starter
        .deliver(SteamMessage::StartCluster {
            id: "bogus".to_string(),
        })
        .await
        .unwrap();
    cluster
        .starter
        .deliver(SteamMessage::StopConfirmation {
            id: "bogus_response".to_string(),
            allowed: true,
        })
        .await
        .unwrap();
    assert!(matches!(
        cluster.starter.deliver_text("{\"_id\": 1}").await,
        Err(ExecutorError::InvalidMessage(_))
    ));
    cluster
        .starter
        .deliver_text(r#"{"_id": "s", "_type": "stopXGBoostClusterNotification"}"#)
        .await
        .unwrap();
    match cluster.steam.expect_message().await {
        SteamMessage::StopConfirmation { id, allowed } => {
            assert_eq!(id, "s_response");
            assert!(allowed);
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_fails_waiting_jobs() {
    let mut cluster = setup(START_TIMEOUT);
    let job = spawn_job(&cluster.starter, "job");
    let _request_id = cluster.steam.expect_start_request().await;
    cluster.starter.shutdown().await.unwrap();
    assert!(matches!(
        join_job(job).await,
        Err(ExecutorError::InternalError(_))
    ));
    assert!(cluster.starter.request_cluster("late").await.is_err());
    cluster.system.join().await;
}

#[tokio::test]
async fn test_shutdown_can_be_repeated() {
    let mut cluster = setup(START_TIMEOUT);
    let other = cluster.starter.clone();
    let (first, second) = tokio::join!(cluster.starter.shutdown(), other.shutdown());
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert!(cluster.starter.shutdown().await.is_ok());
    cluster.system.join().await;
}
