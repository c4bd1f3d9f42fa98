use std::future::Future;

use log::{info, warn};
use steam_common::config::AppConfig;
use steam_common::runtime::RuntimeManager;
use steam_executor::error::ExecutorResult;
use steam_executor::transport::{outbox, SteamConnection};
use steam_executor::{ExecutorStarter, ExecutorStarterOptions};
use steam_server::actor::ActorSystem;
use steam_server::RetryStrategy;
use steam_telemetry::telemetry::{init_telemetry, shutdown_telemetry, ResourceOptions};

async fn shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down the Steam client...");
}

/// Request the external cluster and hold the lease until interrupted.
async fn hold_cluster(starter: &ExecutorStarter, job: &str) -> ExecutorResult<()> {
    let lease = tokio::select! {
        lease = starter.request_cluster(job) => lease?,
        _ = shutdown() => return Ok(()),
    };
    info!(
        "Job {job} is using the external cluster at {} with lease {}",
        lease.uri(),
        lease.id()
    );
    println!("{}", lease.uri());
    shutdown().await;
    lease.release().await
}

async fn serve_steam(
    config: &AppConfig,
    url: &str,
    job: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let retry_strategy = RetryStrategy::from(&config.steam.connect_retry_strategy);
    let connection =
        SteamConnection::connect(url, config.steam.token.as_deref(), &retry_strategy).await?;

    let mut system = ActorSystem::new();
    let (tx, rx) = outbox();
    let starter = ExecutorStarter::new(
        &mut system,
        ExecutorStarterOptions::from_config(&config.steam, tx),
    );
    let mut serve = tokio::spawn(connection.serve(starter.clone(), rx));

    let session = async {
        match job {
            Some(job) => hold_cluster(&starter, &job).await,
            None => {
                shutdown().await;
                Ok(())
            }
        }
    };
    let mut served = false;
    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        result = session => result.map_err(Into::into),
        result = &mut serve => {
            served = true;
            match result {
                Ok(Ok(())) => {
                    info!("The Steam connection has closed.");
                    Ok(())
                }
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        }
    };

    // Stopping the executor starter closes the outbox, which ends the connection.
    starter.shutdown().await?;
    system.join().await;
    if !served {
        match serve.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("The Steam connection failed while closing: {e}"),
            Err(e) => warn!("The Steam connection task failed: {e}"),
        }
    }
    result
}

pub fn run_steam_client(
    url: Option<String>,
    job: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let runtime = RuntimeManager::try_new(&config.runtime)?;

    init_telemetry(ResourceOptions { kind: "cli" })?;

    let url = url.unwrap_or_else(|| config.steam.url.clone());
    info!("Connecting to Steam at {url}...");
    run_and_shutdown(&runtime, serve_steam(&config, &url, job))
}

/// Run the session to completion and flush the logs whether or not it succeeds.
fn run_and_shutdown<F>(runtime: &RuntimeManager, session: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = Result<(), Box<dyn std::error::Error>>>,
{
    let result = runtime.handle().block_on(session);

    shutdown_telemetry();

    result
}
