//! A dedicated module for executor starter options to ensure readonly access.
use std::time::Duration;

use steam_common::config::SteamConfig;

use crate::transport::SteamOutbox;

#[readonly::make]
pub struct ExecutorStarterOptions {
    /// How long to wait for Steam to report the outcome of a start request.
    pub start_timeout: Duration,
    /// The queue of messages to be sent to Steam.
    pub outbox: SteamOutbox,
}

impl ExecutorStarterOptions {
    pub fn new(start_timeout: Duration, outbox: SteamOutbox) -> Self {
        Self {
            start_timeout,
            outbox,
        }
    }

    pub fn from_config(config: &SteamConfig, outbox: SteamOutbox) -> Self {
        Self::new(Duration::from_secs(config.start_timeout_secs), outbox)
    }
}
