//! Runtime services and shared state for the stale-bot.

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::{
    base::{config::Config, types::Res},
    service::issues::IssueClient,
    sweep::{self, SweepSummary},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the issue client and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The issue tracker client instance.
    pub issues: IssueClient,
}

impl Runtime {
    /// Create a new runtime instance backed by GitHub.
    #[instrument(skip_all)]
    pub fn new(config: Config, token: &str) -> Res<Self> {
        let issues = IssueClient::github(&config, token)?;

        Ok(Self { config, issues })
    }

    /// Run a single sweep as of `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Res<SweepSummary> {
        sweep::run(self, now).await
    }
}
