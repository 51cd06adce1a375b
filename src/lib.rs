//! Library root for `stale-bot`.
//!
//! Stale-bot is a scheduled bot that keeps a repository's issue tracker tidy:
//! - Reminds maintainers about issues nobody has triaged yet
//! - Reminds reporters when a maintainer is waiting on their reply
//! - Marks issues stale after a period of inactivity
//! - Closes stale issues that stay inactive
//!
//! The bot holds no state of its own. Each run reads fresh issue snapshots, and the
//! labels on each issue record where it is in its lifecycle. The decision logic in
//! [`policy`] is pure; [`sweep`] applies it through the [`service::issues`] client.

pub mod base;
pub mod policy;
pub mod runtime;
pub mod service;
pub mod sweep;

use base::{config::Config, types::Res};
use chrono::{DateTime, Utc};
use sweep::SweepSummary;
use tracing::{info, warn};

/// Facts about the environment the bot was invoked in.
///
/// The hosting platform's scheduler supplies these; they are passed in explicitly so the
/// canonical repository guard never depends on global state.
#[derive(Debug, Clone)]
pub struct RunEnvironment {
    /// The `owner/name` repository this invocation is executing in.
    pub repository: String,
    /// The evaluation time for this run.
    pub now: DateTime<Utc>,
}

impl RunEnvironment {
    /// Whether this invocation belongs to the canonical repository (and not a fork).
    pub fn is_canonical(&self, config: &Config) -> bool {
        self.repository.eq_ignore_ascii_case(&config.repository)
    }
}

/// Public async entry for the binary crate.
///
/// Builds the GitHub-backed runtime and runs a single sweep.
pub async fn start(config: Config, token: &str, env: RunEnvironment) -> Res<Option<SweepSummary>> {
    info!("Starting stale-bot ...");

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config, token)?;

    run(&runtime, &env).await
}

/// Runs a sweep unless the invocation is outside the canonical repository.
///
/// Returns `None` when the guard prevented the run.
pub async fn run(runtime: &runtime::Runtime, env: &RunEnvironment) -> Res<Option<SweepSummary>> {
    if !env.is_canonical(&runtime.config) {
        warn!("Running in `{}`, not the canonical `{}`; nothing to do.", env.repository, runtime.config.repository);
        return Ok(None);
    }

    let summary = runtime.run(env.now).await?;

    Ok(Some(summary))
}
