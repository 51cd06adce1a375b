//! A single pass over every open issue.
//!
//! The sweep lists candidate issues, asks the policy what to do with each one, and
//! applies the result. Issues are handled concurrently, but all writes to one issue
//! happen inside that issue's own future, one after another.
//!
//! A failure on one issue is logged and the sweep moves on. Only failures that make
//! every other call pointless as well (listing the issues, authentication) abort the run.

pub mod executor;

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::{
    base::types::{Issue, Res},
    policy::{self, Decision, Policy, SkipReason},
    runtime::Runtime,
    service::issues::{ApiError, ApiResult, IssueClient, IssueQuery},
};

// Types.

/// What happened to a single issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The policy chose not to look at the issue.
    Skipped(SkipReason),
    /// Nothing to do yet.
    Unchanged,
    /// The action was applied (or logged, in a dry run).
    Applied(&'static str),
    /// The per-run operation budget ran out; the issue will be looked at next run.
    Deferred,
    /// The issue disappeared or was closed in the meantime.
    Gone,
    /// Applying the action failed; logged and skipped.
    Failed,
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub evaluated: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub deferred: usize,
    pub failed: usize,
    /// Applied actions by name.
    pub applied: BTreeMap<&'static str, usize>,
}

impl SweepSummary {
    fn record(&mut self, outcome: &Outcome) {
        self.evaluated += 1;

        match outcome {
            Outcome::Skipped(_) | Outcome::Gone => self.skipped += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Applied(name) => *self.applied.entry(*name).or_default() += 1,
            Outcome::Deferred => self.deferred += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    pub fn applied_total(&self) -> usize {
        self.applied.values().sum()
    }
}

/// Per-run settings shared by every issue future.
struct Sweep<'a> {
    issues: &'a IssueClient,
    policy: &'a Policy,
    now: DateTime<Utc>,
    dry_run: bool,
    budget: AtomicUsize,
}

impl Sweep<'_> {
    /// Reserves one mutating operation from the run budget.
    fn take_operation(&self) -> bool {
        self.budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }

    /// Evaluates and applies the policy for one issue.
    ///
    /// Only fatal errors are returned; everything else is folded into the [`Outcome`].
    async fn process(&self, issue: Issue) -> ApiResult<Outcome> {
        let action = match policy::decide(&issue, self.now, self.policy) {
            Decision::Skip(reason) => {
                debug!("Skipping #{}: {reason:?}", issue.number);
                return Ok(Outcome::Skipped(reason));
            }
            Decision::NoAction => return Ok(Outcome::Unchanged),
            Decision::Act(action) => action,
        };

        if !self.take_operation() {
            debug!("Operation budget exhausted, deferring #{}", issue.number);
            return Ok(Outcome::Deferred);
        }

        if self.dry_run {
            info!("[DRY RUN] Would apply `{}` to #{} ({})", action.name(), issue.number, issue.title);
            return Ok(Outcome::Applied(action.name()));
        }

        match executor::apply(self.issues, issue.number, &action).await {
            Ok(()) => Ok(Outcome::Applied(action.name())),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) if err.is_skippable() => {
                info!("#{} is gone or already closed: {err}", issue.number);
                Ok(Outcome::Gone)
            }
            Err(err) => {
                error!("Failed to apply `{}` to #{}: {err}", action.name(), issue.number);
                Ok(Outcome::Failed)
            }
        }
    }
}

// Entry.

/// Runs one sweep over all open issues.
#[instrument(skip_all, fields(repository = %runtime.config.repository, now = %now))]
pub async fn run(runtime: &Runtime, now: DateTime<Utc>) -> Res<SweepSummary> {
    let policy = Policy::from_config(&runtime.config)?;

    let query = IssueQuery {
        include_pull_requests: policy.handles_pull_requests(),
        ..Default::default()
    };

    let issues = runtime.issues.list_issues(&query).await.map_err(|e| anyhow::anyhow!("Failed to list issues: {e}"))?;
    info!("Evaluating {} issues ...", issues.len());

    let sweep = Sweep {
        issues: &runtime.issues,
        policy: &policy,
        now,
        dry_run: runtime.config.dry_run,
        budget: AtomicUsize::new(runtime.config.operations_per_run),
    };

    let outcomes: Vec<Outcome> = stream::iter(issues)
        .map(|issue| {
            let span = info_span!("issue", number = issue.number);
            sweep.process(issue).instrument(span)
        })
        .buffer_unordered(runtime.config.concurrency.max(1))
        .try_collect()
        .await
        .map_err(|e: ApiError| anyhow::anyhow!("Aborting run: {e}"))?;

    let mut summary = SweepSummary::default();
    for outcome in &outcomes {
        summary.record(outcome);
    }

    if summary.deferred > 0 {
        warn!("Operation budget of {} reached; {} issues deferred to the next run.", runtime.config.operations_per_run, summary.deferred);
    }

    info!(
        evaluated = summary.evaluated,
        applied = summary.applied_total(),
        skipped = summary.skipped,
        unchanged = summary.unchanged,
        deferred = summary.deferred,
        failed = summary.failed,
        "Sweep complete."
    );

    Ok(summary)
}
