//! The issue lifecycle policy.
//!
//! Everything in here is pure: given an [`Issue`] snapshot, the current time, and a
//! [`Policy`], [`decide`] returns what should happen to the issue. No state is kept
//! between runs; the labels on the issue *are* the state machine, and
//! [`derive_state`] reads it back out of them.

pub mod threshold;

use chrono::{DateTime, Utc};

use crate::base::{
    config::Config,
    types::{Issue, Res},
};

pub use threshold::Threshold;

// Types.

/// Where an issue sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Fresh,
    TriageReminderSent,
    ReplyReminderSent,
    Stale,
    Closed,
}

/// Why an issue was not evaluated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BeforeStartDate,
    PullRequest,
    Exempt,
}

/// A mutation to apply to a single issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// New activity happened after these state labels were applied; remove them.
    Reset { labels: Vec<String> },
    TriageReminder { label: String, message: String },
    ReplyReminder { label: String, message: String },
    MarkStale { label: String, message: String },
    Close { message: String },
}

impl Action {
    /// Short name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reset { .. } => "reset",
            Self::TriageReminder { .. } => "triage_reminder",
            Self::ReplyReminder { .. } => "reply_reminder",
            Self::MarkStale { .. } => "mark_stale",
            Self::Close { .. } => "close",
        }
    }

    /// The state the issue is in once this action has been applied.
    pub fn resulting_state(&self) -> IssueState {
        match self {
            Self::Reset { .. } => IssueState::Fresh,
            Self::TriageReminder { .. } => IssueState::TriageReminderSent,
            Self::ReplyReminder { .. } => IssueState::ReplyReminderSent,
            Self::MarkStale { .. } => IssueState::Stale,
            Self::Close { .. } => IssueState::Closed,
        }
    }
}

/// The outcome of evaluating one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    NoAction,
    Act(Action),
}

/// Immutable evaluation settings, derived once per run from [`Config`].
#[derive(Debug, Clone)]
pub struct Policy {
    pub start_date: Option<DateTime<Utc>>,
    pub bot_login: String,

    pub stale: Threshold,
    pub close: Threshold,
    pub triage_reminder: Threshold,
    pub reply_reminder: Threshold,
    pub pr_stale: Threshold,
    pub pr_close: Threshold,

    pub stale_label: String,
    pub triage_reminder_label: String,
    pub reply_reminder_label: String,
    pub exempt_labels: Vec<String>,

    pub stale_issue_message: String,
    pub close_issue_message: String,
    pub triage_reminder_message: String,
    pub reply_reminder_message: String,
}

impl Policy {
    pub fn from_config(config: &Config) -> Res<Self> {
        Ok(Self {
            start_date: config.start_date()?,
            bot_login: config.bot_login.clone(),
            stale: Threshold::from_days(config.days_before_stale)?,
            close: Threshold::from_days(config.days_before_close)?,
            triage_reminder: Threshold::from_days(config.days_before_triage_reminder)?,
            reply_reminder: Threshold::from_days(config.days_before_reply_reminder)?,
            pr_stale: Threshold::from_days(config.days_before_pr_stale)?,
            pr_close: Threshold::from_days(config.days_before_pr_close)?,
            stale_label: config.stale_label.clone(),
            triage_reminder_label: config.triage_reminder_label.clone(),
            reply_reminder_label: config.reply_reminder_label.clone(),
            exempt_labels: config.exempt_labels.clone(),
            stale_issue_message: config.stale_issue_message.clone(),
            close_issue_message: config.close_issue_message.clone(),
            triage_reminder_message: config.triage_reminder_message.clone(),
            reply_reminder_message: config.reply_reminder_message.clone(),
        })
    }

    /// Whether pull requests are evaluated at all.
    pub fn handles_pull_requests(&self) -> bool {
        self.pr_stale.is_enabled() || self.pr_close.is_enabled()
    }

    fn stale_threshold(&self, issue: &Issue) -> Threshold {
        if issue.is_pull_request { self.pr_stale } else { self.stale }
    }

    fn close_threshold(&self, issue: &Issue) -> Threshold {
        if issue.is_pull_request { self.pr_close } else { self.close }
    }

    /// The labels this policy owns, in reset order.
    fn state_labels(&self) -> [&str; 3] {
        [self.stale_label.as_str(), self.triage_reminder_label.as_str(), self.reply_reminder_label.as_str()]
    }
}

// Derivations.

/// Reads the lifecycle state out of the issue's labels.
pub fn derive_state(issue: &Issue, policy: &Policy) -> IssueState {
    if issue.has_label(&policy.stale_label) {
        IssueState::Stale
    } else if issue.has_label(&policy.reply_reminder_label) {
        IssueState::ReplyReminderSent
    } else if issue.has_label(&policy.triage_reminder_label) {
        IssueState::TriageReminderSent
    } else {
        IssueState::Fresh
    }
}

/// No maintainer has commented on the issue yet.
pub fn is_untriaged(issue: &Issue) -> bool {
    !issue.comments.iter().any(|c| c.association.is_maintainer())
}

/// The latest human comment is a maintainer (other than the reporter) waiting on the reporter.
pub fn is_awaiting_response(issue: &Issue, bot_login: &str) -> bool {
    issue
        .comments
        .iter()
        .filter(|c| c.author != bot_login)
        .max_by_key(|c| c.created_at)
        .is_some_and(|c| c.association.is_maintainer() && c.author != issue.author)
}

/// When a label was applied; labels of unknown age are treated as applied at the last activity.
fn label_applied_at(issue: &Issue, name: &str) -> Option<DateTime<Utc>> {
    issue.label(name).map(|l| l.applied_at.unwrap_or(issue.last_activity))
}

/// State labels that have seen activity since they were applied.
fn labels_to_reset(issue: &Issue, policy: &Policy) -> Vec<String> {
    policy
        .state_labels()
        .into_iter()
        .filter(|name| label_applied_at(issue, name).is_some_and(|applied| issue.last_activity > applied))
        .map(str::to_string)
        .collect()
}

// Decision.

/// Decides what to do with a single issue.
///
/// Rules are checked in order and the first one that matches wins, so an issue gets at
/// most one action per run.
pub fn decide(issue: &Issue, now: DateTime<Utc>, policy: &Policy) -> Decision {
    if issue.is_pull_request && !policy.handles_pull_requests() {
        return Decision::Skip(SkipReason::PullRequest);
    }

    if policy.exempt_labels.iter().any(|l| issue.has_label(l)) {
        return Decision::Skip(SkipReason::Exempt);
    }

    if policy.start_date.is_some_and(|start| issue.created_at < start) {
        return Decision::Skip(SkipReason::BeforeStartDate);
    }

    // Activity after a state label was applied puts the issue back to fresh. This runs
    // before the time-based rules so a revived stale issue is never closed.
    let reset = labels_to_reset(issue, policy);
    if !reset.is_empty() {
        return Decision::Act(Action::Reset { labels: reset });
    }

    let state = derive_state(issue, policy);
    let last_activity = issue.last_activity;

    if !issue.is_pull_request {
        if policy.triage_reminder.has_elapsed(last_activity, now) && !issue.has_label(&policy.triage_reminder_label) && is_untriaged(issue) {
            return Decision::Act(Action::TriageReminder {
                label: policy.triage_reminder_label.clone(),
                message: policy.triage_reminder_message.clone(),
            });
        }

        if policy.reply_reminder.has_elapsed(last_activity, now) && !issue.has_label(&policy.reply_reminder_label) && is_awaiting_response(issue, &policy.bot_login) {
            return Decision::Act(Action::ReplyReminder {
                label: policy.reply_reminder_label.clone(),
                message: policy.reply_reminder_message.clone(),
            });
        }
    }

    if state != IssueState::Stale && policy.stale_threshold(issue).has_elapsed(last_activity, now) {
        return Decision::Act(Action::MarkStale {
            label: policy.stale_label.clone(),
            message: policy.stale_issue_message.clone(),
        });
    }

    if state == IssueState::Stale
        && let Some(staled_at) = label_applied_at(issue, &policy.stale_label)
        && policy.close_threshold(issue).has_elapsed(staled_at, now)
    {
        return Decision::Act(Action::Close {
            message: policy.close_issue_message.clone(),
        });
    }

    Decision::NoAction
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{
        config::ConfigInner,
        types::{AuthorAssociation, Comment, Label},
    };
    use chrono::{Duration, TimeZone};

    const BOT: &str = "github-actions[bot]";

    fn policy() -> Policy {
        policy_with(ConfigInner::default())
    }

    fn policy_with(inner: ConfigInner) -> Policy {
        let config = Config::from(ConfigInner {
            repository: "mlflow/mlflow".to_string(),
            ..inner
        });
        Policy::from_config(&config).unwrap()
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 1, 0, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        created() + Duration::days(n)
    }

    fn issue() -> Issue {
        Issue {
            number: 42,
            title: "Something is broken".to_string(),
            author: "reporter".to_string(),
            is_pull_request: false,
            created_at: created(),
            last_activity: created(),
            labels: vec![],
            comments: vec![],
        }
    }

    fn comment(author: &str, association: AuthorAssociation, at: DateTime<Utc>) -> Comment {
        Comment {
            author: author.to_string(),
            association,
            created_at: at,
        }
    }

    /// Applies an action to a snapshot the way the executor would, so runs can be chained.
    fn apply(issue: &mut Issue, action: &Action, at: DateTime<Utc>) {
        match action {
            Action::Reset { labels } => issue.labels.retain(|l| !labels.contains(&l.name)),
            Action::TriageReminder { label, .. } | Action::ReplyReminder { label, .. } | Action::MarkStale { label, .. } => {
                issue.labels.push(Label::new(label.clone(), Some(at)));
                issue.comments.push(comment(BOT, AuthorAssociation::None, at));
            }
            Action::Close { .. } => issue.comments.push(comment(BOT, AuthorAssociation::None, at)),
        }
    }

    fn add_comment(issue: &mut Issue, c: Comment) {
        issue.comments.push(c);
        issue.last_activity = Issue::compute_last_activity(issue.created_at, &issue.comments, BOT);
    }

    #[test]
    fn issues_before_start_date_are_never_processed() {
        let policy = policy_with(ConfigInner {
            start_date: Some("2022-09-01".to_string()),
            ..Default::default()
        });

        let mut stale = issue();
        stale.labels.push(Label::new("stale", Some(day(1))));
        stale.last_activity = day(5);

        for candidate in [issue(), stale] {
            for n in [0, 8, 30, 365] {
                assert_eq!(decide(&candidate, day(n), &policy), Decision::Skip(SkipReason::BeforeStartDate));
            }
        }

        let mut after = issue();
        after.created_at = Utc.with_ymd_and_hms(2022, 9, 2, 0, 0, 0).unwrap();
        after.last_activity = after.created_at;
        assert_eq!(decide(&after, after.created_at, &policy), Decision::NoAction);
    }

    #[test]
    fn pull_requests_are_skipped_with_sentinel() {
        let policy = policy();
        let mut pr = issue();
        pr.is_pull_request = true;

        for n in [0, 8, 31, 1000] {
            assert_eq!(decide(&pr, day(n), &policy), Decision::Skip(SkipReason::PullRequest));
        }
    }

    #[test]
    fn pull_request_stale_disabled_but_close_enabled_never_stales() {
        let policy = policy_with(ConfigInner {
            days_before_pr_stale: -1,
            days_before_pr_close: 10,
            ..Default::default()
        });
        let mut pr = issue();
        pr.is_pull_request = true;

        for n in [0, 31, 1000] {
            assert_eq!(decide(&pr, day(n), &policy), Decision::NoAction);
        }
    }

    #[test]
    fn pull_requests_get_no_reminders() {
        let policy = policy_with(ConfigInner {
            days_before_pr_stale: 30,
            ..Default::default()
        });
        let mut pr = issue();
        pr.is_pull_request = true;

        assert_eq!(decide(&pr, day(8), &policy), Decision::NoAction);
        assert!(matches!(decide(&pr, day(30), &policy), Decision::Act(Action::MarkStale { .. })));
    }

    #[test]
    fn exempt_labels_are_skipped() {
        let policy = policy_with(ConfigInner {
            exempt_labels: vec!["pinned".to_string()],
            ..Default::default()
        });
        let mut pinned = issue();
        pinned.labels.push(Label::new("pinned", None));

        assert_eq!(decide(&pinned, day(100), &policy), Decision::Skip(SkipReason::Exempt));
    }

    #[test]
    fn triage_reminder_fires_once() {
        let policy = policy();
        let mut issue = issue();

        assert_eq!(decide(&issue, day(6), &policy), Decision::NoAction);

        let decision = decide(&issue, day(8), &policy);
        let Decision::Act(action) = decision else {
            panic!("expected an action, got {decision:?}");
        };
        assert_eq!(
            action,
            Action::TriageReminder {
                label: "triage-reminded".to_string(),
                message: policy.triage_reminder_message.clone(),
            }
        );

        apply(&mut issue, &action, day(8));
        assert_eq!(derive_state(&issue, &policy), IssueState::TriageReminderSent);
        assert_eq!(decide(&issue, day(9), &policy), Decision::NoAction);
        assert_eq!(decide(&issue, day(20), &policy), Decision::NoAction);
    }

    #[test]
    fn new_activity_resets_triage_reminder() {
        let policy = policy();
        let mut issue = issue();
        issue.labels.push(Label::new("triage-reminded", Some(day(8))));

        add_comment(&mut issue, comment("reporter", AuthorAssociation::None, day(10)));
        assert_eq!(
            decide(&issue, day(11), &policy),
            Decision::Act(Action::Reset {
                labels: vec!["triage-reminded".to_string()],
            })
        );

        issue.labels.clear();
        assert_eq!(decide(&issue, day(16), &policy), Decision::NoAction);
        assert!(matches!(decide(&issue, day(17), &policy), Decision::Act(Action::TriageReminder { .. })));
    }

    #[test]
    fn triaged_issues_get_no_triage_reminder() {
        let policy = policy();
        let mut issue = issue();
        add_comment(&mut issue, comment("maintainer", AuthorAssociation::Member, day(1)));
        add_comment(&mut issue, comment("reporter", AuthorAssociation::None, day(2)));

        assert_eq!(decide(&issue, day(12), &policy), Decision::NoAction);
    }

    #[test]
    fn reply_reminder_when_maintainer_waits_on_reporter() {
        let policy = policy();
        let mut issue = issue();
        add_comment(&mut issue, comment("maintainer", AuthorAssociation::Collaborator, day(1)));

        assert!(is_awaiting_response(&issue, BOT));
        assert_eq!(decide(&issue, day(14), &policy), Decision::NoAction);

        let Decision::Act(action) = decide(&issue, day(15), &policy) else {
            panic!("expected a reply reminder");
        };
        assert_eq!(action.name(), "reply_reminder");

        apply(&mut issue, &action, day(15));
        assert_eq!(derive_state(&issue, &policy), IssueState::ReplyReminderSent);
        assert_eq!(decide(&issue, day(16), &policy), Decision::NoAction);
    }

    #[test]
    fn maintainer_reporter_is_not_awaiting_themselves() {
        let mut issue = issue();
        issue.author = "maintainer".to_string();
        add_comment(&mut issue, comment("maintainer", AuthorAssociation::Owner, day(1)));

        assert!(!is_awaiting_response(&issue, BOT));
    }

    #[test]
    fn bot_comments_do_not_count_as_waiting() {
        let mut issue = issue();
        add_comment(&mut issue, comment("maintainer", AuthorAssociation::Member, day(1)));
        add_comment(&mut issue, comment("reporter", AuthorAssociation::None, day(2)));
        add_comment(&mut issue, comment(BOT, AuthorAssociation::None, day(3)));

        assert!(!is_awaiting_response(&issue, BOT));
        assert_eq!(issue.last_activity, day(2));
    }

    #[test]
    fn stale_after_reminders_then_closed() {
        let policy = policy();
        let mut issue = issue();

        let Decision::Act(reminder) = decide(&issue, day(8), &policy) else {
            panic!("expected a triage reminder");
        };
        apply(&mut issue, &reminder, day(8));

        assert_eq!(decide(&issue, day(29), &policy), Decision::NoAction);

        let Decision::Act(stale) = decide(&issue, day(30), &policy) else {
            panic!("expected the issue to go stale");
        };
        assert_eq!(stale.resulting_state(), IssueState::Stale);
        apply(&mut issue, &stale, day(30));

        assert_eq!(decide(&issue, day(64), &policy), Decision::NoAction);
        assert_eq!(
            decide(&issue, day(65), &policy),
            Decision::Act(Action::Close {
                message: policy.close_issue_message.clone(),
            })
        );
    }

    #[test]
    fn stale_at_day_fourteen_closes_at_day_forty_nine() {
        let policy = policy_with(ConfigInner {
            days_before_stale: 14,
            days_before_close: 35,
            ..Default::default()
        });
        let mut issue = issue();
        issue.labels.push(Label::new("triage-reminded", Some(day(7))));
        issue.labels.push(Label::new("stale", Some(day(14))));

        assert_eq!(decide(&issue, day(48), &policy), Decision::NoAction);

        let decision = decide(&issue, day(49), &policy);
        assert_eq!(
            decision,
            Decision::Act(Action::Close {
                message: policy.close_issue_message.clone(),
            })
        );
    }

    #[test]
    fn activity_after_stale_removes_label_and_prevents_close() {
        let policy = policy_with(ConfigInner {
            days_before_stale: 14,
            days_before_close: 35,
            ..Default::default()
        });
        let mut issue = issue();
        issue.labels.push(Label::new("triage-reminded", Some(day(7))));
        issue.labels.push(Label::new("stale", Some(day(14))));

        add_comment(&mut issue, comment("reporter", AuthorAssociation::None, day(20)));

        let Decision::Act(action) = decide(&issue, day(49), &policy) else {
            panic!("expected a reset");
        };
        assert_eq!(
            action,
            Action::Reset {
                labels: vec!["stale".to_string(), "triage-reminded".to_string()],
            }
        );

        apply(&mut issue, &action, day(49));
        assert_eq!(derive_state(&issue, &policy), IssueState::Fresh);
        assert!(!matches!(decide(&issue, day(50), &policy), Decision::Act(Action::Close { .. })));
    }

    #[test]
    fn stale_label_of_unknown_age_waits_for_full_close_period() {
        let policy = policy();
        let mut issue = issue();
        issue.labels.push(Label::new("triage-reminded", None));
        issue.labels.push(Label::new("stale", None));

        assert_eq!(decide(&issue, day(34), &policy), Decision::NoAction);
        assert!(matches!(decide(&issue, day(35), &policy), Decision::Act(Action::Close { .. })));
    }

    #[test]
    fn disabled_close_keeps_stale_issues_open() {
        let policy = policy_with(ConfigInner {
            days_before_close: -1,
            ..Default::default()
        });
        let mut issue = issue();
        issue.labels.push(Label::new("triage-reminded", Some(day(7))));
        issue.labels.push(Label::new("stale", Some(day(30))));

        assert_eq!(decide(&issue, day(1000), &policy), Decision::NoAction);
    }

    #[test]
    fn disabled_reminders_go_straight_to_stale() {
        let policy = policy_with(ConfigInner {
            days_before_triage_reminder: -1,
            days_before_reply_reminder: -1,
            ..Default::default()
        });
        let issue = issue();

        assert_eq!(decide(&issue, day(29), &policy), Decision::NoAction);
        assert!(matches!(decide(&issue, day(30), &policy), Decision::Act(Action::MarkStale { .. })));
    }
}
