//! Common result aliases and the issue snapshot types shared by every module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// How a comment author relates to the repository.
///
/// Mirrors GitHub's `author_association` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Owner,
    Member,
    Collaborator,
    Contributor,
    FirstTimeContributor,
    FirstTimer,
    Mannequin,
    #[serde(other)]
    None,
}

impl AuthorAssociation {
    /// Whether this author is one of the people expected to triage issues.
    pub fn is_maintainer(&self) -> bool {
        matches!(self, Self::Owner | Self::Member | Self::Collaborator)
    }
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub association: AuthorAssociation,
    pub created_at: DateTime<Utc>,
}

/// A label on an issue, along with when it was most recently applied (if known).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl Label {
    pub fn new(name: impl Into<String>, applied_at: Option<DateTime<Utc>>) -> Self {
        Self { name: name.into(), applied_at }
    }
}

/// A fresh snapshot of an issue, as read at the start of a run.
///
/// The bot keeps no state of its own: everything it knows about an issue
/// (including whether it was already reminded or marked stale) is derived
/// from the labels and timestamps in here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub is_pull_request: bool,
    pub created_at: DateTime<Utc>,
    /// Latest of the creation time and every non-bot comment.
    pub last_activity: DateTime<Utc>,
    pub labels: Vec<Label>,
    pub comments: Vec<Comment>,
}

impl Issue {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    pub fn label(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.name == name)
    }

    /// Recomputes `last_activity` from the creation time and the comments, ignoring `bot_login`.
    pub fn compute_last_activity(created_at: DateTime<Utc>, comments: &[Comment], bot_login: &str) -> DateTime<Utc> {
        comments.iter().filter(|c| c.author != bot_login).map(|c| c.created_at).fold(created_at, |latest, at| latest.max(at))
    }
}
