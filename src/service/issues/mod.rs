//! Issue tracker integration for stale-bot.
//!
//! This module provides the operations the bot needs from the hosting platform:
//! - Listing open issues along with their comments and label history
//! - Adding and removing labels
//! - Posting comments and closing issues
//!
//! It defines the `GenericIssueClient` trait that can be implemented for different
//! hosting platforms, with a default implementation for GitHub.

pub mod github;

use std::{ops::Deref, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::base::types::Issue;

// Errors.

/// Classified failures from the issue tracker.
///
/// The classification decides what the caller does next: retry, skip the issue, or
/// abort the whole run.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("Rate limited, retry in {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found")]
    NotFound,

    #[error("Issue already closed")]
    AlreadyClosed,

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether trying the same call again might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    /// Whether the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Whether the target is simply gone or already done, which is not a failure.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::NotFound | Self::AlreadyClosed)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// Types.

/// Filters for listing issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    /// Include pull requests in the listing.
    pub include_pull_requests: bool,
    /// Only issues carrying this label.
    pub label: Option<String>,
    /// Only issues updated at or after this time.
    pub since: Option<DateTime<Utc>>,
}

// Traits.

/// Generic issue tracker trait that clients must implement.
///
/// Only open issues are ever listed.
#[async_trait]
pub trait GenericIssueClient: Send + Sync + 'static {
    /// List open issues matching the query, with comments and label history filled in.
    async fn list_issues(&self, query: &IssueQuery) -> ApiResult<Vec<Issue>>;

    /// Add labels to an issue.
    async fn add_labels(&self, number: u64, labels: &[String]) -> ApiResult<()>;

    /// Remove a label from an issue.
    ///
    /// Removing a label that is not present is not an error.
    async fn remove_label(&self, number: u64, label: &str) -> ApiResult<()>;

    /// Post a comment on an issue.
    async fn post_comment(&self, number: u64, body: &str) -> ApiResult<()>;

    /// Close an issue as "not planned".
    async fn close_issue(&self, number: u64) -> ApiResult<()>;
}

// Structs.

/// Issue client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct IssueClient {
    inner: Arc<dyn GenericIssueClient>,
}

impl Deref for IssueClient {
    type Target = dyn GenericIssueClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl IssueClient {
    pub fn new(inner: Arc<dyn GenericIssueClient>) -> Self {
        Self { inner }
    }
}
