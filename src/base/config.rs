//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::base::messages;

use super::types::Res;

/// Default GitHub API endpoint.
fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

/// Default login of the account the bot acts as.
fn default_bot_login() -> String {
    "github-actions[bot]".to_string()
}

fn default_days_before_stale() -> i64 {
    30
}

fn default_days_before_close() -> i64 {
    35
}

fn default_days_before_triage_reminder() -> i64 {
    7
}

fn default_days_before_reply_reminder() -> i64 {
    14
}

/// Pull requests are left alone unless explicitly enabled.
fn default_days_before_pr() -> i64 {
    -1
}

fn default_stale_label() -> String {
    "stale".to_string()
}

fn default_triage_reminder_label() -> String {
    "triage-reminded".to_string()
}

fn default_reply_reminder_label() -> String {
    "reply-reminded".to_string()
}

fn default_stale_issue_message() -> String {
    messages::STALE_ISSUE_MESSAGE.to_string()
}

fn default_close_issue_message() -> String {
    messages::CLOSE_ISSUE_MESSAGE.to_string()
}

fn default_triage_reminder_message() -> String {
    messages::TRIAGE_REMINDER_MESSAGE.to_string()
}

fn default_reply_reminder_message() -> String {
    messages::REPLY_REMINDER_MESSAGE.to_string()
}

/// Maximum number of mutating actions in a single run.
fn default_operations_per_run() -> usize {
    100
}

/// Number of issues evaluated and mutated at the same time.
fn default_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

/// Configuration for the stale-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Canonical `owner/name` repository the bot is allowed to run against (`REPOSITORY`).
    pub repository: String,
    /// GitHub API endpoint (`API_BASE_URL`).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Login of the account the bot posts as; its comments never count as activity (`BOT_LOGIN`).
    #[serde(default = "default_bot_login")]
    pub bot_login: String,

    /// Days of inactivity before an issue is marked stale, or `-1` to disable (`DAYS_BEFORE_STALE`).
    #[serde(default = "default_days_before_stale")]
    pub days_before_stale: i64,
    /// Days after being marked stale before an issue is closed, or `-1` to disable (`DAYS_BEFORE_CLOSE`).
    #[serde(default = "default_days_before_close")]
    pub days_before_close: i64,
    /// Days of inactivity before an untriaged issue gets a reminder, or `-1` to disable.
    #[serde(default = "default_days_before_triage_reminder")]
    pub days_before_triage_reminder: i64,
    /// Days of inactivity before the reporter is reminded to reply, or `-1` to disable.
    #[serde(default = "default_days_before_reply_reminder")]
    pub days_before_reply_reminder: i64,
    /// Same as `days_before_stale`, for pull requests.
    #[serde(default = "default_days_before_pr")]
    pub days_before_pr_stale: i64,
    /// Same as `days_before_close`, for pull requests.
    #[serde(default = "default_days_before_pr")]
    pub days_before_pr_close: i64,
    /// Issues created before this ISO-8601 date (or date-time) are never processed (`START_DATE`).
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default = "default_stale_label")]
    pub stale_label: String,
    #[serde(default = "default_triage_reminder_label")]
    pub triage_reminder_label: String,
    #[serde(default = "default_reply_reminder_label")]
    pub reply_reminder_label: String,
    /// Issues carrying any of these labels are never touched (`EXEMPT_LABELS`, comma separated).
    #[serde(default)]
    pub exempt_labels: Vec<String>,

    #[serde(default = "default_stale_issue_message")]
    pub stale_issue_message: String,
    #[serde(default = "default_close_issue_message")]
    pub close_issue_message: String,
    #[serde(default = "default_triage_reminder_message")]
    pub triage_reminder_message: String,
    #[serde(default = "default_reply_reminder_message")]
    pub reply_reminder_message: String,

    /// Cap on mutating actions per run (`OPERATIONS_PER_RUN`).
    #[serde(default = "default_operations_per_run")]
    pub operations_per_run: usize,
    /// Number of issues processed concurrently (`CONCURRENCY`).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Timeout for a single API request attempt (`REQUEST_TIMEOUT_SECS`).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Attempts per API call, including the first (`RETRY_MAX_ATTEMPTS`).
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Base delay for exponential backoff (`RETRY_BASE_DELAY_MS`).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Log decisions without touching any issue (`DRY_RUN`).
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            repository: String::new(),
            api_base_url: default_api_base_url(),
            bot_login: default_bot_login(),
            days_before_stale: default_days_before_stale(),
            days_before_close: default_days_before_close(),
            days_before_triage_reminder: default_days_before_triage_reminder(),
            days_before_reply_reminder: default_days_before_reply_reminder(),
            days_before_pr_stale: default_days_before_pr(),
            days_before_pr_close: default_days_before_pr(),
            start_date: None,
            stale_label: default_stale_label(),
            triage_reminder_label: default_triage_reminder_label(),
            reply_reminder_label: default_reply_reminder_label(),
            exempt_labels: Vec::new(),
            stale_issue_message: default_stale_issue_message(),
            close_issue_message: default_close_issue_message(),
            triage_reminder_message: default_triage_reminder_message(),
            reply_reminder_message: default_reply_reminder_message(),
            operations_per_run: default_operations_per_run(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            dry_run: false,
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let env = config::Environment::default()
            .prefix("STALE_BOT")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("exempt_labels");

        let mut cfg = config::Config::builder().add_source(env);

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".github/stale-bot.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".github/stale-bot.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks the values that deserialization alone cannot.
    pub fn validate(&self) -> Res<()> {
        if self.repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(anyhow::anyhow!("Repository must be of the form `owner/name`, got `{}`.", self.repository));
        }

        let thresholds = [
            ("days_before_stale", self.days_before_stale),
            ("days_before_close", self.days_before_close),
            ("days_before_triage_reminder", self.days_before_triage_reminder),
            ("days_before_reply_reminder", self.days_before_reply_reminder),
            ("days_before_pr_stale", self.days_before_pr_stale),
            ("days_before_pr_close", self.days_before_pr_close),
        ];

        for (name, days) in thresholds {
            if days < -1 {
                return Err(anyhow::anyhow!("{name} must be -1 (disabled) or a non-negative number of days, got {days}."));
            }
        }

        // Staleness may only happen once both reminder windows have run out.
        if self.days_before_stale >= 0 {
            if self.days_before_triage_reminder >= 0 && self.days_before_stale < self.days_before_triage_reminder {
                return Err(anyhow::anyhow!("days_before_stale must not be shorter than days_before_triage_reminder."));
            }

            if self.days_before_reply_reminder >= 0 && self.days_before_stale < self.days_before_reply_reminder {
                return Err(anyhow::anyhow!("days_before_stale must not be shorter than days_before_reply_reminder."));
            }
        }

        let labels = [&self.stale_label, &self.triage_reminder_label, &self.reply_reminder_label];
        if labels.iter().any(|l| l.is_empty()) {
            return Err(anyhow::anyhow!("State labels must not be empty."));
        }

        if self.concurrency < 1 {
            return Err(anyhow::anyhow!("Concurrency must be at least 1."));
        }

        if self.retry_max_attempts < 1 {
            return Err(anyhow::anyhow!("Retry max attempts must be at least 1."));
        }

        self.start_date()?;

        Ok(())
    }

    /// Splits the canonical repository into `(owner, name)`.
    pub fn owner_and_name(&self) -> Res<(&str, &str)> {
        self.repository
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("Repository must be of the form `owner/name`, got `{}`.", self.repository))
    }

    /// Parses `start_date`, accepting either a full RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
    pub fn start_date(&self) -> Res<Option<DateTime<Utc>>> {
        let Some(raw) = self.start_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }

        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| anyhow::anyhow!("Invalid start_date `{raw}`: {e}"))?;

        Ok(date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
    }
}
