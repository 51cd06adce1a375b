//! GitHub REST implementation of [`GenericIssueClient`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{AuthorAssociation, Comment, Issue, Label, Res},
    },
    service::retry::{RetryPolicy, with_retry},
};

use super::{ApiError, ApiResult, GenericIssueClient, IssueClient, IssueQuery};

const PER_PAGE: usize = 100;
const MAX_PAGES: u32 = 100;
const USER_AGENT: &str = concat!("stale-bot/", env!("CARGO_PKG_VERSION"));

/// GitHub's documented minimum wait after hitting a secondary rate limit.
const SECONDARY_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

// Extra methods on `IssueClient` applied by the github implementation.

impl IssueClient {
    /// Creates a new GitHub issue client for the configured repository.
    pub fn github(config: &Config, token: &str) -> Res<Self> {
        let client = GitHubIssueClient::new(config, token)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    state: String,
    user: Option<GhUser>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GhComment {
    user: Option<GhUser>,
    author_association: AuthorAssociation,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GhEvent {
    event: String,
    label: Option<GhLabel>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GhError {
    message: String,
}

// Structs.

/// GitHub issue client implementation.
#[derive(Clone)]
pub struct GitHubIssueClient {
    http: Client,
    base_url: String,
    repo_path: String,
    bot_login: String,
    /// Labels whose applied time matters; label history is only fetched for issues carrying one.
    state_labels: Vec<String>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl GitHubIssueClient {
    /// Create a new GitHub issue client.
    #[instrument(name = "GitHubIssueClient::new", skip_all)]
    pub fn new(config: &Config, token: &str) -> Res<Self> {
        let (owner, name) = config.owner_and_name()?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        let http = Client::builder().user_agent(USER_AGENT).default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            repo_path: format!("repos/{owner}/{name}"),
            bot_login: config.bot_login.clone(),
            state_labels: vec![config.stale_label.clone(), config.triage_reminder_label.clone(), config.reply_reminder_label.clone()],
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.repo_path, path)
    }

    /// Sends a request built fresh for every attempt, classifying failures.
    async fn send<F>(&self, operation: &str, build: F) -> ApiResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;

        with_retry(&self.retry, operation, move || execute(build())).await
    }

    /// Fetches and decodes a JSON body; reading the body is part of the retried attempt.
    async fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str, query: &[(&str, String)]) -> ApiResult<T> {
        let url = self.url(path);
        let (http, url) = (&self.http, &url);

        with_retry(&self.retry, operation, move || async move {
            let response = execute(http.request(Method::GET, url).query(query)).await?;
            Ok::<T, ApiError>(response.json::<T>().await?)
        })
        .await
    }

    /// Fetches every page of a list endpoint.
    async fn get_all_pages<T: DeserializeOwned>(&self, operation: &str, path: &str, extra: &[(&str, String)]) -> ApiResult<Vec<T>> {
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut query = vec![("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            query.extend(extra.iter().cloned());

            let batch: Vec<T> = self.get_json(operation, path, &query).await?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);

            if done {
                return Ok(items);
            }
        }

        warn!("{operation}: stopped after {MAX_PAGES} pages");
        Ok(items)
    }

    /// Fills in comments and label history for a listed issue.
    #[instrument(skip(self, raw), fields(number = raw.number))]
    async fn hydrate(&self, raw: GhIssue) -> ApiResult<Issue> {
        let comments: Vec<GhComment> = self.get_all_pages("list_comments", &format!("issues/{}/comments", raw.number), &[]).await?;

        let events: Vec<GhEvent> = if raw.labels.iter().any(|l| self.state_labels.contains(&l.name)) {
            self.get_all_pages("list_events", &format!("issues/{}/events", raw.number), &[]).await?
        } else {
            Vec::new()
        };

        let comments = comments
            .into_iter()
            .map(|c| Comment {
                author: c.user.map(|u| u.login).unwrap_or_default(),
                association: c.author_association,
                created_at: c.created_at,
            })
            .collect::<Vec<_>>();

        let labels = raw
            .labels
            .into_iter()
            .map(|l| {
                let applied_at = last_labeled_at(&events, &l.name);
                Label::new(l.name, applied_at)
            })
            .collect();

        Ok(Issue {
            number: raw.number,
            title: raw.title,
            author: raw.user.map(|u| u.login).unwrap_or_default(),
            is_pull_request: raw.pull_request.is_some(),
            created_at: raw.created_at,
            last_activity: Issue::compute_last_activity(raw.created_at, &comments, &self.bot_login),
            labels,
            comments,
        })
    }
}

#[async_trait]
impl GenericIssueClient for GitHubIssueClient {
    #[instrument(skip(self))]
    async fn list_issues(&self, query: &IssueQuery) -> ApiResult<Vec<Issue>> {
        let mut filters = vec![("state", "open".to_string()), ("sort", "created".to_string()), ("direction", "asc".to_string())];
        if let Some(label) = &query.label {
            filters.push(("labels", label.clone()));
        }
        if let Some(since) = &query.since {
            filters.push(("since", since.to_rfc3339()));
        }

        let listed: Vec<GhIssue> = self.get_all_pages("list_issues", "issues", &filters).await?;
        info!("Listed {} open issues", listed.len());

        let candidates = listed.into_iter().filter(|raw| query.include_pull_requests || raw.pull_request.is_none());

        // A rate limit that outlasted the retries will not clear for the remaining issues either.
        let hydrated: Vec<Option<Issue>> = stream::iter(candidates)
            .map(|raw| async move {
                let number = raw.number;
                match self.hydrate(raw).await {
                    Ok(issue) => Ok(Some(issue)),
                    Err(err) if err.is_fatal() || matches!(err, ApiError::RateLimited { .. }) => Err(err),
                    Err(err) => {
                        warn!("Skipping issue #{number}, failed to fetch details: {err}");
                        Ok(None)
                    }
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(hydrated.into_iter().flatten().collect())
    }

    #[instrument(skip(self))]
    async fn add_labels(&self, number: u64, labels: &[String]) -> ApiResult<()> {
        if labels.is_empty() {
            return Ok(());
        }

        let url = self.url(&format!("issues/{number}/labels"));
        let body = json!({ "labels": labels });

        self.send("add_labels", || self.http.post(&url).json(&body)).await?;
        debug!("Added {} labels to #{number}", labels.len());

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_label(&self, number: u64, label: &str) -> ApiResult<()> {
        let url = self.url(&format!("issues/{number}/labels/{}", encode_path_segment(label)));

        match self.send("remove_label", || self.http.delete(&url)).await {
            Ok(_) => Ok(()),
            Err(ApiError::NotFound) => {
                debug!("Label '{label}' not found on #{number} (already removed)");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, body))]
    async fn post_comment(&self, number: u64, body: &str) -> ApiResult<()> {
        let url = self.url(&format!("issues/{number}/comments"));
        let body = json!({ "body": body });

        self.send("post_comment", || self.http.post(&url).json(&body)).await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn close_issue(&self, number: u64) -> ApiResult<()> {
        let path = format!("issues/{number}");

        let current: GhIssue = self.get_json("get_issue", &path, &[]).await?;
        if current.state == "closed" {
            return Err(ApiError::AlreadyClosed);
        }

        let url = self.url(&path);
        let body = json!({ "state": "closed", "state_reason": "not_planned" });

        self.send("close_issue", || self.http.patch(&url).json(&body)).await?;

        Ok(())
    }
}

// Helpers.

/// Sends one request, turning an unsuccessful status into a classified error.
async fn execute(request: RequestBuilder) -> ApiResult<Response> {
    let response = request.send().await?;

    if response.status().is_success() {
        Ok(response)
    } else {
        Err(classify_response(response).await)
    }
}

/// The time the named label was most recently applied, according to the issue events.
fn last_labeled_at(events: &[GhEvent], label: &str) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.event == "labeled" && e.label.as_ref().is_some_and(|l| l.name == label))
        .map(|e| e.created_at)
        .max()
}

/// Percent-encodes a label name for use as a single URL path segment.
fn encode_path_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// How long GitHub asked us to wait, if this response is a rate limit.
fn rate_limit_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Option<Duration>> {
    let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok()).map(str::trim);

    if let Some(secs) = header("retry-after").and_then(|s| s.parse::<u64>().ok()) {
        return Some(Some(Duration::from_secs(secs)));
    }

    if header("x-ratelimit-remaining") == Some("0") {
        let reset = header("x-ratelimit-reset")
            .and_then(|s| s.parse::<i64>().ok())
            .map(|reset| Duration::from_secs((reset - now.timestamp()).max(0).unsigned_abs()));
        return Some(reset);
    }

    None
}

/// Maps a status code (and the rate-limit headers) onto an [`ApiError`].
fn classify(status: StatusCode, headers: &HeaderMap, message: String, now: DateTime<Utc>) -> ApiError {
    if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS)
        && let Some(retry_after) = rate_limit_retry_after(headers, now)
    {
        return ApiError::RateLimited { retry_after };
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { retry_after: None },
        // Secondary rate limits are a 403 that often carries no rate-limit headers at all.
        StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => ApiError::RateLimited {
            retry_after: Some(SECONDARY_RATE_LIMIT_WAIT),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::GONE => ApiError::AlreadyClosed,
        s if s.is_server_error() => ApiError::Transient(format!("{}: {message}", s.as_u16())),
        s => ApiError::Api { status: s.as_u16(), message },
    }
}

async fn classify_response(response: Response) -> ApiError {
    let status = response.status();
    let headers = response.headers().clone();
    let message = match response.json::<GhError>().await {
        Ok(err) => err.message,
        Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
    };

    classify(status, &headers, message, Utc::now())
}
