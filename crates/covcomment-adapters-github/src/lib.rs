//! GitHub adapters for covcomment.
//!
//! - [`GithubClient`]: the REST implementation of [`CommentApi`].
//! - [`ActionEnvironment`]: request context discovered from the GitHub
//!   Actions environment and the event payload file.
//!
//! Requests are sent exactly once. A failed call surfaces as an error and is
//! never retried.

use std::path::Path;

use async_trait::async_trait;
use covcomment_ports::CommentApi;
use covcomment_types::{Comment, EventKind, RequestContext};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Default REST root for github.com.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default web root for github.com.
pub const DEFAULT_SERVER_URL: &str = "https://github.com";

const USER_AGENT: &str = "covcomment";
const ERROR_BODY_LIMIT: usize = 800;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the GitHub adapters.
#[derive(Debug, Error)]
pub enum GithubError {
    /// `owner/repo` could not be split.
    #[error("invalid repository '{0}': expected owner/repo")]
    InvalidRepository(String),

    /// The token cannot be used in an HTTP header.
    #[error("invalid github token")]
    InvalidToken,

    /// The HTTP client could not be constructed.
    #[error("failed to create github api client: {0}")]
    Client(String),

    /// The request could not be sent or the connection failed.
    #[error("github api {operation} request failed: {message}")]
    Transport { operation: String, message: String },

    /// The server answered with a non-success status.
    #[error("github api {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("failed to decode github {operation}: {message}")]
    Decode { operation: String, message: String },

    /// A required environment variable is missing.
    #[error("missing environment variable {0}")]
    MissingVariable(&'static str),

    /// The event payload file could not be read or parsed.
    #[error("failed to read event payload {path}: {message}")]
    EventPayload { path: String, message: String },
}

fn truncate_for_error(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str("...");
    truncated
}

// ============================================================================
// REST client
// ============================================================================

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubComment {
    id: u64,
    #[serde(default)]
    user: Option<GithubUser>,
    #[serde(default)]
    body: Option<String>,
}

impl From<GithubComment> for Comment {
    fn from(raw: GithubComment) -> Self {
        Comment {
            id: raw.id,
            author: raw.user.map(|user| user.login),
            body: raw.body,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: u64,
}

/// REST client for the comment endpoints of one repository.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
}

impl GithubClient {
    /// Build a client for `repository` (`owner/repo`) authenticated by `token`.
    pub fn new(api_base: &str, token: &str, repository: &str) -> Result<Self, GithubError> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_else(|| GithubError::InvalidRepository(repository.to_string()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .map_err(|_| GithubError::InvalidToken)?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GithubError::Client(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_base, self.owner, self.repo, tail)
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GithubError> {
        let response = request
            .send()
            .await
            .map_err(|e| GithubError::Transport {
                operation: operation.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GithubError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: truncate_for_error(&body, ERROR_BODY_LIMIT),
        })
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GithubError> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| GithubError::Decode {
                operation: operation.to_string(),
                message: e.to_string(),
            })
    }

    /// Fetch one page of comments on an issue or pull request.
    pub async fn list_comments(
        &self,
        issue_number: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Comment>, GithubError> {
        let page_value = page.to_string();
        let per_page_value = per_page.to_string();
        let request = self
            .http
            .get(self.repo_url(&format!("issues/{issue_number}/comments")))
            .query(&[
                ("per_page", per_page_value.as_str()),
                ("page", page_value.as_str()),
            ]);
        let rows: Vec<GithubComment> = self.request_json("list issue comments", request).await?;
        debug!(issue_number, page, count = rows.len(), "listed comments");
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    pub async fn create_comment(&self, issue_number: u64, body: &str) -> Result<u64, GithubError> {
        let request = self
            .http
            .post(self.repo_url(&format!("issues/{issue_number}/comments")))
            .json(&json!({ "body": body }));
        let created: CreatedResponse = self.request_json("create issue comment", request).await?;
        Ok(created.id)
    }

    pub async fn update_comment(&self, comment_id: u64, body: &str) -> Result<(), GithubError> {
        let request = self
            .http
            .patch(self.repo_url(&format!("issues/comments/{comment_id}")))
            .json(&json!({ "body": body }));
        self.send("update issue comment", request).await?;
        Ok(())
    }

    pub async fn delete_comment(&self, comment_id: u64) -> Result<(), GithubError> {
        let request = self
            .http
            .delete(self.repo_url(&format!("issues/comments/{comment_id}")));
        self.send("delete issue comment", request).await?;
        Ok(())
    }

    pub async fn create_commit_comment(
        &self,
        commit_sha: &str,
        body: &str,
    ) -> Result<u64, GithubError> {
        let request = self
            .http
            .post(self.repo_url(&format!("commits/{commit_sha}/comments")))
            .json(&json!({ "body": body }));
        let created: CreatedResponse = self.request_json("create commit comment", request).await?;
        Ok(created.id)
    }
}

#[async_trait]
impl CommentApi for GithubClient {
    async fn list_issue_comments(
        &self,
        issue_number: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Comment>, String> {
        self.list_comments(issue_number, page, per_page)
            .await
            .map_err(|e| e.to_string())
    }

    async fn create_issue_comment(&self, issue_number: u64, body: &str) -> Result<u64, String> {
        self.create_comment(issue_number, body)
            .await
            .map_err(|e| e.to_string())
    }

    async fn update_issue_comment(&self, comment_id: u64, body: &str) -> Result<(), String> {
        self.update_comment(comment_id, body)
            .await
            .map_err(|e| e.to_string())
    }

    async fn delete_issue_comment(&self, comment_id: u64) -> Result<(), String> {
        self.delete_comment(comment_id)
            .await
            .map_err(|e| e.to_string())
    }

    async fn create_commit_comment(&self, commit_sha: &str, body: &str) -> Result<u64, String> {
        GithubClient::create_commit_comment(self, commit_sha, body)
            .await
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// Actions environment
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct BranchRef {
    #[serde(default, rename = "ref")]
    name: Option<String>,
    #[serde(default)]
    sha: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PullRequestPayload {
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    head: BranchRef,
    #[serde(default)]
    base: BranchRef,
}

#[derive(Debug, Default, Deserialize)]
struct EventPayload {
    #[serde(default)]
    pull_request: Option<PullRequestPayload>,
    #[serde(default)]
    after: Option<String>,
}

/// Everything discovered from the Actions environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEnvironment {
    pub context: RequestContext,
    /// REST root, without trailing slash.
    pub api_url: String,
}

impl ActionEnvironment {
    /// Discover the environment from the process environment.
    pub fn from_env() -> Result<Self, GithubError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Discover the environment through `lookup`, reading the event payload
    /// from the path named by `GITHUB_EVENT_PATH` when set.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GithubError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let repository =
            var("GITHUB_REPOSITORY").ok_or(GithubError::MissingVariable("GITHUB_REPOSITORY"))?;
        let event = EventKind::from_event_name(&var("GITHUB_EVENT_NAME").unwrap_or_default());

        let payload = match var("GITHUB_EVENT_PATH") {
            Some(path) => read_event_payload(Path::new(&path))?,
            None => EventPayload::default(),
        };

        let env_sha = var("GITHUB_SHA").unwrap_or_default();
        let branch_from_ref = var("GITHUB_REF")
            .and_then(|r| r.strip_prefix("refs/heads/").map(str::to_string));

        let mut context = RequestContext {
            repository,
            server_url: var("GITHUB_SERVER_URL")
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            event,
            job: var("GITHUB_JOB").unwrap_or_default(),
            issue_number: None,
            commit: env_sha,
            head: branch_from_ref,
            base: None,
            workspace: var("GITHUB_WORKSPACE"),
        };

        if context.event.is_pull_request() {
            if let Some(pr) = payload.pull_request {
                context.issue_number = pr.number;
                if let Some(sha) = pr.head.sha {
                    context.commit = sha;
                }
                if pr.head.name.is_some() {
                    context.head = pr.head.name;
                }
                context.base = pr.base.name;
            }
        } else if context.event == EventKind::Push
            && let Some(after) = payload.after.filter(|sha| !sha.is_empty())
        {
            context.commit = after;
        }

        let api_url = var("GITHUB_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { context, api_url })
    }
}

fn read_event_payload(path: &Path) -> Result<EventPayload, GithubError> {
    let payload_error = |message: String| GithubError::EventPayload {
        path: path.display().to_string(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| payload_error(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| payload_error(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
