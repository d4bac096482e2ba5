use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::GithubSettings;

const GITHUB_API: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Server is not configured to save files.")]
    MissingCredentials,
    #[error("could not read current revision: {0}")]
    RevisionLookup(String),
    #[error("{0}")]
    Rejected(String),
    #[error("invalid repository path: {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub commit_sha: String,
}

/// Version-controlled storage where every save is a commit.
#[async_trait]
pub trait ContentStore: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Create or update `path`, replacing whatever revision is current.
    async fn commit_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<CommitReceipt, CommitError>;
}

/// GitHub contents API backed store.
#[derive(Clone)]
pub struct GithubStore {
    http: Client,
    settings: GithubSettings,
    api_base: String,
    timeout: Duration,
}

impl GithubStore {
    pub fn new(http: Client, settings: GithubSettings) -> Self {
        Self {
            http,
            settings,
            api_base: GITHUB_API.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    fn contents_url(&self, path: &str) -> Result<Url, CommitError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|err| CommitError::InvalidPath(err.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CommitError::InvalidPath(self.api_base.clone()))?;
            segments.pop_if_empty().push("repos");
            segments.extend(self.settings.repo.split('/').filter(|s| !s.is_empty()));
            segments.push("contents");
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/vnd.github.v3+json")
            .timeout(self.timeout)
    }

    /// Current blob SHA of `path`, or `None` when the file does not exist yet.
    async fn file_sha(&self, url: &Url, token: &str) -> Result<Option<String>, CommitError> {
        let response = self
            .authorized(self.http.get(url.clone()), token)
            .query(&[("ref", self.settings.branch.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(CommitError::RevisionLookup(api_message(&body, status)));
        }

        Ok(body
            .get("sha")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl ContentStore for GithubStore {
    fn is_configured(&self) -> bool {
        self.settings.token.is_some()
    }

    async fn commit_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<CommitReceipt, CommitError> {
        let Some(token) = self.settings.token.as_deref() else {
            return Err(CommitError::MissingCredentials);
        };

        let url = self.contents_url(path)?;
        let sha = self.file_sha(&url, token).await?;
        debug!(path, existing = sha.is_some(), "committing newsletter file");

        let payload = commit_payload(content, message, &self.settings.branch, sha.as_deref());
        let response = self
            .authorized(self.http.put(url), token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status == StatusCode::OK || status == StatusCode::CREATED {
            let receipt = receipt_from(&body)?;
            info!(path, commit_sha = %receipt.commit_sha, "newsletter committed");
            Ok(receipt)
        } else {
            Err(CommitError::Rejected(api_message(&body, status)))
        }
    }
}

/// A success status without a commit sha is not a confirmed save.
fn receipt_from(body: &Value) -> Result<CommitReceipt, CommitError> {
    body.pointer("/commit/sha")
        .and_then(Value::as_str)
        .filter(|sha| !sha.is_empty())
        .map(|sha| CommitReceipt {
            commit_sha: sha.to_string(),
        })
        .ok_or_else(|| CommitError::Rejected("commit sha missing from response".to_string()))
}

fn commit_payload(content: &str, message: &str, branch: &str, sha: Option<&str>) -> Value {
    let mut payload = json!({
        "message": message,
        "content": BASE64.encode(content.as_bytes()),
        "branch": branch,
    });
    if let Some(sha) = sha {
        payload["sha"] = Value::String(sha.to_string());
    }
    payload
}

fn api_message(body: &Value, status: StatusCode) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown error (status {status})"))
}
