use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

const READ_TIMEOUT: Duration = Duration::from_secs(30);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(300);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listing entry as reported by the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterSummary {
    #[serde(alias = "filename")]
    pub id: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Payload of `POST /api/generate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratedNewsletter {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub newsletter_id: Option<String>,
    #[serde(default)]
    pub generation_time_seconds: f64,
    #[serde(default)]
    pub total_time_seconds: f64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Generated(GeneratedNewsletter),
    Rejected(String),
    HttpFailure { status: u16, body: String },
}

/// Raw answer from a diagnostic probe.
#[derive(Debug, Clone, Serialize)]
pub struct BackendProbe {
    pub status_code: u16,
    pub body: String,
}

/// Read side of the authoritative newsletter store plus the generation trigger.
///
/// Reads never fail: any upstream problem degrades to an empty listing or a
/// missing newsletter. Nothing is cached between calls.
#[async_trait]
pub trait NewsletterBackend: Send + Sync {
    fn base_url(&self) -> &str;

    async fn list_newsletters(&self) -> Vec<NewsletterSummary>;

    async fn newsletter_content(&self, id: &str) -> Option<String>;

    async fn generate(&self) -> Result<GenerationOutcome>;

    /// Issue a short GET against `path` segments and report the raw status and body.
    async fn probe(&self, segments: &[&str]) -> Result<BackendProbe>;
}

#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid backend url {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend url {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_listing(&self) -> Result<Vec<NewsletterSummary>> {
        let url = self.endpoint(&["api", "newsletters"])?;
        debug!(%url, "fetching newsletter listing");

        let response = self.http.get(url).timeout(READ_TIMEOUT).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(anyhow!("listing request failed with status {status}"));
        }

        let body: Value = response
            .json()
            .await
            .context("listing response was not JSON")?;
        listing_from_payload(body)
    }

    async fn fetch_content(&self, id: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["newsletter", id])?;
        debug!(%url, newsletter_id = id, "fetching newsletter content");

        let response = self.http.get(url).timeout(READ_TIMEOUT).send().await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read newsletter body")?;

        match status {
            StatusCode::OK => Ok(Some(body)),
            StatusCode::NOT_FOUND => {
                info!(newsletter_id = id, "newsletter not found in backend");
                Ok(None)
            }
            other => Err(anyhow!(
                "content request failed with status {other}: {}",
                preview(&body, 200)
            )),
        }
    }
}

#[async_trait]
impl NewsletterBackend for HttpBackend {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_newsletters(&self) -> Vec<NewsletterSummary> {
        match self.fetch_listing().await {
            Ok(newsletters) => {
                debug!(count = newsletters.len(), "backend listing fetched");
                newsletters
            }
            Err(err) => {
                warn!(?err, "failed to fetch newsletter listing; returning empty list");
                Vec::new()
            }
        }
    }

    async fn newsletter_content(&self, id: &str) -> Option<String> {
        match self.fetch_content(id).await {
            Ok(content) => content,
            Err(err) => {
                error!(?err, newsletter_id = id, "failed to fetch newsletter content");
                None
            }
        }
    }

    async fn generate(&self) -> Result<GenerationOutcome> {
        let url = self.endpoint(&["api", "generate"])?;
        info!(%url, "requesting newsletter generation");

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({}))
            .timeout(GENERATE_TIMEOUT)
            .send()
            .await
            .context("generation request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read generation response")?;

        if status != StatusCode::OK {
            return Ok(GenerationOutcome::HttpFailure {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GeneratedNewsletter = serde_json::from_str(&body)
            .with_context(|| format!("unexpected generation payload: {}", preview(&body, 500)))?;

        if payload.success {
            Ok(GenerationOutcome::Generated(payload))
        } else {
            Ok(GenerationOutcome::Rejected(
                payload
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }

    async fn probe(&self, segments: &[&str]) -> Result<BackendProbe> {
        let url = self.endpoint(segments)?;
        let response = self.http.get(url).timeout(PROBE_TIMEOUT).send().await?;
        let status_code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(BackendProbe { status_code, body })
    }
}

/// Accept `{success: true, newsletters: [...]}`; anything else is an error.
fn listing_from_payload(body: Value) -> Result<Vec<NewsletterSummary>> {
    let success = body
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !success {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("no error given");
        return Err(anyhow!("backend reported success=false: {reason}"));
    }

    let entries = body
        .get("newsletters")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    serde_json::from_value(entries).context("malformed newsletter listing")
}

/// Char-boundary-safe prefix used when logging or echoing bodies.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
