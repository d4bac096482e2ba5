//! In-memory collaborators and request helpers shared by router-level tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

use crate::{
    backend::{BackendProbe, GenerationOutcome, NewsletterBackend, NewsletterSummary},
    config::PortalConfig,
    github::{CommitError, CommitReceipt, ContentStore},
    llm::{CompletionProvider, LlmRequest, LlmResponse, TokenUsage},
    mailchimp::{CampaignDraft, CampaignError, CampaignSender},
    utils::email_html::CssInlineEngine,
    web::{AppState, router::build_router, state::Services},
};

#[derive(Default)]
pub struct FakeBackend {
    pub content: Mutex<HashMap<String, String>>,
    pub listing: Mutex<Vec<NewsletterSummary>>,
    pub generation: Mutex<Option<GenerationOutcome>>,
    pub generate_calls: Mutex<usize>,
}

impl FakeBackend {
    pub fn insert(&self, id: &str, html: &str) {
        self.content
            .lock()
            .unwrap()
            .insert(id.to_string(), html.to_string());
        self.listing.lock().unwrap().push(NewsletterSummary {
            id: id.to_string(),
            created: Some("2024-05-01T08:00:00".to_string()),
            size: Some(html.len() as u64),
        });
    }
}

#[async_trait]
impl NewsletterBackend for FakeBackend {
    fn base_url(&self) -> &str {
        "http://backend.test"
    }

    async fn list_newsletters(&self) -> Vec<NewsletterSummary> {
        self.listing.lock().unwrap().clone()
    }

    async fn newsletter_content(&self, id: &str) -> Option<String> {
        self.content.lock().unwrap().get(id).cloned()
    }

    async fn generate(&self) -> Result<GenerationOutcome> {
        *self.generate_calls.lock().unwrap() += 1;
        self.generation
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }

    async fn probe(&self, segments: &[&str]) -> Result<BackendProbe> {
        Ok(BackendProbe {
            status_code: 200,
            body: segments.join("/"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommit {
    pub path: String,
    pub content: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingStore {
    pub commits: Mutex<Vec<RecordedCommit>>,
    pub reject_with: Mutex<Option<String>>,
}

#[async_trait]
impl ContentStore for RecordingStore {
    fn is_configured(&self) -> bool {
        true
    }

    async fn commit_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<CommitReceipt, CommitError> {
        if let Some(reason) = self.reject_with.lock().unwrap().clone() {
            return Err(CommitError::Rejected(reason));
        }
        self.commits.lock().unwrap().push(RecordedCommit {
            path: path.to_string(),
            content: content.to_string(),
            message: message.to_string(),
        });
        Ok(CommitReceipt {
            commit_sha: "c0ffee".to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderCall {
    Create(CampaignDraft),
    Content(String),
    Test(Vec<String>),
    Send,
}

#[derive(Default)]
pub struct RecordingSender {
    pub calls: Mutex<Vec<SenderCall>>,
    pub fail_with: Mutex<Option<String>>,
}

impl RecordingSender {
    fn record(&self, call: SenderCall) -> Result<(), CampaignError> {
        if let Some(body) = self.fail_with.lock().unwrap().clone() {
            return Err(CampaignError::Api(body));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    pub fn calls(&self) -> Vec<SenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CampaignSender for RecordingSender {
    async fn create_campaign(&self, draft: &CampaignDraft) -> Result<String, CampaignError> {
        self.record(SenderCall::Create(draft.clone()))?;
        Ok("campaign-1".to_string())
    }

    async fn set_content(&self, _campaign_id: &str, html: &str) -> Result<(), CampaignError> {
        self.record(SenderCall::Content(html.to_string()))
    }

    async fn send_test(
        &self,
        _campaign_id: &str,
        recipients: &[String],
    ) -> Result<(), CampaignError> {
        self.record(SenderCall::Test(recipients.to_vec()))
    }

    async fn send(&self, _campaign_id: &str) -> Result<(), CampaignError> {
        self.record(SenderCall::Send)
    }
}

#[derive(Default)]
pub struct CannedCompletion {
    pub prompts: Mutex<Vec<String>>,
    pub fail_with: Mutex<Option<String>>,
}

#[async_trait]
impl CompletionProvider for CannedCompletion {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        if let Some(reason) = self.fail_with.lock().unwrap().clone() {
            return Err(anyhow!(reason));
        }
        let prompt = request
            .messages
            .iter()
            .map(|message| message.text.clone())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        Ok(LlmResponse {
            text: "Solid issue; tighten the intro.".to_string(),
            token_usage: TokenUsage::default(),
        })
    }
}

/// Temp directory plus doubles for every collaborator.
pub struct Harness {
    pub dir: TempDir,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<RecordingStore>,
    pub sender: Arc<RecordingSender>,
    pub completion: Arc<CannedCompletion>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            backend: Arc::new(FakeBackend::default()),
            store: Arc::new(RecordingStore::default()),
            sender: Arc::new(RecordingSender::default()),
            completion: Arc::new(CannedCompletion::default()),
        }
    }

    pub fn config(&self, pairs: &[(&str, &str)]) -> PortalConfig {
        let root = self.dir.path();
        let mut values: HashMap<String, String> = HashMap::from([
            (
                "NEWSLETTER_DIR".to_string(),
                root.join("newsletters").display().to_string(),
            ),
            (
                "NEWSLETTER_CSS_PATH".to_string(),
                root.join("newsletter.css").display().to_string(),
            ),
            (
                "GENERATION_LOCK_PATH".to_string(),
                root.join("generation.lock").display().to_string(),
            ),
            ("EDITOR_EMAIL".to_string(), "editor@example.com".to_string()),
            ("MAILCHIMP_LIST_ID".to_string(), "list-1".to_string()),
        ]);
        for (key, value) in pairs {
            values.insert(key.to_string(), value.to_string());
        }

        let mut config = PortalConfig::from_lookup(|key| values.get(key).cloned());
        config.paths.log_dir = root.join("tmp");
        config
    }

    pub fn router(&self, pairs: &[(&str, &str)]) -> Router {
        let services = Services {
            backend: self.backend.clone(),
            store: self.store.clone(),
            mailer: Some(self.sender.clone() as Arc<dyn CampaignSender>),
            completions: Some(self.completion.clone() as Arc<dyn CompletionProvider>),
            inliner: Arc::new(CssInlineEngine),
        };
        let state = AppState::with_services(self.config(pairs), services).unwrap();
        build_router(state)
    }
}

pub async fn call(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn get(router: &Router, uri: &str) -> Response {
    call(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = call(router, request).await;
    let status = response.status();
    (status, body_json(response).await)
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Base URL of a local listener that accepts connections and never answers.
pub async fn stalled_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}
