use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use crate::{
    backend::{HttpBackend, NewsletterBackend},
    config::PortalConfig,
    github::{ContentStore, GithubStore},
    llm::{CompletionProvider, LlmClient},
    mailchimp::{CampaignSender, MailchimpClient},
    utils::email_html::{CssInlineEngine, StyleInliner},
    web::auth::AuthSettings,
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Collaborators injected into every handler.
pub struct Services {
    pub backend: Arc<dyn NewsletterBackend>,
    pub store: Arc<dyn ContentStore>,
    pub mailer: Option<Arc<dyn CampaignSender>>,
    pub completions: Option<Arc<dyn CompletionProvider>>,
    pub inliner: Arc<dyn StyleInliner>,
}

impl Services {
    /// Real HTTP-backed clients. Email and AI clients are left out in mock
    /// mode or when their credentials are missing.
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;

        let mailer = if config.mock_mode {
            None
        } else {
            MailchimpClient::from_settings(http.clone(), &config.mailchimp)
                .map(|client| Arc::new(client) as Arc<dyn CampaignSender>)
        };

        let completions = if config.mock_mode {
            None
        } else {
            LlmClient::from_settings(http.clone(), &config.anthropic)
                .map(|client| Arc::new(client) as Arc<dyn CompletionProvider>)
        };

        Ok(Self {
            backend: Arc::new(HttpBackend::new(http.clone(), config.backend_url.clone())),
            store: Arc::new(GithubStore::new(http, config.github.clone())),
            mailer,
            completions,
            inliner: Arc::new(CssInlineEngine),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<PortalConfig>,
    auth: Arc<AuthSettings>,
    backend: Arc<dyn NewsletterBackend>,
    store: Arc<dyn ContentStore>,
    mailer: Option<Arc<dyn CampaignSender>>,
    completions: Option<Arc<dyn CompletionProvider>>,
    inliner: Arc<dyn StyleInliner>,
}

impl AppState {
    pub fn new(config: PortalConfig) -> Result<Self> {
        let services = Services::from_config(&config)?;
        Self::with_services(config, services)
    }

    pub fn with_services(config: PortalConfig, services: Services) -> Result<Self> {
        let auth = AuthSettings::from_config(&config).context("failed to prepare auth gate")?;

        info!(
            auth_enforced = auth.enforcing(),
            mock_mode = config.mock_mode,
            mailchimp = services.mailer.is_some(),
            anthropic = services.completions.is_some(),
            github = services.store.is_configured(),
            "portal services ready"
        );

        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            backend: services.backend,
            store: services.store,
            mailer: services.mailer,
            completions: services.completions,
            inliner: services.inliner,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthSettings {
        &self.auth
    }

    pub fn backend(&self) -> &dyn NewsletterBackend {
        self.backend.as_ref()
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    /// `None` means sends are simulated.
    pub fn campaign_sender(&self) -> Option<Arc<dyn CampaignSender>> {
        if self.config.mock_mode {
            None
        } else {
            self.mailer.clone()
        }
    }

    /// `None` means reviews are simulated.
    pub fn completion_provider(&self) -> Option<Arc<dyn CompletionProvider>> {
        if self.config.mock_mode {
            None
        } else {
            self.completions.clone()
        }
    }

    pub fn inliner(&self) -> Arc<dyn StyleInliner> {
        self.inliner.clone()
    }
}
