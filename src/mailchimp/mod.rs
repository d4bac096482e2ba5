use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MailchimpSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CampaignError {
    /// Error body reported by the platform, kept verbatim.
    #[error("{0}")]
    Api(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Settings for a single regular (broadcast) campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignDraft {
    pub list_id: Option<String>,
    pub subject_line: String,
    pub title: String,
    pub from_name: String,
    pub reply_to: Option<String>,
}

impl CampaignDraft {
    /// Subject and title are stamped with the send date.
    pub fn dated<Tz>(settings: &MailchimpSettings, now: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let from_name = settings.from_name.clone();
        Self {
            list_id: settings.list_id.clone(),
            subject_line: format!("{from_name} - {}", now.format("%B %d, %Y")),
            title: format!("{from_name} {}", now.format("%Y-%m-%d")),
            from_name,
            reply_to: settings.reply_to.clone(),
        }
    }

    fn to_payload(&self) -> Value {
        json!({
            "type": "regular",
            "recipients": { "list_id": self.list_id },
            "settings": {
                "subject_line": self.subject_line,
                "title": self.title,
                "from_name": self.from_name,
                "reply_to": self.reply_to,
            }
        })
    }
}

/// Email marketing platform operations used by the send pipeline.
#[async_trait]
pub trait CampaignSender: Send + Sync {
    /// Returns the new campaign id.
    async fn create_campaign(&self, draft: &CampaignDraft) -> Result<String, CampaignError>;

    async fn set_content(&self, campaign_id: &str, html: &str) -> Result<(), CampaignError>;

    async fn send_test(&self, campaign_id: &str, recipients: &[String])
    -> Result<(), CampaignError>;

    async fn send(&self, campaign_id: &str) -> Result<(), CampaignError>;
}

#[derive(Clone)]
pub struct MailchimpClient {
    http: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl MailchimpClient {
    pub fn new(http: Client, api_key: &str, server_prefix: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: format!("https://{server_prefix}.api.mailchimp.com/3.0"),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// `None` unless both the API key and server prefix are configured.
    pub fn from_settings(http: Client, settings: &MailchimpSettings) -> Option<Self> {
        settings
            .credentials()
            .map(|(key, prefix)| Self::new(http, key, prefix))
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth("portal", Some(&self.api_key))
            .timeout(self.timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn checked(response: Response) -> Result<Value, CampaignError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(CampaignError::Api(text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|_| CampaignError::Api(text))
}

#[async_trait]
impl CampaignSender for MailchimpClient {
    async fn create_campaign(&self, draft: &CampaignDraft) -> Result<String, CampaignError> {
        let response = self
            .request(self.http.post(self.url("/campaigns")))
            .json(&draft.to_payload())
            .send()
            .await?;
        let body = checked(response).await?;

        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CampaignError::Api(format!("campaign id missing in {body}")))?;
        info!(campaign_id = id, title = %draft.title, "campaign created");
        Ok(id.to_string())
    }

    async fn set_content(&self, campaign_id: &str, html: &str) -> Result<(), CampaignError> {
        let response = self
            .request(
                self.http
                    .put(self.url(&format!("/campaigns/{campaign_id}/content"))),
            )
            .json(&json!({ "html": html }))
            .send()
            .await?;
        checked(response).await?;
        debug!(campaign_id, bytes = html.len(), "campaign content set");
        Ok(())
    }

    async fn send_test(
        &self,
        campaign_id: &str,
        recipients: &[String],
    ) -> Result<(), CampaignError> {
        let response = self
            .request(
                self.http
                    .post(self.url(&format!("/campaigns/{campaign_id}/actions/test"))),
            )
            .json(&json!({ "test_emails": recipients, "send_type": "html" }))
            .send()
            .await?;
        checked(response).await?;
        info!(campaign_id, "test email dispatched");
        Ok(())
    }

    async fn send(&self, campaign_id: &str) -> Result<(), CampaignError> {
        let response = self
            .request(
                self.http
                    .post(self.url(&format!("/campaigns/{campaign_id}/actions/send"))),
            )
            .send()
            .await?;
        checked(response).await?;
        info!(campaign_id, "campaign sent");
        Ok(())
    }
}
