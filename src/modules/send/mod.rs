use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};
use chrono::Local;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    mailchimp::{CampaignDraft, CampaignError, CampaignSender},
    utils::email_html::{load_stylesheet, prepare_email_html},
    web::{ApiMessage, ApiResult, AppState, json_error},
};

const DEFAULT_STYLESHEET_NAME: &str = "newsletter.css";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/newsletter/:newsletter_id/send", post(send_newsletter))
}

#[derive(Debug, Default, Deserialize)]
struct SendRequest {
    #[serde(default, deserialize_with = "truthy")]
    test_mode: bool,
}

/// Any truthy JSON value selects a test send: `1`, `"yes"`, a non-empty list.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    })
}

/// A body that cannot be read is refused outright; it never falls through to
/// a full-list send.
async fn send_newsletter(
    State(state): State<AppState>,
    Path(newsletter_id): Path<String>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<ApiMessage> {
    let Json(SendRequest { test_mode }) = body.map_err(|rejection| {
        warn!(%newsletter_id, reason = %rejection.body_text(), "unreadable send request");
        json_error(
            rejection.status(),
            format!("Invalid request body: {}", rejection.body_text()),
        )
    })?;

    let original = state
        .backend()
        .newsletter_content(&newsletter_id)
        .await
        .filter(|html| !html.is_empty())
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Newsletter not found"))?;

    let html = email_ready_html(&state, original).await;

    let Some(sender) = state.campaign_sender() else {
        let message = if test_mode {
            "[MOCK] Test email sent!"
        } else {
            "[MOCK] Newsletter sent!"
        };
        return Ok(Json(ApiMessage::success(message)));
    };

    let recipients: Vec<String> = state
        .config()
        .mailchimp
        .test_recipient
        .iter()
        .cloned()
        .collect();

    match dispatch(sender, &state, &html, test_mode.then_some(recipients)).await {
        Ok(message) => {
            info!(%newsletter_id, test_mode, "newsletter dispatched");
            Ok(Json(ApiMessage::success(message)))
        }
        Err(err) => {
            error!(?err, %newsletter_id, test_mode, "mailchimp dispatch failed");
            Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Mailchimp error: {err}"),
            ))
        }
    }
}

/// Inline the newsletter stylesheet off the async runtime.
async fn email_ready_html(state: &AppState, original: String) -> String {
    let css_path = &state.config().paths.css_path;
    let css = load_stylesheet(css_path).await;
    let stylesheet_name = css_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_STYLESHEET_NAME.to_string());
    let inliner = state.inliner();

    let fallback = original.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        prepare_email_html(&original, css.as_deref(), &stylesheet_name, inliner.as_ref())
    })
    .await;

    match prepared {
        Ok(html) => html,
        Err(err) => {
            warn!(?err, "inlining task failed; sending original content");
            fallback
        }
    }
}

/// Create a campaign, attach `html`, then either test-send to `test_recipients`
/// or send to the whole list.
async fn dispatch(
    sender: Arc<dyn CampaignSender>,
    state: &AppState,
    html: &str,
    test_recipients: Option<Vec<String>>,
) -> Result<&'static str, CampaignError> {
    let draft = CampaignDraft::dated(&state.config().mailchimp, &Local::now());
    let campaign_id = sender.create_campaign(&draft).await?;
    sender.set_content(&campaign_id, html).await?;

    match test_recipients {
        Some(recipients) => {
            sender.send_test(&campaign_id, &recipients).await?;
            Ok("Test email sent!")
        }
        None => {
            sender.send(&campaign_id).await?;
            Ok("Newsletter sent successfully!")
        }
    }
}
