use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use serde::Serialize;
use tracing::{error, info};

use crate::{
    llm::{ChatMessage, LlmRequest, MessageRole},
    utils::html_text::extract_text,
    web::{ApiResult, AppState, json_error},
};

const REVIEW_MAX_TOKENS: u32 = 1024;
const MOCK_REVIEW: &str = "[MOCK] Looks great!";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/newsletter/:newsletter_id/review", post(review_newsletter))
}

#[derive(Debug, Serialize)]
struct ReviewResponse {
    success: bool,
    review: String,
}

async fn review_newsletter(
    State(state): State<AppState>,
    Path(newsletter_id): Path<String>,
) -> ApiResult<ReviewResponse> {
    let html = state
        .backend()
        .newsletter_content(&newsletter_id)
        .await
        .filter(|html| !html.is_empty())
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Not found"))?;

    let Some(provider) = state.completion_provider() else {
        return Ok(Json(ReviewResponse {
            success: true,
            review: MOCK_REVIEW.to_string(),
        }));
    };

    let prompt = review_prompt(&extract_text(&html));
    let request = LlmRequest::new(
        state.config().anthropic.model.clone(),
        vec![ChatMessage::new(MessageRole::User, prompt)],
    )
    .with_max_tokens(REVIEW_MAX_TOKENS);

    match provider.complete(request).await {
        Ok(response) => {
            info!(
                %newsletter_id,
                prompt_tokens = response.token_usage.prompt_tokens,
                response_tokens = response.token_usage.response_tokens,
                "review completed"
            );
            Ok(Json(ReviewResponse {
                success: true,
                review: response.text,
            }))
        }
        Err(err) => {
            error!(?err, %newsletter_id, "review request failed");
            Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("AI review failed: {err}"),
            ))
        }
    }
}

fn review_prompt(text_content: &str) -> String {
    format!(
        "Please review this financial newsletter content for quality and provide constructive \
feedback. Focus ONLY on the content, writing quality, and reader value - ignore any formatting or HTML.

Newsletter Content:
{text_content}

Provide feedback on:
- Content accuracy and relevance
- Writing clarity and engagement
- Value to financial newsletter readers
- Suggestions for improvement

Keep your review concise and actionable."
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{Harness, post_json};

    #[test]
    fn prompt_wraps_extracted_text() {
        let prompt = review_prompt("Rates held steady.");
        assert!(prompt.starts_with("Please review this financial newsletter content"));
        assert!(prompt.contains("Newsletter Content:\nRates held steady.\n"));
        assert!(prompt.ends_with("Keep your review concise and actionable."));
    }

    #[tokio::test]
    async fn review_sends_plain_text_to_provider() {
        let harness = Harness::new();
        harness.backend.insert(
            "abc.html",
            "<html><head><style>p{color:red}</style></head><body><h1>Markets</h1><p>Rates held.</p></body></html>",
        );
        let router = harness.router(&[]);

        let (status, body) = post_json(&router, "/api/newsletter/abc.html/review", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"success": true, "review": "Solid issue; tighten the intro."})
        );

        let prompts = harness.completion.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Markets\n\nRates held."));
        assert!(!prompts[0].contains("<p>"));
        assert!(!prompts[0].contains("color:red"));
    }

    #[tokio::test]
    async fn mock_mode_skips_provider() {
        let harness = Harness::new();
        harness.backend.insert("abc.html", "<p>x</p>");
        let router = harness.router(&[("MOCK_MODE", "true")]);

        let (status, body) = post_json(&router, "/api/newsletter/abc.html/review", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["review"], "[MOCK] Looks great!");
        assert!(harness.completion.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_or_empty_newsletter_is_not_found() {
        let harness = Harness::new();
        harness.backend.insert("empty.html", "");
        let router = harness.router(&[]);

        let (status, body) = post_json(&router, "/api/newsletter/nope.html/review", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not found"}));

        let (status, _) = post_json(&router, "/api/newsletter/empty.html/review", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn provider_failure_is_reported() {
        let harness = Harness::new();
        harness.backend.insert("abc.html", "<p>x</p>");
        *harness.completion.fail_with.lock().unwrap() = Some("rate limited".to_string());
        let router = harness.router(&[]);

        let (status, body) = post_json(&router, "/api/newsletter/abc.html/review", json!({})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "AI review failed: rate limited");
    }
}
