use std::any::Any;

use axum::{
    Router, middleware,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

use crate::{
    modules,
    web::{AppState, auth, diagnostics, json_error},
};

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(modules::editor::router())
        .merge(modules::generation::router())
        .merge(modules::review::router())
        .merge(modules::send::router())
        .merge(diagnostics::protected_router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_editor,
        ));

    Router::new()
        .route("/login", get(auth::login_page).post(auth::process_login))
        .route("/logout", get(auth::logout).post(auth::logout))
        .route("/health", get(diagnostics::health))
        .route("/api/test", get(diagnostics::test_endpoint))
        .merge(protected)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn a handler panic into a JSON 500 so the process keeps serving.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(%detail, "request handler panicked");

    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Internal server error: {detail}"),
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, header},
    };

    use super::*;
    use crate::test_support::{Harness, body_json, call, get};

    const GATED: &[(&str, &str)] = &[("EDITOR_PASSWORD", "letmein"), ("SECRET_KEY", "s3cret")];

    fn login_request(uri: &str, password: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("password={password}")))
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    /// `name=value` part of the first `Set-Cookie` header.
    fn session_pair(response: &Response) -> String {
        let raw = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        raw.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn protected_route_redirects_to_login_with_next() {
        let harness = Harness::new();
        let router = harness.router(GATED);

        let response = get(&router, "/").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login?next=%2F");

        let response = get(&router, "/api/env-check").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login?next=%2Fapi%2Fenv-check");
    }

    #[tokio::test]
    async fn login_grants_access_and_returns_to_target() {
        let harness = Harness::new();
        harness.backend.insert("abc.html", "<p>x</p>");
        let router = harness.router(GATED);

        let response = call(
            &router,
            login_request("/login?next=%2Feditor%2Fabc.html", "letmein"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/editor/abc.html");
        let cookie = session_pair(&response);
        assert!(cookie.starts_with("editor_session="));

        let request = Request::get("/editor/abc.html")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let response = call(&router, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_rerenders_form() {
        let harness = Harness::new();
        let router = harness.router(GATED);

        let response = call(&router, login_request("/login", "guess")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn offsite_next_falls_back_to_index() {
        let harness = Harness::new();
        let router = harness.router(GATED);

        let response = call(
            &router,
            login_request("/login?next=https%3A%2F%2Fevil.example", "letmein"),
        )
        .await;
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn logout_expires_presented_session() {
        let harness = Harness::new();
        let router = harness.router(GATED);

        let login = call(&router, login_request("/login", "letmein")).await;
        let cookie = session_pair(&login);

        let request = Request::get("/logout")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let response = call(&router, request).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let removal = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("logout must expire the session cookie")
            .to_str()
            .unwrap()
            .to_string();
        assert!(removal.starts_with("editor_session=;"));
        assert!(removal.contains("Max-Age=0"));
        assert!(removal.contains("Path=/"));

        let cleared = session_pair(&response);
        let request = Request::get("/")
            .header(header::COOKIE, cleared)
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&router, request).await.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn logout_without_session_just_redirects() {
        let harness = Harness::new();
        let router = harness.router(GATED);

        let response = call(
            &router,
            Request::post("/logout").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn no_password_means_open_access() {
        let harness = Harness::new();
        let router = harness.router(&[]);

        assert_eq!(get(&router, "/").await.status(), StatusCode::OK);

        let response = get(&router, "/login").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn password_without_secret_key_fails_open() {
        let harness = Harness::new();
        let router = harness.router(&[("EDITOR_PASSWORD", "letmein")]);

        assert_eq!(get(&router, "/").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_and_test_stay_public() {
        let harness = Harness::new();
        let router = harness.router(GATED);

        assert_eq!(get(&router, "/health").await.status(), StatusCode::OK);

        let body = body_json(get(&router, "/api/test").await).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn panics_become_json_errors() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error: boom");
    }
}
