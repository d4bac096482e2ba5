use anyhow::{Result, anyhow};
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    extract::{Form, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use rand_core::OsRng;
use reqwest::Url;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::PortalConfig,
    web::{AppState, render_login_page},
};

pub const SESSION_COOKIE: &str = "editor_session";
pub const SESSION_TTL_DAYS: i64 = 7;

const LOGGED_IN_PREFIX: &str = "logged_in:";
const SESSION_KEY_SALT: &[u8] = b"newsletter-portal/session-key";
const INVALID_PASSWORD: &str = "Invalid password. Please try again.";

/// Shared-secret gate configuration.
///
/// Without a password the gate is open. With a password but no `SECRET_KEY`
/// there is no way to sign a session, so the gate is open as well.
#[derive(Clone, Default)]
pub struct AuthSettings {
    password_hash: Option<String>,
    session_key: Option<Key>,
}

impl AuthSettings {
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let password_hash = config
            .editor_password
            .as_deref()
            .map(hash_password)
            .transpose()
            .map_err(|err| anyhow!("failed to hash editor password: {err}"))?;

        let session_key = config
            .secret_key
            .as_deref()
            .map(derive_session_key)
            .transpose()?;

        Ok(Self {
            password_hash,
            session_key,
        })
    }

    pub fn password_required(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn enforcing(&self) -> bool {
        self.password_hash.is_some() && self.session_key.is_some()
    }

    pub fn is_logged_in(&self, headers: &HeaderMap) -> bool {
        self.request_jar(headers)
            .and_then(|jar| jar.get(SESSION_COOKIE))
            .map(|cookie| session_value_is_live(cookie.value()))
            .unwrap_or(false)
    }

    fn verify(&self, password: &str) -> bool {
        self.password_hash
            .as_deref()
            .map(|hash| verify_password(password, hash))
            .unwrap_or(false)
    }

    fn request_jar(&self, headers: &HeaderMap) -> Option<SignedCookieJar> {
        self.session_key
            .as_ref()
            .map(|key| SignedCookieJar::from_headers(headers, key.clone()))
    }

    fn session_jar(&self) -> Option<SignedCookieJar> {
        self.session_key
            .as_ref()
            .map(|key| SignedCookieJar::new(key.clone()))
    }
}

#[derive(Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub password: String,
}

/// Route guard: pass through when the gate is open or the session is live,
/// otherwise send the browser to the login form with the original target.
pub async fn require_editor(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let auth = state.auth();
    if !auth.enforcing() || auth.is_logged_in(request.headers()) {
        return next.run(request).await;
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&login_location(Some(target))).into_response()
}

pub async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Response {
    let auth = state.auth();
    if !auth.password_required() || auth.is_logged_in(&headers) {
        return Redirect::to("/").into_response();
    }

    Html(render_login_page(&login_location(query.next.as_deref()), None)).into_response()
}

pub async fn process_login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    Form(form): Form<LoginForm>,
) -> Response {
    let auth = state.auth();
    if !auth.password_required() {
        return Redirect::to("/").into_response();
    }

    if !auth.verify(&form.password) {
        warn!("rejected editor login");
        let page = render_login_page(&login_location(query.next.as_deref()), Some(INVALID_PASSWORD));
        return (StatusCode::UNAUTHORIZED, Html(page)).into_response();
    }

    let destination = sanitize_next(query.next.as_deref());
    let Some(jar) = auth.session_jar() else {
        warn!("SECRET_KEY is not set; login accepted without a session");
        return Redirect::to(destination).into_response();
    };

    info!("editor logged in");
    (jar.add(session_cookie()), Redirect::to(destination)).into_response()
}

/// Expire the session cookie the browser presented.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(jar) = state.auth().request_jar(&headers) else {
        return Redirect::to("/login").into_response();
    };

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));

    info!("editor logged out");
    (jar.remove(removal), Redirect::to("/login")).into_response()
}

fn session_cookie() -> Cookie<'static> {
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);
    let mut cookie = Cookie::new(
        SESSION_COOKIE,
        format!("{LOGGED_IN_PREFIX}{}", expires_at.timestamp()),
    );
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));
    cookie
}

fn session_value_is_live(value: &str) -> bool {
    value
        .strip_prefix(LOGGED_IN_PREFIX)
        .and_then(|expiry| expiry.parse::<i64>().ok())
        .map(|expiry| expiry > Utc::now().timestamp())
        .unwrap_or(false)
}

/// Login form URL carrying `next` as a query parameter.
pub fn login_location(next: Option<&str>) -> String {
    let Some(next) = next.filter(|target| !target.is_empty()) else {
        return "/login".to_string();
    };
    match Url::parse_with_params("http://portal.invalid/login", &[("next", next)]) {
        Ok(url) => format!("/login?{}", url.query().unwrap_or_default()),
        Err(_) => "/login".to_string(),
    }
}

/// Only same-site paths are honoured as post-login destinations.
pub fn sanitize_next(input: Option<&str>) -> &str {
    match input {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Stretch `SECRET_KEY` into the 64 bytes needed for cookie signing.
fn derive_session_key(secret: &str) -> Result<Key> {
    let mut material = [0u8; 64];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), SESSION_KEY_SALT, &mut material)
        .map_err(|err| anyhow!("failed to derive session key: {err}"))?;
    Ok(Key::from(&material[..]))
}
