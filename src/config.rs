use std::{env, path::PathBuf};

const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_GITHUB_REPO: &str = "krishivseth/Alphaminr";
const DEFAULT_GITHUB_BRANCH: &str = "main";
const DEFAULT_FROM_NAME: &str = "Alphaminr";
const DEFAULT_NEWSLETTER_DIR: &str = "newsletters";
const DEFAULT_CSS_PATH: &str = "static/css/newsletter.css";
const DEFAULT_LOCK_PATH: &str = "generation.lock";
const DEFAULT_PORT: u16 = 5001;

/// Process-wide settings, read once at startup and handed to `AppState`.
#[derive(Clone)]
pub struct PortalConfig {
    pub secret_key: Option<String>,
    pub editor_password: Option<String>,
    pub backend_url: String,
    pub mock_mode: bool,
    pub mailchimp: MailchimpSettings,
    pub anthropic: AnthropicSettings,
    pub github: GithubSettings,
    pub paths: PortalPaths,
    pub port: u16,
}

#[derive(Clone, Default)]
pub struct MailchimpSettings {
    pub api_key: Option<String>,
    pub server_prefix: Option<String>,
    pub list_id: Option<String>,
    pub reply_to: Option<String>,
    pub test_recipient: Option<String>,
    pub from_name: String,
}

impl MailchimpSettings {
    /// API key and data-center prefix, present only when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.server_prefix.as_deref()) {
            (Some(key), Some(prefix)) => Some((key, prefix)),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct AnthropicSettings {
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Clone, Default)]
pub struct GithubSettings {
    pub token: Option<String>,
    pub repo: String,
    pub branch: String,
    /// Repository directory that holds newsletter files.
    pub content_dir: String,
}

impl GithubSettings {
    pub fn content_path(&self, filename: &str) -> String {
        if self.content_dir.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.content_dir, filename)
        }
    }
}

#[derive(Clone, Debug)]
pub struct PortalPaths {
    pub newsletter_dir: PathBuf,
    pub css_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_dir: PathBuf,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let mock_mode = get("MOCK_MODE")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let port = get("PORT")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            secret_key: get("SECRET_KEY"),
            editor_password: get("EDITOR_PASSWORD"),
            backend_url: get_or("RAILWAY_BACKEND_URL", DEFAULT_BACKEND_URL)
                .trim_end_matches('/')
                .to_string(),
            mock_mode,
            mailchimp: MailchimpSettings {
                api_key: get("MAILCHIMP_API_KEY"),
                server_prefix: get("MAILCHIMP_SERVER_PREFIX"),
                list_id: get("MAILCHIMP_LIST_ID"),
                reply_to: get("REPLY_TO_EMAIL"),
                test_recipient: get("EDITOR_EMAIL"),
                from_name: get_or("NEWSLETTER_FROM_NAME", DEFAULT_FROM_NAME),
            },
            anthropic: AnthropicSettings {
                api_key: get("ANTHROPIC_API_KEY"),
                model: get_or("ANTHROPIC_MODEL", DEFAULT_ANTHROPIC_MODEL),
            },
            github: GithubSettings {
                token: get("GITHUB_TOKEN"),
                repo: get_or("GITHUB_REPO", DEFAULT_GITHUB_REPO),
                branch: get_or("GITHUB_BRANCH", DEFAULT_GITHUB_BRANCH),
                content_dir: get_or("GITHUB_CONTENT_DIR", DEFAULT_NEWSLETTER_DIR)
                    .trim_matches('/')
                    .to_string(),
            },
            paths: PortalPaths {
                newsletter_dir: PathBuf::from(get_or("NEWSLETTER_DIR", DEFAULT_NEWSLETTER_DIR)),
                css_path: PathBuf::from(get_or("NEWSLETTER_CSS_PATH", DEFAULT_CSS_PATH)),
                lock_path: PathBuf::from(get_or("GENERATION_LOCK_PATH", DEFAULT_LOCK_PATH)),
                log_dir: env::temp_dir(),
            },
            port,
        }
    }

    /// Name/value pairs for the environment check page. Secrets are reported as Set/Not set.
    pub fn environment_report(&self) -> Vec<(&'static str, String)> {
        let flag = |value: &Option<String>| {
            if value.is_some() { "Set" } else { "Not set" }.to_string()
        };

        vec![
            ("SECRET_KEY", flag(&self.secret_key)),
            ("EDITOR_PASSWORD", flag(&self.editor_password)),
            ("RAILWAY_BACKEND_URL", self.backend_url.clone()),
            ("ANTHROPIC_API_KEY", flag(&self.anthropic.api_key)),
            ("MAILCHIMP_API_KEY", flag(&self.mailchimp.api_key)),
            ("GITHUB_TOKEN", flag(&self.github.token)),
            ("MOCK_MODE", self.mock_mode.to_string()),
        ]
    }
}
