mod backend;
mod config;
mod github;
mod llm;
mod mailchimp;
mod modules;
mod utils;
mod web;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{config::PortalConfig, web::AppState};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    if let Err(err) = app_main().await {
        error!(?err, "application error");
        std::process::exit(1);
    }
}

async fn app_main() -> Result<()> {
    let config = PortalConfig::from_env();

    if config.secret_key.is_none() {
        warn!("SECRET_KEY is not set; sessions cannot be signed and the editor gate stays open");
    }
    if config.editor_password.is_none() {
        warn!("EDITOR_PASSWORD is not set; the editor is not password-protected");
    }
    if config.mock_mode {
        info!("MOCK_MODE is on; email and AI calls are simulated");
    }

    tokio::fs::create_dir_all(&config.paths.newsletter_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create newsletter directory {}",
                config.paths.newsletter_dir.display()
            )
        })?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config)?;
    let app = web::router::build_router(state);

    info!(%addr, "listening");
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
