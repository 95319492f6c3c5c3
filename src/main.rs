//! MediTrack - medical report upload and question-answering server.

mod completion;
mod config;
mod error;
mod extractor;
mod ocr;
mod prompt;
mod report_store;
mod routes;
mod session;
mod state;

use std::sync::Arc;

use anyhow::Context;
use completion::OpenAiClient;
use config::Settings;
use extractor::TextExtractor;
use state::AppState;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "meditrack=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().context("Invalid configuration")?;
    info!(
        "Model {} at {} (timeout {:?}, default language {})",
        settings.ask.model, settings.openai_base_url, settings.request_timeout, settings.default_locale
    );

    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let completion = OpenAiClient::new(
        http.clone(),
        settings.openai_api_key.clone(),
        settings.openai_base_url.clone(),
        settings.request_timeout,
    );
    let extractor = TextExtractor::new(ocr::build_provider(&settings, http));

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(settings, extractor, Arc::new(completion));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
