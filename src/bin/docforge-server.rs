//! docforge HTTP server binary

use anyhow::Context;
use docforge::{DocumentHistory, DocumentPipeline, EditorSession, ForgeConfig, Gateway, OpenAiBackend};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let config = ForgeConfig::from_env().context("loading configuration")?;
    let api_key = config
        .api_key
        .clone()
        .context("OPENAI_API_KEY must be set")?;

    info!("docforge {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Backend: {} (tier {:?} -> {}, timeout {:?})",
        config.endpoint,
        config.model_tier,
        config.models.model_for(config.model_tier),
        config.request_timeout
    );

    let backend = OpenAiBackend::new(config.endpoint.clone(), api_key)
        .with_organization(config.organization.clone());

    let gateway = Gateway::new(
        Arc::new(backend),
        config.models.clone(),
        config.model_tier,
        config.request_timeout,
    );
    let pipeline = Arc::new(DocumentPipeline::new(Arc::new(gateway)));
    let session = Arc::new(EditorSession::new(pipeline, DocumentHistory::seeded()));

    docforge::server::run_server(session, config.port).await?;

    Ok(())
}
