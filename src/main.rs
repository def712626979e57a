// Web-based image narrator: uploads an image with some context about when,
// where and by whom it was taken, and returns a short narrative written by a
// vision-capable language model.

use std::sync::Arc;

use anyhow::Context;

mod config;
mod error;
mod normalize;
mod pipeline;
mod prompt;
mod routes;
mod upload;
mod vision;

use config::Config;
use routes::AppState;
use vision::OpenAiVisionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let stale = upload::prepare_upload_dir(&config.upload_dir)
        .await
        .with_context(|| format!("cannot prepare {}", config.upload_dir.display()))?;
    if stale > 0 {
        tracing::warn!(count = stale, "removed stale uploads");
    }

    let vision = OpenAiVisionClient::new(config.openai.clone())
        .context("failed to build vision API client")?;

    tracing::info!(
        model = %config.openai.model,
        prompt_mode = %config.prompt_mode,
        fallback = %config.fallback,
        resize = config.image.resize,
        max_width = config.image.max_width,
        origins = ?config.origins,
        "configuration loaded"
    );

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        vision: Arc::new(vision),
    });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("cannot bind port {}", port))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
