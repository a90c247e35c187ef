mod api;
mod config;
mod downloader;
mod helpers;
mod jobs;
mod processor;

use std::sync::Arc;

use anyhow::Context;
use api::AppState;
use config::Config;
use downloader::backends::ytdlp::YtDlpExtractor;
use jobs::{registry::JobRegistry, runner::JobRunner};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{filter::Builder as TracingFilterBuilder, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Err(e) if e.not_found() => {}
        Ok(_) => {}
        Err(e) => {
            return Err(e).context("Failed to load .env file");
        }
    }

    init_log();

    let config = Arc::new(Config::from_env()?);
    info!(?config, "Starting audio download service...");

    for dir in [&config.download_root, &config.public_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let extractor = Arc::new(YtDlpExtractor::new(
        config.ytdlp_bin.clone(),
        config.ffmpeg_bin.clone(),
        config.cookies_file.clone(),
    ));

    let state = AppState {
        registry: Arc::new(JobRegistry::new(
            config.download_root.clone(),
            config.job_log_capacity,
        )),
        runner: Arc::new(JobRunner::new(Arc::clone(&config), extractor)),
        config: Arc::clone(&config),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, api::router(state))
        .await
        .context("Server error")?;

    Ok(())
}

fn init_log() {
    tracing_subscriber::fmt()
        .with_ansi(true)
        .with_env_filter(
            TracingFilterBuilder::default()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish()
        .init();
}
