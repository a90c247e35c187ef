use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
    config::Config,
    jobs::{registry::JobRegistry, runner::JobRunner},
};

pub mod error;
pub mod handlers;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<JobRegistry>,
    pub runner: Arc<JobRunner>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/start", post(handlers::start_json))
        .route("/api/download", post(handlers::start_json))
        .route("/api/download/form", post(handlers::start_form))
        .route("/logs/:job_id", get(handlers::job_status))
        .route("/api/status/:job_id", get(handlers::job_status))
        .route("/downloads/:file", get(handlers::download_file))
        .route("/downloads/:job_id/:file", get(handlers::download_job_file))
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
