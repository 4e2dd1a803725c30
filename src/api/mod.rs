mod error;
mod handlers;
mod middleware;

pub use error::ApiError;

use std::sync::{Arc, RwLock};

use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::jobs::JobManager;

/// Maintenance-window flag plus the cancel handle for its auto-expiry task.
#[derive(Default)]
pub(crate) struct BlockState {
    pub blocked: bool,
    pub unblock_cancel: Option<CancellationToken>,
}

#[derive(Clone)]
pub struct ApiState {
    pub(crate) job_manager: Arc<JobManager>,
    pub(crate) block: Arc<RwLock<BlockState>>,
}

impl ApiState {
    pub fn new(job_manager: Arc<JobManager>) -> Self {
        Self {
            job_manager,
            block: Arc::new(RwLock::new(BlockState::default())),
        }
    }
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/start", post(handlers::start_containers))
        .route("/stop", post(handlers::stop_containers))
        .route("/ping", get(handlers::ping))
        .route("/block/{minutes}", post(handlers::block))
        .route("/unblock", post(handlers::unblock))
        .route("/job_status/{job_id}", get(handlers::job_status))
        .layer(axum_middleware::from_fn(middleware::recovery_middleware))
        .layer(axum_middleware::from_fn(
            middleware::request_logging_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
