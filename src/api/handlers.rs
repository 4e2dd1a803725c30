use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::jobs::{JobHandle, JobType};

use super::error::ApiError;
use super::ApiState;

const DEFAULT_START_TIMEOUT: u64 = 600;
const DEFAULT_STOP_TIMEOUT: u64 = 300;
const DEFAULT_BLOCK_MINUTES: u64 = 10;

pub async fn start_containers(
    State(state): State<ApiState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    ensure_unblocked(&state)?;

    let timeout = parse_timeout(&params, DEFAULT_START_TIMEOUT);
    let ignore = parse_ignore(&params);

    let job = JobHandle::new(JobType::Start, timeout, ignore);
    let job_id = job.id();

    state.job_manager.submit(job).await.map_err(|err| {
        error!(error = %err, "Failed to submit job");
        ApiError::SubmitFailed
    })?;

    info!(job_id = %job_id, timeout, "Start job created");

    Ok(Json(json!({ "job_id": job_id })))
}

pub async fn stop_containers(
    State(state): State<ApiState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    ensure_unblocked(&state)?;

    let timeout = parse_timeout(&params, DEFAULT_STOP_TIMEOUT);
    let ignore = parse_ignore(&params);

    let job = JobHandle::new(JobType::Stop, timeout, ignore.clone());
    let job_id = job.id();

    state.job_manager.submit(job).await.map_err(|err| {
        error!(error = %err, "Failed to submit job");
        ApiError::SubmitFailed
    })?;

    info!(job_id = %job_id, timeout, ignore = ?ignore, "Stop job created");

    Ok(Json(json!({ "job_id": job_id })))
}

pub async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Response {
    let job = Uuid::parse_str(&job_id)
        .ok()
        .and_then(|id| state.job_manager.get(&id));

    match job {
        Some(job) => (StatusCode::OK, Json(json!({ "status": job.status }))).into_response(),
        None => {
            debug!(job_id = %job_id, "Job not found");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "status": "not_found" })),
            )
                .into_response()
        }
    }
}

pub async fn ping() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn block(
    State(state): State<ApiState>,
    Path(minutes): Path<String>,
) -> Json<Value> {
    let minutes: u64 = minutes.parse().unwrap_or(DEFAULT_BLOCK_MINUTES);

    let cancel = CancellationToken::new();
    {
        let mut block = state.block.write().unwrap();
        // At most one outstanding auto-unblock; a new block replaces it.
        if let Some(existing) = block.unblock_cancel.take() {
            existing.cancel();
        }
        block.blocked = true;
        block.unblock_cancel = Some(cancel.clone());
    }

    let block_state = state.block.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(minutes.saturating_mul(60))) => {
                let mut block = block_state.write().unwrap();
                block.blocked = false;
                block.unblock_cancel = None;
                info!("Auto unblock complete");
            }
            _ = cancel.cancelled() => {}
        }
    });

    info!(duration_minutes = minutes, "Operations are now blocked");

    Json(json!({
        "message": format!("Operations are now blocked for {minutes} minutes")
    }))
}

pub async fn unblock(State(state): State<ApiState>) -> Json<Value> {
    let mut block = state.block.write().unwrap();
    if let Some(existing) = block.unblock_cancel.take() {
        existing.cancel();
    }
    block.blocked = false;
    drop(block);

    info!("Operations are now unblocked");

    Json(json!({ "message": "Operations are now unblocked" }))
}

fn ensure_unblocked(state: &ApiState) -> Result<(), ApiError> {
    if state.block.read().unwrap().blocked {
        return Err(ApiError::Blocked);
    }
    Ok(())
}

fn parse_timeout(params: &[(String, String)], default: u64) -> u64 {
    params
        .iter()
        .find(|(key, _)| key == "timeout")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(default)
}

/// Accepts both repeated parameters (`?ignore=a&ignore=b`) and
/// comma-separated values within one parameter (`?ignore=a,b`).
fn parse_ignore(params: &[(String, String)]) -> Vec<String> {
    params
        .iter()
        .filter(|(key, _)| key == "ignore")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
