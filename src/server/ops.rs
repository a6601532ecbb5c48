//! Loopback operations HTTP server.
//!
//! Provides endpoints for:
//! - Prometheus metrics
//! - Listing and triggering background jobs
//! - Listing backups, taking a manual backup and running retention

use super::metrics::metrics_handler;
use crate::background_jobs::{JobError, SchedulerHandle};
use crate::backup::{DatabaseBackup, RetentionPolicy};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct OpsState {
    pub backup: Arc<DatabaseBackup>,
    pub scheduler: SchedulerHandle,
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job_id: String,
    pub status: &'static str,
}

/// Request body for a retention sweep. An empty body uses the configured window.
#[derive(Debug, Default, Deserialize)]
pub struct RetentionBody {
    #[serde(default)]
    pub days_to_keep: Option<u32>,
}

fn error_response(status: StatusCode, error: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// =============================================================================
// Job Routes
// =============================================================================

/// GET /v1/admin/jobs - List registered jobs
async fn list_jobs(State(state): State<OpsState>) -> impl IntoResponse {
    Json(state.scheduler.list_jobs().await)
}

/// POST /v1/admin/jobs/{job_id}/trigger - Run a job now
async fn trigger_job(
    State(state): State<OpsState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.trigger_job(&job_id).await {
        Ok(()) => {
            info!("Triggered job {} from ops server", job_id);
            (
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    job_id,
                    status: "triggered",
                }),
            )
                .into_response()
        }
        Err(e @ JobError::NotFound) => error_response(StatusCode::NOT_FOUND, e),
        Err(e @ JobError::AlreadyRunning) => error_response(StatusCode::CONFLICT, e),
        Err(e) => {
            warn!("Failed to trigger job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

// =============================================================================
// Backup Routes
// =============================================================================

/// GET /v1/admin/backups - List backup files, newest first
async fn list_backups(State(state): State<OpsState>) -> impl IntoResponse {
    match state.backup.list_backups().await {
        Ok(backups) => Json(backups).into_response(),
        Err(e) => {
            warn!("Failed to list backups: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// POST /v1/admin/backups - Take a manual backup
async fn create_backup(State(state): State<OpsState>) -> impl IntoResponse {
    let result = state.backup.backup_now().await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result))
}

/// POST /v1/admin/backups/retention - Delete expired backups
async fn sweep_backups(State(state): State<OpsState>, body: Bytes) -> impl IntoResponse {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RetentionBody::default()
    } else {
        match serde_json::from_slice::<RetentionBody>(&body) {
            Ok(request) => request,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        }
    };

    let policy = match request.days_to_keep {
        Some(days) => match RetentionPolicy::new(days) {
            Ok(policy) => policy,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
        None => state.backup.retention_policy(),
    };

    match state.backup.enforce_retention(policy).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

// =============================================================================
// Router Construction
// =============================================================================

/// Build the operations router.
pub fn make_ops_app(state: OpsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/v1/admin/jobs", get(list_jobs))
        .route("/v1/admin/jobs/{job_id}/trigger", post(trigger_job))
        .route("/v1/admin/backups", get(list_backups).post(create_backup))
        .route("/v1/admin/backups/retention", post(sweep_backups))
        .with_state(state)
}

/// Serve the operations router on the loopback interface until `shutdown` is cancelled.
pub async fn run_ops_server(
    port: u16,
    state: OpsState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = make_ops_app(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind ops server to 127.0.0.1:{}", port))?;
    info!("Ops server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
