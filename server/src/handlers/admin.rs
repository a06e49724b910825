//! Operator views of jobs and the work queue.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use reportflow::db::job_repo::JobFilter;
use reportflow::model::JobStatus;
use reportflow::queue::QueueStats;
use reportflow::reader::{JobSummary, Page};
use reportflow::WorkQueue;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobListQuery {
    pub status: Option<String>,
    pub report_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub name: String,
    pub stats: QueueStats,
}

/// GET /api/admin/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    query: Result<Query<JobListQuery>, QueryRejection>,
) -> Result<Json<Page<JobSummary>>, ApiError> {
    let Query(query) = query?;
    let status = query
        .status
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let filter = JobFilter {
        status,
        report_id: query.report_id,
        limit: query.limit,
        offset: query.offset,
    };
    Ok(Json(state.services.reader.list_jobs(&filter)?))
}

/// GET /api/admin/queue
pub async fn queue(State(state): State<AppState>) -> Result<Json<QueueResponse>, ApiError> {
    let queue = &state.services.queue;
    let stats = queue.stats().await?;
    Ok(Json(QueueResponse {
        name: queue.name().to_string(),
        stats,
    }))
}
