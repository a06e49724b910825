//! Submission, progress and retry endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use reportflow::db::report_repo::ReportFilter;
use reportflow::model::{ReportStatus, SubmitRequest};
use reportflow::reader::{Page, ReportProgress, ReportSummary, SectionDetail};
use reportflow::SubmitOutcome;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub report_id: String,
    pub job_id: String,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            report_id: outcome.report_id,
            job_id: outcome.job_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: String,
    pub cancel_requested: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportListQuery {
    pub status: Option<String>,
    pub owner: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ReportListQuery {
    fn into_filter(self) -> Result<ReportFilter, ApiError> {
        let status = self
            .status
            .map(|s| s.parse::<ReportStatus>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(ReportFilter {
            status,
            owner: self.owner,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// POST /api/reports
pub async fn submit(
    State(state): State<AppState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = body?;
    let outcome = state.services.admission.submit(&request).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// GET /api/reports
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ReportListQuery>, QueryRejection>,
) -> Result<Json<Page<ReportSummary>>, ApiError> {
    let Query(query) = query?;
    let page = state.services.reader.list_reports(&query.into_filter()?)?;
    Ok(Json(page))
}

/// GET /api/reports/:id/progress
pub async fn progress(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<ReportProgress>, ApiError> {
    state
        .services
        .reader
        .report_progress(&report_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Report '{}' not found", report_id)))
}

/// GET /api/reports/:id/sections/:order
pub async fn section(
    State(state): State<AppState>,
    path: Result<Path<(String, u32)>, PathRejection>,
) -> Result<Json<SectionDetail>, ApiError> {
    let Path((report_id, order_no)) = path?;
    state
        .services
        .reader
        .section_detail(&report_id, order_no)?
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "Section {} of report '{}' not found",
                order_no, report_id
            ))
        })
}

/// POST /api/reports/:id/retry
pub async fn retry(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let outcome = state.services.admission.retry_report(&report_id).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome.into())))
}

/// POST /api/reports/:id/sections/:order/retry
pub async fn retry_section(
    State(state): State<AppState>,
    path: Result<Path<(String, u32)>, PathRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Path((report_id, order_no)) = path?;
    let outcome = state
        .services
        .admission
        .retry_section(&report_id, order_no)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(outcome.into())))
}

/// POST /api/reports/:id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let job_id = state.services.admission.cancel(&report_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id,
            cancel_requested: true,
        }),
    ))
}
