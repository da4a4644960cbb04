use crate::error::QueueError;
use crate::models::{AuditVerdict, BatchResult, JobStatus, LineItem};
use crate::service::{AuditService, BatchAudit, CacheStats, QueueStats};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 请求体: 批量审计
#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    pub job_id: String,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub region: Option<String>,
}

/// 通用响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

/// 任务轮询响应
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Arc<BatchResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn message(status: StatusCode, success: bool, message: String) -> Response {
    (status, Json(ApiResponse { success, message })).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 提交批量审计，结果通过轮询获取
pub async fn submit_batch(
    State(service): State<Arc<AuditService>>,
    Json(req): Json<SubmitBatchRequest>,
) -> Response {
    let count = req.items.len();
    match service.submit_batch(req.job_id.clone(), req.items, req.region) {
        Ok(_handle) => message(
            StatusCode::ACCEPTED,
            true,
            format!("Job {} accepted with {} items", req.job_id, count),
        ),
        Err(e @ QueueError::DuplicateJob(_)) => message(StatusCode::CONFLICT, false, format!("Error: {}", e)),
        Err(e) => message(StatusCode::INTERNAL_SERVER_ERROR, false, format!("Error: {}", e)),
    }
}

/// 轮询任务状态
pub async fn job_status(State(service): State<Arc<AuditService>>, Path(job_id): Path<String>) -> Response {
    match service.job(&job_id) {
        Some(job) => {
            let response = JobStatusResponse {
                job_id: job.id,
                status: job.status,
                progress: job.progress,
                result: job.result,
                error: job.error,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        None => message(StatusCode::NOT_FOUND, false, format!("Job {} not found", job_id)),
    }
}

/// 单条同步审计
pub async fn audit_item(
    State(service): State<Arc<AuditService>>,
    Json(item): Json<LineItem>,
) -> Json<AuditVerdict> {
    Json(service.audit_single(&item))
}

/// 多条同步审计
pub async fn audit_items(
    State(service): State<Arc<AuditService>>,
    Json(items): Json<Vec<LineItem>>,
) -> Json<BatchAudit> {
    Json(service.audit_items(&items))
}

pub async fn pause_queue(State(service): State<Arc<AuditService>>) -> Response {
    service.pause_queue();
    message(StatusCode::OK, true, "Queue paused".to_string())
}

pub async fn resume_queue(State(service): State<Arc<AuditService>>) -> Response {
    service.resume_queue();
    message(StatusCode::OK, true, "Queue resumed".to_string())
}

pub async fn clear_queue(State(service): State<Arc<AuditService>>) -> Response {
    let cleared = service.clear_queue();
    message(StatusCode::OK, true, format!("Cleared {} waiting jobs", cleared))
}

pub async fn queue_stats(State(service): State<Arc<AuditService>>) -> Json<QueueStats> {
    Json(service.queue_stats())
}

pub async fn flush_cache(State(service): State<Arc<AuditService>>) -> Response {
    match service.flush_cache() {
        Ok(removed) => message(StatusCode::OK, true, format!("Flushed {} cache entries", removed)),
        Err(e) => message(StatusCode::SERVICE_UNAVAILABLE, false, format!("Error: {}", e)),
    }
}

pub async fn cache_stats(State(service): State<Arc<AuditService>>) -> Json<CacheStats> {
    Json(service.cache_stats())
}
