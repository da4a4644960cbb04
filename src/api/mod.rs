pub mod handlers;

pub use handlers::*;

use crate::service::AuditService;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;

/// 构建路由
pub fn router(service: Arc<AuditService>) -> Router {
    let audit_routes = Router::new()
        .route("/api/audit/batch", post(submit_batch))
        .route("/api/audit/jobs/:job_id", get(job_status))
        .route("/api/audit/item", post(audit_item))
        .route("/api/audit/items", post(audit_items));

    let admin_routes = Router::new()
        .route("/api/admin/queue/pause", post(pause_queue))
        .route("/api/admin/queue/resume", post(resume_queue))
        .route("/api/admin/queue/clear", post(clear_queue))
        .route("/api/admin/queue/stats", get(queue_stats))
        .route("/api/admin/cache/flush", post(flush_cache))
        .route("/api/admin/cache/stats", get(cache_stats));

    Router::new()
        .route("/health", get(health_check))
        .merge(audit_routes)
        .merge(admin_routes)
        .with_state(service)
        .layer(ServiceBuilder::new().layer(middleware::from_fn(log_request)))
}

/// 请求日志
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!("{} {} -> {} ({:?})", method, path, response.status(), start.elapsed());
    response
}
