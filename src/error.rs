use std::time::Duration;

/// 单条明细审计失败
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to audit item {item}: {reason}")]
    Compute { item: String, reason: String },
}

/// 缓存后端错误 (读写时一律降级为未命中)
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// 任务队列错误
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job {0} already exists")]
    DuplicateJob(String),

    #[error("job {0} was cleared from the queue before it started")]
    Cleared(String),

    #[error("job {job_id} failed: {message}")]
    Execution { job_id: String, message: String },

    #[error("job {job_id} timed out after {after:?}")]
    Timeout { job_id: String, after: Duration },

    #[error("job {0} was dropped before reporting an outcome")]
    Dropped(String),
}

/// 价格库加载 / 结果导出错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid catalog entry {name}: {reason}")]
    InvalidEntry { name: String, reason: String },
}
