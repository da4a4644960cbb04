use crate::models::{AuditSummary, AuditVerdict, LineItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 批量任务状态: queued -> processing -> {completed | failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 批次审计结果 (缓存命中 + 新计算合并后)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<AuditVerdict>,
    pub summary: AuditSummary,
    pub partial_cache: bool,
    pub cached_count: usize,
    pub computed_count: usize,
}

/// 批量任务记录 (仅存于内存任务表)
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: String,
    pub status: JobStatus,
    pub items: Vec<LineItem>,
    pub region: Option<String>,
    pub progress: u8,
    pub result: Option<Arc<BatchResult>>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub fn new(id: impl Into<String>, items: Vec<LineItem>, region: Option<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            items,
            region,
            progress: 0,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// queued -> processing
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        true
    }

    /// 非终态时更新进度 (终态前封顶 99)
    pub fn set_progress(&mut self, progress: u8) {
        if self.status == JobStatus::Processing {
            self.progress = progress.min(99);
        }
    }

    pub fn complete(&mut self, result: Arc<BatchResult>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            status: self.status,
            progress: self.progress,
        }
    }
}

/// 轮询视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub progress: u8,
}

/// 任务状态变更通知
#[derive(Debug, Clone)]
pub enum JobEvent {
    Processing { job_id: String },
    Completed { job_id: String, result: Arc<BatchResult> },
    Failed { job_id: String, error: String },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Processing { job_id }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobEvent::Processing { .. } => JobStatus::Processing,
            JobEvent::Completed { .. } => JobStatus::Completed,
            JobEvent::Failed { .. } => JobStatus::Failed,
        }
    }
}
