use crate::config::AppConfig;
use crate::error::{CacheError, QueueError};
use crate::models::{AuditVerdict, BatchJob, Catalog, JobProgress, LineItem};
use crate::service::audit::{AuditEngine, BatchAudit, ItemAuditor};
use crate::service::cache::{CacheBackend, CacheStats, MemoryBackend, ResultCache};
use crate::service::queue::{JobHandle, JobQueue, QueueStats};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// 审计服务: 对外暴露提交 / 轮询 / 单条审计 / 管理操作
///
/// 显式构造并注入 HTTP 层，生命周期为 new -> start -> shutdown。
pub struct AuditService {
    engine: Arc<AuditEngine>,
    cache: Arc<ResultCache>,
    queue: JobQueue,
    sweep_interval: Option<Duration>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl AuditService {
    /// 使用进程内缓存
    pub fn new(config: &AppConfig, catalog: Catalog) -> Self {
        Self::with_backend(config, catalog, Arc::new(MemoryBackend::new()))
    }

    /// 使用指定缓存后端
    pub fn with_backend(config: &AppConfig, catalog: Catalog, backend: Arc<dyn CacheBackend>) -> Self {
        let engine = Arc::new(AuditEngine::new(catalog, config.catalog.strategy));
        let cache = Arc::new(ResultCache::new(backend, config.cache.ttl()));
        let auditor: Arc<dyn ItemAuditor> = engine.clone();
        let queue = JobQueue::new(config.queue.clone(), auditor, Arc::clone(&cache));

        Self {
            engine,
            cache,
            queue,
            sweep_interval: config.cache.sweep_interval(),
            sweeper: Mutex::new(None),
        }
    }

    /// 启动后台过期清理 (重复调用无副作用)
    pub fn start(&self) {
        let Some(interval) = self.sweep_interval else {
            return;
        };

        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        let cache = Arc::clone(&self.cache);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        }));

        tracing::info!("缓存过期清理已启动, 间隔 {:?}", interval);
    }

    /// 停止准入、丢弃等待中的任务、等待执行中的任务结束
    pub async fn shutdown(&self) {
        self.queue.pause();
        self.queue.clear();
        self.queue.wait_idle().await;

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            handle.abort();
        }

        tracing::info!("审计服务已停止");
    }

    pub fn submit_batch(
        &self,
        job_id: impl Into<String>,
        items: Vec<LineItem>,
        region: Option<String>,
    ) -> Result<JobHandle, QueueError> {
        self.queue.enqueue_batch(job_id, items, region)
    }

    pub fn poll_status(&self, job_id: &str) -> Option<JobProgress> {
        self.queue.get_job_status(job_id)
    }

    pub fn job(&self, job_id: &str) -> Option<BatchJob> {
        self.queue.get_job(job_id)
    }

    /// 单条同步审计，不经过队列
    pub fn audit_single(&self, item: &LineItem) -> AuditVerdict {
        self.engine.audit(item)
    }

    /// 小批量同步审计，不经过队列与缓存
    pub fn audit_items(&self, items: &[LineItem]) -> BatchAudit {
        self.engine.audit_batch(items)
    }

    pub fn pause_queue(&self) {
        self.queue.pause();
    }

    pub fn resume_queue(&self) {
        self.queue.resume();
    }

    pub fn clear_queue(&self) -> usize {
        self.queue.clear()
    }

    pub fn flush_cache(&self) -> Result<usize, CacheError> {
        self.cache.flush()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// 替换价格库并清空缓存
    ///
    /// 执行中的任务仍按旧价格库写入缓存，这些条目带旧版本号，不会被后续任务读到。
    pub fn reload_catalog(&self, catalog: Catalog) -> Result<usize, CacheError> {
        let entries = catalog.len();
        self.engine.replace_catalog(catalog);
        tracing::info!("价格库已替换: {} 个条目", entries);
        self.cache.flush()
    }

    pub fn engine(&self) -> &Arc<AuditEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}
