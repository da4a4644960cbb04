use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::models::{BatchJob, BatchResult, JobEvent, JobProgress, LineItem};
use crate::service::audit::{summarize, CatalogSnapshot, ItemAuditor};
use crate::service::cache::ResultCache;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinError;
use tokio::time::Instant;

/// 任务最终结果
pub type JobOutcome = Result<Arc<BatchResult>, QueueError>;

/// 队列统计: pending 为执行中任务数，size 为等待并发槽位的任务数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub size: usize,
    pub concurrency: usize,
    pub is_paused: bool,
}

/// 提交方持有的任务句柄: 状态事件流 + 最终结果
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    events: mpsc::UnboundedReceiver<JobEvent>,
    outcome: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// 下一条状态事件，任务结束且事件读完后返回 None
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// 等待任务结束；任务失败时返回对应错误
    pub async fn wait(self) -> JobOutcome {
        let JobHandle { job_id, outcome, .. } = self;
        outcome
            .await
            .unwrap_or_else(|_| Err(QueueError::Dropped(job_id)))
    }
}

/// 滚动窗口准入限制: window 内最多 limit 次准入，超出者等待而非拒绝
struct RateWindow {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// 取得一次准入，返回准入时刻 (不限速时为 None)
    async fn acquire(&self) -> Option<Instant> {
        if self.limit == 0 {
            return None;
        }

        loop {
            let wait = {
                let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                while admitted
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    admitted.pop_front();
                }

                if admitted.len() < self.limit {
                    admitted.push_back(now);
                    return Some(now);
                }

                match admitted.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => return None,
                }
            };

            tracing::debug!("准入速率已达上限, 等待 {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// 归还未实际使用的准入
    fn refund(&self, at: Option<Instant>) {
        let Some(at) = at else {
            return;
        };
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = admitted.iter().rposition(|t| *t == at) {
            admitted.remove(pos);
        }
    }
}

struct QueueShared {
    config: QueueConfig,
    auditor: Arc<dyn ItemAuditor>,
    cache: Arc<ResultCache>,
    jobs: DashMap<String, BatchJob>,
    slots: Arc<Semaphore>,
    rate: RateWindow,
    paused: watch::Sender<bool>,
    /// 每次 clear 递增，等待中的任务据此退出
    cleared: watch::Sender<u64>,
    waiting: AtomicUsize,
    running: AtomicUsize,
    idle: Notify,
}

/// 有界并发批量审计队列
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<QueueShared>,
}

impl JobQueue {
    pub fn new(config: QueueConfig, auditor: Arc<dyn ItemAuditor>, cache: Arc<ResultCache>) -> Self {
        let concurrency = config.concurrency.max(1);
        let rate = RateWindow::new(config.rate_limit, config.rate_window());

        Self {
            shared: Arc::new(QueueShared {
                config,
                auditor,
                cache,
                jobs: DashMap::new(),
                slots: Arc::new(Semaphore::new(concurrency)),
                rate,
                paused: watch::Sender::new(false),
                cleared: watch::Sender::new(0),
                waiting: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// 提交批量审计任务
    ///
    /// 任务 ID 必须唯一 (包括仍在保留期内的已结束任务)。
    pub fn enqueue_batch(
        &self,
        job_id: impl Into<String>,
        items: Vec<LineItem>,
        region: Option<String>,
    ) -> Result<JobHandle, QueueError> {
        let job_id = job_id.into();

        match self.shared.jobs.entry(job_id.clone()) {
            Entry::Occupied(_) => return Err(QueueError::DuplicateJob(job_id)),
            Entry::Vacant(slot) => {
                slot.insert(BatchJob::new(job_id.clone(), items.clone(), region.clone()));
            }
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let (outcome_tx, outcome) = oneshot::channel();
        let cleared = self.shared.cleared.subscribe();
        self.shared.waiting.fetch_add(1, Ordering::SeqCst);

        tracing::info!("任务 {} 已入队: {} 条明细, 地区 {:?}", job_id, items.len(), region);

        let shared = Arc::clone(&self.shared);
        let id = job_id.clone();
        tokio::spawn(async move {
            let result = shared.run(id, items, region, cleared, event_tx).await;
            let _ = outcome_tx.send(result);
        });

        Ok(JobHandle {
            job_id,
            events,
            outcome,
        })
    }

    pub fn get_job_status(&self, job_id: &str) -> Option<JobProgress> {
        self.shared.jobs.get(job_id).map(|job| job.progress())
    }

    /// 任务完整记录 (含结果与错误信息)
    pub fn get_job(&self, job_id: &str) -> Option<BatchJob> {
        self.shared.jobs.get(job_id).map(|job| job.value().clone())
    }

    /// 暂停准入，不影响执行中的任务
    pub fn pause(&self) {
        self.shared.paused.send_replace(true);
        tracing::info!("任务队列已暂停");
    }

    pub fn resume(&self) {
        self.shared.paused.send_replace(false);
        tracing::info!("任务队列已恢复");
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// 丢弃所有尚未准入的任务，返回丢弃时的等待数
    pub fn clear(&self) -> usize {
        let waiting = self.shared.waiting.load(Ordering::SeqCst);
        self.shared
            .cleared
            .send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        tracing::info!("任务队列已清空, 丢弃 {} 个等待中的任务", waiting);
        waiting
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.shared.running.load(Ordering::SeqCst),
            size: self.shared.waiting.load(Ordering::SeqCst),
            concurrency: self.shared.config.concurrency,
            is_paused: self.is_paused(),
        }
    }

    /// 等待队列中没有等待或执行中的任务
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.running.load(Ordering::SeqCst) == 0
                && self.shared.waiting.load(Ordering::SeqCst) == 0
            {
                return;
            }
            notified.await;
        }
    }
}

impl QueueShared {
    async fn run(
        self: Arc<Self>,
        job_id: String,
        items: Vec<LineItem>,
        region: Option<String>,
        mut cleared: watch::Receiver<u64>,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> JobOutcome {
        // clear 先于准入完成时，任务一律按丢弃处理
        let permit = tokio::select! {
            biased;
            _ = cleared.changed() => None,
            permit = self.admit() => permit,
        };

        let Some(permit) = permit else {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            let err = QueueError::Cleared(job_id.clone());
            self.record_failure(&job_id, &err, &events);
            self.schedule_eviction(job_id);
            self.idle.notify_waiters();
            return Err(err);
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            job.start();
        }
        let _ = events.send(JobEvent::Processing {
            job_id: job_id.clone(),
        });
        tracing::info!("任务 {} 开始处理", job_id);

        let outcome = self.execute(&job_id, items, region, permit).await;

        match &outcome {
            Ok(result) => {
                if let Some(mut job) = self.jobs.get_mut(&job_id) {
                    job.complete(Arc::clone(result));
                }
                let _ = events.send(JobEvent::Completed {
                    job_id: job_id.clone(),
                    result: Arc::clone(result),
                });
                tracing::info!(
                    "任务 {} 完成: 共 {} 条, 缓存命中 {} 条, 新计算 {} 条",
                    job_id,
                    result.results.len(),
                    result.cached_count,
                    result.computed_count
                );
            }
            Err(e) => self.record_failure(&job_id, e, &events),
        }

        self.schedule_eviction(job_id);
        self.idle.notify_waiters();
        outcome
    }

    /// 依次等待: 未暂停 -> 并发槽位 -> 速率窗口
    async fn admit(&self) -> Option<OwnedSemaphorePermit> {
        let mut paused = self.paused.subscribe();

        loop {
            let resumed = paused.wait_for(|p| !*p).await.is_ok();
            if !resumed {
                return None;
            }

            let permit = Arc::clone(&self.slots).acquire_owned().await.ok()?;
            if *self.paused.borrow() {
                continue;
            }

            let admitted_at = self.rate.acquire().await;
            if !*self.paused.borrow() {
                return Some(permit);
            }
            self.rate.refund(admitted_at);
        }
    }

    /// 在阻塞线程池中计算，并加超时保护
    ///
    /// 超时后任务立即以失败结束；计算线程在当前明细完成后停止，槽位在线程退出后归还。
    async fn execute(
        self: &Arc<Self>,
        job_id: &str,
        items: Vec<LineItem>,
        region: Option<String>,
        permit: OwnedSemaphorePermit,
    ) -> JobOutcome {
        let cancel = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(self);
        let id = job_id.to_string();
        let flag = Arc::clone(&cancel);
        let mut compute =
            tokio::task::spawn_blocking(move || shared.process(&id, &items, region.as_deref(), &flag));

        let timeout = self.config.job_timeout();
        match tokio::time::timeout(timeout, &mut compute).await {
            Ok(joined) => {
                self.release(permit);
                match joined {
                    Ok(result) => result.map(Arc::new),
                    Err(join_error) => Err(QueueError::Execution {
                        job_id: job_id.to_string(),
                        message: panic_message(join_error),
                    }),
                }
            }
            Err(_) => {
                cancel.store(true, Ordering::SeqCst);
                let shared = Arc::clone(self);
                let id = job_id.to_string();
                tokio::spawn(async move {
                    let _ = compute.await;
                    tracing::debug!("超时任务 {} 的计算线程已退出, 归还槽位", id);
                    shared.release(permit);
                });

                Err(QueueError::Timeout {
                    job_id: job_id.to_string(),
                    after: timeout,
                })
            }
        }
    }

    fn release(&self, permit: OwnedSemaphorePermit) {
        drop(permit);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.idle.notify_waiters();
    }

    /// 缓存拆分 -> 计算未命中部分 (逐条回写缓存) -> 按原下标合并 -> 汇总
    ///
    /// 整个任务使用同一份价格库快照；cancel 置位后在下一条明细前停止。
    fn process(
        &self,
        job_id: &str,
        items: &[LineItem],
        region: Option<&str>,
        cancel: &AtomicBool,
    ) -> Result<BatchResult, QueueError> {
        let snapshot: CatalogSnapshot = self.auditor.snapshot();
        let total = items.len();
        let split = self.cache.get_batch_cached(items, region, snapshot.generation);
        let cached_count = split.cached.len();
        let mut computed = Vec::with_capacity(split.uncached.len());

        for pending in &split.uncached {
            if cancel.load(Ordering::SeqCst) {
                return Err(QueueError::Timeout {
                    job_id: job_id.to_string(),
                    after: self.config.job_timeout(),
                });
            }

            let verdict = self
                .auditor
                .audit_item(&snapshot, &pending.item)
                .map_err(|e| QueueError::Execution {
                    job_id: job_id.to_string(),
                    message: e.to_string(),
                })?;
            self.cache.set(&pending.item.name, &verdict, region, snapshot.generation);
            computed.push((pending.index, verdict));
            self.update_progress(job_id, cached_count + computed.len(), total);
        }

        let computed_count = computed.len();
        let results = split.merge(computed).ok_or_else(|| QueueError::Execution {
            job_id: job_id.to_string(),
            message: "merged result is missing items".to_string(),
        })?;
        let summary = summarize(items, &results);

        Ok(BatchResult {
            results,
            summary,
            partial_cache: cached_count > 0 && computed_count > 0,
            cached_count,
            computed_count,
        })
    }

    fn update_progress(&self, job_id: &str, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = (done * 100 / total).min(100) as u8;
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.set_progress(percent);
        }
    }

    fn record_failure(&self, job_id: &str, err: &QueueError, events: &mpsc::UnboundedSender<JobEvent>) {
        let message = err.to_string();
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.fail(message.clone());
        }
        tracing::error!("任务 {} 失败: {}", job_id, message);
        let _ = events.send(JobEvent::Failed {
            job_id: job_id.to_string(),
            error: message,
        });
    }

    /// 终态任务保留一段时间供轮询，之后从任务表移除
    fn schedule_eviction(self: &Arc<Self>, job_id: String) {
        let retention = self.config.retention();
        let shared: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(shared) = shared.upgrade() {
                if shared
                    .jobs
                    .remove_if(&job_id, |_, job| job.status.is_terminal())
                    .is_some()
                {
                    tracing::debug!("任务 {} 已超过保留期, 移出任务表", job_id);
                }
            }
        });
    }
}

fn panic_message(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }

    let payload = join_error.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic during audit: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic during audit: {}", msg)
    } else {
        "panic during audit".to_string()
    }
}
