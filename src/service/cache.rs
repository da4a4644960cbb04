use crate::error::CacheError;
use crate::models::{AuditVerdict, IndexedItem, LineItem};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 审计结果缓存键前缀
pub const CACHE_PREFIX: &str = "audit:";

/// 审计结果默认有效期: 7 天
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// 缓存条目
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub verdict: AuditVerdict,
    pub region: Option<String>,
    /// 计算该结论时的价格库版本
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(verdict: AuditVerdict, region: Option<String>, generation: u64) -> Self {
        Self {
            verdict,
            region,
            generation,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        // created_at 晚于 now (时钟回拨) 视为未过期
        (now - self.created_at)
            .to_std()
            .map(|age| age >= ttl)
            .unwrap_or(false)
    }
}

/// 缓存存储后端 (进程内 / 分布式)
///
/// 每个条目的写入与删除都是原子的，读方不会看到半写状态。
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    /// 删除键以 prefix 开头的条目，返回删除数
    fn delete_by_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
    /// 删除满足条件的条目，返回删除数
    fn remove_where(&self, predicate: &dyn Fn(&CacheEntry) -> bool) -> Result<usize, CacheError>;
    fn flush(&self) -> Result<usize, CacheError>;
    fn len(&self) -> Result<usize, CacheError>;
}

/// 进程内缓存后端
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    fn remove_where(&self, predicate: &dyn Fn(&CacheEntry) -> bool) -> Result<usize, CacheError> {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !predicate(entry);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    fn flush(&self) -> Result<usize, CacheError> {
        // 逐条删除而非 clear()，保证返回值与实际删除数一致
        self.delete_by_prefix("")
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }
}

/// 批次缓存拆分结果
///
/// cached 以原批次下标为键，uncached 保留原批次下标。
#[derive(Debug, Clone, Default)]
pub struct CacheSplit {
    pub cached: BTreeMap<usize, AuditVerdict>,
    pub uncached: Vec<IndexedItem>,
}

impl CacheSplit {
    pub fn total(&self) -> usize {
        self.cached.len() + self.uncached.len()
    }

    /// 按原下标合并缓存结果与新计算结果
    ///
    /// 存在缺失或越界下标时返回 None。
    pub fn merge(self, computed: Vec<(usize, AuditVerdict)>) -> Option<Vec<AuditVerdict>> {
        let total = self.total();
        let mut slots: Vec<Option<AuditVerdict>> = vec![None; total];

        for (index, verdict) in self.cached.into_iter().chain(computed) {
            *slots.get_mut(index)? = Some(verdict);
        }

        slots.into_iter().collect()
    }
}

/// 缓存统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub backend_errors: u64,
    pub ttl_secs: u64,
}

/// 审计结果缓存 (纯记忆化层，后端异常一律按未命中处理)
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    backend_errors: AtomicU64,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
        }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 明细的缓存键
    pub fn signature(item: &LineItem, region: Option<&str>) -> String {
        Self::signature_for(&item.name, item.unit_price, region)
    }

    /// 缓存键: audit:{地区}:{单价}:{规范化品名}
    ///
    /// 判定结果依赖申报单价，单价参与键计算。
    pub fn signature_for(name: &str, unit_price: f64, region: Option<&str>) -> String {
        format!(
            "{}:{}:{}",
            Self::region_prefix_part(region),
            unit_price,
            name.trim().to_lowercase()
        )
    }

    /// 某地区全部缓存条目的键前缀
    pub fn region_prefix(region: Option<&str>) -> String {
        format!("{}:", Self::region_prefix_part(region))
    }

    fn region_prefix_part(region: Option<&str>) -> String {
        let region = region
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "*".to_string());
        format!("{}{}", CACHE_PREFIX, region)
    }

    /// 单条查询，命中时以调用方原始品名返回
    ///
    /// 条目的价格库版本与 generation 不一致时按未命中处理，旧版本条目顺带删除。
    pub fn get(&self, item: &LineItem, region: Option<&str>, generation: u64) -> Option<AuditVerdict> {
        let key = Self::signature(item, region);

        let entry = match self.backend.get(&key) {
            Ok(entry) => entry,
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("缓存读取失败, 按未命中处理: key={}, 错误: {}", key, e);
                None
            }
        };

        match entry {
            Some(entry) if entry.generation == generation && !entry.is_expired(self.ttl, Utc::now()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.verdict.with_item_name(&item.name))
            }
            Some(entry) if entry.generation > generation => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(_) => {
                // 惰性过期, 或由旧版本价格库计算
                if let Err(e) = self.backend.remove(&key) {
                    self.backend_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("过期缓存删除失败: key={}, 错误: {}", key, e);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 按原批次下标拆分已缓存 / 未缓存明细
    pub fn get_batch_cached(&self, items: &[LineItem], region: Option<&str>, generation: u64) -> CacheSplit {
        let mut split = CacheSplit::default();

        for (index, item) in items.iter().enumerate() {
            match self.get(item, region, generation) {
                Some(verdict) => {
                    split.cached.insert(index, verdict);
                }
                None => split.uncached.push(IndexedItem {
                    index,
                    item: item.clone(),
                }),
            }
        }

        tracing::debug!(
            "缓存拆分: 共 {} 条, 命中 {} 条, 待计算 {} 条",
            items.len(),
            split.cached.len(),
            split.uncached.len()
        );

        split
    }

    /// 写入判定结果，失败时仅记录日志
    ///
    /// generation 为计算该结论所用的价格库版本。
    pub fn set(&self, item_name: &str, verdict: &AuditVerdict, region: Option<&str>, generation: u64) {
        let key = Self::signature_for(item_name, verdict.user_price(), region);
        let entry = CacheEntry::new(verdict.clone(), region.map(str::to_string), generation);

        if let Err(e) = self.backend.set(&key, entry) {
            self.backend_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("缓存写入失败, 已忽略: key={}, 错误: {}", key, e);
        }
    }

    /// 清空全部缓存
    pub fn flush(&self) -> Result<usize, CacheError> {
        let removed = self.backend.flush()?;
        tracing::info!("缓存已清空, 删除 {} 条", removed);
        Ok(removed)
    }

    pub fn delete_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let removed = self.backend.delete_by_prefix(prefix)?;
        tracing::info!("按前缀 {} 删除缓存 {} 条", prefix, removed);
        Ok(removed)
    }

    /// 主动清理过期条目
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let ttl = self.ttl;
        match self.backend.remove_where(&|entry: &CacheEntry| entry.is_expired(ttl, now)) {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!("清理过期缓存 {} 条", removed);
                }
                removed
            }
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("过期缓存清理失败: {}", e);
                0
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = match self.backend.len() {
            Ok(n) => n,
            Err(e) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("缓存统计失败: {}", e);
                0
            }
        };

        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
