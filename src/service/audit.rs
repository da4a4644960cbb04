use crate::error::AuditError;
use crate::models::verdict::round_to;
use crate::models::{AuditSummary, AuditVerdict, Catalog, LineItem, MatchedVerdict, PriceFlag};
use crate::service::classifier;
use crate::service::matcher::{self, MatchStrategy};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// 价格库快照
///
/// generation 在每次替换价格库时递增，缓存条目据此区分所依据的价格库。
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub catalog: Arc<Catalog>,
    pub strategy: MatchStrategy,
    pub generation: u64,
}

impl CatalogSnapshot {
    pub fn audit(&self, item: &LineItem) -> AuditVerdict {
        audit_with(&self.catalog, self.strategy, item)
    }

    /// 批量审计，保持输入顺序
    pub fn audit_batch(&self, items: &[LineItem]) -> BatchAudit {
        let results: Vec<AuditVerdict> = items.par_iter().map(|item| self.audit(item)).collect();
        let summary = summarize(items, &results);

        tracing::debug!(
            "批次审计完成: {} 条明细, 异常 {} 条, 未匹配 {} 条",
            summary.total_items, summary.flagged_items, summary.unmatched_items
        );

        BatchAudit { results, summary }
    }
}

/// 明细审计接口 (任务队列通过此接口调用审计引擎)
///
/// 一个任务只取一次快照，任务内所有明细都基于同一份价格库计算。
pub trait ItemAuditor: Send + Sync {
    fn snapshot(&self) -> CatalogSnapshot;

    fn audit_item(&self, snapshot: &CatalogSnapshot, item: &LineItem) -> Result<AuditVerdict, AuditError> {
        Ok(snapshot.audit(item))
    }
}

/// 批次审计输出，results[i] 对应 items[i]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAudit {
    pub results: Vec<AuditVerdict>,
    pub summary: AuditSummary,
}

/// 审计引擎: 匹配 + 判定 + 汇总
pub struct AuditEngine {
    current: RwLock<CatalogSnapshot>,
}

impl AuditEngine {
    pub fn new(catalog: Catalog, strategy: MatchStrategy) -> Self {
        Self {
            current: RwLock::new(CatalogSnapshot {
                catalog: Arc::new(catalog),
                strategy,
                generation: 0,
            }),
        }
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 当前价格库
    pub fn catalog(&self) -> Arc<Catalog> {
        self.snapshot().catalog
    }

    pub fn generation(&self) -> u64 {
        self.current.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    /// 整体替换价格库，返回旧库
    pub fn replace_catalog(&self, catalog: Catalog) -> Arc<Catalog> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        guard.generation += 1;
        std::mem::replace(&mut guard.catalog, Arc::new(catalog))
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.current.read().unwrap_or_else(PoisonError::into_inner).strategy
    }

    pub fn audit(&self, item: &LineItem) -> AuditVerdict {
        self.snapshot().audit(item)
    }

    pub fn audit_batch(&self, items: &[LineItem]) -> BatchAudit {
        self.snapshot().audit_batch(items)
    }
}

impl ItemAuditor for AuditEngine {
    fn snapshot(&self) -> CatalogSnapshot {
        AuditEngine::snapshot(self)
    }
}

fn audit_with(catalog: &Catalog, strategy: MatchStrategy, item: &LineItem) -> AuditVerdict {
    let Some(found) = matcher::match_item(catalog, &item.name, strategy) else {
        return AuditVerdict::unmatched(item.name.clone(), item.unit_price);
    };

    let entry = found.entry;
    let c = classifier::classify(item.unit_price, entry);

    AuditVerdict::Matched(MatchedVerdict {
        item: item.name.clone(),
        matched_item: found.key.to_string(),
        user_price: item.unit_price,
        min: entry.min,
        avg: entry.avg,
        max: entry.max,
        unit: entry.unit.clone(),
        category: entry.category.clone(),
        flag: c.flag,
        severity: c.severity,
        percent_from_avg: c.percent_from_avg,
        sample_size: entry.sample_size(),
    })
}

/// 汇总批次结果
///
/// items 与 verdicts 按下标一一对应。公允市价取命中条目均价，未命中时取申报单价。
pub fn summarize(items: &[LineItem], verdicts: &[AuditVerdict]) -> AuditSummary {
    let mut summary = AuditSummary {
        total_items: verdicts.len(),
        ..AuditSummary::default()
    };

    for (item, verdict) in items.iter().zip(verdicts) {
        let flag = verdict.flag();
        *summary.flag_counts.entry(flag).or_insert(0) += 1;

        match flag {
            PriceFlag::Ok => summary.fair_items += 1,
            PriceFlag::NoData => summary.unmatched_items += 1,
            _ => summary.flagged_items += 1,
        }

        let claimed = item.quantity * item.unit_price;
        let fmv = verdict.fmv().unwrap_or(item.unit_price) * item.quantity;
        summary.claim_total += claimed;
        summary.fmv_total += fmv;
        if fmv > claimed {
            summary.underpayment_opportunity += fmv - claimed;
        }
    }

    summary.claim_total = round_to(summary.claim_total, 2);
    summary.fmv_total = round_to(summary.fmv_total, 2);
    summary.underpayment_opportunity = round_to(summary.underpayment_opportunity, 2);
    summary
}
