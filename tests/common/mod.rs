#![allow(dead_code)]

use claim_audit::error::AuditError;
use claim_audit::models::{AuditVerdict, Catalog, CatalogEntry, LineItem};
use claim_audit::service::{AuditEngine, CatalogSnapshot, ItemAuditor, MatchStrategy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 测试价格库
pub fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.insert(
        "Drywall",
        CatalogEntry::from_prices("Drywall", "SF", vec![1.5, 2.0, 2.5]).unwrap(),
    );
    catalog.insert(
        "Interior door",
        CatalogEntry::from_prices("Doors", "EA", vec![180.0, 240.0, 300.0]).unwrap(),
    );
    catalog.insert(
        "Ceiling fan",
        CatalogEntry::from_prices("Electrical", "EA", vec![100.0, 150.0, 200.0]).unwrap(),
    );
    catalog.insert(
        "Asphalt shingles",
        CatalogEntry::from_prices("Roofing", "SQ", vec![250.0, 325.0, 400.0]).unwrap(),
    );
    catalog
}

pub fn engine() -> AuditEngine {
    AuditEngine::new(catalog(), MatchStrategy::FirstHit)
}

pub fn items(names: &[&str]) -> Vec<LineItem> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| LineItem::new(*name, (i + 1) as f64, 100.0 + i as f64))
        .collect()
}

/// 遇到指定品名时返回错误
pub struct FaultyAuditor {
    pub engine: AuditEngine,
    pub poison: &'static str,
}

impl ItemAuditor for FaultyAuditor {
    fn snapshot(&self) -> CatalogSnapshot {
        self.engine.snapshot()
    }

    fn audit_item(&self, snapshot: &CatalogSnapshot, item: &LineItem) -> Result<AuditVerdict, AuditError> {
        if item.name == self.poison {
            return Err(AuditError::Compute {
                item: item.name.clone(),
                reason: "forced failure".to_string(),
            });
        }
        self.engine.audit_item(snapshot, item)
    }
}

/// 遇到指定品名时 panic
pub struct PanickingAuditor {
    pub engine: AuditEngine,
    pub poison: &'static str,
}

impl ItemAuditor for PanickingAuditor {
    fn snapshot(&self) -> CatalogSnapshot {
        self.engine.snapshot()
    }

    fn audit_item(&self, snapshot: &CatalogSnapshot, item: &LineItem) -> Result<AuditVerdict, AuditError> {
        if item.name == self.poison {
            panic!("auditor crashed on {}", item.name);
        }
        self.engine.audit_item(snapshot, item)
    }
}

/// 记录同时执行的最大数量
pub struct GaugeAuditor {
    pub engine: AuditEngine,
    pub delay: Duration,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl GaugeAuditor {
    pub fn new(delay: Duration) -> Self {
        Self {
            engine: engine(),
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

impl ItemAuditor for GaugeAuditor {
    fn snapshot(&self) -> CatalogSnapshot {
        self.engine.snapshot()
    }

    fn audit_item(&self, snapshot: &CatalogSnapshot, item: &LineItem) -> Result<AuditVerdict, AuditError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.engine.audit_item(snapshot, item)
    }
}
