use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 价格判定标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriceFlag {
    #[serde(rename = "Below market minimum")]
    BelowMinimum,
    #[serde(rename = "Above market maximum")]
    AboveMaximum,
    #[serde(rename = "Significantly below average")]
    SignificantlyBelowAverage,
    #[serde(rename = "Significantly above average")]
    SignificantlyAboveAverage,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "No data available")]
    NoData,
}

impl PriceFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceFlag::BelowMinimum => "Below market minimum",
            PriceFlag::AboveMaximum => "Above market maximum",
            PriceFlag::SignificantlyBelowAverage => "Significantly below average",
            PriceFlag::SignificantlyAboveAverage => "Significantly above average",
            PriceFlag::Ok => "OK",
            PriceFlag::NoData => "No data available",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PriceFlag::BelowMinimum => Severity::Error,
            PriceFlag::AboveMaximum => Severity::Warning,
            PriceFlag::SignificantlyBelowAverage => Severity::Warning,
            PriceFlag::SignificantlyAboveAverage => Severity::Info,
            PriceFlag::Ok => Severity::Success,
            PriceFlag::NoData => Severity::Info,
        }
    }
}

impl fmt::Display for PriceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Info => "info",
        }
    }
}

/// 命中价格库的判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedVerdict {
    pub item: String,
    pub matched_item: String,
    pub user_price: f64,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub unit: String,
    pub category: String,
    pub flag: PriceFlag,
    pub severity: Severity,
    pub percent_from_avg: f64,
    pub sample_size: usize,
}

/// 未命中价格库的判定 (固定为 No data available / info)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedVerdict {
    pub item: String,
    pub user_price: f64,
    pub flag: PriceFlag,
    pub severity: Severity,
}

/// 单条明细的审计结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum AuditVerdict {
    Matched(MatchedVerdict),
    Unmatched(UnmatchedVerdict),
}

impl AuditVerdict {
    pub fn unmatched(item: impl Into<String>, user_price: f64) -> Self {
        AuditVerdict::Unmatched(UnmatchedVerdict {
            item: item.into(),
            user_price,
            flag: PriceFlag::NoData,
            severity: PriceFlag::NoData.severity(),
        })
    }

    pub fn item(&self) -> &str {
        match self {
            AuditVerdict::Matched(v) => &v.item,
            AuditVerdict::Unmatched(v) => &v.item,
        }
    }

    pub fn user_price(&self) -> f64 {
        match self {
            AuditVerdict::Matched(v) => v.user_price,
            AuditVerdict::Unmatched(v) => v.user_price,
        }
    }

    pub fn flag(&self) -> PriceFlag {
        match self {
            AuditVerdict::Matched(v) => v.flag,
            AuditVerdict::Unmatched(v) => v.flag,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AuditVerdict::Matched(v) => v.severity,
            AuditVerdict::Unmatched(v) => v.severity,
        }
    }

    pub fn matched_item(&self) -> Option<&str> {
        match self {
            AuditVerdict::Matched(v) => Some(&v.matched_item),
            AuditVerdict::Unmatched(_) => None,
        }
    }

    /// 公允市价 (价格库均价)，未命中时为 None
    pub fn fmv(&self) -> Option<f64> {
        match self {
            AuditVerdict::Matched(v) => Some(v.avg),
            AuditVerdict::Unmatched(_) => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, AuditVerdict::Matched(_))
    }

    /// 以另一条明细名重新绑定 (缓存键忽略大小写，返回时需还原调用方原始名称)
    pub fn with_item_name(mut self, name: &str) -> Self {
        match &mut self {
            AuditVerdict::Matched(v) => v.item = name.to_string(),
            AuditVerdict::Unmatched(v) => v.item = name.to_string(),
        }
        self
    }
}

/// 批次汇总
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_items: usize,
    pub flag_counts: BTreeMap<PriceFlag, usize>,
    /// Σ 数量 × 申报单价
    pub claim_total: f64,
    /// Σ 数量 × 公允市价 (未命中时取申报单价)
    pub fmv_total: f64,
    /// Σ max(0, (公允市价 - 申报单价) × 数量)
    pub underpayment_opportunity: f64,
    pub flagged_items: usize,
    pub fair_items: usize,
    pub unmatched_items: usize,
}

impl AuditSummary {
    /// 公允市价与申报金额之差
    pub fn fmv_delta(&self) -> f64 {
        round_to(self.fmv_total - self.claim_total, 2)
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
