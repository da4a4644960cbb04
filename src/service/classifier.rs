use crate::models::verdict::round_to;
use crate::models::{CatalogEntry, PriceFlag, Severity};

/// 低于均价的判定阈值 (均价 × 85%)
pub const BELOW_AVERAGE_RATIO: f64 = 0.85;
/// 高于均价的判定阈值 (均价 × 115%)
pub const ABOVE_AVERAGE_RATIO: f64 = 1.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub flag: PriceFlag,
    pub severity: Severity,
    pub percent_from_avg: f64,
}

/// 按顺序判定，先命中者为准
pub fn classify(user_price: f64, entry: &CatalogEntry) -> Classification {
    let flag = if user_price < entry.min {
        PriceFlag::BelowMinimum
    } else if user_price > entry.max {
        PriceFlag::AboveMaximum
    } else if user_price < entry.avg * BELOW_AVERAGE_RATIO {
        PriceFlag::SignificantlyBelowAverage
    } else if user_price > entry.avg * ABOVE_AVERAGE_RATIO {
        PriceFlag::SignificantlyAboveAverage
    } else {
        PriceFlag::Ok
    };

    Classification {
        flag,
        severity: flag.severity(),
        percent_from_avg: percent_from_avg(user_price, entry.avg),
    }
}

/// 相对均价偏差百分比，保留一位小数；均价为 0 时返回 0
pub fn percent_from_avg(user_price: f64, avg: f64) -> f64 {
    if avg == 0.0 {
        return 0.0;
    }
    round_to((user_price - avg) / avg * 100.0, 1)
}
