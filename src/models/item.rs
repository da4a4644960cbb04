use serde::{Deserialize, Serialize};

/// 理赔明细行 (调用方输入，身份仅由批次内位置决定)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
            unit: None,
            category: None,
        }
    }

    /// 申报小计 (数量 × 单价)
    pub fn subtotal(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// 保留原始批次下标的明细
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedItem {
    pub index: usize,
    pub item: LineItem,
}
