use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 价格库条目 (历史价格样本 + 统计值)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub category: String,
    pub unit: String,
    pub prices: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl CatalogEntry {
    /// 由价格样本推导 min / max / avg，样本为空时返回 None
    pub fn from_prices(category: impl Into<String>, unit: impl Into<String>, prices: Vec<f64>) -> Option<Self> {
        if prices.is_empty() {
            return None;
        }

        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = prices.iter().sum::<f64>() / prices.len() as f64;

        Some(Self {
            category: category.into(),
            unit: unit.into(),
            prices,
            min,
            max,
            avg,
        })
    }

    /// 历史样本数
    pub fn sample_size(&self) -> usize {
        self.prices.len()
    }

    /// min ≤ avg ≤ max 且样本非空
    pub fn is_consistent(&self) -> bool {
        !self.prices.is_empty() && self.min <= self.avg && self.avg <= self.max
    }
}

/// 只读价格库
///
/// 保留插入顺序：模糊匹配时多个候选以先出现者为准。
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: IndexMap<String, CatalogEntry>,
    /// 小写键 -> entries 下标 (同名大小写变体以先出现者为准)
    lowercase: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: CatalogEntry) {
        let name = name.into();
        let lower = name.to_lowercase();
        let (idx, _) = self.entries.insert_full(name, entry);
        self.lowercase.entry(lower).or_insert(idx);
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    /// 忽略大小写的精确查找 (入参需已小写)
    pub fn get_lowercase(&self, lower: &str) -> Option<(&str, &CatalogEntry)> {
        let idx = *self.lowercase.get(lower)?;
        self.entries
            .get_index(idx)
            .map(|(name, entry)| (name.as_str(), entry))
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, CatalogEntry)> for Catalog {
    fn from_iter<T: IntoIterator<Item = (String, CatalogEntry)>>(iter: T) -> Self {
        let mut catalog = Catalog::new();
        for (name, entry) in iter {
            catalog.insert(name, entry);
        }
        catalog
    }
}
