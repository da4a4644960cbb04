use crate::error::StoreError;
use crate::models::{Catalog, CatalogEntry};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// 价格库文件中的单个条目，min / max / avg 缺省时由 prices 推导
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    category: String,
    #[serde(default)]
    unit: String,
    prices: Vec<f64>,
    min: Option<f64>,
    max: Option<f64>,
    avg: Option<f64>,
}

/// 从 JSON 文件加载价格库 (保持文件中的键顺序)
pub fn load_catalog(path: &Path) -> Result<Catalog, StoreError> {
    let file = File::open(path)?;
    let catalog = read_catalog(BufReader::new(file))?;
    tracing::info!("价格库加载完成: {} 个条目, 来源 {}", catalog.len(), path.display());
    Ok(catalog)
}

pub fn read_catalog<R: Read>(reader: R) -> Result<Catalog, StoreError> {
    let raw: IndexMap<String, RawEntry> = serde_json::from_reader(reader)?;

    let mut catalog = Catalog::new();
    for (name, entry) in raw {
        let entry = build_entry(&name, entry)?;
        catalog.insert(name, entry);
    }
    Ok(catalog)
}

fn build_entry(name: &str, raw: RawEntry) -> Result<CatalogEntry, StoreError> {
    let Some(mut entry) = CatalogEntry::from_prices(raw.category, raw.unit, raw.prices) else {
        return Err(StoreError::InvalidEntry {
            name: name.to_string(),
            reason: "no price samples".to_string(),
        });
    };

    if let Some(min) = raw.min {
        entry.min = min;
    }
    if let Some(max) = raw.max {
        entry.max = max;
    }
    if let Some(avg) = raw.avg {
        entry.avg = avg;
    }

    if !entry.is_consistent() {
        return Err(StoreError::InvalidEntry {
            name: name.to_string(),
            reason: format!(
                "expected min <= avg <= max, got min={} avg={} max={}",
                entry.min, entry.avg, entry.max
            ),
        });
    }

    Ok(entry)
}
