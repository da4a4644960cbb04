use crate::models::{Catalog, CatalogEntry};
use serde::{Deserialize, Serialize};

/// 模糊匹配策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// 子串命中时取价格库中先出现者
    #[default]
    FirstHit,
    /// 子串候选按长度重叠率打分，同分取先出现者
    Scored,
}

/// 匹配结果: 价格库标准名 + 条目
#[derive(Debug, Clone, Copy)]
pub struct CatalogMatch<'a> {
    pub key: &'a str,
    pub entry: &'a CatalogEntry,
}

/// 将自由文本品名映射到价格库条目
///
/// 1. 忽略大小写精确匹配
/// 2. 忽略大小写子串匹配 (键包含输入，或输入包含键)
pub fn match_item<'a>(catalog: &'a Catalog, name: &str, strategy: MatchStrategy) -> Option<CatalogMatch<'a>> {
    let needle = name.trim().to_lowercase();
    // 空串是任何键的子串
    if needle.is_empty() {
        return None;
    }

    if let Some((key, entry)) = catalog.get_lowercase(&needle) {
        return Some(CatalogMatch { key, entry });
    }

    match strategy {
        MatchStrategy::FirstHit => catalog
            .iter()
            .find(|(key, _)| is_substring_match(&key.to_lowercase(), &needle))
            .map(|(key, entry)| CatalogMatch { key, entry }),
        MatchStrategy::Scored => {
            let mut best: Option<(f64, CatalogMatch<'a>)> = None;
            for (key, entry) in catalog.iter() {
                let lower = key.to_lowercase();
                if !is_substring_match(&lower, &needle) {
                    continue;
                }
                let score = overlap_score(&lower, &needle);
                // 严格大于: 同分保留先出现者
                let is_better = best.as_ref().map_or(true, |(best_score, _)| score > *best_score);
                if is_better {
                    best = Some((score, CatalogMatch { key, entry }));
                }
            }
            best.map(|(_, m)| m)
        }
    }
}

fn is_substring_match(key: &str, needle: &str) -> bool {
    !key.is_empty() && (key.contains(needle) || needle.contains(key))
}

/// 短串长度 / 长串长度，取值 (0, 1]
fn overlap_score(key: &str, needle: &str) -> f64 {
    let (a, b) = (key.chars().count(), needle.chars().count());
    a.min(b) as f64 / a.max(b) as f64
}
