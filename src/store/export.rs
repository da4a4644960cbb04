use crate::error::StoreError;
use crate::models::AuditVerdict;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const HEADER: [&str; 12] = [
    "item",
    "matched_item",
    "user_price",
    "min",
    "avg",
    "max",
    "unit",
    "category",
    "flag",
    "severity",
    "percent_from_avg",
    "sample_size",
];

fn to_record(verdict: &AuditVerdict) -> [String; 12] {
    match verdict {
        AuditVerdict::Matched(v) => [
            v.item.clone(),
            v.matched_item.clone(),
            v.user_price.to_string(),
            v.min.to_string(),
            v.avg.to_string(),
            v.max.to_string(),
            v.unit.clone(),
            v.category.clone(),
            v.flag.to_string(),
            v.severity.as_str().to_string(),
            v.percent_from_avg.to_string(),
            v.sample_size.to_string(),
        ],
        AuditVerdict::Unmatched(v) => [
            v.item.clone(),
            String::new(),
            v.user_price.to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            v.flag.to_string(),
            v.severity.as_str().to_string(),
            String::new(),
            String::new(),
        ],
    }
}

/// 导出审计结论到 CSV (含表头)
pub fn export_to_writer<W: Write>(verdicts: &[AuditVerdict], writer: W) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(HEADER)?;

    for verdict in verdicts {
        writer.write_record(&to_record(verdict))?;
    }

    writer.flush()?;
    Ok(())
}

/// 导出审计结论到 CSV 文件
pub fn export_to_csv(verdicts: &[AuditVerdict], output_path: &Path) -> Result<(), StoreError> {
    let file = File::create(output_path)?;
    export_to_writer(verdicts, file)?;
    tracing::info!("已导出 {} 条审计结论到 {}", verdicts.len(), output_path.display());
    Ok(())
}
