//! Report serialization. Internal field names map to display labels here and
//! only here; rounding is applied on the way out and never fed back.

use campaign_core::config::{OutputConfig, OutputFormat};
use campaign_core::types::{CampaignSummary, KeywordReportRow};
use campaign_core::CampaignResult;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::tabular::write_csv;

pub const KEYWORD_REPORT_COLUMNS: [&str; 15] = [
    "campaign_id",
    "keyword_id",
    "country",
    "device",
    "total_impressions",
    "filled_impressions",
    "total_clicks",
    "total_cost",
    "total_revenue",
    "gross_profit",
    "profit_margin_pct",
    "CTR",
    "Fill Rate",
    "is_ctr_anomaly",
    "is_fillrate_anomaly",
];

pub const SUMMARY_COLUMNS: [&str; 10] = [
    "campaign_id",
    "total_impressions",
    "filled_impressions",
    "total_clicks",
    "total_cost",
    "total_revenue",
    "gross_profit",
    "num_ctr_anomalies",
    "num_fillrate_anomalies",
    "profit_margin_pct",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Count(u64),
    Amount(f64),
    Flag(bool),
}

/// Round half away from zero to `precision` decimals, normalizing `-0.0`.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

impl Cell {
    pub fn to_csv(&self, precision: u32) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Count(n) => n.to_string(),
            Cell::Amount(v) => format!("{:?}", round_to(*v, precision)),
            Cell::Flag(b) => b.to_string(),
        }
    }

    pub fn to_json(&self, precision: u32) -> serde_json::Value {
        match self {
            Cell::Text(s) => serde_json::Value::String(s.clone()),
            Cell::Count(n) => serde_json::Value::from(*n),
            Cell::Amount(v) => serde_json::Value::from(round_to(*v, precision)),
            Cell::Flag(b) => serde_json::Value::Bool(*b),
        }
    }
}

pub fn keyword_report_cells(row: &KeywordReportRow) -> Vec<Cell> {
    let m = &row.metrics;
    vec![
        Cell::Text(m.segment.campaign_id.clone()),
        Cell::Text(m.segment.keyword_id.clone()),
        Cell::Text(m.segment.country.clone()),
        Cell::Text(m.segment.device.clone()),
        Cell::Count(m.total_impressions),
        Cell::Count(m.filled_impressions),
        Cell::Count(m.total_clicks),
        Cell::Amount(m.total_cost),
        Cell::Amount(m.total_revenue),
        Cell::Amount(m.gross_profit),
        Cell::Amount(m.profit_margin_pct),
        Cell::Amount(m.ctr),
        Cell::Amount(m.fill_rate),
        Cell::Flag(row.is_ctr_anomaly),
        Cell::Flag(row.is_fillrate_anomaly),
    ]
}

pub fn summary_cells(s: &CampaignSummary) -> Vec<Cell> {
    vec![
        Cell::Text(s.campaign_id.clone()),
        Cell::Count(s.total_impressions),
        Cell::Count(s.filled_impressions),
        Cell::Count(s.total_clicks),
        Cell::Amount(s.total_cost),
        Cell::Amount(s.total_revenue),
        Cell::Amount(s.gross_profit),
        Cell::Count(s.num_ctr_anomalies),
        Cell::Count(s.num_fillrate_anomalies),
        Cell::Amount(s.profit_margin_pct),
    ]
}

pub fn render_table(
    columns: &[&str],
    rows: &[Vec<Cell>],
    format: OutputFormat,
    precision: u32,
) -> CampaignResult<String> {
    match format {
        OutputFormat::Csv => {
            let rendered: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_csv(precision)).collect())
                .collect();
            Ok(write_csv(columns, &rendered))
        }
        OutputFormat::Json => {
            let records: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let record: serde_json::Map<String, serde_json::Value> = columns
                        .iter()
                        .zip(row)
                        .map(|(col, cell)| (col.to_string(), cell.to_json(precision)))
                        .collect();
                    serde_json::Value::Object(record)
                })
                .collect();
            let mut text = serde_json::to_string_pretty(&records)?;
            text.push('\n');
            Ok(text)
        }
    }
}

/// A fully rendered output file, not yet on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Render both reports in memory according to `output`.
pub fn render_reports(
    report: &[KeywordReportRow],
    summary: &[CampaignSummary],
    output: &OutputConfig,
) -> CampaignResult<Vec<RenderedFile>> {
    let report_rows: Vec<Vec<Cell>> = report.iter().map(keyword_report_cells).collect();
    let summary_rows: Vec<Vec<Cell>> = summary.iter().map(summary_cells).collect();

    Ok(vec![
        RenderedFile {
            path: output.keyword_report_path(),
            contents: render_table(
                &KEYWORD_REPORT_COLUMNS,
                &report_rows,
                output.format,
                output.precision,
            )?,
        },
        RenderedFile {
            path: output.summary_path(),
            contents: render_table(
                &SUMMARY_COLUMNS,
                &summary_rows,
                output.format,
                output.precision,
            )?,
        },
    ])
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn staging_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

fn backup_path(path: &Path) -> PathBuf {
    sibling_path(path, ".bak")
}

/// A report moved to its final name, with the previous file it replaced.
struct Published<'a> {
    path: &'a Path,
    backup: Option<PathBuf>,
}

/// Write every file, or none of them.
///
/// All contents go to `.tmp` siblings first; the final names only appear once
/// every staging write has succeeded. If a later rename fails, reports already
/// moved into place are removed and any files they replaced are restored.
pub fn write_all_or_nothing(files: &[RenderedFile]) -> CampaignResult<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());

    for file in files {
        if let Some(parent) = file.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                discard(&staged);
                return Err(e.into());
            }
        }
        let tmp = staging_path(&file.path);
        if let Err(e) = fs::write(&tmp, &file.contents) {
            let _ = fs::remove_file(&tmp);
            discard(&staged);
            return Err(e.into());
        }
        staged.push((tmp, &file.path));
    }

    let mut published: Vec<Published<'_>> = Vec::with_capacity(staged.len());
    for (i, (tmp, path)) in staged.iter().enumerate() {
        match publish(tmp, path) {
            Ok(backup) => published.push(Published { path: *path, backup }),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Rename failed, rolling back reports"
                );
                roll_back(&published);
                discard(&staged[i..]);
                return Err(e.into());
            }
        }
    }

    for p in &published {
        if let Some(backup) = &p.backup {
            if let Err(e) = fs::remove_file(backup) {
                warn!(path = %backup.display(), error = %e, "Failed to remove backup file");
            }
        }
        info!(path = %p.path.display(), "Report written");
    }
    Ok(())
}

/// Move `tmp` to `path`, setting aside a previous regular file at `path`.
fn publish(tmp: &Path, path: &Path) -> std::io::Result<Option<PathBuf>> {
    let backup = if path.is_file() {
        let backup = backup_path(path);
        fs::rename(path, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(tmp, path) {
        if let Some(backup) = &backup {
            restore(backup, path);
        }
        return Err(e);
    }
    Ok(backup)
}

fn roll_back(published: &[Published<'_>]) {
    for p in published.iter().rev() {
        if let Err(e) = fs::remove_file(p.path) {
            warn!(path = %p.path.display(), error = %e, "Failed to remove published report");
        }
        if let Some(backup) = &p.backup {
            restore(backup, p.path);
        }
    }
}

fn restore(backup: &Path, path: &Path) {
    if let Err(e) = fs::rename(backup, path) {
        warn!(path = %path.display(), error = %e, "Failed to restore previous report");
    }
}

fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        if let Err(e) = fs::remove_file(tmp) {
            warn!(path = %tmp.display(), error = %e, "Failed to remove staging file");
        }
    }
}
