//! Input loading and blacklist filtering.
//!
//! Every table's schema is checked before any row is decoded, so a missing
//! column is reported ahead of parse or emptiness problems elsewhere.

use campaign_core::config::InputConfig;
use campaign_core::types::{Click, Impression, Revenue, Row, SegmentKey, Table};
use campaign_core::{CampaignError, CampaignResult};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::tabular::parse_csv;

pub const IMPRESSIONS_TABLE: &str = "impressions_log";
pub const CLICKS_TABLE: &str = "click_log";
pub const REVENUE_TABLE: &str = "revenue_log";
pub const BLACKLIST_TABLE: &str = "keyword_blacklist";

const IMPRESSION_COLUMNS: [&str; 6] = [
    "request_id",
    "campaign_id",
    "keyword_id",
    "country",
    "device",
    "is_filled",
];
const CLICK_COLUMNS: [&str; 6] = [
    "click_id",
    "campaign_id",
    "keyword_id",
    "country",
    "device",
    "cpc",
];
const REVENUE_COLUMNS: [&str; 2] = ["click_id", "revenue"];
const BLACKLIST_COLUMNS: [&str; 1] = ["keyword_id"];

/// Rows carrying a segment key, and therefore a keyword that can be blacklisted.
pub trait Segmented {
    fn segment(&self) -> &SegmentKey;
}

impl Segmented for Impression {
    fn segment(&self) -> &SegmentKey {
        &self.segment
    }
}

impl Segmented for Click {
    fn segment(&self) -> &SegmentKey {
        &self.segment
    }
}

/// Decoded input tables, before blacklist filtering.
#[derive(Debug, Clone)]
pub struct RawInputs {
    pub impressions: Vec<Impression>,
    pub clicks: Vec<Click>,
    pub revenue: Vec<Revenue>,
    pub blacklist: HashSet<String>,
}

/// Impressions and clicks with blacklisted keywords removed. Revenue is
/// carried through untouched; the click join drops orphaned rows later.
#[derive(Debug, Clone)]
pub struct FilteredInputs {
    pub impressions: Vec<Impression>,
    pub clicks: Vec<Click>,
    pub revenue: Vec<Revenue>,
    pub impressions_removed: usize,
    pub clicks_removed: usize,
}

impl RawInputs {
    /// Read and decode the four input files named in the config.
    pub fn load(config: &InputConfig) -> CampaignResult<Self> {
        let impressions = read_table(&config.impressions_path, IMPRESSIONS_TABLE)?;
        let clicks = read_table(&config.clicks_path, CLICKS_TABLE)?;
        let revenue = read_table(&config.revenue_path, REVENUE_TABLE)?;
        let blacklist = read_table(&config.blacklist_path, BLACKLIST_TABLE)?;
        Self::from_tables(&impressions, &clicks, &revenue, &blacklist)
    }

    pub fn from_tables(
        impressions: &Table,
        clicks: &Table,
        revenue: &Table,
        blacklist: &Table,
    ) -> CampaignResult<Self> {
        let imp_cols = require_columns(impressions, &IMPRESSION_COLUMNS)?;
        let click_cols = require_columns(clicks, &CLICK_COLUMNS)?;
        let rev_cols = require_columns(revenue, &REVENUE_COLUMNS)?;
        let bl_cols = require_columns(blacklist, &BLACKLIST_COLUMNS)?;

        for table in [impressions, clicks, revenue] {
            if table.is_empty() {
                return Err(CampaignError::EmptyInput(table.name.clone()));
            }
        }

        let inputs = Self {
            impressions: decode_impressions(impressions, &imp_cols)?,
            clicks: decode_clicks(clicks, &click_cols)?,
            revenue: decode_revenue(revenue, &rev_cols)?,
            blacklist: decode_blacklist(blacklist, &bl_cols)?,
        };

        info!(
            impressions = inputs.impressions.len(),
            clicks = inputs.clicks.len(),
            revenue = inputs.revenue.len(),
            blacklisted_keywords = inputs.blacklist.len(),
            "Input tables loaded"
        );
        Ok(inputs)
    }

    /// Drop every impression and click whose keyword is blacklisted.
    pub fn apply_blacklist(self) -> FilteredInputs {
        let imp_before = self.impressions.len();
        let click_before = self.clicks.len();

        let impressions = filter_blacklisted(self.impressions, &self.blacklist);
        let clicks = filter_blacklisted(self.clicks, &self.blacklist);

        let filtered = FilteredInputs {
            impressions_removed: imp_before - impressions.len(),
            clicks_removed: click_before - clicks.len(),
            impressions,
            clicks,
            revenue: self.revenue,
        };
        debug!(
            table = IMPRESSIONS_TABLE,
            removed = filtered.impressions_removed,
            "Blacklist applied"
        );
        debug!(
            table = CLICKS_TABLE,
            removed = filtered.clicks_removed,
            "Blacklist applied"
        );
        filtered
    }
}

pub fn filter_blacklisted<T: Segmented>(rows: Vec<T>, blacklist: &HashSet<String>) -> Vec<T> {
    if blacklist.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| !blacklist.contains(&row.segment().keyword_id))
        .collect()
}

pub fn read_table(path: &Path, name: &str) -> CampaignResult<Table> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CampaignError::Io(std::io::Error::new(
            e.kind(),
            format!("{} ({}): {e}", name, path.display()),
        ))
    })?;
    parse_csv(name, &text)
}

fn require_columns(table: &Table, columns: &[&str]) -> CampaignResult<Vec<usize>> {
    columns
        .iter()
        .map(|column| {
            table
                .column_index(column)
                .ok_or_else(|| CampaignError::schema(&table.name, column))
        })
        .collect()
}

/// Positional view of one row through a resolved column list.
struct Cells<'a> {
    table: &'a Table,
    row: &'a Row,
    columns: &'a [usize],
}

impl<'a> Cells<'a> {
    fn get(&self, i: usize) -> CampaignResult<&'a str> {
        let idx = self.columns[i];
        self.row
            .cells
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| self.error(i, "missing field".to_string()))
    }

    fn error(&self, i: usize, message: String) -> CampaignError {
        CampaignError::Parse {
            table: self.table.name.clone(),
            line: self.row.line,
            column: self.table.headers[self.columns[i]].clone(),
            message,
        }
    }

    /// Segment key from four consecutive column slots starting at `first`.
    fn segment(&self, first: usize) -> CampaignResult<SegmentKey> {
        Ok(SegmentKey::new(
            self.get(first)?,
            self.get(first + 1)?,
            self.get(first + 2)?,
            self.get(first + 3)?,
        ))
    }

    fn flag(&self, i: usize) -> CampaignResult<bool> {
        let raw = self.get(i)?.trim();
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(self.error(i, format!("expected 0 or 1, got `{raw}`"))),
        }
    }

    fn amount(&self, i: usize) -> CampaignResult<f64> {
        let raw = self.get(i)?.trim();
        let value: f64 = raw
            .parse()
            .map_err(|_| self.error(i, format!("expected a number, got `{raw}`")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(self.error(
                i,
                format!("expected a non-negative amount, got `{raw}`"),
            ));
        }
        Ok(value)
    }
}

fn rows<'a>(table: &'a Table, columns: &'a [usize]) -> impl Iterator<Item = Cells<'a>> {
    table.rows.iter().map(move |row| Cells {
        table,
        row,
        columns,
    })
}

fn decode_impressions(table: &Table, columns: &[usize]) -> CampaignResult<Vec<Impression>> {
    rows(table, columns)
        .map(|cells| -> CampaignResult<Impression> {
            Ok(Impression {
                request_id: cells.get(0)?.to_string(),
                segment: cells.segment(1)?,
                is_filled: cells.flag(5)?,
            })
        })
        .collect()
}

fn decode_clicks(table: &Table, columns: &[usize]) -> CampaignResult<Vec<Click>> {
    rows(table, columns)
        .map(|cells| -> CampaignResult<Click> {
            Ok(Click {
                click_id: cells.get(0)?.to_string(),
                segment: cells.segment(1)?,
                cpc: cells.amount(5)?,
            })
        })
        .collect()
}

fn decode_revenue(table: &Table, columns: &[usize]) -> CampaignResult<Vec<Revenue>> {
    rows(table, columns)
        .map(|cells| -> CampaignResult<Revenue> {
            Ok(Revenue {
                click_id: cells.get(0)?.to_string(),
                revenue: cells.amount(1)?,
            })
        })
        .collect()
}

fn decode_blacklist(table: &Table, columns: &[usize]) -> CampaignResult<HashSet<String>> {
    rows(table, columns)
        .map(|cells| -> CampaignResult<String> { Ok(cells.get(0)?.to_string()) })
        .collect()
}
