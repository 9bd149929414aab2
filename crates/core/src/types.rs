use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Order two identifiers: all-digit ids compare as numbers and sort ahead of
/// other ids, which compare as text. Equal numbers fall back to text so
/// `"01"` and `"1"` stay distinct.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (numeric_digits(a), numeric_digits(b)) {
        (Some(x), Some(y)) => x
            .len()
            .cmp(&y.len())
            .then_with(|| x.cmp(y))
            .then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Significant digits of an all-digit id, or `None` if it is not one.
fn numeric_digits(id: &str) -> Option<&str> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = id.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed })
}

/// Grouping granularity of the keyword-level report. Keys order field by
/// field with [`compare_ids`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub campaign_id: String,
    pub keyword_id: String,
    pub country: String,
    pub device: String,
}

impl SegmentKey {
    pub fn new(
        campaign_id: impl Into<String>,
        keyword_id: impl Into<String>,
        country: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            keyword_id: keyword_id.into(),
            country: country.into(),
            device: device.into(),
        }
    }
}

impl Ord for SegmentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ids(&self.campaign_id, &other.campaign_id)
            .then_with(|| compare_ids(&self.keyword_id, &other.keyword_id))
            .then_with(|| compare_ids(&self.country, &other.country))
            .then_with(|| compare_ids(&self.device, &other.device))
    }
}

impl PartialOrd for SegmentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.campaign_id, self.keyword_id, self.country, self.device
        )
    }
}

/// One ad request, served or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impression {
    pub request_id: String,
    pub segment: SegmentKey,
    pub is_filled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Click {
    pub click_id: String,
    pub segment: SegmentKey,
    pub cpc: f64,
}

/// Revenue attributed to a single click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revenue {
    pub click_id: String,
    pub revenue: f64,
}

/// One data row of a raw table, with the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line: usize,
    pub cells: Vec<String>,
}

/// A raw input table: a header row plus string cells, exactly as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Build a table from bare cell rows, numbering them as if they directly
    /// followed a single header line.
    pub fn from_cells(name: impl Into<String>, headers: &[&str], cells: Vec<Vec<String>>) -> Self {
        let rows = cells
            .into_iter()
            .enumerate()
            .map(|(i, cells)| Row { line: i + 2, cells })
            .collect();
        Self::new(name, headers.iter().map(|h| h.to_string()).collect(), rows)
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Aggregated metrics for one segment, before anomaly flagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    pub segment: SegmentKey,
    pub total_impressions: u64,
    pub filled_impressions: u64,
    pub total_clicks: u64,
    pub total_cost: f64,
    pub total_revenue: f64,
    pub gross_profit: f64,
    pub profit_margin_pct: f64,
    pub ctr: f64,
    pub fill_rate: f64,
}

/// A row of the campaign keyword report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordReportRow {
    pub metrics: SegmentMetrics,
    pub is_ctr_anomaly: bool,
    pub is_fillrate_anomaly: bool,
}

impl KeywordReportRow {
    pub fn campaign_id(&self) -> &str {
        &self.metrics.segment.campaign_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub campaign_id: String,
    pub total_impressions: u64,
    pub filled_impressions: u64,
    pub total_clicks: u64,
    pub total_cost: f64,
    pub total_revenue: f64,
    pub gross_profit: f64,
    pub num_ctr_anomalies: u64,
    pub num_fillrate_anomalies: u64,
    pub profit_margin_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_key_orders_by_campaign_first() {
        let a = SegmentKey::new("1", "z", "US", "mobile");
        let b = SegmentKey::new("2", "a", "AA", "desktop");
        assert!(a < b);
        assert_eq!(a.to_string(), "1/z/US/mobile");
    }

    #[test]
    fn test_numeric_ids_order_as_numbers() {
        assert_eq!(compare_ids("2", "10"), Ordering::Less);
        assert_eq!(compare_ids("007", "10"), Ordering::Less);
        assert_eq!(compare_ids("01", "1"), Ordering::Less);
        assert_eq!(compare_ids("9", "kw"), Ordering::Less);
        assert_eq!(compare_ids("b", "a"), Ordering::Greater);
        assert_eq!(compare_ids("3", "3"), Ordering::Equal);

        let mut keys = vec![
            SegmentKey::new("10", "1", "US", "mobile"),
            SegmentKey::new("2", "20", "US", "mobile"),
            SegmentKey::new("2", "3", "US", "mobile"),
        ];
        keys.sort();
        let order: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(order, ["2/3/US/mobile", "2/20/US/mobile", "10/1/US/mobile"]);
    }

    #[test]
    fn test_table_column_lookup() {
        let table = Table::from_cells(
            "revenue_log",
            &["click_id", "revenue"],
            vec![vec!["c1".into(), "2.0".into()]],
        );
        assert_eq!(table.column_index("revenue"), Some(1));
        assert_eq!(table.column_index("cpc"), None);
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
        assert_eq!(table.rows[0].line, 2);
    }
}
