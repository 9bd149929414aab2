//! Segment-level metrics aggregation: group impressions and clicks by segment
//! key, join revenue through click ids, and derive ratio metrics.

use campaign_core::types::{Click, Impression, Revenue, SegmentKey, SegmentMetrics};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImpressionTotals {
    pub total_impressions: u64,
    pub filled_impressions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClickTotals {
    pub total_clicks: u64,
    pub total_cost: f64,
}

/// `numerator / denominator`, or 0 when the denominator is not positive.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Gross profit as a percentage of cost. Zero cost means zero margin.
pub fn profit_margin_pct(gross_profit: f64, total_cost: f64) -> f64 {
    safe_ratio(gross_profit, total_cost) * 100.0
}

pub fn group_impressions(impressions: &[Impression]) -> BTreeMap<SegmentKey, ImpressionTotals> {
    let mut groups: BTreeMap<SegmentKey, ImpressionTotals> = BTreeMap::new();
    for imp in impressions {
        let totals = groups.entry(imp.segment.clone()).or_default();
        totals.total_impressions += 1;
        if imp.is_filled {
            totals.filled_impressions += 1;
        }
    }
    groups
}

pub fn group_clicks(clicks: &[Click]) -> BTreeMap<SegmentKey, ClickTotals> {
    let mut groups: BTreeMap<SegmentKey, ClickTotals> = BTreeMap::new();
    for click in clicks {
        let totals = groups.entry(click.segment.clone()).or_default();
        totals.total_clicks += 1;
        totals.total_cost += click.cpc;
    }
    groups
}

/// Left join of clicks onto revenue by click id, summed per segment.
///
/// Every click contributes to its segment, with 0 when it has no revenue row.
/// Revenue rows that match no click are ignored.
pub fn group_revenue(clicks: &[Click], revenue: &[Revenue]) -> BTreeMap<SegmentKey, f64> {
    let mut by_click: HashMap<&str, f64> = HashMap::with_capacity(revenue.len());
    for row in revenue {
        *by_click.entry(row.click_id.as_str()).or_insert(0.0) += row.revenue;
    }

    let mut groups: BTreeMap<SegmentKey, f64> = BTreeMap::new();
    for click in clicks {
        let amount = by_click.get(click.click_id.as_str()).copied().unwrap_or(0.0);
        *groups.entry(click.segment.clone()).or_insert(0.0) += amount;
    }
    groups
}

fn derive(
    segment: SegmentKey,
    impressions: ImpressionTotals,
    clicks: ClickTotals,
    total_revenue: f64,
) -> SegmentMetrics {
    let gross_profit = total_revenue - clicks.total_cost;
    SegmentMetrics {
        segment,
        total_impressions: impressions.total_impressions,
        filled_impressions: impressions.filled_impressions,
        total_clicks: clicks.total_clicks,
        total_cost: clicks.total_cost,
        total_revenue,
        gross_profit,
        profit_margin_pct: profit_margin_pct(gross_profit, clicks.total_cost),
        ctr: safe_ratio(
            clicks.total_clicks as f64,
            impressions.filled_impressions as f64,
        ),
        fill_rate: safe_ratio(
            impressions.filled_impressions as f64,
            impressions.total_impressions as f64,
        ),
    }
}

/// Build one metrics row per segment seen in impressions or clicks, in
/// ascending segment-key order. Counts missing on either side default to 0.
pub fn aggregate(
    impressions: &[Impression],
    clicks: &[Click],
    revenue: &[Revenue],
) -> Vec<SegmentMetrics> {
    let imp_groups = group_impressions(impressions);
    let click_groups = group_clicks(clicks);
    let rev_groups = group_revenue(clicks, revenue);

    let keys: BTreeSet<&SegmentKey> = imp_groups.keys().chain(click_groups.keys()).collect();

    let metrics: Vec<SegmentMetrics> = keys
        .into_iter()
        .map(|key| {
            derive(
                key.clone(),
                imp_groups.get(key).copied().unwrap_or_default(),
                click_groups.get(key).copied().unwrap_or_default(),
                rev_groups.get(key).copied().unwrap_or(0.0),
            )
        })
        .collect();

    info!(
        segments = metrics.len(),
        impression_segments = imp_groups.len(),
        click_segments = click_groups.len(),
        "Segment metrics aggregated"
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(campaign: &str, keyword: &str) -> SegmentKey {
        SegmentKey::new(campaign, keyword, "US", "mobile")
    }

    fn impression(n: usize, segment: &SegmentKey, filled: bool) -> Impression {
        Impression {
            request_id: format!("r{n}"),
            segment: segment.clone(),
            is_filled: filled,
        }
    }

    fn click(id: &str, segment: &SegmentKey, cpc: f64) -> Click {
        Click {
            click_id: id.to_string(),
            segment: segment.clone(),
            cpc,
        }
    }

    fn revenue(id: &str, amount: f64) -> Revenue {
        Revenue {
            click_id: id.to_string(),
            revenue: amount,
        }
    }

    #[test]
    fn test_single_segment_example() {
        let s = seg("1", "A");
        let impressions: Vec<_> = (0..100).map(|n| impression(n, &s, true)).collect();
        let clicks: Vec<_> = (0..5).map(|n| click(&format!("c{n}"), &s, 1.0)).collect();
        let revenues: Vec<_> = (0..5).map(|n| revenue(&format!("c{n}"), 2.0)).collect();

        let rows = aggregate(&impressions, &clicks, &revenues);
        assert_eq!(rows.len(), 1);
        let m = &rows[0];
        assert_eq!(m.total_impressions, 100);
        assert_eq!(m.filled_impressions, 100);
        assert_eq!(m.total_clicks, 5);
        assert!((m.total_cost - 5.0).abs() < 1e-9);
        assert!((m.total_revenue - 10.0).abs() < 1e-9);
        assert!((m.gross_profit - 5.0).abs() < 1e-9);
        assert!((m.profit_margin_pct - 100.0).abs() < 1e-9);
        assert!((m.ctr - 0.05).abs() < 1e-9);
        assert!((m.fill_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_filled_impressions_sum_flag() {
        let s = seg("1", "A");
        let impressions: Vec<_> = (0..100).map(|n| impression(n, &s, n < 5)).collect();
        let rows = aggregate(&impressions, &[], &[]);
        assert_eq!(rows[0].total_impressions, 100);
        assert_eq!(rows[0].filled_impressions, 5);
        assert!((rows[0].fill_rate - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_click_without_revenue_counts_as_zero() {
        let s = seg("1", "A");
        let clicks = vec![click("c1", &s, 1.0), click("c2", &s, 1.0)];
        let rows = aggregate(&[impression(0, &s, true)], &clicks, &[revenue("c1", 3.0)]);

        assert_eq!(rows[0].total_clicks, 2);
        assert!((rows[0].total_revenue - 3.0).abs() < 1e-9);
        assert!((rows[0].gross_profit - 1.0).abs() < 1e-9);
        assert!((rows[0].profit_margin_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_orphan_revenue_is_ignored() {
        let s = seg("1", "A");
        let rows = aggregate(
            &[impression(0, &s, true)],
            &[click("c1", &s, 1.0)],
            &[revenue("c1", 2.0), revenue("blacklisted-click", 99.0)],
        );
        assert!((rows[0].total_revenue - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_revenue_rows_are_summed() {
        let s = seg("1", "A");
        let rows = group_revenue(
            &[click("c1", &s, 1.0)],
            &[revenue("c1", 2.0), revenue("c1", 0.5)],
        );
        assert!((rows[&s] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_impression_only_segment_defaults_to_zero() {
        let s = seg("1", "A");
        let rows = aggregate(&[impression(0, &s, false)], &[], &[]);
        let m = &rows[0];
        assert_eq!(m.total_clicks, 0);
        assert_eq!(m.total_cost, 0.0);
        assert_eq!(m.total_revenue, 0.0);
        assert_eq!(m.gross_profit, 0.0);
        assert_eq!(m.profit_margin_pct, 0.0);
        assert_eq!(m.ctr, 0.0);
        assert_eq!(m.fill_rate, 0.0);
    }

    #[test]
    fn test_click_only_segment_is_kept() {
        let a = seg("1", "A");
        let b = seg("1", "B");
        let rows = aggregate(
            &[impression(0, &a, true)],
            &[click("c1", &b, 0.4)],
            &[revenue("c1", 1.0)],
        );
        assert_eq!(rows.len(), 2);
        let m = rows.iter().find(|m| m.segment == b).unwrap();
        assert_eq!(m.total_impressions, 0);
        assert_eq!(m.total_clicks, 1);
        assert_eq!(m.ctr, 0.0);
        assert!((m.profit_margin_pct - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_cost_means_zero_margin() {
        let s = seg("1", "A");
        let rows = aggregate(
            &[impression(0, &s, true)],
            &[click("c1", &s, 0.0)],
            &[revenue("c1", 5.0)],
        );
        assert!((rows[0].gross_profit - 5.0).abs() < 1e-9);
        assert_eq!(rows[0].profit_margin_pct, 0.0);
    }

    #[test]
    fn test_ctr_above_one_is_not_clamped() {
        let s = seg("1", "A");
        let clicks = vec![click("c1", &s, 1.0), click("c2", &s, 1.0), click("c3", &s, 1.0)];
        let rows = aggregate(&[impression(0, &s, true)], &clicks, &[]);
        assert!((rows[0].ctr - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_row_per_segment_in_key_order() {
        let keys = [seg("2", "A"), seg("1", "B"), seg("1", "A"), seg("1", "B")];
        let impressions: Vec<_> = keys
            .iter()
            .enumerate()
            .map(|(n, k)| impression(n, k, true))
            .collect();
        let rows = aggregate(&impressions, &[], &[]);

        let got: Vec<_> = rows.iter().map(|m| m.segment.clone()).collect();
        assert_eq!(got, vec![seg("1", "A"), seg("1", "B"), seg("2", "A")]);
        assert_eq!(rows[1].total_impressions, 2);
    }

    #[test]
    fn test_segments_differ_by_country_and_device() {
        let us = SegmentKey::new("1", "A", "US", "mobile");
        let de = SegmentKey::new("1", "A", "DE", "mobile");
        let tablet = SegmentKey::new("1", "A", "US", "tablet");
        let rows = aggregate(
            &[
                impression(0, &us, true),
                impression(1, &de, true),
                impression(2, &tablet, true),
            ],
            &[],
            &[],
        );
        assert_eq!(rows.len(), 3);
    }
}
