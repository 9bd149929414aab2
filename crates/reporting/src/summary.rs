//! Campaign-level roll-up of the flagged keyword report.

use campaign_core::types::{compare_ids, CampaignSummary, KeywordReportRow};
use std::collections::BTreeMap;
use tracing::info;

use crate::metrics::profit_margin_pct;

/// Sum every segment into its campaign. Margin is recomputed from the summed
/// profit and cost rather than averaged across segments.
pub fn summarize(report: &[KeywordReportRow]) -> Vec<CampaignSummary> {
    let mut campaigns: BTreeMap<&str, CampaignSummary> = BTreeMap::new();

    for row in report {
        let m = &row.metrics;
        let s = campaigns
            .entry(row.campaign_id())
            .or_insert_with(|| CampaignSummary {
                campaign_id: row.campaign_id().to_string(),
                total_impressions: 0,
                filled_impressions: 0,
                total_clicks: 0,
                total_cost: 0.0,
                total_revenue: 0.0,
                gross_profit: 0.0,
                num_ctr_anomalies: 0,
                num_fillrate_anomalies: 0,
                profit_margin_pct: 0.0,
            });
        s.total_impressions += m.total_impressions;
        s.filled_impressions += m.filled_impressions;
        s.total_clicks += m.total_clicks;
        s.total_cost += m.total_cost;
        s.total_revenue += m.total_revenue;
        s.gross_profit += m.gross_profit;
        s.num_ctr_anomalies += u64::from(row.is_ctr_anomaly);
        s.num_fillrate_anomalies += u64::from(row.is_fillrate_anomaly);
    }

    let mut summary: Vec<CampaignSummary> = campaigns
        .into_values()
        .map(|mut s| {
            s.profit_margin_pct = profit_margin_pct(s.gross_profit, s.total_cost);
            s
        })
        .collect();
    summary.sort_by(|a, b| compare_ids(&a.campaign_id, &b.campaign_id));

    info!(campaigns = summary.len(), "Campaign summary generated");
    summary
}
