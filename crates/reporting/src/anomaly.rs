//! Per-campaign outlier detection on CTR and fill rate.
//!
//! Each campaign's segments form one sample per metric. A segment is flagged
//! when its value falls strictly outside the campaign's
//! `[lower_quantile, upper_quantile]` percentile band.

use campaign_core::config::AnomalyConfig;
use campaign_core::types::{KeywordReportRow, SegmentMetrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Linear-interpolation percentile of `sample` at `quantile` (0.0..=1.0).
///
/// The quantile lands at position `quantile * (n - 1)` of the sorted sample
/// and is interpolated between the two neighbouring ranks. Returns `None` for
/// an empty sample.
pub fn percentile(sample: &[f64], quantile: f64) -> Option<f64> {
    if sample.is_empty() || !quantile.is_finite() {
        return None;
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, quantile)
}

fn percentile_sorted(sorted: &[f64], quantile: f64) -> Option<f64> {
    let q = quantile.clamp(0.0, 1.0);
    if sorted.len() == 1 {
        return sorted.first().copied();
    }
    let pos = q * ((sorted.len() - 1) as f64);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let lo_v = sorted.get(lo).copied()?;
    let hi_v = sorted.get(hi).copied()?;
    let frac = pos - lo as f64;
    // Interpolate from the nearer end so the result stays within [lo_v, hi_v].
    let value = if frac >= 0.5 {
        hi_v - (hi_v - lo_v) * (1.0 - frac)
    } else {
        lo_v + (hi_v - lo_v) * frac
    };
    Some(value)
}

/// Normal range of a metric within one campaign.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBand {
    pub lower: f64,
    pub upper: f64,
}

impl PercentileBand {
    pub fn from_sample(sample: &[f64], lower_quantile: f64, upper_quantile: f64) -> Option<Self> {
        Some(Self {
            lower: percentile(sample, lower_quantile)?,
            upper: percentile(sample, upper_quantile)?,
        })
    }

    /// Strictly below the lower bound or strictly above the upper bound.
    pub fn is_outside(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignBands {
    pub campaign_id: String,
    pub segments: usize,
    pub ctr: PercentileBand,
    pub fill_rate: PercentileBand,
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    lower_quantile: f64,
    upper_quantile: f64,
    min_segments: usize,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(&AnomalyConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            lower_quantile: config.lower_quantile,
            upper_quantile: config.upper_quantile,
            min_segments: config.min_segments,
        }
    }

    /// Compute the CTR and fill-rate bands of every campaign in `metrics`.
    pub fn campaign_bands(&self, metrics: &[SegmentMetrics]) -> BTreeMap<String, CampaignBands> {
        let mut samples: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for m in metrics {
            let (ctr, fill_rate) = samples.entry(m.segment.campaign_id.as_str()).or_default();
            ctr.push(m.ctr);
            fill_rate.push(m.fill_rate);
        }

        samples
            .into_iter()
            .filter_map(|(campaign_id, (ctr, fill_rate))| {
                let bands = CampaignBands {
                    campaign_id: campaign_id.to_string(),
                    segments: ctr.len(),
                    ctr: PercentileBand::from_sample(
                        &ctr,
                        self.lower_quantile,
                        self.upper_quantile,
                    )?,
                    fill_rate: PercentileBand::from_sample(
                        &fill_rate,
                        self.lower_quantile,
                        self.upper_quantile,
                    )?,
                };
                Some((campaign_id.to_string(), bands))
            })
            .collect()
    }

    /// Flag every segment against its own campaign's bands. The full set of a
    /// campaign's segments must be present in `metrics`.
    pub fn detect(&self, metrics: Vec<SegmentMetrics>) -> Vec<KeywordReportRow> {
        let bands = self.campaign_bands(&metrics);
        for b in bands.values() {
            debug!(
                campaign_id = %b.campaign_id,
                segments = b.segments,
                ctr_lower = b.ctr.lower,
                ctr_upper = b.ctr.upper,
                fill_rate_lower = b.fill_rate.lower,
                fill_rate_upper = b.fill_rate.upper,
                "Campaign percentile bands"
            );
        }

        let rows: Vec<KeywordReportRow> = metrics
            .into_iter()
            .map(|m| {
                let (is_ctr_anomaly, is_fillrate_anomaly) =
                    match bands.get(m.segment.campaign_id.as_str()) {
                        Some(b) if b.segments >= self.min_segments => {
                            (b.ctr.is_outside(m.ctr), b.fill_rate.is_outside(m.fill_rate))
                        }
                        _ => (false, false),
                    };
                KeywordReportRow {
                    metrics: m,
                    is_ctr_anomaly,
                    is_fillrate_anomaly,
                }
            })
            .collect();

        info!(
            campaigns = bands.len(),
            ctr_anomalies = rows.iter().filter(|r| r.is_ctr_anomaly).count(),
            fillrate_anomalies = rows.iter().filter(|r| r.is_fillrate_anomaly).count(),
            "Anomaly detection complete"
        );
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::types::SegmentKey;

    fn metrics(campaign: &str, keyword: &str, ctr: f64, fill_rate: f64) -> SegmentMetrics {
        SegmentMetrics {
            segment: SegmentKey::new(campaign, keyword, "US", "mobile"),
            total_impressions: 100,
            filled_impressions: 50,
            total_clicks: 5,
            total_cost: 5.0,
            total_revenue: 10.0,
            gross_profit: 5.0,
            profit_margin_pct: 100.0,
            ctr,
            fill_rate,
        }
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let sample = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sample, 0.5).unwrap() - 2.5).abs() < 1e-12);
        assert!((percentile(&sample, 0.05).unwrap() - 1.15).abs() < 1e-12);
        assert!((percentile(&sample, 0.95).unwrap() - 3.85).abs() < 1e-12);
        assert_eq!(percentile(&sample, 0.0), Some(1.0));
        assert_eq!(percentile(&sample, 1.0), Some(4.0));
    }

    #[test]
    fn test_percentile_ignores_input_order() {
        let sample = [4.0, 1.0, 3.0, 2.0];
        assert!((percentile(&sample, 0.25).unwrap() - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_edge_samples() {
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[0.3], 0.05), Some(0.3));
        assert_eq!(percentile(&[0.3], 0.95), Some(0.3));
        assert_eq!(percentile(&[1.0, 2.0], f64::NAN), None);
    }

    #[test]
    fn test_percentile_of_ties_is_exact() {
        let sample = [0.1; 7];
        assert_eq!(percentile(&sample, 0.05), Some(0.1));
        assert_eq!(percentile(&sample, 0.95), Some(0.1));
    }

    #[test]
    fn test_band_matches_percentile() {
        let sample = [0.4, 0.1, 0.3, 0.2];
        let band = PercentileBand::from_sample(&sample, 0.05, 0.95).unwrap();
        assert_eq!(Some(band.lower), percentile(&sample, 0.05));
        assert_eq!(Some(band.upper), percentile(&sample, 0.95));
        assert!(PercentileBand::from_sample(&[], 0.05, 0.95).is_none());
    }

    #[test]
    fn test_single_segment_campaign_is_never_flagged() {
        let rows = AnomalyDetector::default().detect(vec![metrics("1", "A", 0.9, 0.01)]);
        assert!(!rows[0].is_ctr_anomaly);
        assert!(!rows[0].is_fillrate_anomaly);
    }

    #[test]
    fn test_identical_segments_are_not_flagged() {
        let rows = AnomalyDetector::default().detect(
            (0..10)
                .map(|k| metrics("1", &format!("k{k}"), 0.05, 0.8))
                .collect(),
        );
        assert!(rows.iter().all(|r| !r.is_ctr_anomaly && !r.is_fillrate_anomaly));
    }

    #[test]
    fn test_extremes_are_flagged() {
        // 21 segments: p5 and p95 fall exactly on ranks 1 and 19.
        let mut input: Vec<_> = (0..21)
            .map(|k| metrics("1", &format!("k{k:02}"), 0.05, 0.5))
            .collect();
        input[0].ctr = 0.0;
        input[20].ctr = 0.9;
        input[7].fill_rate = 0.99;

        let rows = AnomalyDetector::default().detect(input);
        let ctr_flagged: Vec<_> = rows
            .iter()
            .filter(|r| r.is_ctr_anomaly)
            .map(|r| r.metrics.segment.keyword_id.as_str())
            .collect();
        let fill_flagged: Vec<_> = rows
            .iter()
            .filter(|r| r.is_fillrate_anomaly)
            .map(|r| r.metrics.segment.keyword_id.as_str())
            .collect();

        assert_eq!(ctr_flagged, vec!["k00", "k20"]);
        assert_eq!(fill_flagged, vec!["k07"]);
    }

    #[test]
    fn test_two_distinct_segments_are_both_flagged() {
        let rows = AnomalyDetector::default()
            .detect(vec![metrics("1", "A", 0.1, 0.5), metrics("1", "B", 0.2, 0.5)]);
        assert!(rows.iter().all(|r| r.is_ctr_anomaly));
        assert!(rows.iter().all(|r| !r.is_fillrate_anomaly));
    }

    #[test]
    fn test_bands_are_computed_per_campaign() {
        let input = vec![
            metrics("1", "A", 0.1, 0.5),
            metrics("1", "B", 0.1, 0.5),
            metrics("2", "A", 0.9, 0.5),
        ];
        let bands = AnomalyDetector::default().campaign_bands(&input);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands["1"].segments, 2);
        assert_eq!(bands["2"].ctr.lower, 0.9);
        assert_eq!(bands["2"].ctr.upper, 0.9);

        // Campaign 2's high CTR is not measured against campaign 1.
        let rows = AnomalyDetector::default().detect(input);
        assert!(rows.iter().all(|r| !r.is_ctr_anomaly));
    }

    #[test]
    fn test_min_segments_guard_suppresses_small_campaigns() {
        let config = AnomalyConfig {
            min_segments: 3,
            ..AnomalyConfig::default()
        };
        let rows = AnomalyDetector::new(&config)
            .detect(vec![metrics("1", "A", 0.1, 0.2), metrics("1", "B", 0.9, 0.8)]);
        assert!(rows.iter().all(|r| !r.is_ctr_anomaly && !r.is_fillrate_anomaly));
    }

    #[test]
    fn test_detect_preserves_rows_and_order() {
        let input = vec![metrics("1", "A", 0.1, 0.2), metrics("1", "B", 0.3, 0.4)];
        let rows = AnomalyDetector::default().detect(input.clone());
        let kept: Vec<_> = rows.into_iter().map(|r| r.metrics).collect();
        assert_eq!(kept, input);
    }
}
