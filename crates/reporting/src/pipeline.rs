//! End-to-end batch run: filter → aggregate → flag → summarize.

use campaign_core::types::{CampaignSummary, KeywordReportRow};
use campaign_core::{AppConfig, CampaignError, CampaignResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::anomaly::AnomalyDetector;
use crate::ingest::RawInputs;
use crate::metrics::aggregate;
use crate::summary::summarize;

pub const KEYWORD_REPORT_TABLE: &str = "campaign_keyword_report";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub campaigns: usize,
    pub segments: usize,
    pub ctr_anomalies: usize,
    pub fillrate_anomalies: usize,
    pub impressions_filtered: usize,
    pub clicks_filtered: usize,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generated reports for {} campaigns", self.campaigns)?;
        writeln!(f, "{} keyword combinations analyzed", self.segments)?;
        writeln!(f, "{} CTR anomalies detected", self.ctr_anomalies)?;
        write!(f, "{} fill rate anomalies detected", self.fillrate_anomalies)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub keyword_report: Vec<KeywordReportRow>,
    pub summary: Vec<CampaignSummary>,
    pub stats: RunStats,
}

pub struct Pipeline {
    detector: AnomalyDetector,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> CampaignResult<Self> {
        config.validate()?;
        Ok(Self {
            detector: AnomalyDetector::new(&config.anomaly),
        })
    }

    /// Run all four stages over fully loaded inputs.
    pub fn run(&self, inputs: RawInputs) -> CampaignResult<PipelineOutput> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "Computing campaign metrics");

        let filtered = inputs.apply_blacklist();
        let metrics = aggregate(&filtered.impressions, &filtered.clicks, &filtered.revenue);
        if metrics.is_empty() {
            return Err(CampaignError::EmptyInput(KEYWORD_REPORT_TABLE.to_string()));
        }

        info!(%run_id, "Detecting anomalies");
        let keyword_report = self.detector.detect(metrics);

        info!(%run_id, "Generating campaign summary");
        let summary = summarize(&keyword_report);

        let stats = RunStats {
            run_id,
            started_at,
            campaigns: summary.len(),
            segments: keyword_report.len(),
            ctr_anomalies: keyword_report.iter().filter(|r| r.is_ctr_anomaly).count(),
            fillrate_anomalies: keyword_report
                .iter()
                .filter(|r| r.is_fillrate_anomaly)
                .count(),
            impressions_filtered: filtered.impressions_removed,
            clicks_filtered: filtered.clicks_removed,
        };

        Ok(PipelineOutput {
            keyword_report,
            summary,
            stats,
        })
    }
}
