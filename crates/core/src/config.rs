use crate::error::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root pipeline configuration. Loaded from an optional TOML file, then from
/// environment variables with the prefix `CAMPAIGN_METRICS__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_impressions_path")]
    pub impressions_path: PathBuf,
    #[serde(default = "default_clicks_path")]
    pub clicks_path: PathBuf,
    #[serde(default = "default_revenue_path")]
    pub revenue_path: PathBuf,
    #[serde(default = "default_blacklist_path")]
    pub blacklist_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(CampaignError::Config(format!(
                "unknown output format `{other}` (expected csv or json)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_keyword_report_name")]
    pub keyword_report_name: String,
    #[serde(default = "default_summary_name")]
    pub summary_name: String,
    /// Decimal places kept for every float column.
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_lower_quantile")]
    pub lower_quantile: f64,
    #[serde(default = "default_upper_quantile")]
    pub upper_quantile: f64,
    /// Campaigns with fewer segments than this are never flagged.
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,
}

// Default functions
fn default_impressions_path() -> PathBuf {
    PathBuf::from("impressions_log.csv")
}
fn default_clicks_path() -> PathBuf {
    PathBuf::from("click_log.csv")
}
fn default_revenue_path() -> PathBuf {
    PathBuf::from("revenue_log.csv")
}
fn default_blacklist_path() -> PathBuf {
    PathBuf::from("keyword_blacklist.csv")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_keyword_report_name() -> String {
    "campaign_keyword_report".to_string()
}
fn default_summary_name() -> String {
    "campaign_summary".to_string()
}
fn default_precision() -> u32 {
    4
}
fn default_lower_quantile() -> f64 {
    0.05
}
fn default_upper_quantile() -> f64 {
    0.95
}
fn default_min_segments() -> usize {
    1
}

const MAX_PRECISION: u32 = 12;

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            impressions_path: default_impressions_path(),
            clicks_path: default_clicks_path(),
            revenue_path: default_revenue_path(),
            blacklist_path: default_blacklist_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            keyword_report_name: default_keyword_report_name(),
            summary_name: default_summary_name(),
            precision: default_precision(),
            format: OutputFormat::default(),
        }
    }
}

impl OutputConfig {
    pub fn keyword_report_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.keyword_report_name, self.format.extension()))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.summary_name, self.format.extension()))
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            lower_quantile: default_lower_quantile(),
            upper_quantile: default_upper_quantile(),
            min_segments: default_min_segments(),
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> CampaignResult<()> {
        let in_unit = |q: f64| q.is_finite() && (0.0..=1.0).contains(&q);
        if !in_unit(self.lower_quantile) || !in_unit(self.upper_quantile) {
            return Err(CampaignError::Config(format!(
                "anomaly quantiles must lie in [0, 1], got {} and {}",
                self.lower_quantile, self.upper_quantile
            )));
        }
        if self.lower_quantile > self.upper_quantile {
            return Err(CampaignError::Config(format!(
                "anomaly.lower_quantile ({}) exceeds anomaly.upper_quantile ({})",
                self.lower_quantile, self.upper_quantile
            )));
        }
        if self.min_segments == 0 {
            return Err(CampaignError::Config(
                "anomaly.min_segments must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and environment variables.
    /// Environment values take precedence over the file.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_METRICS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn validate(&self) -> CampaignResult<()> {
        if self.output.precision > MAX_PRECISION {
            return Err(CampaignError::Config(format!(
                "output.precision must be at most {MAX_PRECISION}, got {}",
                self.output.precision
            )));
        }
        self.anomaly.validate()
    }
}
