//! Campaign Metrics — batch keyword performance report with anomaly flags.
//!
//! Reads the impression, click, revenue and blacklist logs, runs the
//! reporting pipeline, and writes the keyword report and campaign summary.

use anyhow::Context;
use campaign_core::config::{AppConfig, OutputFormat};
use campaign_reporting::{render_reports, write_all_or_nothing, Pipeline, RawInputs};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "campaign-metrics")]
#[command(about = "Campaign keyword performance report with percentile-band anomaly flags")]
#[command(version)]
struct Cli {
    /// TOML config file (environment variables still take precedence)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Impressions log (overrides config)
    #[arg(long, env = "CAMPAIGN_METRICS__INPUT__IMPRESSIONS_PATH")]
    impressions: Option<PathBuf>,

    /// Click log (overrides config)
    #[arg(long, env = "CAMPAIGN_METRICS__INPUT__CLICKS_PATH")]
    clicks: Option<PathBuf>,

    /// Revenue log (overrides config)
    #[arg(long, env = "CAMPAIGN_METRICS__INPUT__REVENUE_PATH")]
    revenue: Option<PathBuf>,

    /// Keyword blacklist (overrides config)
    #[arg(long, env = "CAMPAIGN_METRICS__INPUT__BLACKLIST_PATH")]
    blacklist: Option<PathBuf>,

    /// Directory for both reports (overrides config)
    #[arg(short, long, env = "CAMPAIGN_METRICS__OUTPUT__DIR")]
    output_dir: Option<PathBuf>,

    /// Report format: csv or json (overrides config)
    #[arg(long, env = "CAMPAIGN_METRICS__OUTPUT__FORMAT")]
    format: Option<OutputFormat>,

    /// Minimum segments a campaign needs before it can be flagged
    #[arg(long, env = "CAMPAIGN_METRICS__ANOMALY__MIN_SEGMENTS")]
    min_segments: Option<usize>,

    /// Run the pipeline and print the summary without writing reports
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Print run statistics as JSON instead of text
    #[arg(long, default_value_t = false)]
    stats_json: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campaign_metrics=info,campaign_reporting=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })?;

    // Apply CLI overrides
    if let Some(path) = &cli.impressions {
        config.input.impressions_path = path.clone();
    }
    if let Some(path) = &cli.clicks {
        config.input.clicks_path = path.clone();
    }
    if let Some(path) = &cli.revenue {
        config.input.revenue_path = path.clone();
    }
    if let Some(path) = &cli.blacklist {
        config.input.blacklist_path = path.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if let Some(min) = cli.min_segments {
        config.anomaly.min_segments = min;
    }
    Ok(config)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    info!(
        impressions = %config.input.impressions_path.display(),
        clicks = %config.input.clicks_path.display(),
        revenue = %config.input.revenue_path.display(),
        blacklist = %config.input.blacklist_path.display(),
        output_dir = %config.output.dir.display(),
        min_segments = config.anomaly.min_segments,
        "Configuration loaded"
    );

    let pipeline = Pipeline::new(&config).context("Invalid configuration")?;
    let inputs = RawInputs::load(&config.input).context("Failed to load input tables")?;
    let output = pipeline.run(inputs)?;

    let files = render_reports(&output.keyword_report, &output.summary, &config.output)?;
    if cli.dry_run {
        info!("Dry run, skipping report writes");
    } else {
        write_all_or_nothing(&files).context("Failed to write reports")?;
    }

    if cli.stats_json {
        println!("{}", serde_json::to_string_pretty(&output.stats)?);
    } else {
        println!("{}", output.stats);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Campaign Metrics starting up");

    if let Err(e) = run(&cli) {
        let input_error = e
            .downcast_ref::<campaign_core::CampaignError>()
            .is_some_and(|ce| ce.is_input_error());
        error!(error = %format!("{e:#}"), input_error, "Pipeline failed");
        return Err(e);
    }
    Ok(())
}
