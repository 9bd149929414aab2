//! Campaign keyword reporting: blacklist filtering, segment metrics
//! aggregation, percentile-band anomaly flags, and campaign roll-ups.

pub mod anomaly;
pub mod export;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod summary;
pub mod tabular;

pub use anomaly::{percentile, AnomalyDetector, CampaignBands, PercentileBand};
pub use export::{render_reports, write_all_or_nothing, RenderedFile};
pub use ingest::{FilteredInputs, RawInputs};
pub use pipeline::{Pipeline, PipelineOutput, RunStats};
pub use summary::summarize;
