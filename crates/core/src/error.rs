use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: table `{table}` is missing required column `{column}`")]
    Schema { table: String, column: String },

    #[error("Empty input: table `{0}` has no rows")]
    EmptyInput(String),

    #[error("Parse error in `{table}` line {line}, column `{column}`: {message}")]
    Parse {
        table: String,
        line: usize,
        column: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CampaignError {
    pub fn schema(table: &str, column: &str) -> Self {
        Self::Schema {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    /// True for the errors raised while validating input tables, before any
    /// computation has started.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::EmptyInput(_) | Self::Parse { .. }
        )
    }
}
