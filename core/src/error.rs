use crate::types::CampaignId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid config: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Unknown campaign '{label}'")]
    UnknownCampaign { label: CampaignId },

    #[error("Output column '{column}' is not produced by the simulator")]
    MissingColumn { column: String },

    #[error("Table '{table}' already holds columns [{existing}]; this run writes [{requested}]")]
    SchemaMismatch {
        table: String,
        existing: String,
        requested: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
