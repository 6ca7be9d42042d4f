use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not decode upstream response: {0}")]
    Decode(String),

    #[error("Table not found in data source: {0}")]
    UnknownTable(String),

    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown aggregation {id} for table {table}")]
    UnknownAggregation { table: String, id: String },

    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Full scan exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl EngineError {
    /// True when the failure came from the upstream store rather than the request.
    pub fn is_upstream(&self) -> bool {
        matches!(self, EngineError::Source(_) | EngineError::DeadlineExceeded(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
