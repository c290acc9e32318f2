use thiserror::Error;

/// Errors raised while building a table or ingesting raw rows.
#[derive(Debug, Error)]
pub enum TableError {
    /// The configured date-time pattern is not a valid strftime string.
    #[error("invalid date-time pattern: {0:?}")]
    InvalidDateTimePattern(String),
    /// Raw JSON data could not be parsed as an array of rows.
    #[error("invalid row data: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
