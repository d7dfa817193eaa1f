use std::fmt;

/// Failure reading a serialized SPARQL result set (JSON/XML/CSV/TSV), as
/// produced by a remote `SERVICE` endpoint or a local result file.
#[derive(Debug, thiserror::Error)]
pub enum ParseResultsError {
    #[error("malformed SPARQL results: {0}")]
    Malformed(String),
    #[error("invalid term value: {0}")]
    InvalidTerm(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ParseResultsError {
    pub(crate) fn malformed(msg: impl fmt::Display) -> Self {
        Self::Malformed(msg.to_string())
    }
}
