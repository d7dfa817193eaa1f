//! The evaluator's error taxonomy (§7): every failure surfaced to a caller
//! of [`crate::executor::QueryEvaluator`] is one of these variants.

use spargebra::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("unknown prefix: {0}")]
    UnknownPrefix(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("SERVICE request failed: {0}")]
    Endpoint(String),

    #[error("resource limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("query execution was cancelled")]
    Cancelled,

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl EngineError {
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        Self::NotImplemented(what.into())
    }

    /// Whether a `SILENT` clause (`SERVICE`, `LOAD`) should swallow this
    /// error rather than abort the whole query.
    pub fn is_silenceable(&self) -> bool {
        matches!(self, Self::Endpoint(_) | Self::Storage(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_endpoint_and_storage_errors_are_silenceable() {
        assert!(EngineError::Endpoint("timeout".into()).is_silenceable());
        assert!(EngineError::Storage("disk full".into()).is_silenceable());
        assert!(!EngineError::Cancelled.is_silenceable());
        assert!(!EngineError::evaluation("bad cast").is_silenceable());
        assert!(!EngineError::not_implemented("SERVICE federation").is_silenceable());
    }

    #[test]
    fn display_messages_include_the_detail() {
        assert_eq!(
            EngineError::evaluation("type error").to_string(),
            "evaluation error: type error"
        );
        assert_eq!(
            EngineError::UnknownPrefix("ex".into()).to_string(),
            "unknown prefix: ex"
        );
    }
}
