//! The engine boundary's error type: every public `Store`/`Transaction`
//! method returns this, wrapping the parser's, evaluator's and this
//! crate's own I/O failures behind one enum so a caller matches one type
//! regardless of which subsystem raised it.

use spareval::EngineError;
use spargebra::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Query(#[from] EngineError),

    #[error("updates are disabled on this store (StoreConfig::allow_updates is false)")]
    UpdatesDisabled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_disabled_has_a_stable_message() {
        assert_eq!(
            Error::UpdatesDisabled.to_string(),
            "updates are disabled on this store (StoreConfig::allow_updates is false)"
        );
    }

    #[test]
    fn io_error_wraps_the_source_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let wrapped: Error = io_err.into();
        assert!(wrapped.to_string().contains("missing"));
    }
}
