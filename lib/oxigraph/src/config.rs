use std::time::Duration;

/// The configuration options spec.md §6 enumerates by name. Every limit
/// defaults to unlimited/enabled so an out-of-the-box `Store` behaves like
/// one with no configuration at all; a caller opts into enforcement field
/// by field.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Hard cap on a `LOAD` body's size in bytes. `0` means unlimited.
    pub max_download_bytes: u64,
    /// Hard cap on the number of triples one `LOAD` may insert. `0` means
    /// unlimited.
    pub max_triple_count: u64,
    /// Reject a `LOAD` whose declared `Content-Length` already exceeds
    /// `max_download_bytes`, before reading a single body byte.
    pub enforce_content_length: bool,
    /// Gate on accepting `INSERT`/`DELETE`/`LOAD`/`CLEAR`/`DROP` at all;
    /// `Store::update` returns [`crate::Error::UpdatesDisabled`] when false.
    pub allow_updates: bool,
    /// Upper bound on how long a single `SERVICE` HTTP call may take.
    pub service_timeout: Duration,
    /// Number of retries the federation collaborator attempts for a
    /// `SERVICE` call before giving up (0 = one attempt, no retry).
    pub service_default_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_download_bytes: 0,
            max_triple_count: 0,
            enforce_content_length: false,
            allow_updates: true,
            service_timeout: Duration::from_secs(30),
            service_default_retries: 0,
        }
    }
}

impl StoreConfig {
    pub fn max_download_bytes(&self) -> Option<u64> {
        (self.max_download_bytes != 0).then_some(self.max_download_bytes)
    }

    pub fn max_triple_count(&self) -> Option<u64> {
        (self.max_triple_count != 0).then_some(self.max_triple_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_unlimited_and_allows_updates() {
        let config = StoreConfig::default();
        assert!(config.max_download_bytes().is_none());
        assert!(config.max_triple_count().is_none());
        assert!(config.allow_updates);
        assert!(!config.enforce_content_length);
    }

    #[test]
    fn zero_is_treated_as_unlimited_nonzero_as_a_cap() {
        let mut config = StoreConfig::default();
        config.max_download_bytes = 1024;
        assert_eq!(config.max_download_bytes(), Some(1024));
        config.max_download_bytes = 0;
        assert_eq!(config.max_download_bytes(), None);
    }
}
