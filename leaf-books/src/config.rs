//! Configuration for the book lookup client.

use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";

/// The volumes endpoint refuses page sizes above this.
const MAX_PAGE_SIZE: u32 = 40;

#[derive(Debug, Clone)]
pub struct BooksConfig {
    /// API root, without the trailing `/volumes`
    pub base_url: String,

    /// Sent as the `key` query parameter when set
    pub api_key: Option<String>,

    /// Results requested per lookup, between 1 and 40
    pub max_results: u32,

    /// Timeout for a single HTTP attempt
    pub timeout: Duration,
}

impl Default for BooksConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            max_results: 20,
            timeout: Duration::from_secs(10),
        }
    }
}

impl BooksConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create config from `LEAFNODE_BOOKS_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("LEAFNODE_BOOKS_URL").filter(|url| !url.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(key) = lookup("LEAFNODE_BOOKS_API_KEY").filter(|key| !key.trim().is_empty()) {
            config.api_key = Some(key.trim().to_string());
        }
        if let Some(n) = parse(&lookup, "LEAFNODE_BOOKS_MAX_RESULTS") {
            config = config.with_max_results(n);
        }
        if let Some(ms) = parse(&lookup, "LEAFNODE_BOOKS_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(ms);
        }

        config
    }

    pub(crate) fn volumes_url(&self) -> String {
        format!("{}/volumes", self.base_url.trim_end_matches('/'))
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    raw.trim()
        .parse()
        .inspect_err(|e| tracing::warn!(key, value = %raw, error = %e, "ignoring invalid books setting"))
        .ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = BooksConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.max_results, 20);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(
            config.volumes_url(),
            "https://www.googleapis.com/books/v1/volumes"
        );
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LEAFNODE_BOOKS_URL", "http://localhost:8080/books/"),
            ("LEAFNODE_BOOKS_API_KEY", "secret"),
            ("LEAFNODE_BOOKS_MAX_RESULTS", "500"),
            ("LEAFNODE_BOOKS_TIMEOUT_MS", "2500"),
        ]);
        let config = BooksConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.volumes_url(), "http://localhost:8080/books/volumes");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.max_results, 40);
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn blank_and_invalid_values_keep_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LEAFNODE_BOOKS_URL", "  "),
            ("LEAFNODE_BOOKS_API_KEY", ""),
            ("LEAFNODE_BOOKS_MAX_RESULTS", "lots"),
        ]);
        let config = BooksConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.max_results, 20);
    }
}
