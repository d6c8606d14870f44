//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default TTL for cached search results in seconds (30 minutes).
///
/// Resolved answers change slowly relative to how often users repeat a
/// query, so a generous TTL saves most repeat round-trips.
fn default_search_ttl_secs() -> u64 {
    30 * 60
}

/// Default validity window for ephemeral upload slots in seconds.
fn default_upload_ttl_secs() -> u64 {
    60
}

/// Default bound on cached search results before oldest-first eviction.
fn default_max_cache_entries() -> usize {
    50
}

fn default_search_endpoint() -> String {
    "https://ml.wellquery.app".to_string()
}

fn default_scanner_endpoint() -> String {
    "https://services.wellquery.app".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Configuration for the resolution pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base endpoint for the primary analysis API.
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,
    /// Base endpoint for the scanner API (barcode, product, image).
    #[serde(default = "default_scanner_endpoint")]
    pub scanner_endpoint: String,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// TTL for cached search results in seconds.
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,
    /// Validity window for ephemeral upload slots in seconds.
    #[serde(default = "default_upload_ttl_secs")]
    pub upload_ttl_secs: u64,
    /// Maximum number of cached search results.
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl PipelineConfig {
    /// Base default without env overrides (used internally to avoid recursion).
    fn base_default() -> Self {
        Self {
            search_endpoint: default_search_endpoint(),
            scanner_endpoint: default_scanner_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            search_ttl_secs: default_search_ttl_secs(),
            upload_ttl_secs: default_upload_ttl_secs(),
            max_cache_entries: default_max_cache_entries(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `WELLQUERY_SEARCH_ENDPOINT`: primary analysis API base URL
    /// - `WELLQUERY_SCANNER_ENDPOINT`: scanner API base URL
    /// - `WELLQUERY_REQUEST_TIMEOUT_SECS`: per-request HTTP timeout
    /// - `WELLQUERY_SEARCH_TTL_SECS`: cached result TTL
    /// - `WELLQUERY_UPLOAD_TTL_SECS`: upload slot validity window
    /// - `WELLQUERY_MAX_CACHE_ENTRIES`: cache size bound
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("WELLQUERY_SEARCH_ENDPOINT") {
            self.search_endpoint = val;
        }
        if let Ok(val) = std::env::var("WELLQUERY_SCANNER_ENDPOINT") {
            self.scanner_endpoint = val;
        }
        if let Ok(val) = std::env::var("WELLQUERY_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.request_timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("WELLQUERY_SEARCH_TTL_SECS") {
            if let Ok(n) = val.parse() {
                self.search_ttl_secs = n;
            }
        }
        if let Ok(val) = std::env::var("WELLQUERY_UPLOAD_TTL_SECS") {
            if let Ok(n) = val.parse() {
                self.upload_ttl_secs = n;
            }
        }
        if let Ok(val) = std::env::var("WELLQUERY_MAX_CACHE_ENTRIES") {
            if let Ok(n) = val.parse() {
                self.max_cache_entries = n;
            }
        }
        self
    }

    pub fn with_search_endpoint(mut self, endpoint: &str) -> Self {
        self.search_endpoint = endpoint.to_string();
        self
    }

    pub fn with_scanner_endpoint(mut self, endpoint: &str) -> Self {
        self.scanner_endpoint = endpoint.to_string();
        self
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// TTL for cached search results.
    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    /// Validity window for ephemeral upload slots.
    pub fn upload_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_ttl_secs)
    }
}
