//! Barcode product lookup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::{json_body, send_cancellable, ScannerClient};
use super::AnalysisBackend;
use crate::models::{BackendResult, Query};

/// Looks a product up by its GTIN-14 barcode.
pub struct BarcodeLookup {
    client: ScannerClient,
}

impl BarcodeLookup {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: ScannerClient::new(endpoint, timeout),
        }
    }
}

#[async_trait]
impl AnalysisBackend for BarcodeLookup {
    fn name(&self) -> &'static str {
        "barcode"
    }

    async fn call(&self, query: &Query, token: &CancellationToken) -> BackendResult {
        if token.is_cancelled() {
            return BackendResult::Cancelled;
        }
        let Some(code) = query.key() else {
            return BackendResult::Failed("barcode lookup requires an identifier".to_string());
        };

        let url = self.client.url_with_segments("/api/barcode", &[code]);
        let response = match send_cancellable(self.client.http().get(url), token).await {
            Ok(response) => response,
            Err(terminal) => return terminal,
        };

        // An unknown barcode is a valid answer, not an error.
        if response.status() == StatusCode::NOT_FOUND {
            debug!(code, "barcode not found");
            return BackendResult::Miss;
        }
        if !response.status().is_success() {
            return BackendResult::Failed(format!("HTTP {}", response.status()));
        }

        let value = match json_body(response).await {
            Ok(value) => value,
            Err(terminal) => return terminal,
        };
        if matches!(value.get("success"), Some(Value::Bool(false))) {
            return BackendResult::Miss;
        }
        BackendResult::Success(value)
    }
}
