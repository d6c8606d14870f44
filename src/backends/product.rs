//! Product name lookup.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::{json_body, send_cancellable, ScannerClient};
use super::AnalysisBackend;
use crate::models::{BackendResult, Query};

/// Searches the product database by name.
pub struct ProductNameLookup {
    client: ScannerClient,
}

impl ProductNameLookup {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: ScannerClient::new(endpoint, timeout),
        }
    }

    /// An empty result set is a miss, not a failure.
    fn is_empty_result(value: &Value) -> bool {
        if matches!(value.get("success"), Some(Value::Bool(false))) {
            return true;
        }
        match value.get("results") {
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(fields)) => fields.is_empty(),
            Some(Value::Null) => true,
            _ => false,
        }
    }
}

#[async_trait]
impl AnalysisBackend for ProductNameLookup {
    fn name(&self) -> &'static str {
        "product"
    }

    async fn call(&self, query: &Query, token: &CancellationToken) -> BackendResult {
        if token.is_cancelled() {
            return BackendResult::Cancelled;
        }
        let Some(name) = query.key() else {
            return BackendResult::Failed("product lookup requires an identifier".to_string());
        };

        let request = self
            .client
            .http()
            .get(self.client.url("/api/product"))
            .query(&[("name", name)]);
        let response = match send_cancellable(request, token).await {
            Ok(response) => response,
            Err(terminal) => return terminal,
        };
        if !response.status().is_success() {
            return BackendResult::Failed(format!("HTTP {}", response.status()));
        }

        let value = match json_body(response).await {
            Ok(value) => value,
            Err(terminal) => return terminal,
        };
        if Self::is_empty_result(&value) {
            debug!(name, "no products matched");
            return BackendResult::Miss;
        }
        BackendResult::Success(value)
    }
}
