//! Primary analysis backend: the remote AI/analysis capability.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::{json_body, send_cancellable, ScannerClient};
use super::AnalysisBackend;
use crate::models::{BackendResult, Query};

/// Request body for the universal search endpoint.
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    query_type: &'a str,
    options: SearchOptions,
}

#[derive(Debug, Serialize)]
struct SearchOptions {
    limit: u32,
    include_recommendations: bool,
}

/// Calls the remote analysis capability for free-text queries.
pub struct PrimaryAnalyzer {
    client: ScannerClient,
}

impl PrimaryAnalyzer {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: ScannerClient::new(endpoint, timeout),
        }
    }

    /// Check if the analysis service is reachable.
    pub async fn is_available(&self) -> bool {
        self.client.health().await.reachable
    }

    /// A response counts as an answer only if it carries recognizable
    /// content. Empty or malformed objects must not be cached as results, so
    /// they map to `Failed` rather than `Success`.
    fn has_usable_content(value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        if matches!(object.get("success"), Some(Value::Bool(false))) {
            return false;
        }
        if object.get("summary").map_or(false, |v| !v.is_null())
            || object.get("details").map_or(false, |v| !v.is_null())
        {
            return true;
        }
        if let Some(results) = object.get("results") {
            return results.as_object().map_or(false, |r| !r.is_empty());
        }
        !object.is_empty()
    }
}

#[async_trait]
impl AnalysisBackend for PrimaryAnalyzer {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn call(&self, query: &Query, token: &CancellationToken) -> BackendResult {
        if token.is_cancelled() {
            return BackendResult::Cancelled;
        }
        let Some(text) = query.as_text() else {
            return BackendResult::Failed("primary analyzer requires query text".to_string());
        };

        let body = SearchRequest {
            query: text,
            query_type: "auto",
            options: SearchOptions {
                limit: 10,
                include_recommendations: true,
            },
        };
        let request = self
            .client
            .http()
            .post(self.client.url("/search"))
            .json(&body);

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
        if Self::has_usable_content(&value) {
            BackendResult::Success(value)
        } else {
            debug!(query = text, "analysis response had no usable content");
            BackendResult::Failed("no usable content in analysis response".to_string())
        }
    }
}
