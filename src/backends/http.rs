//! Shared HTTP plumbing for backend adapters.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::BackendResult;

/// Result of a connectivity probe.
#[derive(Debug, Clone)]
pub struct ApiHealth {
    pub reachable: bool,
    pub latency: Option<Duration>,
}

/// Thin wrapper over `reqwest::Client` bound to one API base endpoint.
#[derive(Clone)]
pub struct ScannerClient {
    client: Client,
    endpoint: String,
}

impl ScannerClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Absolute URL for a fixed path under the base endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Absolute URL for a path with caller-supplied trailing segments, each
    /// percent-encoded. Falls back to plain formatting if the endpoint does
    /// not parse (it will fail at request time with a normal `Failed`).
    pub fn url_with_segments(&self, path: &str, segments: &[&str]) -> String {
        match url::Url::parse(&self.url(path)) {
            Ok(mut parsed) => {
                if let Ok(mut parts) = parsed.path_segments_mut() {
                    parts.extend(segments);
                }
                parsed.to_string()
            }
            Err(_) => {
                let mut out = self.url(path);
                for segment in segments {
                    out.push('/');
                    out.push_str(segment);
                }
                out
            }
        }
    }

    /// Probe the `/health` endpoint, measuring round-trip latency.
    pub async fn health(&self) -> ApiHealth {
        let start = Instant::now();
        match self.client.get(self.url("/health")).send().await {
            Ok(response) => ApiHealth {
                reachable: response.status().is_success(),
                latency: Some(start.elapsed()),
            },
            Err(error) => {
                debug!(%error, endpoint = %self.endpoint, "health probe failed");
                ApiHealth {
                    reachable: false,
                    latency: None,
                }
            }
        }
    }
}

/// Send a request, racing it against cancellation.
///
/// Returns the terminal [`BackendResult`] in the error position so adapters
/// can bubble it with `?`-free match arms: a token abort maps to `Cancelled`,
/// a transport error to `Failed`. Status handling stays with the caller
/// because Miss/Failed discrimination is backend-specific.
pub async fn send_cancellable(
    request: RequestBuilder,
    token: &CancellationToken,
) -> Result<Response, BackendResult> {
    if token.is_cancelled() {
        return Err(BackendResult::Cancelled);
    }
    tokio::select! {
        _ = token.cancelled() => Err(BackendResult::Cancelled),
        result = request.send() => match result {
            Ok(response) => Ok(response),
            Err(error) => Err(BackendResult::Failed(format!("transport error: {error}"))),
        },
    }
}

/// Read a response body as JSON, mapping parse failures to `Failed`.
pub async fn json_body(response: Response) -> Result<Value, BackendResult> {
    response
        .json()
        .await
        .map_err(|error| BackendResult::Failed(format!("malformed response body: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_stripped() {
        let client = ScannerClient::new("http://localhost:5001/", Duration::from_secs(5));
        assert_eq!(client.url("/api/image"), "http://localhost:5001/api/image");
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let client = ScannerClient::new("http://localhost:5001", Duration::from_secs(5));
        let url = client.url_with_segments("/api/barcode", &["00 49"]);
        assert_eq!(url, "http://localhost:5001/api/barcode/00%2049");
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let client = ScannerClient::new("http://localhost:1", Duration::from_secs(5));
        let token = CancellationToken::new();
        token.cancel();
        let result = send_cancellable(client.http().get(client.url("/health")), &token).await;
        assert!(matches!(result, Err(BackendResult::Cancelled)));
    }
}
