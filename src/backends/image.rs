//! Image analysis backend with two-phase upload and inline fallback.
//!
//! The preferred path is a three-step protocol: request a short-lived upload
//! slot, PUT the image bytes to the slot's URL, then trigger analysis by slot
//! id. When any step fails, the whole image is retried once through the
//! inline multipart endpoint. The inner chain follows the same
//! Success/Miss/Failed/Cancelled contract as the outer pipeline, so the
//! orchestrator sees this backend as a single opaque call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::http::{json_body, send_cancellable, ScannerClient};
use super::AnalysisBackend;
use crate::models::{BackendResult, Query, QueryInput};

/// Upload slot issued by the scanner API, valid for a short window.
#[derive(Debug, Deserialize)]
struct UploadSlot {
    slot_id: String,
    upload_url: String,
}

/// Failures inside the two-phase upload protocol.
#[derive(Debug, Error)]
enum UploadError {
    #[error("slot request failed: {0}")]
    SlotRequest(String),
    #[error("byte upload failed: {0}")]
    Upload(String),
    #[error("analysis trigger failed: {0}")]
    Analyze(String),
    #[error("cancelled")]
    Cancelled,
}

fn phase_result(
    result: Result<Response, BackendResult>,
    wrap: fn(String) -> UploadError,
) -> Result<Response, UploadError> {
    match result {
        Ok(response) => Ok(response),
        Err(BackendResult::Cancelled) => Err(UploadError::Cancelled),
        Err(BackendResult::Failed(reason)) => Err(wrap(reason)),
        Err(_) => Err(wrap("unexpected backend state".to_string())),
    }
}

/// Analyzes uploaded images and image URL references.
pub struct ImageUploadAnalyzer {
    client: ScannerClient,
}

impl ImageUploadAnalyzer {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: ScannerClient::new(endpoint, timeout),
        }
    }

    /// Fetch the bytes behind an image URL reference so both input shapes go
    /// through the same upload paths.
    async fn fetch_reference(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, BackendResult> {
        let response = send_cancellable(self.client.http().get(reference), token).await?;
        if !response.status().is_success() {
            return Err(BackendResult::Failed(format!(
                "failed to fetch image reference: HTTP {}",
                response.status()
            )));
        }
        match response.bytes().await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(error) => Err(BackendResult::Failed(format!(
                "failed to read image reference body: {error}"
            ))),
        }
    }

    /// Two-phase path: slot, upload, trigger.
    async fn analyze_via_slot(
        &self,
        data: &[u8],
        filename: &str,
        token: &CancellationToken,
    ) -> Result<Value, UploadError> {
        let request = self
            .client
            .http()
            .post(self.client.url("/api/image/slots"))
            .json(&serde_json::json!({ "filename": filename }));
        let response = phase_result(
            send_cancellable(request, token).await,
            UploadError::SlotRequest,
        )?;
        if !response.status().is_success() {
            return Err(UploadError::SlotRequest(format!(
                "HTTP {}",
                response.status()
            )));
        }
        let slot: UploadSlot = response
            .json()
            .await
            .map_err(|error| UploadError::SlotRequest(error.to_string()))?;
        debug!(slot_id = %slot.slot_id, "upload slot issued");

        let request = self
            .client
            .http()
            .put(slot.upload_url.as_str())
            .body(data.to_vec());
        let response =
            phase_result(send_cancellable(request, token).await, UploadError::Upload)?;
        if !response.status().is_success() {
            return Err(UploadError::Upload(format!("HTTP {}", response.status())));
        }

        let url = self
            .client
            .url_with_segments("/api/image/slots", &[&slot.slot_id, "analyze"]);
        let response = phase_result(
            send_cancellable(self.client.http().post(url), token).await,
            UploadError::Analyze,
        )?;
        if !response.status().is_success() {
            return Err(UploadError::Analyze(format!("HTTP {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|error| UploadError::Analyze(error.to_string()))
    }

    /// Inline fallback: a single multipart POST with the image bytes.
    async fn analyze_inline(
        &self,
        data: &[u8],
        filename: &str,
        token: &CancellationToken,
    ) -> BackendResult {
        let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("include_ingredients", "true");
        let request = self
            .client
            .http()
            .post(self.client.url("/api/image"))
            .multipart(form);

        let response = match send_cancellable(request, token).await {
            Ok(response) => response,
            Err(terminal) => return terminal,
        };
        if !response.status().is_success() {
            return BackendResult::Failed(format!("HTTP {}", response.status()));
        }
        match json_body(response).await {
            Ok(value) => BackendResult::Success(value),
            Err(terminal) => terminal,
        }
    }
}

#[async_trait]
impl AnalysisBackend for ImageUploadAnalyzer {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn call(&self, query: &Query, token: &CancellationToken) -> BackendResult {
        if token.is_cancelled() {
            return BackendResult::Cancelled;
        }
        let (data, filename) = match query.input() {
            QueryInput::ImageBytes { data, filename } => (data.clone(), filename.clone()),
            QueryInput::Identifier(reference) => {
                let reference = reference.trim();
                match self.fetch_reference(reference, token).await {
                    Ok(bytes) => (bytes, "url-image.jpg".to_string()),
                    Err(terminal) => return terminal,
                }
            }
            QueryInput::Text(_) => {
                return BackendResult::Failed("image analyzer requires image input".to_string())
            }
        };

        match self.analyze_via_slot(&data, &filename, token).await {
            Ok(value) => BackendResult::Success(value),
            Err(UploadError::Cancelled) => BackendResult::Cancelled,
            Err(error) => {
                warn!(%error, "two-phase upload failed, retrying via inline upload");
                self.analyze_inline(&data, &filename, token).await
            }
        }
    }
}
