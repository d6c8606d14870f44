//! Core value types shared across the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{classify_identifier, normalize_gtin14, InputClass};

/// Where a resolved payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLabel {
    /// Served from the result cache.
    Cache,
    /// Primary AI analysis.
    Primary,
    /// Near-duplicate prior result.
    Similar,
    /// Barcode product lookup.
    Barcode,
    /// Product name lookup.
    Product,
    /// Image upload analysis.
    Image,
    /// Error placeholder (diagnostics only).
    Error,
}

impl SourceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLabel::Cache => "cache",
            SourceLabel::Primary => "primary",
            SourceLabel::Similar => "similar",
            SourceLabel::Barcode => "barcode",
            SourceLabel::Product => "product",
            SourceLabel::Image => "image",
            SourceLabel::Error => "error",
        }
    }
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the user produced the query. Carried for diagnostics only; it never
/// changes resolution behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOrigin {
    #[default]
    Typed,
    /// Voice transcript entered as text.
    Voice,
    /// Detected from an uploaded image.
    ImageUpload,
    /// Entered through the scanner surface.
    Scan,
}

/// Raw user input carried by a query.
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// Free-form question text.
    Text(String),
    /// Scan-style identifier: barcode digits, a product name, or an image URL.
    Identifier(String),
    /// Raw uploaded image bytes.
    ImageBytes { data: Vec<u8>, filename: String },
}

/// Immutable description of one user intent.
///
/// The normalized lookup key is computed once at construction: lower-cased
/// trimmed text for questions and product names, the GTIN-14 form for
/// barcodes, the trimmed string for image references. Raw image bytes carry
/// no key, which makes the orchestrator skip the cache check for them.
#[derive(Debug, Clone)]
pub struct Query {
    input: QueryInput,
    key: Option<String>,
    origin: QueryOrigin,
}

impl Query {
    /// A free-text question.
    pub fn text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let key = raw.trim().to_lowercase();
        Self {
            input: QueryInput::Text(raw),
            key: Some(key),
            origin: QueryOrigin::Typed,
        }
    }

    /// A scan-style identifier (barcode digits, product name, or image URL).
    pub fn identifier(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        let key = match classify_identifier(trimmed) {
            InputClass::Barcode => normalize_gtin14(trimmed),
            InputClass::ProductName => trimmed.to_lowercase(),
            // URLs are case-sensitive; trim only.
            InputClass::ImageReference => trimmed.to_string(),
        };
        Self {
            input: QueryInput::Identifier(raw),
            key: Some(key),
            origin: QueryOrigin::Scan,
        }
    }

    /// Raw uploaded image bytes. No identifier is known yet, so there is no
    /// lookup key.
    pub fn image(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            input: QueryInput::ImageBytes {
                data,
                filename: filename.into(),
            },
            key: None,
            origin: QueryOrigin::ImageUpload,
        }
    }

    /// Override the origin marker (e.g. a voice transcript entering as text).
    pub fn with_origin(mut self, origin: QueryOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn input(&self) -> &QueryInput {
        &self.input
    }

    /// Normalized lookup key, when one exists.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn origin(&self) -> QueryOrigin {
        self.origin
    }

    /// The raw question text, for backends that consume free text.
    pub fn as_text(&self) -> Option<&str> {
        match &self.input {
            QueryInput::Text(raw) => Some(raw.trim()),
            _ => None,
        }
    }
}

/// Result of one backend call. Backends never surface raw errors; every
/// failure path is mapped into this union at the adapter boundary.
#[derive(Debug, Clone)]
pub enum BackendResult {
    /// Usable answer.
    Success(Value),
    /// Valid call, no usable answer (cache miss, barcode not found).
    Miss,
    /// The stage errored; operationally equivalent to a miss for fallback,
    /// kept distinct for diagnostics.
    Failed(String),
    /// The attempt was abandoned; never triggers fallback.
    Cancelled,
}

/// One discrete step within the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    CacheCheck,
    PrimaryResolve,
    FallbackResolve,
    BarcodeResolve,
    ProductResolve,
    ImageResolve,
    Persisting,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::CacheCheck => "cache_check",
            Stage::PrimaryResolve => "primary_resolve",
            Stage::FallbackResolve => "fallback_resolve",
            Stage::BarcodeResolve => "barcode_resolve",
            Stage::ProductResolve => "product_resolve",
            Stage::ImageResolve => "image_resolve",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a resolution attempt. Callers handle all four variants;
/// there is no other shape.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A stage produced a usable answer.
    Resolved { payload: Value, source: SourceLabel },
    /// Every applicable stage was exhausted without an answer.
    NotFound { attempted: Vec<Stage> },
    /// The attempt was deliberately abandoned. Not a failure.
    Cancelled,
    /// The attempt could not start (pre-flight invariant problem).
    Failed { reason: String },
}

/// A cached resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub source: SourceLabel,
}
