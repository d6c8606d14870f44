//! Stage-progress projection for UI rendering.
//!
//! A pure lookup table: the same stage always yields the same percent and
//! label, so it can be unit-tested without running the orchestrator.

use std::time::Duration;

use crate::models::{Outcome, Stage};

/// Which pipeline an attempt is running. Labels differ between the text and
/// image surfaces even where the stages line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    TextSearch,
    ImageAnalysis,
}

/// Progress snapshot for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 0..=100.
    pub percent: u8,
    pub label: &'static str,
}

/// How long a terminal status message stays visible before the UI resets to
/// idle. "No results" lingers slightly longer than a hard failure; success
/// and deliberate cancellation show no message at all.
pub const NOT_FOUND_DISMISS: Duration = Duration::from_secs(3);
pub const FAILURE_DISMISS: Duration = Duration::from_secs(2);

/// Map a pipeline stage to a progress snapshot.
pub fn project(kind: PipelineKind, stage: Stage) -> Progress {
    use PipelineKind::*;
    match stage {
        Stage::Init => Progress {
            percent: 10,
            label: "Initializing search...",
        },
        Stage::CacheCheck => Progress {
            percent: 25,
            label: "Checking cache...",
        },
        Stage::PrimaryResolve => Progress {
            percent: 55,
            label: "Analyzing with AI...",
        },
        Stage::FallbackResolve => Progress {
            percent: 75,
            label: "Processing results...",
        },
        Stage::ImageResolve => Progress {
            percent: 35,
            label: "Processing image...",
        },
        Stage::BarcodeResolve => Progress {
            percent: 45,
            label: "Checking nutrition database...",
        },
        Stage::ProductResolve => Progress {
            percent: 60,
            label: "Analyzing nutrition...",
        },
        Stage::Persisting => match kind {
            TextSearch => Progress {
                percent: 75,
                label: "Processing results...",
            },
            ImageAnalysis => Progress {
                percent: 80,
                label: "Processing nutrition data...",
            },
        },
        Stage::Done => match kind {
            TextSearch => Progress {
                percent: 95,
                label: "Results ready",
            },
            ImageAnalysis => Progress {
                percent: 95,
                label: "Analysis complete",
            },
        },
    }
}

/// Auto-dismiss delay for a terminal outcome, if its status message expires.
pub fn dismissal_delay(outcome: &Outcome) -> Option<Duration> {
    match outcome {
        Outcome::NotFound { .. } => Some(NOT_FOUND_DISMISS),
        Outcome::Failed { .. } => Some(FAILURE_DISMISS),
        Outcome::Resolved { .. } | Outcome::Cancelled => None,
    }
}
