//! Nutrition analysis collaborator.
//!
//! The pipeline treats analysis as an opaque call: `(caption, ordered image
//! URLs)` in, structured [`NutritionReport`](crate::types::NutritionReport)
//! or [`AnalysisError`] out. The trait is the seam; the shipped
//! implementation talks to an OpenAI-compatible vision chat API.

mod fixture;
mod openai;

pub use fixture::FixtureAnalyzer;
pub use openai::OpenAiAnalyzer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NutritionReport;

/// Ways the analysis call can fail.
///
/// Variants carry rendered strings rather than source errors so finished
/// groups stay cloneable and serializable on the output stream.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AnalysisError {
    /// Transport failure or non-success HTTP status from the collaborator.
    #[error("analysis request failed: {0}")]
    Http(String),

    /// The collaborator replied without any usable content.
    #[error("analysis returned an empty response")]
    EmptyResponse,

    /// The collaborator's reply did not parse as a nutrition report.
    #[error("analysis returned malformed JSON: {0}")]
    MalformedResponse(String),

    /// The call was abandoned because the shutdown grace period expired.
    #[error("analysis call abandoned after shutdown grace period expired")]
    ShutdownGraceExpired,
}

/// External analysis collaborator invoked by the processor.
///
/// One call in flight at a time, by design; implementations do not need to
/// be re-entrant. No retry happens at this seam; a failed call surfaces as
/// an error attached to the group.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Estimate nutrition for a meal described by `caption` and photographed
    /// in `image_urls` (arrival order).
    async fn analyze(
        &self,
        caption: &str,
        image_urls: &[String],
    ) -> Result<NutritionReport, AnalysisError>;

    /// Human-readable name for logging (e.g. "openai", "fixture").
    fn analyzer_name(&self) -> &str;
}
