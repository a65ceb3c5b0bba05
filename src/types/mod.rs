//! Shared data structures for the media consolidation pipeline
//!
//! This module defines the types carried between pipeline stages:
//! - Ingestion: `RawMediaItem` (wire record) -> `MediaItem`
//! - Consolidation: `MediaGroup` (album under construction)
//! - Analysis: `NutritionReport` / `AnalysisOutcome` (attached result-or-error)

mod media;
mod nutrition;

pub use media::*;
pub use nutrition::*;
