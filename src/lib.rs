//! Mealsnap: meal photo intelligence pipeline
//!
//! Consolidates media items from a chat stream into albums and runs each
//! completed album through a vision-LLM nutrition estimate.
//!
//! ## Architecture
//!
//! - **Consolidator**: stateful, time-driven grouping engine (actor-owned table)
//! - **Processor**: single sequential worker invoking the analysis collaborator
//! - **Analyzer**: trait boundary over an OpenAI-compatible vision chat API
//! - **Output stream**: finished groups, exactly one result-or-error each

pub mod analysis;
pub mod config;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod stats;
pub mod types;

// Re-export configuration
pub use config::{AnalysisConfig, AppConfig, PipelineConfig};

// Re-export commonly used types
pub use types::{
    AnalysisOutcome, FoodEstimate, GroupKey, MediaGroup, MediaItem, NutritionReport, RawMediaItem,
};

// Re-export pipeline entry points
pub use pipeline::{GroupTable, MediaPipeline, PipelineClosed, PipelineHandle};

// Re-export analysis components
pub use analysis::{AnalysisError, Analyzer, FixtureAnalyzer, OpenAiAnalyzer};

// Re-export stats
pub use stats::{StatsSnapshot, UsageStats};
