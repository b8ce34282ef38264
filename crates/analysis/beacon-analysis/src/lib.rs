//! Cross-region divergence analysis for completed Beacon jobs.
//!
//! [`DiffAnalysisEngine`] turns a job's completed units into an
//! [`AnalysisReport`]; a [`summary::FallbackChain`] renders the narrative;
//! [`AnalysisReport::into_record`] produces the persisted
//! [`beacon_types::CrossRegionAnalysis`].

pub mod conclusion;
pub mod differences;
pub mod divergence;
pub mod engine;
pub mod lexicon;
pub mod metrics;
pub mod risk;
pub mod scoring;
pub mod summary;
pub mod text;

pub use conclusion::Conclusion;
pub use engine::{AnalysisError, AnalysisReport, DiffAnalysisEngine};
pub use risk::DivergenceMetrics;
pub use summary::{
    FallbackChain, LlmConfig, LlmSummaryStrategy, RenderedSummary, SummaryContext, SummaryError,
    SummaryStrategy, TemplateSummaryStrategy,
};
