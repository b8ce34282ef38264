use thiserror::Error;

/// Reasons a submitted job is rejected before it is ever persisted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("benchmark name is required")]
    MissingBenchmarkName,

    #[error("container image is required")]
    MissingContainerImage,

    #[error("at least one region is required")]
    NoRegions,

    #[error("min_regions ({min_regions}) cannot exceed available regions ({available})")]
    MinRegionsExceedsRegions { min_regions: usize, available: usize },

    #[error("min_success_rate must be within (0, 1], got {0}")]
    InvalidSuccessRate(f64),

    #[error("duplicate region: {0}")]
    DuplicateRegion(String),

    #[error("question {index} is empty")]
    EmptyQuestion { index: usize },

    #[error("questions are required for bias-detection benchmarks")]
    MissingQuestions,

    #[error("malformed job request: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Stable machine-readable code returned to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingBenchmarkName => "missing_field:benchmark.name",
            ValidationError::MissingContainerImage => "missing_field:benchmark.container.image",
            ValidationError::NoRegions => "missing_field:constraints.regions",
            ValidationError::MissingQuestions => "missing_field:questions",
            _ => "validation_error",
        }
    }
}

/// Top-level error taxonomy shared across the runner crates.
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("authentication failed: {message}")]
    Authentication { code: String, message: String },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("execution timed out after {timeout_secs}s")]
    ExecutionTimeout { timeout_secs: u64 },

    #[error("execution failed: {0}")]
    ExecutionFailure(String),

    #[error("insufficient regions for analysis: required {required}, got {actual}")]
    InsufficientRegions { required: usize, actual: usize },

    #[error("summary generation failed: {0}")]
    SummaryGeneration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}
