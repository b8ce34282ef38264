pub mod analysis;
pub mod error;
pub mod execution;
pub mod jobs;
pub mod receipt;

pub use analysis::{
    CrossRegionAnalysis, KeyDifference, RegionScoring, RiskAssessment, RiskSeverity, Severity,
    SummarySource,
};
pub use error::{BeaconError, ValidationError};
pub use execution::{
    ExecutionUnit, FailureReason, JobRecord, JobStatus, RegionResult, RegionStatus, UnitStatus,
};
pub use jobs::{
    Benchmark, BenchmarkInput, Constraints, Container, JobSpec, ModelSpec, Scoring, WalletAuth,
    DEFAULT_MODEL_ID,
};
pub use receipt::{ExecutionDetails, Provenance, Receipt, ReceiptOutput, RECEIPT_SCHEMA_VERSION};
