use thiserror::Error;

/// Errors that can occur while probing latency or running a loopback session.
///
/// Timing anomalies in individual trials are not errors; see
/// [`TrialVerdict`](crate::models::measurement::TrialVerdict).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LatencyError {
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("degenerate estimate: {0}")]
    DegenerateEstimate(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("native engine failed: {0}")]
    EngineFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("pipe halves belong to different pipes")]
    PipeMismatch,
}
