use crate::models::error::LatencyError;

/// Destination for the accumulated text log.
///
/// Delivery is best-effort; callers log failures and move on.
pub trait ReportSink: Send + Sync {
    /// Submit the newline-joined log. Returns the sink's response text.
    fn submit(&self, report: &str) -> Result<String, LatencyError>;
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReportSink;

impl ReportSink for NullReportSink {
    fn submit(&self, _report: &str) -> Result<String, LatencyError> {
        Ok(String::new())
    }
}
