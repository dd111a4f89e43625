use crate::models::error::LatencyError;
use crate::models::report::SweepReport;
use crate::models::state::LoopbackState;

/// Event delegate for loopback session notifications.
///
/// Methods are called from whichever thread drives the session, not the UI
/// thread. Implementations should marshal to the UI thread if needed.
pub trait LoopbackDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &LoopbackState);

    /// Called when starting or running the session fails.
    fn on_error(&self, error: &LatencyError);
}

/// Event delegate for probe runs.
///
/// All methods are called from the probe thread.
pub trait ProbeDelegate: Send + Sync {
    /// Called for every line appended to the report log.
    fn on_log_line(&self, line: &str);

    /// Called once a sweep has finished and the report was submitted.
    fn on_sweep_finished(&self, _report: &SweepReport) {}
}
