use serde::{Deserialize, Serialize};

use super::error::LatencyError;

/// Loopback session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → running → stopping → idle
///           ↓          ↓
///         failed ──────┴──→ idle
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum LoopbackState {
    Idle,
    Starting,
    Running { prefill_bytes: usize },
    Stopping,
    Failed(LatencyError),
}

impl LoopbackState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Whether the host should show the session as recording.
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Starting | Self::Running { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Counters for one loopback session, reset on every start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopbackDiagnostics {
    pub bytes_captured: u64,
    /// Captured bytes that did not fit into the pipe.
    pub bytes_dropped: u64,
    pub bytes_played: u64,
    pub prefill_bytes: u64,
    /// Polls that found the pipe empty.
    pub underrun_polls: u64,
    pub capture_errors: u64,
    pub playback_errors: u64,
}
