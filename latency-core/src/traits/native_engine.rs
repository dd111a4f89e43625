use crate::models::error::LatencyError;
use crate::models::trace::TimestampTrace;

/// Parameters of one timed trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRequest {
    /// Number of callback ticks to record.
    pub len: usize,
    /// Busy work added to each callback, in units of 100 µs.
    pub delay_callback: u32,
    /// Busy work added to each render pass, in units of 100 µs.
    pub delay_render: u32,
    /// Apply the delays only on alternating 50-tick blocks.
    pub pulsed: bool,
}

impl TraceRequest {
    /// A trial with no added delay.
    pub fn plain(len: usize) -> Self {
        Self {
            len,
            delay_callback: 0,
            delay_render: 0,
            pulsed: false,
        }
    }
}

/// A recorded trace and the engine's own one-line summary of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceCapture {
    pub trace: TimestampTrace,
    pub status: String,
}

/// Native audio engine that opens the device and records timestamp traces.
///
/// The engine is a black box: the callback/render loop and the device itself
/// live behind this trait. Implementations:
/// - `SyntheticEngine` / `ScriptedEngine` (`latency-sim`)
/// - Future: OpenSL ES / AAudio bindings
pub trait NativeEngine: Send {
    /// Configure the device for the next trials. May be called again after
    /// any trial; unsupported values are accepted silently.
    fn init_audio(&mut self, sample_rate: u32, buffer_frames: u32);

    /// Run one synchronous trial.
    fn capture_trace(&mut self, request: &TraceRequest) -> Result<TraceCapture, LatencyError>;

    /// Informational CPU speed benchmark.
    fn cpu_bound_benchmark(&mut self) -> String;

    /// Informational thread hand-off self test.
    fn self_test(&mut self) -> String;
}
