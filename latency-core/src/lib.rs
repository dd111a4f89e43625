//! # latency-core
//!
//! Platform-agnostic audio latency measurement core.
//!
//! Turns timestamp traces recorded by a native audio engine into the
//! device's native buffer size, its clock drift and worst-case scheduling
//! jitter, and drives the adaptive experiment sweep that produces them. Also
//! hosts the delayed microphone-to-speaker loopback session.
//!
//! Platform-specific engines and devices implement the `NativeEngine` and
//! `AudioBackend` traits and plug into `ProbeRunner` and `LoopbackSession`.
//!
//! ## Architecture
//!
//! ```text
//! latency-core (this crate)
//! ├── traits/       ← NativeEngine, AudioBackend, PlatformInfo, ReportSink, delegates
//! ├── models/       ← LatencyError, AudioParams, TimestampTrace, measurements, configs, reports
//! ├── analysis/     ← buffer size estimation, drift regression, thread jitter
//! ├── processing/   ← Pipe (SPSC byte FIFO), StopSignal
//! ├── session/      ← ProbeRunner, LoopbackSession
//! └── storage/      ← ReportLog
//! ```

pub mod analysis;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use analysis::{actual_sample_rate, analyze_drift, analyze_jitter, estimate_buffer_size};
pub use models::config::{ExperimentConfig, LoopbackConfiguration, ProbeConfiguration};
pub use models::error::LatencyError;
pub use models::measurement::{BadStreak, JitterMeasurement, ThreadMeasurement, TrialVerdict};
pub use models::params::AudioParams;
pub use models::report::{CalibrationResult, ConfigOutcome, ConfigReport, SweepReport};
pub use models::state::{LoopbackDiagnostics, LoopbackState};
pub use models::trace::{Channel, TimestampTrace};
pub use processing::pipe::{Pipe, PipeReader, PipeWriter};
pub use processing::stop_signal::StopSignal;
pub use session::loopback::LoopbackSession;
pub use session::probe::ProbeRunner;
pub use storage::report_log::ReportLog;
pub use traits::audio_device::{AudioBackend, CaptureStream, PlaybackStream, StreamFormat};
pub use traits::delegate::{LoopbackDelegate, ProbeDelegate};
pub use traits::native_engine::{NativeEngine, TraceCapture, TraceRequest};
pub use traits::platform::PlatformInfo;
pub use traits::report_sink::{NullReportSink, ReportSink};
