//! # latency-sim
//!
//! Software stand-ins for the native pieces latency-core talks to.
//!
//! Provides:
//! - `SyntheticEngine`: seeded model of a device with a native buffer size, clock drift and scheduling noise
//! - `ScriptedEngine`: replays queued traces and failures
//! - `MemoryBackend`: in-memory capture/playback devices with failure injection
//! - `StaticPlatform`: fixed device description and optional authoritative params
//!
//! ## Usage
//! ```ignore
//! use latency_sim::{DeviceModel, StaticPlatform, SyntheticEngine};
//! use latency_core::{NullReportSink, ProbeConfiguration, ProbeRunner, ReportLog};
//!
//! let engine = SyntheticEngine::new(DeviceModel::default(), 42)?;
//! let mut runner = ProbeRunner::new(
//!     Box::new(engine),
//!     Arc::new(StaticPlatform::new("synthetic")),
//!     Arc::new(NullReportSink),
//!     Arc::new(ReportLog::new()),
//!     ProbeConfiguration::default(),
//! )?;
//! let calibration = runner.calibrate()?;
//! let report = runner.run_sweep();
//! ```

pub mod memory_device;
pub mod scripted_engine;
pub mod static_platform;
pub mod synthetic_engine;

pub use memory_device::{DeviceEvent, MemoryBackend, MemoryBackendOptions};
pub use scripted_engine::{EngineCall, ScriptedEngine};
pub use static_platform::StaticPlatform;
pub use synthetic_engine::{DeviceModel, SyntheticEngine};
