//! Timing analysis of timestamp traces.

pub mod buffer_size;
pub mod drift;
pub mod jitter;

pub use buffer_size::{estimate_buffer_size, BufferSizeEstimate};
pub use drift::{actual_sample_rate, analyze_drift};
pub use jitter::analyze_jitter;
