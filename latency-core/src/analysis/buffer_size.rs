use crate::models::error::LatencyError;
use crate::models::params::AudioParams;

/// Gap between consecutive callbacks that marks a new native buffer, in seconds.
pub const CALLBACK_BOUNDARY_SECS: f64 = 0.001;

/// Native buffer sizes are always a multiple of this many frames.
pub const BUFFER_SIZE_MULTIPLE: u32 = 16;

/// Result of inferring the native callback period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSizeEstimate {
    /// Unrounded frames per native callback.
    pub raw_estimate: f64,
    /// Callback boundaries seen after the startup skip.
    pub transitions: usize,
    /// Input sample rate with the rounded buffer size.
    pub params: AudioParams,
}

/// Infer the device's native buffer size from a trace captured while the
/// engine was polled with `polling_frames`-frame buffers.
///
/// When the requested buffer is smaller than the native one, callbacks arrive
/// in back-to-back bursts, one burst per native period. Counting the gaps
/// larger than [`CALLBACK_BOUNDARY_SECS`] gives the number of native periods.
pub fn estimate_buffer_size(
    params: &AudioParams,
    callback: &[f64],
    startup_skip: usize,
    polling_frames: u32,
) -> Result<BufferSizeEstimate, LatencyError> {
    let skip = startup_skip.max(1);
    let n = callback.len();
    if n <= skip {
        return Err(LatencyError::DegenerateEstimate(format!(
            "trace of {} ticks is not longer than the startup skip of {}",
            n, skip
        )));
    }

    let transitions = callback[skip - 1..]
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > CALLBACK_BOUNDARY_SECS)
        .count();
    if transitions == 0 {
        return Err(LatencyError::DegenerateEstimate(
            "no callback boundaries in trace (insufficient signal)".into(),
        ));
    }

    let raw_estimate = polling_frames as f64 * (n - skip) as f64 / transitions as f64;
    let multiple = BUFFER_SIZE_MULTIPLE as f64;
    let buffer_size = (multiple * (raw_estimate / multiple).round()) as u32;

    Ok(BufferSizeEstimate {
        raw_estimate,
        transitions,
        params: AudioParams::new(params.sample_rate, buffer_size),
    })
}
