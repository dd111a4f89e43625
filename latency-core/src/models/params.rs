use std::fmt;

use serde::{Deserialize, Serialize};

/// Sample rate and native buffer size of the audio device under test.
///
/// `confident` is set when the values come from an authoritative platform query.
/// Empirical estimates never replace a confident value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub confident: bool,
}

impl AudioParams {
    /// Parameters that still need to be confirmed by measurement.
    pub fn new(sample_rate: u32, buffer_size: u32) -> Self {
        Self {
            sample_rate,
            buffer_size,
            confident: false,
        }
    }

    /// Parameters reported by the platform itself.
    pub fn authoritative(sample_rate: u32, buffer_size: u32) -> Self {
        Self {
            sample_rate,
            buffer_size,
            confident: true,
        }
    }

    /// Adopt `estimate` unless these parameters are confident.
    ///
    /// Returns whether anything changed.
    pub fn update_from(&mut self, estimate: &AudioParams) -> bool {
        if self.confident {
            return false;
        }
        let changed =
            self.sample_rate != estimate.sample_rate || self.buffer_size != estimate.buffer_size;
        self.sample_rate = estimate.sample_rate;
        self.buffer_size = estimate.buffer_size;
        changed
    }

    /// Duration of one native buffer in seconds.
    pub fn buffer_period_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.buffer_size as f64 / self.sample_rate as f64
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self::new(44100, 768)
    }
}

impl fmt::Display for AudioParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sampleRate={} bufferSize={}",
            self.sample_rate, self.buffer_size
        )
    }
}
