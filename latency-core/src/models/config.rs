use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::processing::pipe::LOOPBACK_PIPE_CAPACITY;

/// One threading/signal combination swept by the probe runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Test delay applied only on alternating 50-tick blocks.
    pub pulsed: bool,
    /// Apply the delay on the render thread instead of the callback.
    pub run_in_thread: bool,
}

impl ExperimentConfig {
    /// Configuration for sweep index `exp` (bit 0 = pulsed, bit 1 = in thread).
    pub fn from_index(exp: usize) -> Self {
        Self {
            pulsed: exp & 1 != 0,
            run_in_thread: exp & 2 != 0,
        }
    }

    pub fn index(&self) -> usize {
        (self.pulsed as usize) | ((self.run_in_thread as usize) << 1)
    }

    /// All four configurations in sweep order.
    pub fn sweep() -> impl Iterator<Item = ExperimentConfig> {
        (0..4).map(Self::from_index)
    }

    /// Split a trial's delay between the callback and render sides.
    pub fn delays(&self, delay: u32) -> (u32, u32) {
        if self.run_in_thread {
            (0, delay)
        } else {
            (delay, 0)
        }
    }
}

impl fmt::Display for ExperimentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.pulsed { "pulsed" } else { "not pulsed" })?;
        if self.run_in_thread {
            f.write_str(" in thread")?;
        }
        Ok(())
    }
}

/// Tunables for calibration and the experiment sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfiguration {
    /// Leading ticks ignored while the pipeline settles (default: 100).
    pub startup_skip: usize,

    /// Buffer size requested while estimating the native one (default: 64).
    pub polling_frames: u32,

    /// Ticks captured for buffer size estimation (default: 10000).
    pub estimation_trace_len: usize,

    /// Ticks captured per sweep trial (default: 2000).
    pub trial_trace_len: usize,

    /// Maximum trials per configuration (default: 100).
    pub trials_per_config: u32,

    /// Jitter above this marks a trial bad, in seconds (default: 0.02).
    pub max_jitter_secs: f64,

    /// Render completion delay above this marks a trial bad, in seconds (default: 0.06).
    pub max_render_delay_secs: f64,

    /// Consecutive bad trials that end a configuration (default: 2).
    pub consecutive_bad_limit: u32,

    /// Sample rates tried during calibration.
    pub candidate_sample_rates: Vec<u32>,
}

impl ProbeConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.startup_skip == 0 {
            return Err("startup skip must be at least 1".into());
        }
        if self.polling_frames == 0 {
            return Err("polling frames must be positive".into());
        }
        if self.estimation_trace_len <= self.startup_skip {
            return Err(format!(
                "estimation trace length {} must exceed startup skip {}",
                self.estimation_trace_len, self.startup_skip
            ));
        }
        if self.trial_trace_len < self.startup_skip + 2 {
            return Err(format!(
                "trial trace length {} too short for startup skip {}",
                self.trial_trace_len, self.startup_skip
            ));
        }
        if self.consecutive_bad_limit == 0 {
            return Err("consecutive bad limit must be positive".into());
        }
        if !(self.max_jitter_secs > 0.0 && self.max_render_delay_secs > 0.0) {
            return Err("thresholds must be positive".into());
        }
        if self.candidate_sample_rates.is_empty()
            || self.candidate_sample_rates.contains(&0)
        {
            return Err("candidate sample rates must be non-empty and positive".into());
        }
        Ok(())
    }
}

impl Default for ProbeConfiguration {
    fn default() -> Self {
        Self {
            startup_skip: 100,
            polling_frames: 64,
            estimation_trace_len: 10_000,
            trial_trace_len: 2_000,
            trials_per_config: 100,
            max_jitter_secs: 0.02,
            max_render_delay_secs: 0.06,
            consecutive_bad_limit: 2,
            candidate_sample_rates: vec![44100, 48000],
        }
    }
}

/// Configuration for a live loopback session (mono 16-bit PCM).
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackConfiguration {
    /// Sample rate in Hz (default: 16000).
    pub sample_rate: u32,

    /// Output lag built from silence before streaming starts, in tenths of a
    /// second. Valid range 0..=100 (default: 20).
    pub delay_deciseconds: u32,

    /// Bytes moved per playback write (default: 128).
    pub chunk_bytes: usize,

    /// How long an idle worker waits before polling again (default: 10ms).
    pub idle_wait: Duration,

    /// Pipe capacity in bytes (default: 10s of audio at 16kHz).
    pub pipe_capacity: usize,
}

impl LoopbackConfiguration {
    pub const MAX_DELAY_DECISECONDS: u32 = 100;

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.delay_deciseconds > Self::MAX_DELAY_DECISECONDS {
            return Err(format!(
                "delay {} ds out of range 0..={}",
                self.delay_deciseconds,
                Self::MAX_DELAY_DECISECONDS
            ));
        }
        if self.chunk_bytes == 0 || self.chunk_bytes % 2 != 0 {
            return Err(format!("chunk size {} must be a positive even number", self.chunk_bytes));
        }
        if self.pipe_capacity < self.chunk_bytes {
            return Err("pipe capacity smaller than one chunk".into());
        }
        Ok(())
    }

    /// Bytes of silence written ahead of the stream.
    pub fn prefill_bytes(&self) -> usize {
        self.delay_deciseconds as usize * self.sample_rate as usize * 2 / 10
    }

    /// Set the delay, ignoring values outside 0..=100.
    pub fn set_delay_deciseconds(&mut self, delay: u32) -> bool {
        if delay > Self::MAX_DELAY_DECISECONDS {
            return false;
        }
        self.delay_deciseconds = delay;
        true
    }
}

impl Default for LoopbackConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            delay_deciseconds: 20,
            chunk_bytes: 128,
            idle_wait: Duration::from_millis(10),
            pipe_capacity: LOOPBACK_PIPE_CAPACITY,
        }
    }
}
