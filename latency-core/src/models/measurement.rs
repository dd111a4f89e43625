use std::fmt;

use serde::{Deserialize, Serialize};

/// Clock rate and timing jitter of one trace channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterMeasurement {
    /// Fitted seconds per tick (regression slope).
    pub rate: f64,
    /// Peak-to-peak deviation from the reference rate, in seconds.
    pub jitter: f64,
}

impl fmt::Display for JitterMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ms per tick = {:.3}; jitter (lr) = {:.3}",
            self.rate * 1000.0,
            self.jitter * 1000.0
        )
    }
}

/// Worst-case delay of each pipeline stage relative to the callback, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMeasurement {
    pub cb_done: f64,
    pub render_start: f64,
    pub render_end: f64,
}

impl fmt::Display for ThreadMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cbDone={:.3}, renderStart={:.3}, renderEnd={:.3}",
            self.cb_done * 1000.0,
            self.render_start * 1000.0,
            self.render_end * 1000.0
        )
    }
}

/// Classification of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialVerdict {
    Good,
    Bad,
}

impl TrialVerdict {
    /// Bad when jitter or render delay exceed their limits.
    pub fn classify(
        jitter: &JitterMeasurement,
        thread: &ThreadMeasurement,
        max_jitter: f64,
        max_render_delay: f64,
    ) -> Self {
        if jitter.jitter > max_jitter || thread.render_end > max_render_delay {
            Self::Bad
        } else {
            Self::Good
        }
    }

    pub fn is_bad(self) -> bool {
        matches!(self, Self::Bad)
    }
}

/// Tracks consecutive bad trials within one configuration.
///
/// A single bad trial is a transient anomaly; `limit` in a row is systemic and
/// ends the configuration.
#[derive(Debug, Clone, Copy)]
pub struct BadStreak {
    count: u32,
    limit: u32,
}

impl BadStreak {
    pub fn new(limit: u32) -> Self {
        Self {
            count: 0,
            limit: limit.max(1),
        }
    }

    /// Record a verdict. Returns `true` when the configuration should abort.
    pub fn record(&mut self, verdict: TrialVerdict) -> bool {
        if verdict.is_bad() {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.count >= self.limit
    }

    pub fn current(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(verdicts: &[TrialVerdict]) -> Option<usize> {
        let mut streak = BadStreak::new(2);
        verdicts.iter().position(|&v| streak.record(v))
    }

    #[test]
    fn aborts_exactly_after_second_consecutive_bad() {
        use TrialVerdict::*;
        assert_eq!(run(&[Good, Bad, Bad, Good, Good]), Some(2));
    }

    #[test]
    fn tolerates_isolated_bad_trials() {
        use TrialVerdict::*;
        assert_eq!(run(&[Bad, Good, Bad, Good, Bad, Good]), None);
    }

    #[test]
    fn classify_uses_both_thresholds() {
        let calm = JitterMeasurement { rate: 0.005, jitter: 0.001 };
        let noisy = JitterMeasurement { rate: 0.005, jitter: 0.03 };
        let fast = ThreadMeasurement { cb_done: 0.0, render_start: 0.0, render_end: 0.01 };
        let slow = ThreadMeasurement { render_end: 0.07, ..fast };

        assert_eq!(TrialVerdict::classify(&calm, &fast, 0.02, 0.06), TrialVerdict::Good);
        assert_eq!(TrialVerdict::classify(&noisy, &fast, 0.02, 0.06), TrialVerdict::Bad);
        assert_eq!(TrialVerdict::classify(&calm, &slow, 0.02, 0.06), TrialVerdict::Bad);
    }

    #[test]
    fn thread_measurement_display_in_ms() {
        let tm = ThreadMeasurement {
            cb_done: 0.0001,
            render_start: 0.0025,
            render_end: 0.0123456,
        };
        assert_eq!(tm.to_string(), "cbDone=0.100, renderStart=2.500, renderEnd=12.346");
    }
}
