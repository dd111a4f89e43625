use serde::{Deserialize, Serialize};

use super::config::ExperimentConfig;
use super::params::AudioParams;

/// How one configuration of the sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfigOutcome {
    /// Every trial ran.
    Completed { trials: u32, bad_trials: u32 },
    /// Consecutive bad trials ended the configuration after trial `at_trial`.
    Aborted { at_trial: u32, bad_trials: u32 },
}

impl ConfigOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Number of trials that ran.
    pub fn trials_run(&self) -> u32 {
        match *self {
            Self::Completed { trials, .. } => trials,
            Self::Aborted { at_trial, .. } => at_trial + 1,
        }
    }
}

/// Result of one configuration in the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigReport {
    pub config: ExperimentConfig,
    pub outcome: ConfigOutcome,
    /// Largest render completion delay seen, in seconds.
    pub worst_render_end: f64,
    /// Largest jitter seen, in seconds.
    pub worst_jitter: f64,
}

/// Summary of a full experiment sweep.
///
/// Serializable for JSON export alongside the text log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub id: String,
    pub created_at: String,
    pub params: AudioParams,
    /// Buffer size estimate in effect for the sweep, if estimation succeeded.
    pub estimated: Option<AudioParams>,
    /// Seconds per tick fitted on the first trial.
    pub reference_rate: Option<f64>,
    /// Effective sample rate derived from the first trial.
    pub actual_sample_rate: Option<f64>,
    pub configs: Vec<ConfigReport>,
    /// Response text from the report sink, when submission succeeded.
    pub upload_response: Option<String>,
    /// The sweep was cancelled before every configuration finished.
    #[serde(default)]
    pub cancelled: bool,
}

impl SweepReport {
    pub fn new(params: AudioParams) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            params,
            estimated: None,
            reference_rate: None,
            actual_sample_rate: None,
            configs: Vec::new(),
            upload_response: None,
            cancelled: false,
        }
    }
}

/// Outcome of the sample-rate/buffer-size calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub buffer_size: u32,
    pub sample_rate: u32,
    /// Jitter measured with the chosen parameters, in seconds.
    pub jitter: f64,
}

impl CalibrationResult {
    /// Sample rate as a short label, e.g. `44.1kHz` or `48kHz`.
    pub fn sample_rate_label(&self) -> String {
        let khz = self.sample_rate / 1000;
        let rest = self.sample_rate % 1000;
        if rest == 0 {
            format!("{}kHz", khz)
        } else {
            format!("{}.{}kHz", khz, rest / 100)
        }
    }

    pub fn params(&self) -> AudioParams {
        AudioParams::new(self.sample_rate, self.buffer_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_labels() {
        let mut result = CalibrationResult { buffer_size: 240, sample_rate: 48000, jitter: 0.0 };
        assert_eq!(result.sample_rate_label(), "48kHz");
        result.sample_rate = 44100;
        assert_eq!(result.sample_rate_label(), "44.1kHz");
    }

    #[test]
    fn outcome_trial_counts() {
        let done = ConfigOutcome::Completed { trials: 100, bad_trials: 1 };
        let aborted = ConfigOutcome::Aborted { at_trial: 4, bad_trials: 2 };
        assert_eq!(done.trials_run(), 100);
        assert_eq!(aborted.trials_run(), 5);
        assert!(aborted.is_aborted());
    }

    #[test]
    fn report_serializes_outcome_tag() {
        let mut report = SweepReport::new(AudioParams::new(48000, 240));
        report.configs.push(ConfigReport {
            config: ExperimentConfig::from_index(1),
            outcome: ConfigOutcome::Aborted { at_trial: 2, bad_trials: 2 },
            worst_render_end: 0.07,
            worst_jitter: 0.001,
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["configs"][0]["outcome"]["status"], "aborted");
        assert_eq!(json["configs"][0]["config"]["pulsed"], true);
        assert_eq!(json["params"]["buffer_size"], 240);
        assert!(uuid::Uuid::parse_str(json["id"].as_str().unwrap()).is_ok());
    }
}
