use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::analysis::{
    actual_sample_rate, analyze_drift, analyze_jitter, estimate_buffer_size, BufferSizeEstimate,
};
use crate::models::config::{ExperimentConfig, ProbeConfiguration};
use crate::models::error::LatencyError;
use crate::models::measurement::{BadStreak, TrialVerdict};
use crate::models::params::AudioParams;
use crate::models::report::{CalibrationResult, ConfigOutcome, ConfigReport, SweepReport};
use crate::models::trace::TimestampTrace;
use crate::processing::stop_signal::StopSignal;
use crate::storage::report_log::ReportLog;
use crate::traits::delegate::ProbeDelegate;
use crate::traits::native_engine::{NativeEngine, TraceRequest};
use crate::traits::platform::PlatformInfo;
use crate::traits::report_sink::ReportSink;

/// Clock reference shared by every trial of one sweep.
#[derive(Debug, Default)]
struct SweepClock {
    /// Seconds per tick fitted on the first trial.
    locked_rate: Option<f64>,
}

/// Per-configuration running totals.
#[derive(Debug)]
struct ConfigTally {
    streak: BadStreak,
    bad_trials: u32,
    worst_render_end: f64,
    worst_jitter: f64,
}

/// Drives the native engine through calibration and the experiment sweep.
///
/// All output goes to the [`ReportLog`]; the returned reports summarize the
/// same run in structured form.
/// ```text
/// calibrate:  for each candidate rate → estimate buffer size → drift trial → keep lowest jitter
/// run_sweep:  estimate buffer size → 4 configs × up to N trials → submit log
/// ```
pub struct ProbeRunner {
    engine: Box<dyn NativeEngine>,
    platform: Arc<dyn PlatformInfo>,
    sink: Arc<dyn ReportSink>,
    log: Arc<ReportLog>,
    config: ProbeConfiguration,
    params: Arc<Mutex<AudioParams>>,
    delegate: Option<Arc<dyn ProbeDelegate>>,
    cancel: Arc<StopSignal>,
}

impl ProbeRunner {
    pub fn new(
        engine: Box<dyn NativeEngine>,
        platform: Arc<dyn PlatformInfo>,
        sink: Arc<dyn ReportSink>,
        log: Arc<ReportLog>,
        config: ProbeConfiguration,
    ) -> Result<Self, LatencyError> {
        config.validate().map_err(LatencyError::ConfigurationFailed)?;
        let params = platform.authoritative_params().unwrap_or_default();
        Ok(Self {
            engine,
            platform,
            sink,
            log,
            config,
            params: Arc::new(Mutex::new(params)),
            delegate: None,
            cancel: Arc::new(StopSignal::new()),
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn ProbeDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Current session parameters, readable from the host while a sweep runs.
    pub fn params_handle(&self) -> Arc<Mutex<AudioParams>> {
        Arc::clone(&self.params)
    }

    pub fn params(&self) -> AudioParams {
        *self.params.lock()
    }

    /// Signal that stops a running sweep after the current trial.
    pub fn cancel_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.cancel)
    }

    pub fn log(&self) -> &Arc<ReportLog> {
        &self.log
    }

    /// Informational thread hand-off test of the engine, logged and returned.
    pub fn self_test(&mut self) -> String {
        let result = self.engine.self_test();
        self.log.append(result.clone());
        result
    }

    /// Find the sample rate and buffer size with the lowest callback jitter.
    ///
    /// Each candidate rate gets a buffer size estimate and one drift trial at
    /// that estimate, even when the platform reported params. The first
    /// candidate wins ties. Session parameters are updated with the winner
    /// unless they are confident.
    pub fn calibrate(&mut self) -> Result<CalibrationResult, LatencyError> {
        self.log.append(self.platform.device_description());

        let mut params = AudioParams::default();
        if let Some(platform_params) = self.platform.authoritative_params() {
            params = platform_params;
            self.log.append(format!("from platform: {}", params));
        }

        let candidates = self.config.candidate_sample_rates.clone();
        let mut best: Option<CalibrationResult> = None;
        for rate in candidates {
            params.sample_rate = rate;
            self.engine.init_audio(rate, self.config.polling_frames);
            let estimate = match self.estimate_buffer_size(&params) {
                Ok(estimate) => estimate,
                Err(err) => {
                    self.log.append(format!("{} Hz skipped: {}", rate, err));
                    continue;
                }
            };
            let buffer_size = estimate.params.buffer_size;

            self.engine.init_audio(rate, buffer_size);
            let request = TraceRequest::plain(self.config.trial_trace_len);
            let measurement = self
                .engine
                .capture_trace(&request)
                .and_then(|capture| {
                    analyze_drift(capture.trace.callback(), self.config.startup_skip, 0.0)
                });
            let measurement = match measurement {
                Ok(measurement) => measurement,
                Err(err) => {
                    self.log.append(format!("{} Hz skipped: {}", rate, err));
                    continue;
                }
            };
            self.log.append(measurement.to_string());

            if best.map_or(true, |b| measurement.jitter < b.jitter) {
                best = Some(CalibrationResult {
                    buffer_size,
                    sample_rate: rate,
                    jitter: measurement.jitter,
                });
            }
        }

        let best = best.ok_or_else(|| {
            LatencyError::DegenerateEstimate("no candidate sample rate could be measured".into())
        })?;
        self.log.append(format!("result: {} {}", best.buffer_size, best.sample_rate));
        log::info!(
            "calibrated to {} frames at {} ({:.3} ms jitter)",
            best.buffer_size,
            best.sample_rate_label(),
            best.jitter * 1000.0
        );
        self.params.lock().update_from(&best.params());
        Ok(best)
    }

    /// Run the four-configuration experiment sweep and submit the log.
    ///
    /// Never fails: engine and analysis errors turn into bad trials, upload
    /// errors are logged.
    pub fn run_sweep(&mut self) -> SweepReport {
        let benchmark = self.engine.cpu_bound_benchmark();
        self.log.append(benchmark);
        self.log.append(format!(
            "audio tests based on {} samples",
            self.config.trial_trace_len
        ));

        let mut params = self.params();
        let mut report = SweepReport::new(params);

        self.engine.init_audio(params.sample_rate, self.config.polling_frames);
        match self.estimate_buffer_size(&params) {
            Ok(estimate) => {
                report.estimated = Some(estimate.params);
                if params.update_from(&estimate.params) {
                    log::debug!("session params now {}", params);
                }
            }
            Err(err) => self.log.append(format!("keeping {}: {}", params, err)),
        }
        *self.params.lock() = params;
        report.params = params;

        self.engine.init_audio(params.sample_rate, params.buffer_size);
        // The actual rate is derived from what the device was measured to do.
        let drift_params = report.estimated.unwrap_or(params);
        let mut clock = SweepClock::default();
        for config in ExperimentConfig::sweep() {
            if self.cancel.is_stopped() {
                report.cancelled = true;
                break;
            }
            self.log.append(format!("experiment: {}", config));
            let config_report = self.run_config(config, &drift_params, &mut clock, &mut report);
            log::debug!("{} finished: {:?}", config, config_report.outcome);
            report.configs.push(config_report);
            self.log.append("");
        }
        if report.cancelled {
            self.log.append("sweep cancelled");
        }

        match self.sink.submit(&self.log.text()) {
            Ok(response) if response.is_empty() => {}
            Ok(response) => {
                self.log.append(response.clone());
                report.upload_response = Some(response);
            }
            Err(err) => self.log.append(format!("report not submitted: {}", err)),
        }

        if let Some(ref delegate) = self.delegate {
            delegate.on_sweep_finished(&report);
        }
        report
    }

    /// Run [`run_sweep`](ProbeRunner::run_sweep) on a named background thread.
    /// The runner is handed back with the report.
    pub fn spawn_sweep(mut self) -> Result<thread::JoinHandle<(Self, SweepReport)>, LatencyError> {
        thread::Builder::new()
            .name("probe-sweep".into())
            .spawn(move || {
                let report = self.run_sweep();
                (self, report)
            })
            .map_err(|e| LatencyError::ResourceUnavailable(format!("failed to spawn sweep: {}", e)))
    }

    // --- Internal helpers ---

    fn estimate_buffer_size(
        &mut self,
        params: &AudioParams,
    ) -> Result<BufferSizeEstimate, LatencyError> {
        let request = TraceRequest::plain(self.config.estimation_trace_len);
        let capture = self.engine.capture_trace(&request)?;
        let estimate = estimate_buffer_size(
            params,
            capture.trace.callback(),
            self.config.startup_skip,
            self.config.polling_frames,
        )?;
        self.log.append(format!("buffer size estimate = {:.1}", estimate.raw_estimate));
        self.log.append(format!("detected params: {}", estimate.params));
        Ok(estimate)
    }

    fn run_config(
        &mut self,
        config: ExperimentConfig,
        drift_params: &AudioParams,
        clock: &mut SweepClock,
        report: &mut SweepReport,
    ) -> ConfigReport {
        let mut tally = ConfigTally {
            streak: BadStreak::new(self.config.consecutive_bad_limit),
            bad_trials: 0,
            worst_render_end: 0.0,
            worst_jitter: 0.0,
        };

        let mut outcome = None;
        let mut trials = 0;
        for i in 0..self.config.trials_per_config {
            if self.cancel.is_stopped() {
                report.cancelled = true;
                break;
            }
            let (delay_callback, delay_render) = config.delays(i);
            let request = TraceRequest {
                len: self.config.trial_trace_len,
                delay_callback,
                delay_render,
                pulsed: config.pulsed,
            };
            let label = format!("{:.1}", i as f64 * 0.1);

            let verdict = match self.engine.capture_trace(&request) {
                Ok(capture) => {
                    self.log.append(format!("{}: {}", label, capture.status));
                    self.judge_trial(&capture.trace, drift_params, clock, report, &mut tally)
                }
                Err(err) => {
                    self.log.append(format!("{}: {}", label, err));
                    TrialVerdict::Bad
                }
            };
            trials = i + 1;

            if verdict.is_bad() {
                tally.bad_trials += 1;
            }
            if tally.streak.record(verdict) {
                outcome = Some(ConfigOutcome::Aborted {
                    at_trial: i,
                    bad_trials: tally.bad_trials,
                });
                break;
            }
        }

        ConfigReport {
            config,
            outcome: outcome.unwrap_or(ConfigOutcome::Completed {
                trials,
                bad_trials: tally.bad_trials,
            }),
            worst_render_end: tally.worst_render_end,
            worst_jitter: tally.worst_jitter,
        }
    }

    fn judge_trial(
        &self,
        trace: &TimestampTrace,
        drift_params: &AudioParams,
        clock: &mut SweepClock,
        report: &mut SweepReport,
        tally: &mut ConfigTally,
    ) -> TrialVerdict {
        let skip = self.config.startup_skip;
        let forced_rate = clock.locked_rate.unwrap_or(0.0);
        let drift = match analyze_drift(trace.callback(), skip, forced_rate) {
            Ok(drift) => drift,
            Err(err) => {
                self.log.append(err.to_string());
                return TrialVerdict::Bad;
            }
        };
        self.log.append(drift.to_string());

        if clock.locked_rate.is_none() {
            clock.locked_rate = Some(drift.rate);
            let actual = actual_sample_rate(drift_params, &drift);
            self.log.append(format!("Actual sample rate = {:.1}", actual));
            report.reference_rate = Some(drift.rate);
            report.actual_sample_rate = Some(actual);
        }

        let thread = analyze_jitter(trace, skip);
        self.log.append(thread.to_string());

        tally.worst_jitter = tally.worst_jitter.max(drift.jitter);
        tally.worst_render_end = tally.worst_render_end.max(thread.render_end);
        TrialVerdict::classify(
            &drift,
            &thread,
            self.config.max_jitter_secs,
            self.config.max_render_delay_secs,
        )
    }
}
