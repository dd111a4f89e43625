use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Args;
use serde::Serialize;

use latency_core::{
    CalibrationResult, LatencyError, LoopbackConfiguration, LoopbackDiagnostics, LoopbackSession,
    NullReportSink, ProbeConfiguration, ProbeRunner, ReportLog, ReportSink, StreamFormat,
    SweepReport,
};
use latency_sim::{DeviceModel, MemoryBackend, MemoryBackendOptions, StaticPlatform, SyntheticEngine};

use crate::console::ConsoleDelegate;
use crate::upload::HttpReportSink;

/// Simulated device and engine settings.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Native buffer size of the simulated device, in frames
    #[arg(long, default_value_t = 240)]
    pub native_frames: u32,

    /// Native sample rate of the simulated device, in Hz
    #[arg(long, default_value_t = 48000)]
    pub native_rate: u32,

    /// Device clock error in parts per million
    #[arg(long, default_value_t = 0.0)]
    pub drift_ppm: f64,

    /// Upper bound of callback lateness, in milliseconds
    #[arg(long, default_value_t = 0.2)]
    pub jitter_ms: f64,

    /// Render pass cost, in milliseconds
    #[arg(long, default_value_t = 0.3)]
    pub render_ms: f64,

    /// Seed for the simulated scheduling noise
    #[arg(long, default_value_t = 42, env = "LATENCY_PROBE_SEED")]
    pub seed: u64,

    /// Report these params as authoritative: <sample_rate> <buffer_size>
    #[arg(long, num_args = 2, value_names = ["RATE", "FRAMES"])]
    pub platform_params: Option<Vec<u32>>,

    /// Trials per experiment configuration
    #[arg(long, default_value_t = 100)]
    pub trials: u32,

    /// Print events and the final report as JSON
    #[arg(long)]
    pub json: bool,
}

impl EngineArgs {
    fn engine(&self) -> Result<SyntheticEngine, LatencyError> {
        let model = DeviceModel {
            native_frames: self.native_frames,
            native_sample_rate: self.native_rate,
            drift_ppm: self.drift_ppm,
            callback_jitter_secs: self.jitter_ms / 1000.0,
            render_cost_secs: self.render_ms / 1000.0,
            ..Default::default()
        };
        SyntheticEngine::new(model, self.seed)
    }

    fn platform(&self) -> StaticPlatform {
        let description = format!(
            "synthetic device, {} frames at {} Hz, seed {}",
            self.native_frames, self.native_rate, self.seed
        );
        match self.platform_params.as_deref() {
            Some([rate, frames]) => StaticPlatform::with_params(description, *rate, *frames),
            _ => StaticPlatform::new(description),
        }
    }

    fn runner(
        &self,
        sink: Arc<dyn ReportSink>,
        delegate: Arc<ConsoleDelegate>,
    ) -> Result<ProbeRunner, LatencyError> {
        let config = ProbeConfiguration {
            trials_per_config: self.trials,
            ..Default::default()
        };
        let log = Arc::new(ReportLog::with_delegate(delegate.clone()));
        let mut runner = ProbeRunner::new(
            Box::new(self.engine()?),
            Arc::new(self.platform()),
            sink,
            log,
            config,
        )?;
        runner.set_delegate(delegate);
        Ok(runner)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Post the report log to this URL
    #[arg(long, env = "LATENCY_PROBE_UPLOAD_URL")]
    pub upload_url: Option<String>,

    /// Sweep with the current params instead of calibrating first
    #[arg(long)]
    pub skip_calibration: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LoopbackArgs {
    /// Playback delay in tenths of a second (0-100)
    #[arg(long, default_value_t = 20)]
    pub delay: u32,

    /// How long to stream before stopping, in seconds
    #[arg(long, default_value_t = 3.0)]
    pub seconds: f64,

    /// Sample rate of the loopback streams, in Hz
    #[arg(long, default_value_t = 16000)]
    pub sample_rate: u32,

    /// Print events and diagnostics as JSON
    #[arg(long)]
    pub json: bool,
}

/// Final output of the `probe` command.
#[derive(Serialize)]
pub struct ProbeSummary {
    pub calibration: Option<CalibrationResult>,
    pub sweep: SweepReport,
}

pub fn calibrate(args: &EngineArgs) -> Result<CalibrationResult, LatencyError> {
    let delegate = ConsoleDelegate::new(args.json);
    let mut runner = args.runner(Arc::new(NullReportSink), delegate)?;
    runner.calibrate()
}

pub fn self_test(args: &EngineArgs) -> Result<String, LatencyError> {
    let delegate = ConsoleDelegate::new(args.json);
    let mut runner = args.runner(Arc::new(NullReportSink), delegate)?;
    Ok(runner.self_test())
}

pub fn probe(args: &ProbeArgs) -> Result<ProbeSummary, LatencyError> {
    let sink: Arc<dyn ReportSink> = match args.upload_url {
        Some(ref url) => Arc::new(HttpReportSink::new(url.clone())?),
        None => Arc::new(NullReportSink),
    };
    let delegate = ConsoleDelegate::new(args.engine.json);
    let mut runner = args.engine.runner(sink, delegate)?;

    let calibration = if args.skip_calibration {
        None
    } else {
        Some(runner.calibrate()?)
    };

    let handle = runner.spawn_sweep()?;
    let (_runner, sweep) = handle
        .join()
        .map_err(|_| LatencyError::InvalidState("sweep thread panicked".into()))?;
    Ok(ProbeSummary { calibration, sweep })
}

pub fn loopback(args: &LoopbackArgs) -> Result<LoopbackDiagnostics, LatencyError> {
    let format = StreamFormat::mono(args.sample_rate);
    let backend = MemoryBackend::new(MemoryBackendOptions::realtime(format, 320));

    let mut config = LoopbackConfiguration {
        sample_rate: args.sample_rate,
        ..Default::default()
    };
    if !config.set_delay_deciseconds(args.delay) {
        return Err(LatencyError::ConfigurationFailed(format!(
            "delay {} ds out of range 0..={}",
            args.delay,
            LoopbackConfiguration::MAX_DELAY_DECISECONDS
        )));
    }

    let run_for = stream_duration(args.seconds)?;

    let mut session = LoopbackSession::new(backend, config);
    session.set_delegate(ConsoleDelegate::new(args.json));
    session.start()?;
    thread::sleep(run_for);
    session.stop()
}

fn stream_duration(seconds: f64) -> Result<Duration, LatencyError> {
    Duration::try_from_secs_f64(seconds).map_err(|e| {
        LatencyError::ConfigurationFailed(format!("invalid duration of {} s: {}", seconds, e))
    })
}
