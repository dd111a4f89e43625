//! Native engine model driven by a seeded random number generator.

use std::hint::black_box;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use latency_core::models::error::LatencyError;
use latency_core::models::trace::{Channel, TimestampTrace};
use latency_core::traits::native_engine::{NativeEngine, TraceCapture, TraceRequest};

/// Engine delays are requested in units of 100 µs.
pub const DELAY_UNIT_SECS: f64 = 1e-4;

/// Spacing of back-to-back callbacks inside one native burst.
const BURST_SPACING_SECS: f64 = 2e-5;

/// Timing behaviour of the simulated audio device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceModel {
    /// Frames per native callback.
    pub native_frames: u32,
    /// Rate the hardware runs at; other rates go through a resampler.
    pub native_sample_rate: u32,
    /// Clock error of the device in parts per million.
    pub drift_ppm: f64,
    /// Upper bound of random callback lateness, in seconds.
    pub callback_jitter_secs: f64,
    /// Extra lateness bound when running at a non-native rate.
    pub resampler_jitter_secs: f64,
    pub callback_cost_secs: f64,
    /// Mean hand-off latency from the callback to the render thread.
    pub wake_latency_secs: f64,
    pub render_cost_secs: f64,
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            native_frames: 240,
            native_sample_rate: 48000,
            drift_ppm: 0.0,
            callback_jitter_secs: 0.0002,
            resampler_jitter_secs: 0.002,
            callback_cost_secs: 0.00005,
            wake_latency_secs: 0.0001,
            render_cost_secs: 0.0003,
        }
    }
}

impl DeviceModel {
    pub fn validate(&self) -> Result<(), String> {
        if self.native_frames == 0 || self.native_sample_rate == 0 {
            return Err("native frames and sample rate must be positive".into());
        }
        let costs = [
            self.callback_jitter_secs,
            self.resampler_jitter_secs,
            self.callback_cost_secs,
            self.wake_latency_secs,
            self.render_cost_secs,
        ];
        if costs.iter().any(|c| c.is_nan() || *c < 0.0) {
            return Err("timing costs must be non-negative".into());
        }
        Ok(())
    }
}

/// Simulated native engine.
///
/// When the requested buffer is smaller than the native one, callbacks come
/// in bursts of `native / requested` per native period, the pattern the
/// buffer size estimator looks for. Added delays follow the engine contract:
/// units of 100 µs, applied only on odd 50-tick blocks when pulsed.
pub struct SyntheticEngine {
    model: DeviceModel,
    rng: StdRng,
    sample_rate: u32,
    buffer_frames: u32,
    /// Simulated time at the end of the last trace.
    clock: f64,
}

impl SyntheticEngine {
    pub fn new(model: DeviceModel, seed: u64) -> Result<Self, LatencyError> {
        model.validate().map_err(LatencyError::ConfigurationFailed)?;
        Ok(Self {
            sample_rate: model.native_sample_rate,
            buffer_frames: model.native_frames,
            model,
            rng: StdRng::seed_from_u64(seed),
            clock: 0.0,
        })
    }

    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    fn lateness_bound(&self) -> f64 {
        if self.sample_rate == self.model.native_sample_rate {
            self.model.callback_jitter_secs
        } else {
            self.model.callback_jitter_secs + self.model.resampler_jitter_secs
        }
    }
}

impl NativeEngine for SyntheticEngine {
    fn init_audio(&mut self, sample_rate: u32, buffer_frames: u32) {
        log::debug!("synthetic engine at {} Hz, {} frames", sample_rate, buffer_frames);
        self.sample_rate = sample_rate.max(1);
        self.buffer_frames = buffer_frames.max(1);
    }

    fn capture_trace(&mut self, request: &TraceRequest) -> Result<TraceCapture, LatencyError> {
        let n = request.len;
        let clock_scale = 1.0 + self.model.drift_ppm * 1e-6;
        let native = self.model.native_frames as u64;
        let frames = self.buffer_frames as u64;
        let bursty = frames < native;
        let period_frames = if bursty { native } else { frames };
        let period = period_frames as f64 / self.sample_rate as f64 * clock_scale;
        // Callbacks needed to cover native buffer `k` when polling `frames` at a time.
        let burst_len = |k: u64| {
            if bursty {
                ((k + 1) * native / frames - k * native / frames) as usize
            } else {
                1
            }
        };
        let lateness = self.lateness_bound();
        let callback_delay = request.delay_callback as f64 * DELAY_UNIT_SECS;
        let render_delay = request.delay_render as f64 * DELAY_UNIT_SECS;

        let start = self.clock;
        let mut trace = TimestampTrace::zeroed(n);
        let (mut burst, mut pos) = (0u64, 0usize);
        for i in 0..n {
            let scheduled = start + burst as f64 * period + pos as f64 * BURST_SPACING_SECS;
            let callback = scheduled + self.rng.gen_range(0.0..=lateness);

            let active = !request.pulsed || (i / 50) & 1 == 1;
            let (extra_callback, extra_render) = if active {
                (callback_delay, render_delay)
            } else {
                (0.0, 0.0)
            };

            let done = callback + self.model.callback_cost_secs + extra_callback;
            let woken = done + self.model.wake_latency_secs * self.rng.gen_range(0.5..1.5);
            let rendered = woken + self.model.render_cost_secs + extra_render;

            trace.channel_mut(Channel::Callback)[i] = callback;
            trace.channel_mut(Channel::CallbackDone)[i] = done;
            trace.channel_mut(Channel::ThreadWoken)[i] = woken;
            trace.channel_mut(Channel::RenderComplete)[i] = rendered;

            pos += 1;
            if pos == burst_len(burst) {
                burst += 1;
                pos = 0;
            }
        }
        self.clock = start + (burst + 1) as f64 * period;

        let callbacks = trace.callback();
        let (min_gap, max_gap) = callbacks
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|gap| !bursty || *gap > BURST_SPACING_SECS * 10.0)
            .fold((f64::INFINITY, 0.0f64), |(lo, hi), gap| (lo.min(gap), hi.max(gap)));
        let spread = if min_gap.is_finite() { max_gap - min_gap } else { 0.0 };

        Ok(TraceCapture {
            trace,
            status: format!("OpenSL callback jitter = {:.3}ms", spread * 1000.0),
        })
    }

    fn cpu_bound_benchmark(&mut self) -> String {
        const ITERS: u64 = 10_000_000;
        let start = Instant::now();
        let mut acc = 0u64;
        for i in 0..ITERS {
            acc = black_box(acc.wrapping_mul(6364136223846793005).wrapping_add(i));
        }
        black_box(acc);
        format!("{} iters in {:.6}s", ITERS, start.elapsed().as_secs_f64())
    }

    /// Measures real thread hand-off latency on this machine.
    fn self_test(&mut self) -> String {
        const ROUNDS: usize = 100;
        let (tx, rx) = mpsc::channel::<Instant>();
        let (done_tx, done_rx) = mpsc::channel::<Duration>();

        let worker = thread::Builder::new()
            .name("synthetic-self-test".into())
            .spawn(move || {
                while let Ok(sent) = rx.recv() {
                    if done_tx.send(sent.elapsed()).is_err() {
                        break;
                    }
                }
            });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => return format!("self test failed: {}", e),
        };

        let mut wakes = Vec::with_capacity(ROUNDS);
        for _ in 0..ROUNDS {
            if tx.send(Instant::now()).is_err() {
                break;
            }
            match done_rx.recv() {
                Ok(latency) => wakes.push(latency.as_secs_f64()),
                Err(_) => break,
            }
            thread::sleep(Duration::from_micros(200));
        }
        drop(tx);
        let _ = worker.join();

        let render_start = Instant::now();
        let mut phase = 0.0f64;
        let mut out = vec![0i16; self.buffer_frames as usize];
        for sample in out.iter_mut() {
            phase += 440.0 / self.sample_rate as f64;
            *sample = ((phase * std::f64::consts::TAU).sin() * i16::MAX as f64) as i16;
        }
        black_box(&out);
        let render = render_start.elapsed().as_secs_f64();

        let max = wakes.iter().cloned().fold(0.0, f64::max);
        let mean = if wakes.is_empty() {
            0.0
        } else {
            wakes.iter().sum::<f64>() / wakes.len() as f64
        };
        format!(
            "max = {:.3}, mean = {:.3}, render = {:.3}",
            max * 1000.0,
            mean * 1000.0,
            render * 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use latency_core::analysis::{analyze_drift, analyze_jitter, estimate_buffer_size};
    use latency_core::models::params::AudioParams;

    fn engine(model: DeviceModel) -> SyntheticEngine {
        SyntheticEngine::new(model, 7).unwrap()
    }

    #[test]
    fn polling_bursts_reveal_native_buffer() {
        let mut engine = engine(DeviceModel {
            native_frames: 192,
            ..Default::default()
        });
        engine.init_audio(48000, 64);

        let capture = engine.capture_trace(&TraceRequest::plain(10_000)).unwrap();
        let estimate =
            estimate_buffer_size(&AudioParams::new(48000, 64), capture.trace.callback(), 100, 64)
                .unwrap();

        assert_eq!(estimate.params.buffer_size, 192);
    }

    #[test]
    fn drift_shows_up_in_fitted_rate() {
        let mut engine = engine(DeviceModel {
            drift_ppm: 500.0,
            callback_jitter_secs: 0.0,
            ..Default::default()
        });
        engine.init_audio(48000, 240);

        let capture = engine.capture_trace(&TraceRequest::plain(2_000)).unwrap();
        let drift = analyze_drift(capture.trace.callback(), 100, 0.0).unwrap();

        assert_relative_eq!(drift.rate, 240.0 / 48000.0 * 1.0005, max_relative = 1e-9);
        assert!(drift.jitter < 1e-9);
    }

    #[test]
    fn jitter_bounded_by_model() {
        let mut engine = engine(DeviceModel::default());
        engine.init_audio(48000, 240);

        let capture = engine.capture_trace(&TraceRequest::plain(2_000)).unwrap();
        let drift = analyze_drift(capture.trace.callback(), 100, 0.0).unwrap();

        assert!(drift.jitter <= 0.0002 * 1.1);
        assert!(drift.jitter > 0.0);
    }

    #[test]
    fn render_delay_applies_on_pulsed_blocks() {
        let mut engine = engine(DeviceModel::default());
        engine.init_audio(48000, 240);
        let request = TraceRequest {
            len: 400,
            delay_callback: 0,
            delay_render: 300,
            pulsed: true,
        };

        let capture = engine.capture_trace(&request).unwrap();
        let trace = &capture.trace;
        let render = |i: usize| {
            trace.channel(Channel::RenderComplete)[i] - trace.channel(Channel::ThreadWoken)[i]
        };

        // Block 2 (ticks 100..150) is even, block 3 odd.
        assert!(render(120) < 0.001);
        assert!(render(170) > 0.03);
        let tm = analyze_jitter(trace, 100);
        assert!(tm.render_end > 0.03);
    }

    #[test]
    fn traces_continue_in_time() {
        let mut engine = engine(DeviceModel::default());
        let first = engine.capture_trace(&TraceRequest::plain(200)).unwrap();
        let second = engine.capture_trace(&TraceRequest::plain(200)).unwrap();
        assert!(second.trace.callback()[0] > first.trace.callback()[199]);
    }

    #[test]
    fn same_seed_same_trace() {
        let mut a = engine(DeviceModel::default());
        let mut b = engine(DeviceModel::default());
        let request = TraceRequest::plain(500);
        assert_eq!(
            a.capture_trace(&request).unwrap(),
            b.capture_trace(&request).unwrap()
        );
    }

    #[test]
    fn status_and_benchmark_formats() {
        let mut engine = engine(DeviceModel::default());
        let capture = engine.capture_trace(&TraceRequest::plain(300)).unwrap();
        assert!(capture.status.starts_with("OpenSL callback jitter = "));
        assert!(capture.status.ends_with("ms"));

        let bench = engine.cpu_bound_benchmark();
        assert!(bench.starts_with("10000000 iters in "));

        let test = engine.self_test();
        assert!(test.starts_with("max = "));
        assert!(test.contains(", render = "));
    }

    #[test]
    fn invalid_model_is_rejected() {
        let model = DeviceModel {
            native_frames: 0,
            ..Default::default()
        };
        assert!(matches!(
            SyntheticEngine::new(model, 1),
            Err(LatencyError::ConfigurationFailed(_))
        ));
    }
}
