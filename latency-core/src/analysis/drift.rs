use crate::models::error::LatencyError;
use crate::models::measurement::JitterMeasurement;
use crate::models::params::AudioParams;

/// Fit the clock rate of one trace channel and measure its jitter.
///
/// The rate is the least-squares slope of timestamp against tick index over
/// `[startup_skip, n)`. Jitter is the peak-to-peak spread of
/// `reference · i − value[i]`, where the reference is `forced_rate` when
/// nonzero and the fitted slope otherwise. Only the slope is used as
/// reference; the intercept is not removed, so a constant offset cancels out
/// in the spread.
///
/// The returned `rate` is always the fitted slope, even when a forced rate
/// was used for the jitter.
pub fn analyze_drift(
    values: &[f64],
    startup_skip: usize,
    forced_rate: f64,
) -> Result<JitterMeasurement, LatencyError> {
    let n = values.len();
    if n < startup_skip + 2 {
        return Err(LatencyError::DegenerateEstimate(format!(
            "need at least two ticks after the startup skip, got {}",
            n.saturating_sub(startup_skip)
        )));
    }

    let count = (n - startup_skip) as f64;
    let (mut xs, mut ys, mut xys, mut x2s) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in values.iter().enumerate().skip(startup_skip) {
        let x = i as f64;
        xs += x;
        ys += y;
        xys += x * y;
        x2s += x * x;
    }
    let beta = (count * xys - xs * ys) / (count * x2s - xs * xs);

    let reference = if forced_rate == 0.0 { beta } else { forced_rate };
    let (min_err, max_err) = values
        .iter()
        .enumerate()
        .skip(startup_skip)
        .map(|(i, &y)| reference * i as f64 - y)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), err| {
            (lo.min(err), hi.max(err))
        });

    Ok(JitterMeasurement {
        rate: beta,
        jitter: max_err - min_err,
    })
}

/// Sample rate implied by the measured callback period.
pub fn actual_sample_rate(params: &AudioParams, measurement: &JitterMeasurement) -> f64 {
    params.buffer_size as f64 / measurement.rate
}
