use crate::models::measurement::ThreadMeasurement;
use crate::models::trace::{Channel, TimestampTrace};

/// Worst-case delay of each later stage relative to the callback timestamp.
///
/// Only ticks at or after `startup_skip` count. A single scheduling hiccup
/// dominates the result; this is a tail-latency measure, not an average.
pub fn analyze_jitter(trace: &TimestampTrace, startup_skip: usize) -> ThreadMeasurement {
    let callback = trace.callback();
    let cb_done = trace.channel(Channel::CallbackDone);
    let woken = trace.channel(Channel::ThreadWoken);
    let rendered = trace.channel(Channel::RenderComplete);

    let mut tm = ThreadMeasurement::default();
    for i in startup_skip..trace.len() {
        let start = callback[i];
        tm.cb_done = tm.cb_done.max(cb_done[i] - start);
        tm.render_start = tm.render_start.max(woken[i] - start);
        tm.render_end = tm.render_end.max(rendered[i] - start);
    }
    tm
}
