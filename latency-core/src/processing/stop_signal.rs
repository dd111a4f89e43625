use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Cooperative cancellation flag that idle workers can wait on.
///
/// Workers poll [`is_stopped`](StopSignal::is_stopped) at the top of each loop
/// and park in [`wait_timeout`](StopSignal::wait_timeout) when they have
/// nothing to do; `stop` wakes them immediately instead of after the timeout.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    /// Re-arm the signal for the next session.
    pub fn reset(&self) {
        *self.stopped.lock() = false;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Wait until stopped or `timeout` elapses. Returns whether stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cond.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}
