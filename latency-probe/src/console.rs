use std::sync::Arc;

use serde::Serialize;

use latency_core::{LatencyError, LoopbackDelegate, LoopbackState, ProbeDelegate, SweepReport};

/// Delegate that prints session events to the terminal.
///
/// In JSON mode every event is one JSON object per line on stderr, leaving
/// stdout for the final report.
pub struct ConsoleDelegate {
    json: bool,
}

impl ConsoleDelegate {
    pub fn new(json: bool) -> Arc<Self> {
        Arc::new(Self { json })
    }

    fn emit<T: Serialize>(&self, payload: &T, plain: impl FnOnce() -> String) {
        if self.json {
            match serde_json::to_string(payload) {
                Ok(line) => eprintln!("{}", line),
                Err(e) => log::warn!("failed to encode event: {}", e),
            }
        } else {
            println!("{}", plain());
        }
    }
}

// -- Event payloads --

#[derive(Serialize)]
#[serde(tag = "event", rename = "log")]
struct LogLinePayload<'a> {
    line: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "event", rename = "sweep_finished")]
struct SweepFinishedPayload<'a> {
    id: &'a str,
    configs: usize,
    aborted: usize,
    upload_response: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(tag = "event", rename = "state")]
struct StatePayload {
    state: &'static str,
    prefill_bytes: usize,
}

#[derive(Serialize)]
#[serde(tag = "event", rename = "error")]
struct ErrorPayload {
    message: String,
}

impl ProbeDelegate for ConsoleDelegate {
    fn on_log_line(&self, line: &str) {
        self.emit(&LogLinePayload { line }, || line.to_string());
    }

    fn on_sweep_finished(&self, report: &SweepReport) {
        let aborted = report.configs.iter().filter(|c| c.outcome.is_aborted()).count();
        let payload = SweepFinishedPayload {
            id: &report.id,
            configs: report.configs.len(),
            aborted,
            upload_response: report.upload_response.as_deref(),
        };
        self.emit(&payload, || {
            format!(
                "sweep {} finished: {} configurations, {} aborted",
                report.id,
                report.configs.len(),
                aborted
            )
        });
    }
}

impl LoopbackDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &LoopbackState) {
        let (name, prefill_bytes) = match state {
            LoopbackState::Idle => ("idle", 0),
            LoopbackState::Starting => ("starting", 0),
            LoopbackState::Running { prefill_bytes } => ("running", *prefill_bytes),
            LoopbackState::Stopping => ("stopping", 0),
            LoopbackState::Failed(_) => ("failed", 0),
        };
        self.emit(
            &StatePayload {
                state: name,
                prefill_bytes,
            },
            || format!("loopback {}", name),
        );
    }

    fn on_error(&self, error: &LatencyError) {
        self.emit(
            &ErrorPayload {
                message: error.to_string(),
            },
            || format!("loopback error: {}", error),
        );
    }
}
