use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use latency_core::models::error::LatencyError;
use latency_core::models::trace::TimestampTrace;
use latency_core::traits::native_engine::{NativeEngine, TraceCapture, TraceRequest};

/// Calls received by a [`ScriptedEngine`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Init { sample_rate: u32, buffer_frames: u32 },
    Capture(TraceRequest),
}

/// Engine that replays queued captures and failures.
///
/// Every call is recorded in a journal that stays readable after the engine
/// has been moved into a runner. Once the script runs out, captures fail
/// with `EngineFailed`.
pub struct ScriptedEngine {
    script: VecDeque<Result<TraceCapture, LatencyError>>,
    journal: Arc<Mutex<Vec<EngineCall>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a trace with the given status line.
    pub fn push_trace(&mut self, trace: TimestampTrace, status: impl Into<String>) -> &mut Self {
        self.script.push_back(Ok(TraceCapture {
            trace,
            status: status.into(),
        }));
        self
    }

    pub fn push_failure(&mut self, error: LatencyError) -> &mut Self {
        self.script.push_back(Err(error));
        self
    }

    pub fn journal(&self) -> Arc<Mutex<Vec<EngineCall>>> {
        Arc::clone(&self.journal)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine for ScriptedEngine {
    fn init_audio(&mut self, sample_rate: u32, buffer_frames: u32) {
        self.journal.lock().push(EngineCall::Init {
            sample_rate,
            buffer_frames,
        });
    }

    fn capture_trace(&mut self, request: &TraceRequest) -> Result<TraceCapture, LatencyError> {
        self.journal.lock().push(EngineCall::Capture(*request));
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(LatencyError::EngineFailed("script exhausted".into())))
    }

    fn cpu_bound_benchmark(&mut self) -> String {
        "scripted engine".into()
    }

    fn self_test(&mut self) -> String {
        "max = 0.000, mean = 0.000, render = 0.000".into()
    }
}
