use std::sync::Arc;

use parking_lot::Mutex;

use crate::traits::delegate::ProbeDelegate;

/// Accumulated text log of a probe session.
///
/// Written from the probe thread and read from the host thread, so lines are
/// kept behind a mutex. Each line is also mirrored to the `log` facade and
/// forwarded to the delegate, if any.
pub struct ReportLog {
    lines: Mutex<Vec<String>>,
    delegate: Option<Arc<dyn ProbeDelegate>>,
}

impl ReportLog {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            delegate: None,
        }
    }

    pub fn with_delegate(delegate: Arc<dyn ProbeDelegate>) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            delegate: Some(delegate),
        }
    }

    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        log::info!(target: "latency_core::report", "{}", line);
        self.lines.lock().push(line.clone());
        if let Some(ref delegate) = self.delegate {
            delegate.on_log_line(&line);
        }
    }

    /// All lines joined with newlines, as submitted to the report sink.
    pub fn text(&self) -> String {
        self.lines.lock().join("\n")
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Default for ReportLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Collector(Mutex<Vec<String>>);

    impl ProbeDelegate for Collector {
        fn on_log_line(&self, line: &str) {
            self.0.lock().push(line.to_string());
        }
    }

    #[test]
    fn text_is_newline_joined() {
        let log = ReportLog::new();
        log.append("first");
        log.append(String::from("second"));
        log.append("");

        assert_eq!(log.text(), "first\nsecond\n");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn forwards_lines_to_delegate() {
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let log = ReportLog::with_delegate(collector.clone());
        log.append("hello");

        assert_eq!(*collector.0.lock(), vec!["hello".to_string()]);
    }

    #[test]
    fn appends_from_worker_threads() {
        let log = Arc::new(ReportLog::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..25 {
                        log.append(format!("{}:{}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.len(), 100);
        log.clear();
        assert!(log.is_empty());
    }
}
