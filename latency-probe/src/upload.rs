use std::time::Duration;

use latency_core::{LatencyError, ReportSink};

/// Posts the report log as the form field `content`.
pub struct HttpReportSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpReportSink {
    pub fn new(url: impl Into<String>) -> Result<Self, LatencyError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("latency-probe/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LatencyError::UploadFailed(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ReportSink for HttpReportSink {
    fn submit(&self, report: &str) -> Result<String, LatencyError> {
        log::debug!("uploading {} bytes of report to {}", report.len(), self.url);
        let response = self
            .client
            .post(&self.url)
            .form(&[("content", report)])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| LatencyError::UploadFailed(e.to_string()))?;
        response
            .text()
            .map(|body| body.trim_end().to_string())
            .map_err(|e| LatencyError::UploadFailed(e.to_string()))
    }
}
