// Diagnostic channel
//
// Failures the core swallows (attribute reads, unexpected session errors)
// are reported here instead of being returned to the caller.

use std::error::Error;
use std::sync::Mutex;
use tracing::error;

pub trait DiagnosticSink: Send + Sync {
    /// Report a failure that was handled locally
    fn report(&self, context: &str, error: &dyn Error);
}

/// Sink that forwards every report to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, context: &str, err: &dyn Error) {
        error!("{}: {}", context, err);
    }
}

/// Sink that keeps reports in memory, for tests and the scenario driver
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.reports().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, context: &str, err: &dyn Error) {
        error!("{}: {}", context, err);
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(format!("{}: {}", context, err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    #[test]
    fn test_recording_sink_keeps_reports() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());

        sink.report("create request", &SessionError::Failed("INVALID_CLASS".into()));

        assert_eq!(sink.reports(), vec!["create request: INVALID_CLASS".to_string()]);
    }
}
