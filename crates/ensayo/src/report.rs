//! Reporting sink boundary.
//!
//! The core emits pass/fail/info events and end-of-session records through
//! the [`ReportSink`] trait; report rendering (HTML layout, styling) lives
//! entirely behind that boundary and is out of scope here.

use crate::artifacts::ArtifactPaths;
use crate::engine::Screenshot;
use crate::result::EnsayoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Severity of a report event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Informational step
    Info,
    /// Passing assertion or milestone
    Pass,
    /// Failure
    Fail,
    /// Non-fatal problem (teardown errors, skips)
    Warn,
}

/// Final status of one test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    /// Test passed
    Passed,
    /// Test failed
    Failed,
    /// Test was skipped
    Skipped,
}

impl TestStatus {
    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Which outcomes get a screenshot attached at session end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenshotPolicy {
    /// Every outcome
    All,
    /// Failed tests only
    #[default]
    Failed,
    /// Passed tests only
    Passed,
    /// Never capture
    None,
}

impl ScreenshotPolicy {
    /// Whether a screenshot should be captured for the given status
    #[must_use]
    pub const fn should_capture(self, status: TestStatus) -> bool {
        match self {
            Self::All => true,
            Self::Failed => status.is_failed(),
            Self::Passed => status.is_passed(),
            Self::None => false,
        }
    }
}

impl FromStr for ScreenshotPolicy {
    type Err = EnsayoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "failed" => Ok(Self::Failed),
            "passed" => Ok(Self::Passed),
            "none" => Ok(Self::None),
            other => Err(EnsayoError::config(format!(
                "unknown screenshot policy: {other}"
            ))),
        }
    }
}

/// Immutable record of one finished test execution.
///
/// Produced at teardown and handed to the sink; never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Test name
    pub test_name: String,
    /// Final status
    pub status: TestStatus,
    /// Failure detail, if any
    pub error: Option<String>,
    /// When the record was produced
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Create a passing record
    #[must_use]
    pub fn passed(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            status: TestStatus::Passed,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a failing record
    #[must_use]
    pub fn failed(test_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            status: TestStatus::Failed,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// Create a skipped record
    #[must_use]
    pub fn skipped(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            status: TestStatus::Skipped,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver for report events and session outcomes.
///
/// Implementations own their file layout and rendering. The harness calls
/// `on_event` for step-level messages (optionally with a screenshot) and
/// `on_session_end` exactly once per test execution.
pub trait ReportSink: Send + Sync {
    /// Record a step-level event
    fn on_event(&self, level: LogLevel, message: &str, screenshot: Option<&Screenshot>);

    /// Record the outcome of one test execution
    fn on_session_end(&self, record: &ExecutionRecord);
}

/// Sink that forwards events to `tracing` and persists screenshots through
/// [`ArtifactPaths`].
#[derive(Debug)]
pub struct TracingSink {
    artifacts: Option<Arc<ArtifactPaths>>,
}

impl TracingSink {
    /// Create a sink that only logs
    #[must_use]
    pub fn new() -> Self {
        Self { artifacts: None }
    }

    /// Create a sink that also saves screenshot attachments
    #[must_use]
    pub fn with_artifacts(artifacts: Arc<ArtifactPaths>) -> Self {
        Self {
            artifacts: Some(artifacts),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for TracingSink {
    fn on_event(&self, level: LogLevel, message: &str, screenshot: Option<&Screenshot>) {
        match level {
            LogLevel::Info | LogLevel::Pass => tracing::info!(?level, "{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Fail => tracing::error!("{message}"),
        }
        if let (Some(shot), Some(artifacts)) = (screenshot, &self.artifacts) {
            match artifacts.save_screenshot(shot, message) {
                Ok(path) => tracing::info!(path = %path.display(), "screenshot saved"),
                Err(e) => tracing::warn!("failed to save screenshot: {e}"),
            }
        }
    }

    fn on_session_end(&self, record: &ExecutionRecord) {
        match record.status {
            TestStatus::Passed => tracing::info!(test = %record.test_name, "test passed"),
            TestStatus::Skipped => tracing::warn!(test = %record.test_name, "test skipped"),
            TestStatus::Failed => tracing::error!(
                test = %record.test_name,
                error = record.error.as_deref().unwrap_or(""),
                "test failed"
            ),
        }
    }
}

/// Recorded event as seen by [`MemorySink`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Event level
    pub level: LogLevel,
    /// Event message
    pub message: String,
    /// Whether a screenshot was attached
    pub had_screenshot: bool,
}

/// In-memory sink for assertions in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RecordedEvent>>,
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemorySink {
    /// Create an empty memory sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Session records received so far
    #[must_use]
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl ReportSink for MemorySink {
    fn on_event(&self, level: LogLevel, message: &str, screenshot: Option<&Screenshot>) {
        self.events.lock().unwrap().push(RecordedEvent {
            level,
            message: message.to_string(),
            had_screenshot: screenshot.is_some(),
        });
    }

    fn on_session_end(&self, record: &ExecutionRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Initialize the global `tracing` subscriber from `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_should_capture() {
        assert!(ScreenshotPolicy::All.should_capture(TestStatus::Skipped));
        assert!(ScreenshotPolicy::Failed.should_capture(TestStatus::Failed));
        assert!(!ScreenshotPolicy::Failed.should_capture(TestStatus::Passed));
        assert!(ScreenshotPolicy::Passed.should_capture(TestStatus::Passed));
        assert!(!ScreenshotPolicy::None.should_capture(TestStatus::Failed));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("ALL".parse::<ScreenshotPolicy>().unwrap(), ScreenshotPolicy::All);
        assert!("sometimes".parse::<ScreenshotPolicy>().is_err());
    }

    #[test]
    fn test_record_constructors() {
        let rec = ExecutionRecord::failed("login", "element not found");
        assert_eq!(rec.status, TestStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("element not found"));
        assert!(ExecutionRecord::passed("login").error.is_none());
    }

    #[test]
    fn test_memory_sink_records_events() {
        let sink = MemorySink::new();
        sink.on_event(LogLevel::Info, "step one", None);
        sink.on_session_end(&ExecutionRecord::passed("t"));
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.records().len(), 1);
        assert!(!sink.events()[0].had_screenshot);
    }
}
