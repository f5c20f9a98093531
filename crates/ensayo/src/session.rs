//! Session lifecycle management.
//!
//! One isolated browser session per test execution: the manager resolves
//! per-key configuration overrides, acquires browser → context → page →
//! trace in order, registers the handles in the [`SessionRegistry`], and
//! guarantees full release before the key can begin another test, on every
//! exit path, including start failures.
//!
//! State machine per key: `Idle → Starting → Active → Ending → Idle`.
//! `Starting` is rejected while a session is active; `Ending` always
//! completes to `Idle`, even when individual teardown steps fail.

use crate::artifacts::ArtifactPaths;
use crate::config::HarnessConfig;
use crate::engine::{
    BrowserEngine, BrowserId, BrowserKind, ContextId, ContextOptions, LaunchOptions, TraceOptions,
};
use crate::registry::{Session, SessionKey, SessionRegistry};
use crate::report::{ExecutionRecord, LogLevel, ReportSink, TestStatus};
use crate::result::{EnsayoError, EnsayoResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Lifecycle state of one key's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session; the key may begin one
    #[default]
    Idle,
    /// `begin_session` is acquiring resources
    Starting,
    /// Session is registered and usable
    Active,
    /// `end_session` is releasing resources
    Ending,
}

/// Per-test configuration overrides, taking precedence over the global
/// configuration during the next `begin_session` on the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Browser kind override
    pub browser: Option<BrowserKind>,
    /// Headless override
    pub headless: Option<bool>,
    /// Target URL override
    pub base_url: Option<String>,
}

impl Overrides {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the browser kind
    #[must_use]
    pub const fn with_browser(mut self, kind: BrowserKind) -> Self {
        self.browser = Some(kind);
        self
    }

    /// Override headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    /// Override the target URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Whether nothing is overridden
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.browser.is_none() && self.headless.is_none() && self.base_url.is_none()
    }
}

/// Key-partitioned override storage.
///
/// Overrides are write-once per test and **single-use**: the next
/// `begin_session` on the key consumes them, so a later test on the same
/// worker cannot silently inherit a previous test's configuration.
#[derive(Debug, Default)]
pub struct OverrideChannel {
    inner: Mutex<HashMap<SessionKey, Overrides>>,
}

impl OverrideChannel {
    /// Create an empty channel
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the browser kind for a key's next session
    pub fn set_browser_for(&self, key: SessionKey, kind: BrowserKind) {
        self.inner.lock().unwrap().entry(key).or_default().browser = Some(kind);
    }

    /// Set headless mode for a key's next session
    pub fn set_headless_for(&self, key: SessionKey, headless: bool) {
        self.inner.lock().unwrap().entry(key).or_default().headless = Some(headless);
    }

    /// Set the target URL for a key's next session
    pub fn set_base_url_for(&self, key: SessionKey, url: impl Into<String>) {
        self.inner.lock().unwrap().entry(key).or_default().base_url = Some(url.into());
    }

    /// Set the browser kind for the calling thread's next session
    pub fn set_browser(&self, kind: BrowserKind) {
        self.set_browser_for(SessionKey::current(), kind);
    }

    /// Set headless mode for the calling thread's next session
    pub fn set_headless(&self, headless: bool) {
        self.set_headless_for(SessionKey::current(), headless);
    }

    /// Set the target URL for the calling thread's next session
    pub fn set_base_url(&self, url: impl Into<String>) {
        self.set_base_url_for(SessionKey::current(), url);
    }

    /// Replace a key's pending overrides wholesale
    pub fn set_for(&self, key: SessionKey, overrides: Overrides) {
        self.inner.lock().unwrap().insert(key, overrides);
    }

    /// Consume a key's pending overrides
    #[must_use]
    pub fn take_for(&self, key: SessionKey) -> Overrides {
        self.inner.lock().unwrap().remove(&key).unwrap_or_default()
    }
}

/// Outcome of `end_session`: every release step is attempted, and errors
/// are collected here instead of being thrown, so cleanup failures can
/// never mask the test's own result.
#[derive(Debug, Default)]
pub struct TeardownReport {
    errors: Vec<EnsayoError>,
}

impl TeardownReport {
    /// Whether every release step succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collected release errors, in the order the steps ran
    #[must_use]
    pub fn errors(&self) -> &[EnsayoError] {
        &self.errors
    }
}

/// Resources acquired so far during `begin_session`, released in reverse
/// order when a later step fails
enum Acquired {
    Browser(BrowserId),
    Context(ContextId),
}

/// Coordinates one isolated session per key.
///
/// Owns the registry and the override channel; shared across test threads
/// behind an `Arc`.
pub struct SessionManager {
    engine: Arc<dyn BrowserEngine>,
    config: Arc<HarnessConfig>,
    artifacts: Arc<ArtifactPaths>,
    sink: Arc<dyn ReportSink>,
    registry: Arc<SessionRegistry>,
    overrides: OverrideChannel,
    states: Mutex<HashMap<SessionKey, SessionState>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("active_sessions", &self.registry.len())
            .finish()
    }
}

impl SessionManager {
    /// Create a manager over an engine, configuration, artifact layout,
    /// and report sink
    #[must_use]
    pub fn new(
        engine: Arc<dyn BrowserEngine>,
        config: Arc<HarnessConfig>,
        artifacts: Arc<ArtifactPaths>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            engine,
            config,
            artifacts,
            sink,
            registry: Arc::new(SessionRegistry::new()),
            overrides: OverrideChannel::new(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// The session registry
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The override channel
    #[must_use]
    pub fn overrides(&self) -> &OverrideChannel {
        &self.overrides
    }

    /// The browser engine
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn BrowserEngine> {
        &self.engine
    }

    /// The loaded configuration
    #[must_use]
    pub fn config(&self) -> &Arc<HarnessConfig> {
        &self.config
    }

    /// Current lifecycle state of a key
    #[must_use]
    pub fn state_for(&self, key: SessionKey) -> SessionState {
        self.states
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or_default()
    }

    fn set_state(&self, key: SessionKey, state: SessionState) {
        let mut states = self.states.lock().unwrap();
        if state == SessionState::Idle {
            states.remove(&key);
        } else {
            states.insert(key, state);
        }
    }

    /// Begin a session for the calling thread
    pub fn begin_session(&self, test_name: &str) -> EnsayoResult<()> {
        self.begin_session_for(SessionKey::current(), test_name)
    }

    /// Begin a session for a key.
    ///
    /// Resolves effective browser/headless/URL (override → config default),
    /// then acquires browser → context (fixed viewport, exclusive video
    /// dir) → page → trace and navigates to the target URL. On any failure
    /// everything acquired so far is closed in reverse order, nothing is
    /// left in the registry, and `SessionStart` wrapping the cause is
    /// returned.
    pub fn begin_session_for(&self, key: SessionKey, test_name: &str) -> EnsayoResult<()> {
        {
            let mut states = self.states.lock().unwrap();
            match states.get(&key).copied().unwrap_or_default() {
                SessionState::Idle => {
                    states.insert(key, SessionState::Starting);
                }
                other => {
                    return Err(EnsayoError::session_start(format!(
                        "{test_name}: a session is already {other:?} on {key:?}"
                    )));
                }
            }
        }

        let mut acquired: Vec<Acquired> = Vec::new();
        match self.acquire(key, test_name, &mut acquired) {
            Ok(session) => {
                self.registry.insert(key, session);
                self.set_state(key, SessionState::Active);
                Ok(())
            }
            Err(cause) => {
                self.release_acquired(&acquired);
                self.registry.clear(key);
                self.set_state(key, SessionState::Idle);
                let message = format!("{test_name}: {cause}");
                self.sink.on_event(LogLevel::Fail, &message, None);
                Err(EnsayoError::session_start(message))
            }
        }
    }

    fn acquire(
        &self,
        key: SessionKey,
        test_name: &str,
        acquired: &mut Vec<Acquired>,
    ) -> EnsayoResult<Session> {
        let overrides = self.overrides.take_for(key);
        let kind = overrides.browser.unwrap_or_else(|| self.config.browser());
        let headless = overrides.headless.unwrap_or_else(|| self.config.headless());
        let url = overrides.base_url.unwrap_or_else(|| self.config.base_url());

        tracing::info!(
            test = test_name,
            browser = kind.name(),
            headless,
            url = %url,
            "starting session"
        );

        let launch = LaunchOptions::new().with_headless(headless);
        let browser = self.engine.launch(kind, &launch)?;
        acquired.push(Acquired::Browser(browser));

        let video_dir = self.artifacts.video_dir_for(test_name)?;
        let ctx_opts = ContextOptions::new().with_video_dir(&video_dir);
        let context = self.engine.new_context(browser, &ctx_opts)?;
        acquired.push(Acquired::Context(context));

        let page = self.engine.new_page(context)?;
        let main_frame = self.engine.main_frame(page)?;
        self.engine.start_tracing(context, &TraceOptions::default())?;
        self.engine.goto(page, &url)?;

        self.sink.on_event(
            LogLevel::Info,
            &format!("session started: {} | headless={headless} | {url}", kind.name()),
            None,
        );

        Ok(Session {
            test_name: test_name.to_string(),
            browser,
            context,
            page,
            main_frame,
            frame_override: None,
            video_dir,
            trace_path: self.artifacts.trace_path_for(test_name),
            started_at: Instant::now(),
        })
    }

    fn release_acquired(&self, acquired: &[Acquired]) {
        for resource in acquired.iter().rev() {
            let result = match resource {
                Acquired::Context(id) => self.engine.close_context(*id),
                Acquired::Browser(id) => self.engine.close_browser(*id),
            };
            if let Err(e) = result {
                tracing::warn!("cleanup after failed start: {e}");
            }
        }
    }

    /// End the calling thread's session
    pub fn end_session(&self, record: &ExecutionRecord) -> TeardownReport {
        self.end_session_for(SessionKey::current(), record)
    }

    /// End a key's session, regardless of outcome.
    ///
    /// Captures a screenshot per the configured policy while the page is
    /// still open, notifies the sink, then releases in reverse-acquisition
    /// order: trace stop → context → browser, finally renaming the
    /// session's recording and clearing the registry entry. Every step runs
    /// even when an earlier one fails; errors are collected in the returned
    /// report and logged, never thrown.
    pub fn end_session_for(&self, key: SessionKey, record: &ExecutionRecord) -> TeardownReport {
        self.set_state(key, SessionState::Ending);
        let mut report = TeardownReport::default();

        let Some(session) = self.registry.remove(key) else {
            // Begin failures still get a report entry
            tracing::warn!(test = %record.test_name, "end_session with no active session");
            self.sink.on_session_end(record);
            self.set_state(key, SessionState::Idle);
            return report;
        };

        self.capture_outcome_screenshot(&session, record, &mut report);
        self.sink.on_session_end(record);

        if let Err(e) = self.engine.stop_tracing(session.context, &session.trace_path) {
            self.note_teardown_error(&mut report, "trace", &e);
        } else {
            tracing::info!(path = %session.trace_path.display(), "trace saved");
        }

        if let Err(e) = self.engine.close_context(session.context) {
            self.note_teardown_error(&mut report, "context", &e);
        }

        if let Err(e) = self.engine.close_browser(session.browser) {
            self.note_teardown_error(&mut report, "browser", &e);
        }

        match self.artifacts.finalize_recording(&session.video_dir, &record.test_name) {
            Ok(Some(path)) => {
                tracing::info!(path = %path.display(), "video saved");
            }
            Ok(None) => {}
            Err(e) => self.note_teardown_error(&mut report, "video", &e),
        }

        self.registry.clear(key);
        self.set_state(key, SessionState::Idle);
        tracing::info!(
            test = %record.test_name,
            elapsed_ms = session.started_at.elapsed().as_millis() as u64,
            clean = report.is_clean(),
            "session ended"
        );
        report
    }

    fn capture_outcome_screenshot(
        &self,
        session: &Session,
        record: &ExecutionRecord,
        report: &mut TeardownReport,
    ) {
        if !self.config.screenshot_policy().should_capture(record.status) {
            return;
        }
        let full_page = self.config.screenshot_fullpage();
        match self.engine.screenshot(session.page, full_page) {
            Ok(shot) => {
                let (level, message) = match record.status {
                    TestStatus::Passed => {
                        (LogLevel::Pass, format!("{} passed", record.test_name))
                    }
                    TestStatus::Skipped => {
                        (LogLevel::Warn, format!("{} skipped", record.test_name))
                    }
                    TestStatus::Failed => (
                        LogLevel::Fail,
                        format!(
                            "{} failed: {}",
                            record.test_name,
                            record.error.as_deref().unwrap_or("unknown error")
                        ),
                    ),
                };
                self.sink.on_event(level, &message, Some(&shot));
            }
            Err(e) => self.note_teardown_error(report, "screenshot", &e),
        }
    }

    fn note_teardown_error(
        &self,
        report: &mut TeardownReport,
        resource: &str,
        cause: &EnsayoError,
    ) {
        let err = EnsayoError::teardown(resource, cause.to_string());
        tracing::warn!("{err}");
        self.sink.on_event(LogLevel::Warn, &err.to_string(), None);
        report.errors.push(err);
    }

    /// Report a test that never got a session, such as a fail-fast skip,
    /// straight to the sink. No lifecycle state is touched.
    pub fn report_skipped(&self, record: &ExecutionRecord) {
        tracing::info!(test = %record.test_name, "skipped before session start");
        self.sink.on_session_end(record);
    }

    /// Select a named child frame of a key's active page for subsequent
    /// operations
    pub fn select_frame_for(&self, key: SessionKey, name: &str) -> EnsayoResult<()> {
        let page = self.registry.active_page_for(key)?;
        let frame = self.engine.frame_by_name(page, name)?;
        self.registry.set_active_frame_for(key, frame)
    }

    /// Select a named child frame on the calling thread
    pub fn select_frame(&self, name: &str) -> EnsayoResult<()> {
        self.select_frame_for(SessionKey::current(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MockEngine, MockOp};
    use crate::report::MemorySink;

    struct Fixture {
        _tmp: tempfile::TempDir,
        engine: Arc<MockEngine>,
        sink: Arc<MemorySink>,
        manager: SessionManager,
    }

    fn fixture(config: &str) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let sink = Arc::new(MemorySink::new());
        let artifacts = Arc::new(ArtifactPaths::new(tmp.path().join("ensayo")));
        artifacts.prepare().unwrap();
        let manager = SessionManager::new(
            engine.clone(),
            Arc::new(HarnessConfig::parse(config)),
            artifacts,
            sink.clone(),
        );
        Fixture {
            _tmp: tmp,
            engine,
            sink,
            manager,
        }
    }

    mod override_channel_tests {
        use super::*;

        #[test]
        fn test_take_consumes() {
            let channel = OverrideChannel::new();
            let key = SessionKey::token(1);
            channel.set_headless_for(key, true);
            channel.set_base_url_for(key, "https://staging.example.com");
            let taken = channel.take_for(key);
            assert_eq!(taken.headless, Some(true));
            assert_eq!(taken.base_url.as_deref(), Some("https://staging.example.com"));
            assert!(channel.take_for(key).is_empty());
        }

        #[test]
        fn test_keys_are_independent() {
            let channel = OverrideChannel::new();
            channel.set_browser_for(SessionKey::token(1), BrowserKind::Firefox);
            assert!(channel.take_for(SessionKey::token(2)).is_empty());
            assert_eq!(
                channel.take_for(SessionKey::token(1)).browser,
                Some(BrowserKind::Firefox)
            );
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_begin_and_end_happy_path() {
            let fx = fixture("browser=chrome\nbaseUrl=https://example.com");
            let key = SessionKey::token(1);
            fx.manager.begin_session_for(key, "login").unwrap();
            assert_eq!(fx.manager.state_for(key), SessionState::Active);

            let page = fx.manager.registry().active_page_for(key).unwrap();
            assert_eq!(fx.engine.url_of(page).unwrap(), "https://example.com");

            let report = fx
                .manager
                .end_session_for(key, &ExecutionRecord::passed("login"));
            assert!(report.is_clean());
            assert_eq!(fx.manager.state_for(key), SessionState::Idle);
            assert_eq!(fx.engine.open_browsers(), 0);
            assert_eq!(fx.engine.open_contexts(), 0);
        }

        #[test]
        fn test_acquisition_and_release_ordering() {
            let fx = fixture("baseUrl=https://example.com");
            let key = SessionKey::token(1);
            fx.manager.begin_session_for(key, "order").unwrap();
            let _ = fx
                .manager
                .end_session_for(key, &ExecutionRecord::passed("order"));
            let log = fx.engine.log();
            let positions: Vec<usize> = [
                "launch:chrome",
                "new_context",
                "new_page",
                "start_tracing",
                "goto:https://example.com",
                "stop_tracing",
                "close_context",
                "close_browser",
            ]
            .iter()
            .map(|op| log.iter().position(|e| e == op).unwrap())
            .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "log: {log:?}");
        }

        #[test]
        fn test_registry_cleared_after_end() {
            let fx = fixture("");
            let key = SessionKey::token(2);
            fx.manager.begin_session_for(key, "t").unwrap();
            let _ = fx.manager.end_session_for(key, &ExecutionRecord::passed("t"));
            let err = fx.manager.registry().active_page_for(key).unwrap_err();
            assert!(matches!(err, EnsayoError::UninitializedSession { .. }));
        }

        #[test]
        fn test_second_begin_on_active_key_is_rejected() {
            let fx = fixture("");
            let key = SessionKey::token(3);
            fx.manager.begin_session_for(key, "first").unwrap();
            let err = fx.manager.begin_session_for(key, "second").unwrap_err();
            assert!(matches!(err, EnsayoError::SessionStart { .. }));
            // The active session is untouched
            assert!(fx.manager.registry().active_page_for(key).is_ok());
        }

        #[test]
        fn test_headless_override_beats_config() {
            let fx = fixture("headless=false");
            let key = SessionKey::token(4);
            fx.manager.overrides().set_headless_for(key, true);
            fx.manager.begin_session_for(key, "T1").unwrap();
            let session = fx.manager.registry().session_for(key).unwrap();
            assert!(fx.engine.is_headless(session.browser));
        }

        #[test]
        fn test_overrides_are_single_use() {
            let fx = fixture("browser=chrome");
            let key = SessionKey::token(5);
            fx.manager
                .overrides()
                .set_browser_for(key, BrowserKind::Firefox);

            fx.manager.begin_session_for(key, "a").unwrap();
            let first = fx.manager.registry().session_for(key).unwrap();
            assert_eq!(fx.engine.kind_of(first.browser), Some(BrowserKind::Firefox));
            let _ = fx.manager.end_session_for(key, &ExecutionRecord::passed("a"));

            fx.manager.begin_session_for(key, "b").unwrap();
            let second = fx.manager.registry().session_for(key).unwrap();
            assert_eq!(fx.engine.kind_of(second.browser), Some(BrowserKind::Chrome));
        }

        #[test]
        fn test_select_frame_then_new_page_resets() {
            let fx = fixture("");
            let key = SessionKey::token(6);
            fx.manager.begin_session_for(key, "frames").unwrap();
            let main = fx.manager.registry().active_frame_for(key).unwrap();
            fx.manager.select_frame_for(key, "editor").unwrap();
            let selected = fx.manager.registry().active_frame_for(key).unwrap();
            assert_ne!(selected, main);
            assert_eq!(fx.engine.frame_name(selected).as_deref(), Some("editor"));
        }
    }

    mod failure_tests {
        use super::*;

        #[test]
        fn test_begin_failure_leaves_no_partial_session() {
            let fx = fixture("");
            let key = SessionKey::token(10);
            fx.engine.fail_next(MockOp::NewPage, "target crashed");
            let err = fx.manager.begin_session_for(key, "boom").unwrap_err();
            assert!(matches!(err, EnsayoError::SessionStart { .. }));
            assert!(fx.manager.registry().active_page_for(key).is_err());
            assert_eq!(fx.engine.open_browsers(), 0);
            assert_eq!(fx.engine.open_contexts(), 0);
            assert_eq!(fx.manager.state_for(key), SessionState::Idle);

            // The key is reusable after a failed start
            fx.manager.begin_session_for(key, "retry").unwrap();
        }

        #[test]
        fn test_launch_failure_has_nothing_to_unwind() {
            let fx = fixture("");
            let key = SessionKey::token(11);
            fx.engine.fail_next(MockOp::Launch, "no chromium");
            assert!(fx.manager.begin_session_for(key, "t").is_err());
            assert_eq!(fx.engine.open_browsers(), 0);
        }

        #[test]
        fn test_navigation_failure_unwinds_context_and_browser() {
            let fx = fixture("baseUrl=https://unreachable.invalid");
            let key = SessionKey::token(12);
            fx.engine.fail_next(MockOp::Goto, "dns failure");
            assert!(fx.manager.begin_session_for(key, "t").is_err());
            assert_eq!(fx.engine.open_contexts(), 0);
            assert_eq!(fx.engine.open_browsers(), 0);
        }

        #[test]
        fn test_teardown_is_total_despite_trace_failure() {
            let fx = fixture("");
            let key = SessionKey::token(13);
            fx.manager.begin_session_for(key, "t").unwrap();
            fx.engine.fail_next(MockOp::StopTracing, "disk full");
            let report = fx.manager.end_session_for(key, &ExecutionRecord::failed("t", "assert"));
            assert!(!report.is_clean());
            assert_eq!(report.errors().len(), 1);
            assert!(matches!(report.errors()[0], EnsayoError::Teardown { .. }));
            // Later steps still ran: everything is closed exactly once
            assert_eq!(fx.engine.open_contexts(), 0);
            assert_eq!(fx.engine.open_browsers(), 0);
            assert_eq!(fx.manager.state_for(key), SessionState::Idle);
            assert!(fx.manager.registry().active_page_for(key).is_err());
        }

        #[test]
        fn test_end_without_session_is_harmless() {
            let fx = fixture("");
            let report = fx
                .manager
                .end_session_for(SessionKey::token(14), &ExecutionRecord::skipped("ghost"));
            assert!(report.is_clean());
        }
    }

    mod reporting_tests {
        use super::*;

        #[test]
        fn test_screenshot_attached_per_policy() {
            let fx = fixture("reporting.screenshots=all");
            let key = SessionKey::token(20);
            fx.manager.begin_session_for(key, "shot").unwrap();
            let _ = fx.manager.end_session_for(key, &ExecutionRecord::passed("shot"));
            assert!(fx.sink.events().iter().any(|e| e.had_screenshot));
            assert_eq!(fx.sink.records().len(), 1);
        }

        #[test]
        fn test_no_screenshot_for_pass_under_failed_policy() {
            let fx = fixture("reporting.screenshots=failed");
            let key = SessionKey::token(21);
            fx.manager.begin_session_for(key, "quiet").unwrap();
            let _ = fx.manager.end_session_for(key, &ExecutionRecord::passed("quiet"));
            assert!(fx.sink.events().iter().all(|e| !e.had_screenshot));
        }

        #[test]
        fn test_failed_record_reaches_sink_with_detail() {
            let fx = fixture("reporting.screenshots=none");
            let key = SessionKey::token(22);
            fx.manager.begin_session_for(key, "broken").unwrap();
            let _ = fx
                .manager
                .end_session_for(key, &ExecutionRecord::failed("broken", "button missing"));
            let records = fx.sink.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].status, TestStatus::Failed);
            assert_eq!(records[0].error.as_deref(), Some("button missing"));
        }
    }

    mod concurrency_tests {
        use super::*;
        use std::sync::Barrier;

        #[test]
        fn test_five_concurrent_sessions_are_isolated() {
            let fx = fixture("baseUrl=https://example.com");
            let manager = &fx.manager;
            let barrier = Barrier::new(5);

            std::thread::scope(|scope| {
                for i in 0..5 {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        manager.begin_session(&format!("t{i}")).unwrap();
                        let mine = manager.registry().active_page().unwrap();
                        barrier.wait();
                        assert_eq!(manager.registry().len(), 5);

                        if i == 0 {
                            let _ = manager.end_session(&ExecutionRecord::passed("t0"));
                            assert!(manager.registry().active_page().is_err());
                        }
                        barrier.wait();

                        if i != 0 {
                            // Closing t0 did not disturb this thread's entry
                            assert_eq!(manager.registry().active_page().unwrap(), mine);
                            let _ =
                                manager.end_session(&ExecutionRecord::passed(format!("t{i}")));
                        }
                    });
                }
            });

            assert!(fx.manager.registry().is_empty());
            assert_eq!(fx.engine.open_browsers(), 0);
        }
    }
}
