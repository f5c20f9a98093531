//! Test harness for running suites.
//!
//! Wraps each test body in a full session lifecycle: `begin_session` before
//! the body, `end_session` after it on every exit path (pass, failure,
//! panic, skip). Parallel mode runs one OS thread per test; sequential mode
//! supports fail-fast, reporting the remaining tests as skipped.

use crate::datafeed::Record;
use crate::report::{ExecutionRecord, TestStatus};
use crate::result::EnsayoResult;
use crate::session::SessionManager;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Everything a test body may touch during its run
pub struct TestContext<'a> {
    manager: &'a SessionManager,
    data: Option<&'a Record>,
}

impl<'a> TestContext<'a> {
    /// The session manager (registry, engine, overrides)
    #[must_use]
    pub fn manager(&self) -> &'a SessionManager {
        self.manager
    }

    /// The current data-feed record, for parameterized tests
    #[must_use]
    pub fn data(&self) -> Option<&'a Record> {
        self.data
    }

    /// Look up a field of the current data record
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'a str> {
        self.data.and_then(|r| r.get(name)).map(String::as_str)
    }
}

/// A test body
pub type TestFn = Arc<dyn Fn(&TestContext<'_>) -> EnsayoResult<()> + Send + Sync>;

/// A single test case
#[derive(Clone)]
pub struct TestCase {
    /// Test name
    pub name: String,
    /// Data-feed records; the body runs once per record when present
    pub data: Option<Vec<Record>>,
    run: TestFn,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("iterations", &self.data.as_ref().map_or(1, Vec::len))
            .finish()
    }
}

impl TestCase {
    /// Create a new test case
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(&TestContext<'_>) -> EnsayoResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            data: None,
            run: Arc::new(run),
        }
    }

    /// Run the body once per data record
    #[must_use]
    pub fn with_data(mut self, records: Vec<Record>) -> Self {
        self.data = Some(records);
        self
    }
}

/// A test suite containing multiple tests
#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    /// Suite name
    pub name: String,
    /// Tests in this suite
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    /// Create a new test suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
        }
    }

    /// Add a test case
    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Add a test case, builder style
    #[must_use]
    pub fn with_test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    /// Get the number of tests
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }
}

/// Result of running a single test iteration
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test (iteration) name
    pub name: String,
    /// Final status
    pub status: TestStatus,
    /// Error message if failed
    pub error: Option<String>,
    /// Test duration
    pub duration: Duration,
}

impl TestResult {
    /// Whether this iteration passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self.status, TestStatus::Passed)
    }
}

/// Results from running a test suite
#[derive(Debug, Clone)]
pub struct SuiteResults {
    /// Suite name
    pub suite_name: String,
    /// Individual test results
    pub results: Vec<TestResult>,
    /// Total duration
    pub duration: Duration,
}

impl SuiteResults {
    /// Check if all tests passed or were skipped
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results
            .iter()
            .all(|r| !matches!(r.status, TestStatus::Failed))
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TestStatus::Failed))
            .count()
    }

    /// Count skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TestStatus::Skipped))
            .count()
    }

    /// Get total iteration count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TestStatus::Failed))
            .collect()
    }
}

/// One expanded unit of work: a test case bound to one data record (or none)
struct Iteration<'a> {
    name: String,
    case: &'a TestCase,
    record: Option<&'a Record>,
}

fn expand<'a>(suite: &'a TestSuite) -> Vec<Iteration<'a>> {
    let mut iterations = Vec::new();
    for case in &suite.tests {
        match &case.data {
            None => iterations.push(Iteration {
                name: case.name.clone(),
                case,
                record: None,
            }),
            Some(records) => {
                for (i, record) in records.iter().enumerate() {
                    iterations.push(Iteration {
                        name: format!("{}[{i}]", case.name),
                        case,
                        record: Some(record),
                    });
                }
            }
        }
    }
    iterations
}

/// Test harness for running suites
#[derive(Debug, Default)]
pub struct TestHarness {
    /// Stop after the first failure (sequential mode only)
    pub fail_fast: bool,
    /// Run tests in parallel, one OS thread per test
    pub parallel: bool,
}

impl TestHarness {
    /// Create a new test harness
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable fail-fast mode
    #[must_use]
    pub const fn with_fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Enable parallel execution
    #[must_use]
    pub const fn with_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Run a test suite, one session per test iteration
    #[must_use]
    pub fn run(&self, suite: &TestSuite, manager: &SessionManager) -> SuiteResults {
        let start = Instant::now();
        tracing::info!(suite = %suite.name, tests = suite.test_count(), "suite started");

        let iterations = expand(suite);
        let results = if self.parallel {
            Self::run_parallel(&iterations, manager)
        } else {
            self.run_sequential(&iterations, manager)
        };

        let results = SuiteResults {
            suite_name: suite.name.clone(),
            results,
            duration: start.elapsed(),
        };
        tracing::info!(
            suite = %suite.name,
            passed = results.passed_count(),
            failed = results.failed_count(),
            skipped = results.skipped_count(),
            "suite finished"
        );
        results
    }

    fn run_sequential(
        &self,
        iterations: &[Iteration<'_>],
        manager: &SessionManager,
    ) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(iterations.len());
        let mut stopped = false;
        for iteration in iterations {
            if stopped {
                let record = ExecutionRecord::skipped(&iteration.name);
                manager.report_skipped(&record);
                results.push(TestResult {
                    name: iteration.name.clone(),
                    status: TestStatus::Skipped,
                    error: None,
                    duration: Duration::ZERO,
                });
                continue;
            }
            let result = execute_one(iteration, manager);
            if self.fail_fast && matches!(result.status, TestStatus::Failed) {
                stopped = true;
            }
            results.push(result);
        }
        results
    }

    fn run_parallel(iterations: &[Iteration<'_>], manager: &SessionManager) -> Vec<TestResult> {
        let results: Mutex<Vec<(usize, TestResult)>> = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            for (index, iteration) in iterations.iter().enumerate() {
                let results = &results;
                scope.spawn(move || {
                    let result = execute_one(iteration, manager);
                    results.lock().unwrap().push((index, result));
                });
            }
        });
        let mut indexed = results.into_inner().unwrap();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

/// Run one iteration inside a full session lifecycle. Teardown runs on
/// every exit path, including panics in the test body.
fn execute_one(iteration: &Iteration<'_>, manager: &SessionManager) -> TestResult {
    let start = Instant::now();
    let name = iteration.name.as_str();

    if let Err(e) = manager.begin_session(name) {
        let record = ExecutionRecord::failed(name, e.to_string());
        let _ = manager.end_session(&record);
        return TestResult {
            name: name.to_string(),
            status: TestStatus::Failed,
            error: Some(e.to_string()),
            duration: start.elapsed(),
        };
    }

    let context = TestContext {
        manager,
        data: iteration.record,
    };
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| (iteration.case.run)(&context)));

    let (status, error) = match outcome {
        Ok(Ok(())) => (TestStatus::Passed, None),
        Ok(Err(e)) => (TestStatus::Failed, Some(e.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "test panicked".to_string());
            (TestStatus::Failed, Some(message))
        }
    };

    let record = match (status, &error) {
        (TestStatus::Passed, _) => ExecutionRecord::passed(name),
        (_, Some(detail)) => ExecutionRecord::failed(name, detail.clone()),
        (_, None) => ExecutionRecord::failed(name, "unknown failure"),
    };
    let teardown = manager.end_session(&record);
    if !teardown.is_clean() {
        tracing::warn!(
            test = name,
            errors = teardown.errors().len(),
            "teardown reported errors"
        );
    }

    TestResult {
        name: name.to_string(),
        status,
        error,
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactPaths;
    use crate::config::HarnessConfig;
    use crate::engine::{MockEngine, MockOp};
    use crate::report::MemorySink;
    use crate::result::EnsayoError;

    struct Fixture {
        _tmp: tempfile::TempDir,
        engine: Arc<MockEngine>,
        sink: Arc<MemorySink>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let sink = Arc::new(MemorySink::new());
        let artifacts = Arc::new(ArtifactPaths::new(tmp.path().join("ensayo")));
        artifacts.prepare().unwrap();
        let manager = SessionManager::new(
            engine.clone(),
            Arc::new(HarnessConfig::parse("baseUrl=https://example.com")),
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

    #[test]
    fn test_suite_runs_each_test_in_its_own_session() {
        let fx = fixture();
        let suite = TestSuite::new("smoke")
            .with_test(TestCase::new("a", |ctx| {
                ctx.manager().registry().active_page().map(|_| ())
            }))
            .with_test(TestCase::new("b", |_| Ok(())));

        let results = TestHarness::new().run(&suite, &fx.manager);
        assert!(results.all_passed());
        assert_eq!(results.total(), 2);
        assert_eq!(fx.engine.open_browsers(), 0);
        assert_eq!(fx.sink.records().len(), 2);
    }

    #[test]
    fn test_failing_body_tears_down_and_reports() {
        let fx = fixture();
        let suite = TestSuite::new("s").with_test(TestCase::new("bad", |_| {
            Err(EnsayoError::engine("element not found"))
        }));
        let results = TestHarness::new().run(&suite, &fx.manager);
        assert_eq!(results.failed_count(), 1);
        assert_eq!(fx.engine.open_browsers(), 0);
        let records = fx.sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].error.as_deref().unwrap().contains("element not found"));
    }

    #[test]
    fn test_panicking_body_still_tears_down() {
        let fx = fixture();
        let suite = TestSuite::new("s").with_test(TestCase::new("explode", |_| {
            panic!("boom");
        }));
        let results = TestHarness::new().run(&suite, &fx.manager);
        assert_eq!(results.failed_count(), 1);
        assert_eq!(results.results[0].error.as_deref(), Some("boom"));
        assert_eq!(fx.engine.open_browsers(), 0);
        assert!(fx.manager.registry().is_empty());
    }

    #[test]
    fn test_begin_failure_is_a_test_failure_with_report_entry() {
        let fx = fixture();
        fx.engine.fail_next(MockOp::Launch, "no chromium binary");
        let suite = TestSuite::new("s").with_test(TestCase::new("t", |_| Ok(())));
        let results = TestHarness::new().run(&suite, &fx.manager);
        assert_eq!(results.failed_count(), 1);
        assert_eq!(fx.sink.records().len(), 1);
    }

    #[test]
    fn test_fail_fast_skips_remaining() {
        let fx = fixture();
        let suite = TestSuite::new("s")
            .with_test(TestCase::new("first", |_| {
                Err(EnsayoError::engine("broken"))
            }))
            .with_test(TestCase::new("second", |_| Ok(())));
        let results = TestHarness::new().with_fail_fast().run(&suite, &fx.manager);
        assert_eq!(results.failed_count(), 1);
        assert_eq!(results.skipped_count(), 1);
        // The skipped test still produced a report record, without going
        // through a session lifecycle of its own
        let records = fx.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, TestStatus::Skipped);
        let launches = fx
            .engine
            .log()
            .iter()
            .filter(|op| op.starts_with("launch:"))
            .count();
        assert_eq!(launches, 1);
    }

    #[test]
    fn test_data_driven_expansion() {
        let fx = fixture();
        let records = crate::datafeed::parse_csv("username,password\na,1\nb,2\nc,3\n").unwrap();
        let suite = TestSuite::new("login").with_test(
            TestCase::new("login", |ctx| {
                let user = ctx.field("username").unwrap();
                assert!(!user.is_empty());
                Ok(())
            })
            .with_data(records),
        );
        let results = TestHarness::new().run(&suite, &fx.manager);
        assert_eq!(results.total(), 3);
        assert!(results.all_passed());
        assert_eq!(results.results[0].name, "login[0]");
    }

    #[test]
    fn test_parallel_mode_preserves_result_order() {
        let fx = fixture();
        let mut suite = TestSuite::new("par");
        for i in 0..4 {
            suite.add_test(TestCase::new(format!("t{i}"), |ctx| {
                ctx.manager().registry().active_page().map(|_| ())
            }));
        }
        let results = TestHarness::new().with_parallel().run(&suite, &fx.manager);
        assert!(results.all_passed());
        let names: Vec<_> = results.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["t0", "t1", "t2", "t3"]);
        assert!(fx.manager.registry().is_empty());
    }
}
