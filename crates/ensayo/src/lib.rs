//! # Ensayo
//!
//! Browser UI test-session harness: one isolated browser session per test
//! execution, partitioned by OS thread, with guaranteed teardown on every
//! exit path, data-driven feeds, and screenshot/video/trace artifacts.
//!
//! The browser itself is driven through the [`BrowserEngine`] seam: the
//! `browser` feature enables real Chrome `DevTools` Protocol control via
//! chromiumoxide, while [`MockEngine`] backs unit tests and dry runs.
//! Report rendering sits behind the [`ReportSink`] boundary.
//!
//! ```no_run
//! use ensayo::{
//!     ArtifactPaths, HarnessConfig, MockEngine, SessionManager, TestCase, TestHarness,
//!     TestSuite, TracingSink,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> ensayo::EnsayoResult<()> {
//! ensayo::init_logging();
//!
//! let config = Arc::new(HarnessConfig::load("ensayo.properties")?);
//! let artifacts = Arc::new(ArtifactPaths::default_root());
//! artifacts.prepare()?;
//!
//! let manager = SessionManager::new(
//!     Arc::new(MockEngine::new()),
//!     config,
//!     artifacts.clone(),
//!     Arc::new(TracingSink::with_artifacts(artifacts)),
//! );
//!
//! let suite = TestSuite::new("smoke").with_test(TestCase::new("open_home", |ctx| {
//!     let page = ctx.manager().registry().active_page()?;
//!     let _ = page; // drive the page through the engine here
//!     Ok(())
//! }));
//!
//! let results = TestHarness::new().with_parallel().run(&suite, &manager);
//! assert!(results.all_passed());
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod config;
pub mod datafeed;
pub mod engine;
pub mod harness;
pub mod registry;
pub mod report;
pub mod result;
pub mod session;

#[cfg(feature = "browser")]
pub mod cdp;

pub use artifacts::{readable_timestamp, ArtifactPaths};
pub use config::HarnessConfig;
pub use datafeed::{parse_csv, parse_json, read_csv, read_json, Record};
pub use engine::{
    BrowserEngine, BrowserId, BrowserKind, ContextId, ContextOptions, FrameId, LaunchOptions,
    MockEngine, MockOp, PageId, Screenshot, TraceOptions,
};
pub use harness::{SuiteResults, TestCase, TestContext, TestHarness, TestResult, TestSuite};
pub use registry::{Session, SessionKey, SessionRegistry};
pub use report::{
    init_logging, ExecutionRecord, LogLevel, MemorySink, ReportSink, ScreenshotPolicy,
    TestStatus, TracingSink,
};
pub use result::{EnsayoError, EnsayoResult};
pub use session::{
    OverrideChannel, Overrides, SessionManager, SessionState, TeardownReport,
};

#[cfg(feature = "browser")]
pub use cdp::CdpEngine;
