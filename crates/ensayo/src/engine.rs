//! Abstract browser-engine seam.
//!
//! The harness core never talks to a browser directly; it drives an
//! implementation of [`BrowserEngine`]. When compiled with the `browser`
//! feature, [`crate::cdp::CdpEngine`] provides real control via the Chrome
//! `DevTools` Protocol. [`MockEngine`] is always available and backs the
//! crate's own tests.
//!
//! All operations are blocking from the caller's perspective; the harness
//! runs one OS thread per concurrently executing test and suspends only at
//! session boundaries.

use crate::result::{EnsayoError, EnsayoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::SystemTime;

/// Browser kind selectable per test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserKind {
    /// Google Chrome (branded channel)
    Chrome,
    /// Plain Chromium
    Chromium,
    /// Mozilla Firefox
    Firefox,
    /// Microsoft Edge
    Edge,
}

impl BrowserKind {
    /// Lowercase name used in configuration files and logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Edge => "edge",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = EnsayoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(Self::Chrome),
            "chromium" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "edge" | "msedge" => Ok(Self::Edge),
            other => Err(EnsayoError::config(format!("unknown browser kind: {other}"))),
        }
    }
}

/// Opaque browser handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrowserId(pub u64);

/// Opaque browsing-context handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub u64);

/// Opaque page handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Opaque frame handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

/// Browser launch options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Explicit browser executable (None = engine default discovery)
    pub executable: Option<PathBuf>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl LaunchOptions {
    /// Create launch options with the engine defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            headless: false,
            executable: None,
            sandbox: true,
        }
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set an explicit browser executable
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Disable the sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Options for an isolated browsing context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Directory the engine records video into (None = no recording)
    pub video_dir: Option<PathBuf>,
    /// Ignore HTTPS certificate errors
    pub ignore_https_errors: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            viewport_width: 1440,
            viewport_height: 900,
            video_dir: None,
            ignore_https_errors: true,
        }
    }
}

impl ContextOptions {
    /// Create context options with the harness defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Record video into the given directory
    #[must_use]
    pub fn with_video_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.video_dir = Some(dir.into());
        self
    }
}

/// Options for trace capture on a context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceOptions {
    /// Capture screenshots along the timeline
    pub screenshots: bool,
    /// Capture DOM snapshots
    pub snapshots: bool,
    /// Capture page sources
    pub sources: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            screenshots: true,
            snapshots: true,
            sources: true,
        }
    }
}

/// Screenshot data with metadata
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Whether the full page was captured (vs. the viewport)
    pub full_page: bool,
    /// Timestamp when the screenshot was taken
    pub timestamp: SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, full_page: bool) -> Self {
        Self {
            data,
            full_page,
            timestamp: SystemTime::now(),
        }
    }
}

/// Abstract browser automation engine.
///
/// Implementations own all protocol-level complexity; the harness core only
/// coordinates handle lifetimes. Every method is blocking and safe to call
/// from any thread.
pub trait BrowserEngine: Send + Sync {
    /// Launch a browser of the given kind
    fn launch(&self, kind: BrowserKind, opts: &LaunchOptions) -> EnsayoResult<BrowserId>;

    /// Create an isolated browsing context within a browser
    fn new_context(&self, browser: BrowserId, opts: &ContextOptions) -> EnsayoResult<ContextId>;

    /// Open a page in a context
    fn new_page(&self, context: ContextId) -> EnsayoResult<PageId>;

    /// Resolve the main frame of a page
    fn main_frame(&self, page: PageId) -> EnsayoResult<FrameId>;

    /// Resolve a child frame of a page by name
    fn frame_by_name(&self, page: PageId, name: &str) -> EnsayoResult<FrameId>;

    /// Navigate a page
    fn goto(&self, page: PageId, url: &str) -> EnsayoResult<()>;

    /// Start trace capture on a context
    fn start_tracing(&self, context: ContextId, opts: &TraceOptions) -> EnsayoResult<()>;

    /// Stop trace capture, writing the trace to `path`
    fn stop_tracing(&self, context: ContextId, path: &Path) -> EnsayoResult<()>;

    /// Take a screenshot of a page
    fn screenshot(&self, page: PageId, full_page: bool) -> EnsayoResult<Screenshot>;

    /// Close a page
    fn close_page(&self, page: PageId) -> EnsayoResult<()>;

    /// Close a context (and its pages). Recorded video, if any, is written
    /// into the context's video directory before this returns.
    fn close_context(&self, context: ContextId) -> EnsayoResult<()>;

    /// Close a browser (and its contexts)
    fn close_browser(&self, browser: BrowserId) -> EnsayoResult<()>;
}

// ============================================================================
// Mock engine (always compiled; used by unit tests and dry runs)
// ============================================================================

/// Operation points where [`MockEngine`] can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `launch`
    Launch,
    /// `new_context`
    NewContext,
    /// `new_page`
    NewPage,
    /// `goto`
    Goto,
    /// `start_tracing`
    StartTracing,
    /// `stop_tracing`
    StopTracing,
    /// `close_page`
    ClosePage,
    /// `close_context`
    CloseContext,
    /// `close_browser`
    CloseBrowser,
}

#[derive(Debug, Clone)]
struct MockBrowser {
    kind: BrowserKind,
    headless: bool,
    closed: bool,
}

#[derive(Debug, Clone)]
struct MockContext {
    browser: BrowserId,
    video_dir: Option<PathBuf>,
    tracing: bool,
    closed: bool,
}

#[derive(Debug, Clone)]
struct MockPage {
    context: ContextId,
    url: String,
    main_frame: FrameId,
    closed: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    browsers: HashMap<BrowserId, MockBrowser>,
    contexts: HashMap<ContextId, MockContext>,
    pages: HashMap<PageId, MockPage>,
    frames: HashMap<FrameId, (PageId, String)>,
    fail_on: HashMap<MockOp, String>,
    log: Vec<String>,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_fail(&mut self, op: MockOp) -> EnsayoResult<()> {
        if let Some(message) = self.fail_on.remove(&op) {
            return Err(EnsayoError::engine(message));
        }
        Ok(())
    }
}

/// In-process engine backed by id tables.
///
/// Supports one-shot failure injection per operation and records an ordered
/// operation log, which the lifecycle tests use to assert acquisition and
/// release ordering. `close_context` writes a synthetic `.webm` recording
/// into the context's video directory, mirroring a real engine that
/// finalizes video at context close.
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    /// Create a new mock engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next call of `op` to fail with `message`
    pub fn fail_next(&self, op: MockOp, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.fail_on.insert(op, message.into());
    }

    /// Ordered log of operations performed so far
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Number of browsers that have not been closed
    #[must_use]
    pub fn open_browsers(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.browsers.values().filter(|b| !b.closed).count()
    }

    /// Number of contexts that have not been closed
    #[must_use]
    pub fn open_contexts(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.contexts.values().filter(|c| !c.closed).count()
    }

    /// Whether the given browser was launched headless
    #[must_use]
    pub fn is_headless(&self, browser: BrowserId) -> bool {
        let state = self.state.lock().unwrap();
        state.browsers.get(&browser).is_some_and(|b| b.headless)
    }

    /// Kind the given browser was launched as
    #[must_use]
    pub fn kind_of(&self, browser: BrowserId) -> Option<BrowserKind> {
        let state = self.state.lock().unwrap();
        state.browsers.get(&browser).map(|b| b.kind)
    }

    /// Current URL of a page still open
    #[must_use]
    pub fn url_of(&self, page: PageId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .pages
            .get(&page)
            .filter(|p| !p.closed)
            .map(|p| p.url.clone())
    }

    /// Name a frame handle was resolved under
    #[must_use]
    pub fn frame_name(&self, frame: FrameId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.frames.get(&frame).map(|(_, name)| name.clone())
    }
}

impl BrowserEngine for MockEngine {
    fn launch(&self, kind: BrowserKind, opts: &LaunchOptions) -> EnsayoResult<BrowserId> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::Launch)?;
        let id = BrowserId(state.next());
        state.browsers.insert(
            id,
            MockBrowser {
                kind,
                headless: opts.headless,
                closed: false,
            },
        );
        state.log.push(format!("launch:{}", kind.name()));
        Ok(id)
    }

    fn new_context(&self, browser: BrowserId, opts: &ContextOptions) -> EnsayoResult<ContextId> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::NewContext)?;
        if !state.browsers.contains_key(&browser) {
            return Err(EnsayoError::engine("unknown browser handle"));
        }
        let id = ContextId(state.next());
        state.contexts.insert(
            id,
            MockContext {
                browser,
                video_dir: opts.video_dir.clone(),
                tracing: false,
                closed: false,
            },
        );
        state.log.push("new_context".to_string());
        Ok(id)
    }

    fn new_page(&self, context: ContextId) -> EnsayoResult<PageId> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::NewPage)?;
        if !state.contexts.contains_key(&context) {
            return Err(EnsayoError::engine("unknown context handle"));
        }
        let page = PageId(state.next());
        let frame = FrameId(state.next());
        state.frames.insert(frame, (page, "<main>".to_string()));
        state.pages.insert(
            page,
            MockPage {
                context,
                url: "about:blank".to_string(),
                main_frame: frame,
                closed: false,
            },
        );
        state.log.push("new_page".to_string());
        Ok(page)
    }

    fn main_frame(&self, page: PageId) -> EnsayoResult<FrameId> {
        let state = self.state.lock().unwrap();
        state
            .pages
            .get(&page)
            .map(|p| p.main_frame)
            .ok_or_else(|| EnsayoError::engine("unknown page handle"))
    }

    fn frame_by_name(&self, page: PageId, name: &str) -> EnsayoResult<FrameId> {
        let mut state = self.state.lock().unwrap();
        if !state.pages.contains_key(&page) {
            return Err(EnsayoError::engine("unknown page handle"));
        }
        let id = FrameId(state.next());
        state.frames.insert(id, (page, name.to_string()));
        Ok(id)
    }

    fn goto(&self, page: PageId, url: &str) -> EnsayoResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::Goto)?;
        let entry = state
            .pages
            .get_mut(&page)
            .ok_or_else(|| EnsayoError::engine("unknown page handle"))?;
        entry.url = url.to_string();
        state.log.push(format!("goto:{url}"));
        Ok(())
    }

    fn start_tracing(&self, context: ContextId, _opts: &TraceOptions) -> EnsayoResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::StartTracing)?;
        let entry = state
            .contexts
            .get_mut(&context)
            .ok_or_else(|| EnsayoError::engine("unknown context handle"))?;
        entry.tracing = true;
        state.log.push("start_tracing".to_string());
        Ok(())
    }

    fn stop_tracing(&self, context: ContextId, path: &Path) -> EnsayoResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::StopTracing)?;
        let entry = state
            .contexts
            .get_mut(&context)
            .ok_or_else(|| EnsayoError::engine("unknown context handle"))?;
        if !entry.tracing {
            return Err(EnsayoError::engine("tracing was not started"));
        }
        entry.tracing = false;
        let timeline = serde_json::json!({
            "context": context.0,
            "events": state.log.clone(),
        });
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&timeline)?)?;
        state.log.push("stop_tracing".to_string());
        Ok(())
    }

    fn screenshot(&self, page: PageId, full_page: bool) -> EnsayoResult<Screenshot> {
        let state = self.state.lock().unwrap();
        if !state.pages.contains_key(&page) {
            return Err(EnsayoError::engine("unknown page handle"));
        }
        // Minimal PNG header stands in for pixel data
        Ok(Screenshot::new(
            vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'],
            full_page,
        ))
    }

    fn close_page(&self, page: PageId) -> EnsayoResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::ClosePage)?;
        let entry = state
            .pages
            .get_mut(&page)
            .ok_or_else(|| EnsayoError::engine("unknown page handle"))?;
        entry.closed = true;
        state.log.push("close_page".to_string());
        Ok(())
    }

    fn close_context(&self, context: ContextId) -> EnsayoResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::CloseContext)?;
        let entry = state
            .contexts
            .get_mut(&context)
            .ok_or_else(|| EnsayoError::engine("unknown context handle"))?;
        if entry.closed {
            return Err(EnsayoError::engine("context already closed"));
        }
        entry.closed = true;
        let video_dir = entry.video_dir.clone();
        let pages: Vec<PageId> = state
            .pages
            .iter()
            .filter(|(_, p)| p.context == context)
            .map(|(id, _)| *id)
            .collect();
        for id in pages {
            if let Some(p) = state.pages.get_mut(&id) {
                p.closed = true;
            }
        }
        if let Some(dir) = video_dir {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join("recording.webm"), b"webm")?;
        }
        state.log.push("close_context".to_string());
        Ok(())
    }

    fn close_browser(&self, browser: BrowserId) -> EnsayoResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fail(MockOp::CloseBrowser)?;
        let entry = state
            .browsers
            .get_mut(&browser)
            .ok_or_else(|| EnsayoError::engine("unknown browser handle"))?;
        if entry.closed {
            return Err(EnsayoError::engine("browser already closed"));
        }
        entry.closed = true;
        let contexts: Vec<ContextId> = state
            .contexts
            .iter()
            .filter(|(_, c)| c.browser == browser)
            .map(|(id, _)| *id)
            .collect();
        for id in contexts {
            if let Some(c) = state.contexts.get_mut(&id) {
                c.closed = true;
            }
        }
        state.log.push("close_browser".to_string());
        Ok(())
    }
}
