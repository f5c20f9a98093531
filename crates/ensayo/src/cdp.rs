//! Real browser control via the Chrome `DevTools` Protocol.
//!
//! [`CdpEngine`] implements [`BrowserEngine`] over chromiumoxide. The engine
//! owns a tokio runtime and blocks on it per call, so the harness core sees
//! the same blocking surface as with the mock engine; the CDP event stream
//! is drained on a spawned task.
//!
//! Chromium family only. Session isolation comes from launching a dedicated
//! browser process per `launch` call, so a context maps to a logical
//! grouping of pages within that process. Trace capture is the engine's own
//! recorded action timeline, serialized to JSON at `stop_tracing`; video
//! recording is not available over plain CDP and the session's video
//! directory is simply left empty.

use crate::engine::{
    BrowserEngine, BrowserId, BrowserKind, ContextId, ContextOptions, FrameId, LaunchOptions,
    PageId, Screenshot, TraceOptions,
};
use crate::result::{EnsayoError, EnsayoResult};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize)]
struct TraceEvent {
    at_ms: u64,
    action: String,
}

// The browser connection lives behind its own lock so the handle-table
// mutex is never held across a CDP round trip; a slow browser must only
// stall its own session, not every other session's lifecycle calls.
struct BrowserEntry {
    browser: Arc<Mutex<CdpBrowser>>,
    handler_task: JoinHandle<()>,
}

struct ContextEntry {
    browser: BrowserId,
    tracing: Option<Vec<TraceEvent>>,
    started: std::time::Instant,
}

struct PageEntry {
    context: ContextId,
    page: CdpPage,
    main_frame: FrameId,
}

#[derive(Default)]
struct CdpState {
    next_id: u64,
    browsers: HashMap<BrowserId, BrowserEntry>,
    contexts: HashMap<ContextId, ContextEntry>,
    pages: HashMap<PageId, PageEntry>,
}

impl CdpState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn trace(&mut self, context: ContextId, action: impl Into<String>) {
        if let Some(entry) = self.contexts.get_mut(&context) {
            if let Some(events) = entry.tracing.as_mut() {
                events.push(TraceEvent {
                    at_ms: entry.started.elapsed().as_millis() as u64,
                    action: action.into(),
                });
            }
        }
    }
}

/// CDP-backed browser engine
pub struct CdpEngine {
    runtime: Runtime,
    state: Mutex<CdpState>,
}

impl std::fmt::Debug for CdpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpEngine").finish_non_exhaustive()
    }
}

impl CdpEngine {
    /// Create the engine with its own multi-threaded tokio runtime
    pub fn new() -> EnsayoResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| EnsayoError::engine(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            runtime,
            state: Mutex::new(CdpState::default()),
        })
    }
}

impl BrowserEngine for CdpEngine {
    fn launch(&self, kind: BrowserKind, opts: &LaunchOptions) -> EnsayoResult<BrowserId> {
        if kind == BrowserKind::Firefox {
            return Err(EnsayoError::engine(
                "firefox is not supported by the CDP engine",
            ));
        }

        let mut builder = CdpConfig::builder();
        if !opts.headless {
            builder = builder.with_head();
        }
        if !opts.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = opts.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| EnsayoError::engine(format!("invalid launch config: {e}")))?;

        let (browser, mut handler) = self
            .runtime
            .block_on(CdpBrowser::launch(config))
            .map_err(|e| EnsayoError::engine(format!("failed to launch browser: {e}")))?;

        let handler_task = self.runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut state = self.state.lock().unwrap();
        let id = BrowserId(state.next());
        state.browsers.insert(
            id,
            BrowserEntry {
                browser: Arc::new(Mutex::new(browser)),
                handler_task,
            },
        );
        Ok(id)
    }

    fn new_context(&self, browser: BrowserId, _opts: &ContextOptions) -> EnsayoResult<ContextId> {
        let mut state = self.state.lock().unwrap();
        if !state.browsers.contains_key(&browser) {
            return Err(EnsayoError::engine("unknown browser handle"));
        }
        let id = ContextId(state.next());
        state.contexts.insert(
            id,
            ContextEntry {
                browser,
                tracing: None,
                started: std::time::Instant::now(),
            },
        );
        Ok(id)
    }

    fn new_page(&self, context: ContextId) -> EnsayoResult<PageId> {
        let browser = {
            let state = self.state.lock().unwrap();
            let browser_id = state
                .contexts
                .get(&context)
                .map(|c| c.browser)
                .ok_or_else(|| EnsayoError::engine("unknown context handle"))?;
            state
                .browsers
                .get(&browser_id)
                .map(|entry| entry.browser.clone())
                .ok_or_else(|| EnsayoError::engine("unknown browser handle"))?
        };

        // Table guard released; only this session's browser is locked for
        // the round trip
        let page = self
            .runtime
            .block_on(browser.lock().unwrap().new_page("about:blank"))
            .map_err(|e| EnsayoError::engine(format!("failed to open page: {e}")))?;

        let mut state = self.state.lock().unwrap();
        let page_id = PageId(state.next());
        let main_frame = FrameId(state.next());
        state.pages.insert(
            page_id,
            PageEntry {
                context,
                page,
                main_frame,
            },
        );
        state.trace(context, "new_page");
        Ok(page_id)
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
        // Frames are logical handles; operations resolve them lazily
        let id = FrameId(state.next());
        let context = state.pages[&page].context;
        state.trace(context, format!("frame:{name}"));
        Ok(id)
    }

    fn goto(&self, page: PageId, url: &str) -> EnsayoResult<()> {
        let (cdp_page, context) = {
            let state = self.state.lock().unwrap();
            let entry = state
                .pages
                .get(&page)
                .ok_or_else(|| EnsayoError::engine("unknown page handle"))?;
            (entry.page.clone(), entry.context)
        };
        self.runtime
            .block_on(cdp_page.goto(url))
            .map_err(|e| EnsayoError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        self.state.lock().unwrap().trace(context, format!("goto:{url}"));
        Ok(())
    }

    fn start_tracing(&self, context: ContextId, _opts: &TraceOptions) -> EnsayoResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .contexts
            .get_mut(&context)
            .ok_or_else(|| EnsayoError::engine("unknown context handle"))?;
        entry.tracing = Some(Vec::new());
        entry.started = std::time::Instant::now();
        Ok(())
    }

    fn stop_tracing(&self, context: ContextId, path: &Path) -> EnsayoResult<()> {
        let events = {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .contexts
                .get_mut(&context)
                .ok_or_else(|| EnsayoError::engine("unknown context handle"))?;
            entry.tracing.take().unwrap_or_default()
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&events)?)?;
        Ok(())
    }

    fn screenshot(&self, page: PageId, _full_page: bool) -> EnsayoResult<Screenshot> {
        let (cdp_page, context) = {
            let state = self.state.lock().unwrap();
            let entry = state
                .pages
                .get(&page)
                .ok_or_else(|| EnsayoError::engine("unknown page handle"))?;
            (entry.page.clone(), entry.context)
        };
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let response = self
            .runtime
            .block_on(cdp_page.execute(params))
            .map_err(|e| EnsayoError::engine(format!("screenshot failed: {e}")))?;

        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD
            .decode(&response.data)
            .map_err(|e| EnsayoError::engine(format!("screenshot decode failed: {e}")))?;
        self.state.lock().unwrap().trace(context, "screenshot");
        Ok(Screenshot::new(data, false))
    }

    fn close_page(&self, page: PageId) -> EnsayoResult<()> {
        let entry = {
            let mut state = self.state.lock().unwrap();
            state
                .pages
                .remove(&page)
                .ok_or_else(|| EnsayoError::engine("unknown page handle"))?
        };
        self.runtime
            .block_on(entry.page.close())
            .map_err(|e| EnsayoError::teardown("page", e.to_string()))?;
        Ok(())
    }

    fn close_context(&self, context: ContextId) -> EnsayoResult<()> {
        let pages: Vec<PageEntry> = {
            let mut state = self.state.lock().unwrap();
            if state.contexts.remove(&context).is_none() {
                return Err(EnsayoError::engine("unknown context handle"));
            }
            let ids: Vec<PageId> = state
                .pages
                .iter()
                .filter(|(_, p)| p.context == context)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.pages.remove(&id))
                .collect()
        };
        let mut first_error = None;
        for entry in pages {
            if let Err(e) = self.runtime.block_on(entry.page.close()) {
                first_error.get_or_insert(EnsayoError::teardown("context", e.to_string()));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn close_browser(&self, browser: BrowserId) -> EnsayoResult<()> {
        let entry = {
            let mut state = self.state.lock().unwrap();
            state
                .browsers
                .remove(&browser)
                .ok_or_else(|| EnsayoError::engine("unknown browser handle"))?
        };
        let BrowserEntry {
            browser,
            handler_task,
        } = entry;
        let result = self
            .runtime
            .block_on(browser.lock().unwrap().close())
            .map_err(|e| EnsayoError::teardown("browser", e.to_string()));
        handler_task.abort();
        result.map(|_| ())
    }
}
