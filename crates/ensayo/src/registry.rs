//! Key-partitioned session registry.
//!
//! Storage and retrieval of the active session's handles, partitioned by
//! [`SessionKey`]. Each executing thread owns disjoint state, which is the
//! designed mechanism for safe parallel test execution; the registry is an
//! explicit coordinator object handed to whoever needs it, never ambient
//! global state. A token key stands in for a thread in unit tests.

use crate::engine::{BrowserId, ContextId, FrameId, PageId};
use crate::result::{EnsayoError, EnsayoResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

/// Identity a session is keyed by: the executing thread, or an explicit
/// token for tests that exercise multi-session behavior without threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Real OS thread identity
    Thread(std::thread::ThreadId),
    /// Explicit test token
    Token(u64),
}

impl SessionKey {
    /// Key for the calling thread
    #[must_use]
    pub fn current() -> Self {
        Self::Thread(std::thread::current().id())
    }

    /// Explicit token key
    #[must_use]
    pub const fn token(id: u64) -> Self {
        Self::Token(id)
    }
}

/// The set of resources owned by one test execution
#[derive(Debug, Clone)]
pub struct Session {
    /// Test this session belongs to
    pub test_name: String,
    /// Browser handle
    pub browser: BrowserId,
    /// Isolated context handle
    pub context: ContextId,
    /// Page handle
    pub page: PageId,
    /// Main frame of the page
    pub main_frame: FrameId,
    /// Explicitly selected frame, if any
    pub frame_override: Option<FrameId>,
    /// Exclusive recording directory for this session
    pub video_dir: PathBuf,
    /// Where the trace will be written at teardown
    pub trace_path: PathBuf,
    /// When the session became active
    pub started_at: Instant,
}

/// Thread-partitioned storage of active sessions.
///
/// The mutex only guards the map itself; entries belong to disjoint keys,
/// so there is no cross-key contention beyond the brief lookup.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<SessionKey, Session>>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under a key. Replaces any previous entry.
    pub fn insert(&self, key: SessionKey, session: Session) {
        self.inner.lock().unwrap().insert(key, session);
    }

    /// Remove and return a key's session. Idempotent.
    pub fn remove(&self, key: SessionKey) -> Option<Session> {
        self.inner.lock().unwrap().remove(&key)
    }

    /// Remove a key's session, if any. Idempotent.
    pub fn clear(&self, key: SessionKey) {
        let _ = self.remove(key);
    }

    /// Whether a key has an active session
    #[must_use]
    pub fn contains(&self, key: SessionKey) -> bool {
        self.inner.lock().unwrap().contains_key(&key)
    }

    /// Number of active sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether no sessions are active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a key's session
    pub fn session_for(&self, key: SessionKey) -> EnsayoResult<Session> {
        self.inner
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::uninitialized(key))
    }

    /// Active page for a key
    ///
    /// # Errors
    ///
    /// `UninitializedSession` when the key has no session; callers must not
    /// proceed without one.
    pub fn active_page_for(&self, key: SessionKey) -> EnsayoResult<PageId> {
        self.inner
            .lock()
            .unwrap()
            .get(&key)
            .map(|s| s.page)
            .ok_or_else(|| Self::uninitialized(key))
    }

    /// Active page for the calling thread
    pub fn active_page(&self) -> EnsayoResult<PageId> {
        self.active_page_for(SessionKey::current())
    }

    /// Replace a key's page. Clears any frame override so the next frame
    /// lookup cannot target a frame of the previous page.
    pub fn set_active_page_for(
        &self,
        key: SessionKey,
        page: PageId,
        main_frame: FrameId,
    ) -> EnsayoResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.get_mut(&key).ok_or_else(|| Self::uninitialized(key))?;
        session.page = page;
        session.main_frame = main_frame;
        session.frame_override = None;
        Ok(())
    }

    /// Replace the calling thread's page
    pub fn set_active_page(&self, page: PageId, main_frame: FrameId) -> EnsayoResult<()> {
        self.set_active_page_for(SessionKey::current(), page, main_frame)
    }

    /// Select a frame for subsequent operations on a key
    pub fn set_active_frame_for(&self, key: SessionKey, frame: FrameId) -> EnsayoResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.get_mut(&key).ok_or_else(|| Self::uninitialized(key))?;
        session.frame_override = Some(frame);
        Ok(())
    }

    /// Select a frame for the calling thread
    pub fn set_active_frame(&self, frame: FrameId) -> EnsayoResult<()> {
        self.set_active_frame_for(SessionKey::current(), frame)
    }

    /// Active frame for a key: the explicit selection, or the page's main
    /// frame when none was made. Never null once a page exists.
    pub fn active_frame_for(&self, key: SessionKey) -> EnsayoResult<FrameId> {
        self.inner
            .lock()
            .unwrap()
            .get(&key)
            .map(|s| s.frame_override.unwrap_or(s.main_frame))
            .ok_or_else(|| Self::uninitialized(key))
    }

    /// Active frame for the calling thread
    pub fn active_frame(&self) -> EnsayoResult<FrameId> {
        self.active_frame_for(SessionKey::current())
    }

    fn uninitialized(key: SessionKey) -> EnsayoError {
        EnsayoError::uninitialized(format!(
            "no session registered for {key:?}; begin a session first"
        ))
    }
}
