//! # Shared-article injection
//! Places a deep-linked article right after the opening card, exactly once.
//!
//! The request is a small state machine (`Pending` → `Resolved` | `Abandoned`).
//! Every resolution attempt checks and transitions inside one synchronous call
//! on the latest `FeedState`, so concurrent fetch/page/poll tasks cannot inject
//! twice.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assemble::to_news;
use crate::state::FeedState;
use crate::story::{NewsStory, RawArticle, Story};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 25;

/// Session-scoped fallback for a deep-link id, so an in-session reload can
/// recover it without the URL parameter.
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, id: &str);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<String> {
        self.slot.lock().expect("session store mutex poisoned").clone()
    }

    fn set(&self, id: &str) {
        *self.slot.lock().expect("session store mutex poisoned") = Some(id.to_string());
    }

    fn clear(&self) {
        *self.slot.lock().expect("session store mutex poisoned") = None;
    }
}

/// Stores the pending id as a one-line text file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write(&self, id: &str) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating session dir {}", dir.display()))?;
        }
        fs::write(&self.path, id)
            .with_context(|| format!("writing session id to {}", self.path.display()))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<String> {
        fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn set(&self, id: &str) {
        if let Err(e) = self.write(id) {
            warn!(target: "shared", "session store: {e:#}");
        }
    }

    fn clear(&self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(target: "shared", path = %self.path.display(), error = %e, "session store clear failed");
            }
        }
    }
}

/// The three places a deep-link id may come from, highest priority first.
pub struct DeepLinkSources<'a> {
    /// Set synchronously the moment the link is discovered (URL parameter).
    pub reference: Option<&'a str>,
    /// Id already held by the host from an earlier discovery.
    pub pending: Option<&'a str>,
    /// Recovered after an in-session reload.
    pub session: &'a dyn SessionStore,
}

impl DeepLinkSources<'_> {
    pub fn resolve(&self) -> Option<String> {
        let clean = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        clean(self.reference)
            .or_else(|| clean(self.pending))
            .or_else(|| clean(self.session.get().as_deref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Resolved,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharedArticleRequest {
    target_id: String,
    state: RequestState,
    fetched_payload: Option<NewsStory>,
}

/// What a single resolution attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// Found in the sequence and moved to slot 1 (from the given index).
    Moved { from: usize },
    /// Independently fetched payload spliced into slot 1.
    Spliced,
    /// Neither path is available yet; try again later.
    NotReady,
    /// Request was already resolved or abandoned.
    Inactive,
}

impl InjectOutcome {
    pub fn injected(self) -> bool {
        matches!(self, Self::Moved { .. } | Self::Spliced)
    }
}

impl SharedArticleRequest {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            state: RequestState::Pending,
            fetched_payload: None,
        }
    }

    /// Build a request from whichever source has an id and stash it in the
    /// session store so a reload can find it again.
    pub fn discover(sources: &DeepLinkSources<'_>) -> Option<Self> {
        let id = sources.resolve()?;
        sources.session.set(&id);
        info!(target: "shared", %id, "deep link discovered");
        Some(Self::new(id))
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn handled(&self) -> bool {
        self.state != RequestState::Pending
    }

    /// Target id while the request is still pending.
    pub fn pending_target(&self) -> Option<&str> {
        (self.state == RequestState::Pending).then_some(self.target_id.as_str())
    }

    /// Id that was placed into the feed, once resolved.
    pub fn resolved_id(&self) -> Option<&str> {
        (self.state == RequestState::Resolved).then_some(self.target_id.as_str())
    }

    pub fn has_payload(&self) -> bool {
        self.fetched_payload.is_some()
    }

    /// Attach the independently fetched article. Ignored once handled or when
    /// the payload is for another id.
    pub fn attach_payload(&mut self, raw: RawArticle) -> bool {
        if self.handled() {
            return false;
        }
        if raw.id != self.target_id {
            warn!(target: "shared", expected = %self.target_id, got = %raw.id, "shared payload id mismatch");
            return false;
        }
        self.fetched_payload = Some(to_news(raw));
        true
    }

    /// Give up silently. Returns false if the request was not pending.
    pub fn abandon(&mut self) -> bool {
        if self.handled() {
            return false;
        }
        self.state = RequestState::Abandoned;
        self.fetched_payload = None;
        warn!(target: "shared", id = %self.target_id, "deep link abandoned, showing ranked feed");
        true
    }

    fn resolve(&mut self) {
        self.state = RequestState::Resolved;
        self.fetched_payload = None;
    }
}

/// One resolution attempt against the latest feed state.
///
/// 1) target already in the sequence: move it to index 1
/// 2) otherwise a fetched payload: splice it in at index 1
/// 3) otherwise leave everything unchanged
///
/// Both successful paths set the cursor to 1 and resolve the request.
pub fn try_inject(state: &mut FeedState, req: &mut SharedArticleRequest) -> InjectOutcome {
    if req.handled() {
        return InjectOutcome::Inactive;
    }
    if !state.is_populated() {
        return InjectOutcome::NotReady;
    }

    if let Some(k) = state.position_of(&req.target_id) {
        if k != 1 {
            let story = state.sequence.remove(k);
            state.sequence.insert(1, story);
        }
        state.set_cursor(1);
        req.resolve();
        info!(target: "shared", id = %req.target_id, from = k, "shared article moved to front");
        return InjectOutcome::Moved { from: k };
    }

    if let Some(payload) = req.fetched_payload.take() {
        state.sequence.insert(1, Story::news(payload));
        if state.truncate_to_cap() {
            debug!(target: "shared", "splice pushed the feed past its cap, tail trimmed");
        }
        state.set_cursor(1);
        req.resolve();
        info!(target: "shared", id = %req.target_id, "shared article spliced in");
        return InjectOutcome::Spliced;
    }

    InjectOutcome::NotReady
}

/// How a polling resolution loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryExit {
    Found,
    Exhausted,
    Superseded,
}

/// Fixed-interval attempt budget for polling resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub interval: Duration,
    pub attempts: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(interval: Duration, attempts: u32) -> Self {
        Self {
            interval,
            attempts: attempts.max(1),
            used: 0,
        }
    }

    /// Consume one attempt; false once the budget is spent.
    pub fn take(&mut self) -> bool {
        if self.used >= self.attempts {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL, DEFAULT_RETRY_ATTEMPTS)
    }
}
