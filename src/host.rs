//! # Feed host
//! Owns the feed state and the shared-article request and runs the async
//! work around them: initial load, pagination, background refresh,
//! deep-link fetch and the bounded deep-link polling loop.
//!
//! Every mutation goes through [`FeedHost::commit`], which applies a pure
//! transition to the latest committed state under one lock. Fetches happen
//! outside the lock; nothing captured before an await is written back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assemble::{assemble_feed, assemble_page};
use crate::config::FeedConfig;
use crate::content::ContentService;
use crate::metrics as m;
use crate::navigation::{InputEvent, Navigator, Transition, STEP_TRANSITION_SECS};
use crate::pagination::{abort_load, apply_page, apply_refresh, begin_load, should_prefetch};
use crate::read_filter::{filter_read, ReadHistory};
use crate::shared::{
    try_inject, DeepLinkSources, InjectOutcome, RequestState, RetryBudget, RetryExit,
    SessionStore, SharedArticleRequest,
};
use crate::state::{FeedSnapshot, FeedState};
use crate::story::{ComponentKind, OpeningCard};
use crate::window::{self, Slot};

/// "Is the reader signed in", owned by the auth subsystem.
pub trait AuthStatus: Send + Sync {
    fn is_authenticated(&self) -> bool;
}

/// Auth flag flipped by the embedding application.
#[derive(Debug, Default)]
pub struct StaticAuth(AtomicBool);

impl StaticAuth {
    pub fn new(authenticated: bool) -> Self {
        Self(AtomicBool::new(authenticated))
    }

    pub fn set(&self, authenticated: bool) {
        self.0.store(authenticated, Ordering::Relaxed);
    }
}

impl AuthStatus for StaticAuth {
    fn is_authenticated(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// External collaborators the host consumes.
#[derive(Clone)]
pub struct Services {
    pub content: Arc<dyn ContentService>,
    pub history: Arc<dyn ReadHistory>,
    pub session: Arc<dyn SessionStore>,
    pub auth: Arc<dyn AuthStatus>,
}

/// Everything guarded by the host lock.
pub struct Core {
    pub feed: FeedState,
    pub shared: Option<SharedArticleRequest>,
    nav: Navigator,
}

struct Inner {
    cfg: FeedConfig,
    services: Services,
    opening: OpeningCard,
    core: Mutex<Core>,
    retry_task: Mutex<Option<JoinHandle<RetryExit>>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct FeedHost {
    inner: Arc<Inner>,
}

impl FeedHost {
    pub fn new(cfg: FeedConfig, services: Services, opening: OpeningCard) -> Self {
        let cfg = cfg.sanitized();
        m::ensure_metrics_described();
        let core = Core {
            feed: FeedState::new(opening.clone(), cfg.memory_cap),
            shared: None,
            nav: Navigator::new(cfg.paywall_threshold, cfg.rearm_delay_ms),
        };
        Self {
            inner: Arc::new(Inner {
                cfg,
                services,
                opening,
                core: Mutex::new(core),
                retry_task: Mutex::new(None),
                refresh_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.cfg
    }

    /// Apply `f` to the latest committed state in one synchronous step.
    pub fn commit<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        let mut core = self.inner.core.lock().expect("feed core mutex poisoned");
        let out = f(&mut *core);
        debug_assert!(
            core.feed.check_invariants().is_ok(),
            "feed invariant broken: {:?}",
            core.feed.check_invariants()
        );
        gauge!(m::SEQUENCE_LEN).set(core.feed.len() as f64);
        out
    }

    /// Read-only access to the latest committed state.
    pub fn with_state<R>(&self, f: impl FnOnce(&FeedState) -> R) -> R {
        let core = self.inner.core.lock().expect("feed core mutex poisoned");
        f(&core.feed)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.with_state(FeedState::snapshot)
    }

    pub fn shared_state(&self) -> Option<RequestState> {
        let core = self.inner.core.lock().expect("feed core mutex poisoned");
        core.shared.as_ref().map(SharedArticleRequest::state)
    }

    /// Materialization window around the cursor.
    pub fn with_window<R>(&self, f: impl FnOnce(&[Slot<'_>]) -> R) -> R {
        let radius = self.inner.cfg.window_radius;
        self.with_state(|st| {
            let slots = window::view(st.sequence(), st.current_index(), radius, |s| {
                s.news_id()
                    .map(|id| st.active_component(id))
                    .unwrap_or_default()
            });
            f(&slots)
        })
    }

    /// Boot the feed: discover a deep link, load page 1, then leave the
    /// deep-link fetch, polling and background refresh running.
    pub async fn start(&self, url_param: Option<&str>) {
        let target = self.discover_shared(url_param);
        if target.is_some() {
            let host = self.clone();
            tokio::spawn(async move { host.fetch_shared().await });
        }

        self.load_initial().await;

        if self.shared_state() == Some(RequestState::Pending) {
            self.spawn_retry();
        }
        if let Some(delay) = self.inner.cfg.background_refresh_delay() {
            let host = self.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                host.background_refresh().await;
            });
            self.replace_refresh_task(handle);
        }
    }

    /// Open a shared-article request from the URL parameter, a pending id or
    /// the session fallback. A handled request is never reopened.
    pub fn discover_shared(&self, url_param: Option<&str>) -> Option<String> {
        let session = self.inner.services.session.clone();
        self.commit(|core| {
            if core.shared.as_ref().is_some_and(SharedArticleRequest::handled) {
                return None;
            }
            let pending = core
                .shared
                .as_ref()
                .and_then(|r| r.pending_target())
                .map(str::to_string);
            let req = SharedArticleRequest::discover(&DeepLinkSources {
                reference: url_param,
                pending: pending.as_deref(),
                session: session.as_ref(),
            })?;
            let id = req.pending_target().map(str::to_string);
            if pending.as_deref() != id.as_deref() {
                core.shared = Some(req);
            }
            id
        })
    }

    /// Load and commit page 1 with the opening card. Failures keep the
    /// opening-only feed.
    pub async fn load_initial(&self) -> bool {
        let cfg = &self.inner.cfg;
        let page = match self.inner.services.content.fetch_page(1, cfg.page_size).await {
            Ok(p) => p,
            Err(e) => {
                self.fetch_failed("initial", &e);
                return false;
            }
        };
        counter!(m::PAGES_LOADED).increment(1);

        let history = self.inner.services.history.clone();
        let opening = self.inner.opening.clone();
        self.commit(|core| {
            let pending = core.shared.as_ref().and_then(|r| r.pending_target());
            let stories = filter_read(assemble_feed(page.articles, opening), history.as_ref(), pending);
            if core.feed.load_initial(stories, page.pagination.has_more) {
                counter!(m::CAP_HITS).increment(1);
            }
            info!(target: "feed", len = core.feed.len(), has_more = core.feed.has_more(), "initial page committed");
            self.inject_locked(core);
        });
        true
    }

    /// Request `page_number`. Dropped while another load is in flight.
    pub async fn load_more(&self, page_number: u32) -> bool {
        if !self.commit(|core| begin_load(&mut core.feed)) {
            debug!(target: "feed", page = page_number, "load already in flight, dropping request");
            return false;
        }
        self.run_load(page_number).await
    }

    /// Fetch and commit a page; the caller holds the in-flight slot.
    async fn run_load(&self, page_number: u32) -> bool {
        let page_size = self.inner.cfg.page_size;
        let page = match self.inner.services.content.fetch_page(page_number, page_size).await {
            Ok(p) => p,
            Err(e) => {
                self.commit(|core| abort_load(&mut core.feed));
                self.fetch_failed("page", &e);
                return false;
            }
        };
        counter!(m::PAGES_LOADED).increment(1);

        let history = self.inner.services.history.clone();
        self.commit(|core| {
            let pending = core.shared.as_ref().and_then(|r| r.pending_target());
            let stories = filter_read(assemble_page(page.articles), history.as_ref(), pending);
            let outcome = apply_page(&mut core.feed, page_number, stories, page.pagination.has_more);
            if outcome.cap_hit {
                counter!(m::CAP_HITS).increment(1);
            }
            self.inject_locked(core);
        });
        // a page that added nothing leaves the trigger armed at the tail
        self.maybe_prefetch();
        true
    }

    /// Re-fetch page 1 to pick up newly published stories. Commits only when
    /// the page holds an id the current feed lacks.
    pub async fn background_refresh(&self) -> bool {
        let page_size = self.inner.cfg.page_size;
        let page = match self.inner.services.content.fetch_page(1, page_size).await {
            Ok(p) => p,
            Err(e) => {
                self.fetch_failed("refresh", &e);
                return false;
            }
        };
        counter!(m::PAGES_LOADED).increment(1);

        let history = self.inner.services.history.clone();
        self.commit(|core| {
            let pending = core.shared.as_ref().and_then(|r| r.pending_target());
            let stories = filter_read(assemble_page(page.articles), history.as_ref(), pending);
            let pinned = core
                .shared
                .as_ref()
                .and_then(|r| r.resolved_id())
                .map(str::to_string);
            let changed = apply_refresh(&mut core.feed, stories, pinned.as_deref());
            if changed {
                counter!(m::REFRESH_COMMITS).increment(1);
                self.inject_locked(core);
            }
            changed
        })
    }

    /// Fetch the deep-linked article on its own and try to place it.
    pub async fn fetch_shared(&self) -> bool {
        let target = {
            let core = self.inner.core.lock().expect("feed core mutex poisoned");
            core.shared
                .as_ref()
                .and_then(|r| r.pending_target())
                .map(str::to_string)
        };
        let Some(id) = target else { return false };

        match self.inner.services.content.fetch_by_id(&id).await {
            Ok(Some(raw)) => self.commit(|core| {
                let attached = core
                    .shared
                    .as_mut()
                    .is_some_and(|req| req.attach_payload(raw));
                if attached {
                    self.inject_locked(core);
                }
                attached
            }),
            Ok(None) => {
                warn!(target: "shared", %id, "shared article not found, waiting for feed pages");
                false
            }
            Err(e) => {
                self.fetch_failed("shared", &e);
                false
            }
        }
    }

    /// One polling attempt; the exit tag says whether the loop should stop.
    pub fn poll_shared(&self) -> Option<RetryExit> {
        self.commit(|core| {
            let state = core.shared.as_ref().map(SharedArticleRequest::state);
            if state != Some(RequestState::Pending) {
                return Some(RetryExit::Superseded);
            }
            self.inject_locked(core).injected().then_some(RetryExit::Found)
        })
    }

    /// Start the bounded polling loop (interval × attempts), replacing any
    /// earlier loop. On exhaustion the request is abandoned silently.
    pub fn spawn_retry(&self) {
        let host = self.clone();
        let mut budget = RetryBudget::new(self.inner.cfg.retry_interval(), self.inner.cfg.retry_attempts);
        let handle = tokio::spawn(async move {
            while budget.take() {
                tokio::time::sleep(budget.interval).await;
                if let Some(exit) = host.poll_shared() {
                    debug!(target: "shared", ?exit, attempts = budget.used(), "polling finished");
                    return exit;
                }
            }
            host.abandon_shared();
            RetryExit::Exhausted
        });

        let mut slot = self.inner.retry_task.lock().expect("retry task mutex poisoned");
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Wait for the polling loop to finish. `None` when no loop is running.
    pub async fn join_retry(&self) -> Option<RetryExit> {
        let handle = self.inner.retry_task.lock().expect("retry task mutex poisoned").take()?;
        Some(handle.await.unwrap_or(RetryExit::Superseded))
    }

    pub fn cancel_retry(&self) {
        if let Some(h) = self.inner.retry_task.lock().expect("retry task mutex poisoned").take() {
            h.abort();
        }
    }

    /// Give up on the pending deep link and clear its persisted trace.
    pub fn abandon_shared(&self) -> bool {
        let abandoned = self.commit(|core| core.shared.as_mut().is_some_and(SharedArticleRequest::abandon));
        if abandoned {
            self.inner.services.session.clear();
            counter!(m::SHARED_ABANDONED).increment(1);
        }
        abandoned
    }

    /// Stop the polling loop and any scheduled refresh.
    pub fn shutdown(&self) {
        self.cancel_retry();
        if let Some(h) = self.inner.refresh_task.lock().expect("refresh task mutex poisoned").take() {
            h.abort();
        }
    }

    fn replace_refresh_task(&self, handle: JoinHandle<()>) {
        let mut slot = self.inner.refresh_task.lock().expect("refresh task mutex poisoned");
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Route one input event, then mark the landed-on story read and
    /// prefetch when the tail is near.
    pub fn handle_input(&self, event: InputEvent) -> Transition {
        let authenticated = self.inner.services.auth.is_authenticated();
        let t = self.commit(|core| {
            let Core { feed, nav, .. } = core;
            nav.handle(feed, event, authenticated)
        });
        self.after_transition(t);
        t
    }

    pub fn advance(&self) -> Transition {
        let authenticated = self.inner.services.auth.is_authenticated();
        let t = self.commit(|core| {
            core.nav
                .advance(&mut core.feed, authenticated, STEP_TRANSITION_SECS)
        });
        self.after_transition(t);
        t
    }

    pub fn retreat(&self) -> Transition {
        let t = self.commit(|core| core.nav.retreat(&mut core.feed, STEP_TRANSITION_SECS));
        self.after_transition(t);
        t
    }

    pub fn go_to_story(&self, index: usize) -> bool {
        let moved = self.commit(|core| core.nav.go_to_story(&mut core.feed, index));
        if moved {
            self.mark_current_read();
            self.maybe_prefetch();
        }
        moved
    }

    pub fn select_component(&self, id: &str, kind: ComponentKind) -> bool {
        self.commit(|core| core.feed.select_component(id, kind))
    }

    fn after_transition(&self, t: Transition) {
        match t {
            Transition::Moved { .. } => {
                self.mark_current_read();
                self.maybe_prefetch();
            }
            // pushing against the tail re-checks the trigger
            Transition::Ignored | Transition::SnapBack { .. } => {
                self.maybe_prefetch();
            }
            Transition::Blocked => counter!(m::PAYWALL_BLOCKS).increment(1),
            _ => {}
        }
    }

    fn mark_current_read(&self) {
        let id = self.with_state(|st| st.current().and_then(|s| s.news_id()).map(str::to_string));
        if let Some(id) = id {
            self.inner.services.history.mark_as_read(&id);
        }
    }

    /// Claim the load slot synchronously when the trigger fires, then fetch
    /// in the background. Returns the requested page.
    pub fn maybe_prefetch(&self) -> Option<u32> {
        let threshold = self.inner.cfg.prefetch_remaining;
        let next = self.commit(|core| {
            if should_prefetch(&core.feed, threshold) && begin_load(&mut core.feed) {
                Some(core.feed.page() + 1)
            } else {
                None
            }
        })?;
        debug!(target: "feed", page = next, "prefetching next page");
        let host = self.clone();
        tokio::spawn(async move { host.run_load(next).await });
        Some(next)
    }

    /// Resolution attempt with the lock held. Clears the session trace and
    /// marks the story read when the article lands.
    fn inject_locked(&self, core: &mut Core) -> InjectOutcome {
        let Some(req) = core.shared.as_mut() else {
            return InjectOutcome::Inactive;
        };
        let outcome = try_inject(&mut core.feed, req);
        if outcome.injected() {
            let path = match outcome {
                InjectOutcome::Moved { .. } => "move",
                _ => "splice",
            };
            counter!(m::SHARED_INJECTED, "path" => path).increment(1);
            self.inner.services.session.clear();
            if let Some(id) = req.resolved_id() {
                self.inner.services.history.mark_as_read(id);
            }
        }
        outcome
    }

    fn fetch_failed(&self, what: &'static str, e: &anyhow::Error) {
        warn!(
            target: "feed",
            provider = self.inner.services.content.name(),
            what,
            error = %format!("{e:#}"),
            "fetch failed, keeping current feed"
        );
        counter!(m::FETCH_ERRORS, "what" => what).increment(1);
    }
}
