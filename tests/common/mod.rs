// tests/common/mod.rs
// Shared fixtures: scripted content service and host builder.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use storyfeed::content::{ContentService, PageResponse, Pagination};
use storyfeed::host::{FeedHost, Services, StaticAuth};
use storyfeed::read_filter::MemoryReadHistory;
use storyfeed::shared::MemorySessionStore;
use storyfeed::story::{OpeningCard, RawArticle};
use storyfeed::FeedConfig;

/// Content service serving scripted pages and articles.
#[derive(Default)]
pub struct MockContent {
    pages: Mutex<HashMap<u32, PageResponse>>,
    articles: Mutex<HashMap<String, RawArticle>>,
    failing_pages: Mutex<HashSet<u32>>,
    pub page_delay: Duration,
    pub article_delay: Duration,
    pub page_calls: AtomicUsize,
}

impl MockContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delays(page_delay: Duration, article_delay: Duration) -> Self {
        Self {
            page_delay,
            article_delay,
            ..Self::default()
        }
    }

    pub fn set_page(&self, n: u32, scored: &[(&str, f64)], has_more: bool) {
        let articles = scored
            .iter()
            .map(|(id, score)| RawArticle::new(*id, *score))
            .collect();
        self.pages.lock().unwrap().insert(
            n,
            PageResponse {
                articles,
                pagination: Pagination { has_more, total: 0 },
            },
        );
    }

    pub fn set_article(&self, id: &str) {
        self.articles
            .lock()
            .unwrap()
            .insert(id.to_string(), RawArticle::new(id, 0.0));
    }

    pub fn fail_page(&self, n: u32) {
        self.failing_pages.lock().unwrap().insert(n);
    }

    pub fn recover_page(&self, n: u32) {
        self.failing_pages.lock().unwrap().remove(&n);
    }

    pub fn calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentService for MockContent {
    async fn fetch_page(&self, page: u32, _page_size: u32) -> Result<PageResponse> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
        if self.failing_pages.lock().unwrap().contains(&page) {
            return Err(anyhow!("page {page} unavailable"));
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<RawArticle>> {
        if !self.article_delay.is_zero() {
            tokio::time::sleep(self.article_delay).await;
        }
        Ok(self.articles.lock().unwrap().get(id).cloned())
    }

    fn name(&self) -> &'static str {
        "MockContent"
    }
}

pub struct Harness {
    pub host: FeedHost,
    pub content: Arc<MockContent>,
    pub history: Arc<MemoryReadHistory>,
    pub session: Arc<MemorySessionStore>,
    pub auth: Arc<StaticAuth>,
}

/// Config with the background refresh disabled so tests drive it by hand.
pub fn quiet_config() -> FeedConfig {
    FeedConfig {
        background_refresh_delay_ms: 0,
        ..FeedConfig::default()
    }
}

pub fn opening() -> OpeningCard {
    OpeningCard {
        greeting: "Good morning".into(),
        date_label: "Sunday, October 18".into(),
    }
}

pub fn harness(cfg: FeedConfig, content: MockContent, read: &[&str]) -> Harness {
    let content = Arc::new(content);
    let history = Arc::new(MemoryReadHistory::with_ids(read.iter().copied()));
    let session = Arc::new(MemorySessionStore::new());
    let auth = Arc::new(StaticAuth::new(false));
    let services = Services {
        content: content.clone(),
        history: history.clone(),
        session: session.clone(),
        auth: auth.clone(),
    };
    Harness {
        host: FeedHost::new(cfg, services, opening()),
        content,
        history,
        session,
        auth,
    }
}

/// News ids of the committed sequence, in order.
pub fn ids(host: &FeedHost) -> Vec<String> {
    host.with_state(|st| {
        st.sequence()
            .iter()
            .filter_map(|s| s.news_id().map(str::to_string))
            .collect()
    })
}

/// Let spawned tasks run; with paused time this also auto-advances the clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
