use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const PAGES_LOADED: &str = "feed_pages_loaded_total";
pub const FETCH_ERRORS: &str = "feed_fetch_errors_total";
pub const CAP_HITS: &str = "feed_cap_hits_total";
pub const REFRESH_COMMITS: &str = "feed_refresh_commits_total";
pub const SHARED_INJECTED: &str = "feed_shared_injected_total";
pub const SHARED_ABANDONED: &str = "feed_shared_abandoned_total";
pub const PAYWALL_BLOCKS: &str = "feed_paywall_blocks_total";
pub const SEQUENCE_LEN: &str = "feed_sequence_len";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(PAGES_LOADED, "Feed pages fetched (initial, pagination, refresh).");
        describe_counter!(FETCH_ERRORS, "Content service failures swallowed by the feed.");
        describe_counter!(CAP_HITS, "Pages whose tail was dropped by the memory cap.");
        describe_counter!(REFRESH_COMMITS, "Background refreshes that changed the feed.");
        describe_counter!(SHARED_INJECTED, "Deep-linked articles placed into the feed.");
        describe_counter!(SHARED_ABANDONED, "Deep-linked articles given up after the retry budget.");
        describe_counter!(PAYWALL_BLOCKS, "Forward moves absorbed by the paywall.");
        describe_gauge!(SEQUENCE_LEN, "Stories currently held in the feed.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Recorder that is not installed globally; renders an empty exposition.
    /// Handy for routers built in tests.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
