//! Storyfeed binary entrypoint.
//! Boots the feed host against an HTTP content service and serves the debug
//! router (feed snapshot, window, input, metrics).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storyfeed::assemble::opening_card;
use storyfeed::metrics::Metrics;
use storyfeed::read_filter::JsonReadHistory;
use storyfeed::shared::FileSessionStore;
use storyfeed::{create_router, FeedConfig, FeedHost, HttpContentService, Services, StaticAuth};

const DEFAULT_CONTENT_BASE_URL: &str = "http://127.0.0.1:3000/api";
const DEFAULT_STATE_DIR: &str = "state";
const DEFAULT_DEBUG_ADDR: &str = "127.0.0.1:8000";

/// Tracing setup. `FEED_LOG` holds the filter, `FEED_LOG_JSON=1` switches to
/// JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("FEED_LOG")
        .unwrap_or_else(|_| EnvFilter::new("storyfeed=info,feed=info,shared=info,warn"));
    let json = std::env::var("FEED_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

/// Deep-link id from `--article=<id>`, else `SHARED_ARTICLE_ID`.
fn shared_article_param() -> Option<String> {
    std::env::args()
        .find_map(|a| a.strip_prefix("--article=").map(str::to_string))
        .or_else(|| std::env::var("SHARED_ARTICLE_ID").ok())
        .filter(|s| !s.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = FeedConfig::load_default().context("loading feed config")?;
    let metrics = Metrics::init()?;

    let base_url =
        std::env::var("CONTENT_BASE_URL").unwrap_or_else(|_| DEFAULT_CONTENT_BASE_URL.to_string());
    let state_dir = PathBuf::from(
        std::env::var("FEED_STATE_DIR").unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string()),
    );
    let authenticated = std::env::var("FEED_AUTHENTICATED").is_ok_and(|v| v == "1");

    let services = Services {
        content: Arc::new(HttpContentService::new(base_url.clone())),
        history: Arc::new(JsonReadHistory::open(state_dir.join("read_history.json"))),
        session: Arc::new(FileSessionStore::new(state_dir.join("shared_article"))),
        auth: Arc::new(StaticAuth::new(authenticated)),
    };
    let opening = opening_card(chrono::Local::now(), cfg.greeting_name.as_deref());
    let host = FeedHost::new(cfg, services, opening);

    info!(target: "feed", %base_url, authenticated, "starting feed host");
    host.start(shared_article_param().as_deref()).await;

    let addr = std::env::var("FEED_DEBUG_ADDR").unwrap_or_else(|_| DEFAULT_DEBUG_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding debug router on {addr}"))?;
    info!(target: "feed", %addr, "debug router listening");

    let router = create_router(host.clone(), &metrics);
    let served = axum::serve(listener, router).await.context("debug router");
    host.shutdown();
    served
}
