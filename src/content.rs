//! Content service boundary: paged article fetch and single-article fetch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::story::RawArticle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub has_more: bool,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    #[serde(default)]
    pub articles: Vec<RawArticle>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[async_trait]
pub trait ContentService: Send + Sync {
    /// Fetch page `page` (1-based). Idempotent per page number.
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResponse>;
    /// Fetch one article; `Ok(None)` when it does not exist.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<RawArticle>>;
    fn name(&self) -> &'static str;
}

/// JSON-over-HTTP content service.
///
/// - `GET {base}/articles?page=N&pageSize=M` → `PageResponse`
/// - `GET {base}/articles/{id}` → `RawArticle` (404 means not found)
#[derive(Debug, Clone)]
pub struct HttpContentService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpContentService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ContentService for HttpContentService {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResponse> {
        let url = format!("{}/articles", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("page", page), ("pageSize", page_size)])
            .send()
            .await
            .with_context(|| format!("GET {url} page {page}"))?
            .error_for_status()
            .with_context(|| format!("page {page} status"))?;
        resp.json::<PageResponse>()
            .await
            .with_context(|| format!("parse page {page} body"))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<RawArticle>> {
        let url = format!("{}/articles/{}", self.base_url, id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .with_context(|| format!("article {id} status"))?;
        let article = resp
            .json::<RawArticle>()
            .await
            .with_context(|| format!("parse article {id} body"))?;
        Ok(Some(article))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
