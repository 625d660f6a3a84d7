// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod assemble;
pub mod config;
pub mod content;
pub mod gesture;
pub mod host;
pub mod metrics;
pub mod navigation;
pub mod pagination;
pub mod read_filter;
pub mod shared;
pub mod state;
pub mod story;
pub mod window;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::FeedConfig;
pub use crate::content::{ContentService, HttpContentService, PageResponse, Pagination};
pub use crate::host::{AuthStatus, FeedHost, Services, StaticAuth};
pub use crate::navigation::{InputEvent, Transition};
pub use crate::state::{FeedSnapshot, FeedState};
pub use crate::story::{RawArticle, Story};
