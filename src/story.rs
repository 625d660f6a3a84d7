//! # Story model
//! The renderable units of the feed plus the raw article payload they are built from.
//!
//! A `Story` is one of three things: the opening card (always first), a news
//! article, or the "all caught up" sentinel (always last when present).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Information component kinds a news story can carry, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Details,
    Timeline,
    Map,
    Graph,
}

impl ComponentKind {
    /// Fixed probing/display order.
    pub const ORDER: [ComponentKind; 4] = [
        ComponentKind::Details,
        ComponentKind::Timeline,
        ComponentKind::Map,
        ComponentKind::Graph,
    ];

    /// Lenient parse of a source-declared component tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "details" => Some(Self::Details),
            "timeline" => Some(Self::Timeline),
            "map" => Some(Self::Map),
            "graph" => Some(Self::Graph),
            _ => None,
        }
    }
}

/// Which component a story currently shows. At most one by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveComponent {
    Details,
    Timeline,
    Map,
    Graph,
    #[default]
    None,
}

impl From<ComponentKind> for ActiveComponent {
    fn from(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Details => Self::Details,
            ComponentKind::Timeline => Self::Timeline,
            ComponentKind::Map => Self::Map,
            ComponentKind::Graph => Self::Graph,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub date: String,
    pub event: String,
}

/// Article payload as delivered by the content service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    pub id: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interest_tags: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Source-declared component list; absent or empty means "probe the data".
    #[serde(default)]
    pub components: Option<Vec<String>>,
    #[serde(default)]
    pub details: Option<Vec<String>>,
    #[serde(default)]
    pub timeline: Option<Vec<TimelineEntry>>,
    #[serde(default)]
    pub map: Option<serde_json::Value>,
    #[serde(default)]
    pub graph: Option<serde_json::Value>,
}

impl RawArticle {
    /// Minimal article, mostly for tests and fixtures.
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            rank: 0,
            score,
            category: String::new(),
            title: String::new(),
            summary: String::new(),
            published_at: None,
            interest_tags: Vec::new(),
            image_url: None,
            components: None,
            details: None,
            timeline: None,
            map: None,
            graph: None,
        }
    }
}

/// Normalized news article as held in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsStory {
    pub id: String,
    pub rank: u32,
    pub score: f64,
    pub category: String,
    pub components: Vec<ComponentKind>,
    pub published_at: DateTime<Utc>,
    pub interest_tags: Vec<String>,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub details: Vec<String>,
    pub timeline: Vec<TimelineEntry>,
    pub map: Option<serde_json::Value>,
    pub graph: Option<serde_json::Value>,
}

/// Display-only first card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningCard {
    pub greeting: String,
    pub date_label: String,
}

/// Why the feed ended; drives the sentinel's user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaughtUpReason {
    /// The content service reported no further pages.
    Exhausted,
    /// The in-memory story cap was reached.
    CapReached,
}

impl CaughtUpReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::Exhausted => "You're all caught up. Check back later for fresh stories.",
            Self::CapReached => "That's plenty for today. Come back tomorrow for more.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Story {
    Opening(OpeningCard),
    News(Box<NewsStory>),
    AllCaughtUp { reason: CaughtUpReason },
}

impl Story {
    pub fn news(story: NewsStory) -> Self {
        Self::News(Box::new(story))
    }

    pub fn as_news(&self) -> Option<&NewsStory> {
        match self {
            Story::News(n) => Some(n),
            _ => None,
        }
    }

    /// Article id for news stories, `None` for cards.
    pub fn news_id(&self) -> Option<&str> {
        self.as_news().map(|n| n.id.as_str())
    }

    pub fn is_news(&self) -> bool {
        matches!(self, Story::News(_))
    }

    pub fn is_opening(&self) -> bool {
        matches!(self, Story::Opening(_))
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Story::AllCaughtUp { .. })
    }
}
