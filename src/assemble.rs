//! # Feed Assembler
//! Maps raw article payloads into normalized `NewsStory` records.
//!
//! Steps per page:
//! 1) fill structural placeholders for missing details/timeline
//! 2) derive the ordered component list
//! 3) drop in-page duplicate ids (first occurrence wins)
//! 4) stable sort by descending score
//!
//! The opening card is prepended after sorting and never takes part in it.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Local, Timelike, Utc};

use crate::story::{ComponentKind, NewsStory, OpeningCard, RawArticle, Story, TimelineEntry};

const PLACEHOLDER_DETAILS: [&str; 3] = [
    "Key facts are still being gathered for this story.",
    "Context and background will be added as reporting develops.",
    "Check back soon for a fuller picture.",
];

const PLACEHOLDER_TIMELINE: [(&str, &str); 4] = [
    ("Background", "How the story began"),
    ("Development", "Events as they unfolded"),
    ("Now", "Where things stand today"),
    ("Next", "What to watch for"),
];

fn placeholder_details() -> Vec<String> {
    PLACEHOLDER_DETAILS.iter().map(|s| s.to_string()).collect()
}

fn placeholder_timeline() -> Vec<TimelineEntry> {
    PLACEHOLDER_TIMELINE
        .iter()
        .map(|(date, event)| TimelineEntry {
            date: date.to_string(),
            event: event.to_string(),
        })
        .collect()
}

fn has_data(kind: ComponentKind, story: &NewsStory) -> bool {
    match kind {
        ComponentKind::Details => !story.details.is_empty(),
        ComponentKind::Timeline => !story.timeline.is_empty(),
        ComponentKind::Map => story.map.as_ref().is_some_and(json_non_empty),
        ComponentKind::Graph => story.graph.as_ref().is_some_and(json_non_empty),
    }
}

fn json_non_empty(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => false,
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Ordered components for a story. A declared list is intersected with the
/// data actually present; without one every kind is probed directly.
pub fn derive_components(declared: Option<&[String]>, story: &NewsStory) -> Vec<ComponentKind> {
    let declared: Option<HashSet<ComponentKind>> = declared
        .filter(|d| !d.is_empty())
        .map(|d| d.iter().filter_map(|t| ComponentKind::parse(t)).collect());

    ComponentKind::ORDER
        .into_iter()
        .filter(|kind| declared.as_ref().map_or(true, |d| d.contains(kind)))
        .filter(|kind| has_data(*kind, story))
        .collect()
}

/// Normalize a single raw article.
pub fn to_news(raw: RawArticle) -> NewsStory {
    let details = match raw.details {
        Some(d) if !d.is_empty() => d,
        _ => placeholder_details(),
    };
    let timeline = match raw.timeline {
        Some(t) if !t.is_empty() => t,
        _ => placeholder_timeline(),
    };

    let mut story = NewsStory {
        id: raw.id,
        rank: raw.rank,
        score: raw.score,
        category: raw.category,
        components: Vec::new(),
        published_at: raw.published_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        interest_tags: raw.interest_tags,
        title: raw.title,
        summary: raw.summary,
        image_url: raw.image_url,
        details,
        timeline,
        map: raw.map,
        graph: raw.graph,
    };
    story.components = derive_components(raw.components.as_deref(), &story);
    story
}

/// Assemble one page of articles into sorted news stories (no opening card).
pub fn assemble_page(raw: Vec<RawArticle>) -> Vec<Story> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut out: Vec<NewsStory> = Vec::with_capacity(raw.len());
    for r in raw {
        if r.id.trim().is_empty() || !seen.insert(r.id.clone()) {
            tracing::debug!(target: "feed", id = %r.id, "dropping blank or duplicate id in page");
            continue;
        }
        out.push(to_news(r));
    }

    // `sort_by` is stable, so equal scores keep source order.
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out.into_iter().map(Story::news).collect()
}

/// Assemble the initial feed: opening card followed by the sorted page.
pub fn assemble_feed(raw: Vec<RawArticle>, opening: OpeningCard) -> Vec<Story> {
    let page = assemble_page(raw);
    let mut out = Vec::with_capacity(page.len() + 1);
    out.push(Story::Opening(opening));
    out.extend(page);
    out
}

/// Opening card for the given local time, e.g. "Good morning, Ada" / "Sunday, October 18".
pub fn opening_card(now: DateTime<Local>, name: Option<&str>) -> OpeningCard {
    let part = match now.hour() {
        5..=11 => "Good morning",
        12..=16 => "Good afternoon",
        _ => "Good evening",
    };
    let greeting = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("{part}, {n}"),
        None => part.to_string(),
    };
    let date_label = format!("{}, {} {}", now.format("%A"), now.format("%B"), now.day());
    OpeningCard {
        greeting,
        date_label,
    }
}
