//! # Feed state
//! The owned aggregate: ordered story sequence, cursor, pagination bookkeeping
//! and per-story active component.
//!
//! All mutators in `pagination`, `shared` and `navigation` take `&mut FeedState`
//! at commit time, so they always see the latest committed sequence.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::story::{ActiveComponent, CaughtUpReason, ComponentKind, OpeningCard, Story};

pub const DEFAULT_MEMORY_CAP: usize = 150;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub(crate) sequence: Vec<Story>,
    pub(crate) current_index: usize,
    pub(crate) page: u32,
    pub(crate) has_more: bool,
    pub(crate) memory_cap: usize,
    pub(crate) is_loading_more: bool,
    active: HashMap<String, ActiveComponent>,
}

/// First broken invariant found by [`FeedState::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    MissingOpening,
    MisplacedOpening(usize),
    MisplacedSentinel(usize),
    SentinelWhileMorePages,
    DuplicateId(String),
    OverCap { news: usize, cap: usize },
    CursorOutOfBounds { index: usize, len: usize },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOpening => write!(f, "sequence does not start with the opening card"),
            Self::MisplacedOpening(i) => write!(f, "opening card at index {i}"),
            Self::MisplacedSentinel(i) => write!(f, "sentinel at non-final index {i}"),
            Self::SentinelWhileMorePages => write!(f, "sentinel present while more pages exist"),
            Self::DuplicateId(id) => write!(f, "duplicate news id {id}"),
            Self::OverCap { news, cap } => write!(f, "{news} news stories exceed cap {cap}"),
            Self::CursorOutOfBounds { index, len } => {
                write!(f, "cursor {index} outside sequence of length {len}")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

impl FeedState {
    /// Empty feed holding only the opening card.
    pub fn new(opening: OpeningCard, memory_cap: usize) -> Self {
        Self {
            sequence: vec![Story::Opening(opening)],
            current_index: 0,
            page: 1,
            has_more: true,
            memory_cap: memory_cap.max(1),
            is_loading_more: false,
            active: HashMap::new(),
        }
    }

    /// Commit the first assembled and filtered page. The opening card must
    /// already be at index 0 of `stories`. Returns true when the memory cap
    /// cut the page, which ends the feed.
    pub fn load_initial(&mut self, stories: Vec<Story>, has_more: bool) -> bool {
        self.sequence = stories;
        if !self.sequence.first().is_some_and(Story::is_opening) {
            tracing::warn!(target: "feed", "initial page without opening card");
        }
        let cap_hit = self.truncate_to_cap();
        self.page = 1;
        self.has_more = has_more && !cap_hit;
        if cap_hit {
            self.push_sentinel(CaughtUpReason::CapReached);
        } else if !has_more {
            self.push_sentinel(CaughtUpReason::Exhausted);
        }
        self.current_index = self.current_index.min(self.sequence.len().saturating_sub(1));
        cap_hit
    }

    pub fn sequence(&self) -> &[Story] {
        &self.sequence
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&Story> {
        self.sequence.get(self.current_index)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn memory_cap(&self) -> usize {
        self.memory_cap
    }

    pub fn is_loading_more(&self) -> bool {
        self.is_loading_more
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn news_count(&self) -> usize {
        self.sequence.iter().filter(|s| s.is_news()).count()
    }

    /// News stories after the cursor.
    pub fn news_remaining_ahead(&self) -> usize {
        self.sequence
            .iter()
            .skip(self.current_index + 1)
            .filter(|s| s.is_news())
            .count()
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.sequence.iter().position(|s| s.news_id() == Some(id))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.position_of(id).is_some()
    }

    pub fn news_ids(&self) -> HashSet<&str> {
        self.sequence.iter().filter_map(|s| s.news_id()).collect()
    }

    /// More than just the opening card.
    pub fn is_populated(&self) -> bool {
        self.sequence.len() > 1
    }

    pub(crate) fn remove_sentinel(&mut self) {
        self.sequence.retain(|s| !s.is_sentinel());
    }

    pub(crate) fn push_sentinel(&mut self, reason: CaughtUpReason) {
        self.remove_sentinel();
        self.sequence.push(Story::AllCaughtUp { reason });
    }

    pub fn sentinel_reason(&self) -> Option<CaughtUpReason> {
        match self.sequence.last() {
            Some(Story::AllCaughtUp { reason }) => Some(*reason),
            _ => None,
        }
    }

    /// Keep the opening card plus the first `memory_cap` news stories.
    /// Returns true when anything was dropped.
    pub(crate) fn truncate_to_cap(&mut self) -> bool {
        let cap = self.memory_cap;
        let mut news_seen = 0usize;
        let before = self.sequence.len();
        self.sequence.retain(|s| {
            if s.is_news() {
                news_seen += 1;
                news_seen <= cap
            } else {
                true
            }
        });
        let dropped = before != self.sequence.len();
        if dropped {
            let live: HashSet<String> = self
                .sequence
                .iter()
                .filter_map(|s| s.news_id().map(str::to_string))
                .collect();
            self.active.retain(|id, _| live.contains(id));
        }
        dropped
    }

    /// Move the cursor, clamping to the sequence.
    pub(crate) fn set_cursor(&mut self, index: usize) {
        self.current_index = index.min(self.sequence.len().saturating_sub(1));
    }

    /// Active component of a news story; defaults to its first component.
    pub fn active_component(&self, id: &str) -> ActiveComponent {
        if let Some(a) = self.active.get(id) {
            return *a;
        }
        self.position_of(id)
            .and_then(|i| self.sequence[i].as_news())
            .and_then(|n| n.components.first().copied())
            .map(ActiveComponent::from)
            .unwrap_or_default()
    }

    /// Switch the visible component of a story. Kinds the story does not carry
    /// are rejected.
    pub fn select_component(&mut self, id: &str, kind: ComponentKind) -> bool {
        let carries = self
            .position_of(id)
            .and_then(|i| self.sequence[i].as_news())
            .is_some_and(|n| n.components.contains(&kind));
        if carries {
            self.active.insert(id.to_string(), kind.into());
        }
        carries
    }

    /// Verify the structural invariants of the sequence and cursor.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match self.sequence.first() {
            Some(s) if s.is_opening() => {}
            _ => return Err(InvariantViolation::MissingOpening),
        }
        let last = self.sequence.len() - 1;
        let mut seen = HashSet::new();
        let mut news = 0usize;
        for (i, s) in self.sequence.iter().enumerate() {
            match s {
                Story::Opening(_) if i != 0 => return Err(InvariantViolation::MisplacedOpening(i)),
                Story::AllCaughtUp { .. } if i != last => {
                    return Err(InvariantViolation::MisplacedSentinel(i))
                }
                Story::AllCaughtUp { .. } if self.has_more => {
                    return Err(InvariantViolation::SentinelWhileMorePages)
                }
                Story::News(n) => {
                    news += 1;
                    if !seen.insert(n.id.as_str()) {
                        return Err(InvariantViolation::DuplicateId(n.id.clone()));
                    }
                }
                _ => {}
            }
        }
        if news > self.memory_cap {
            return Err(InvariantViolation::OverCap {
                news,
                cap: self.memory_cap,
            });
        }
        if self.current_index >= self.sequence.len() {
            return Err(InvariantViolation::CursorOutOfBounds {
                index: self.current_index,
                len: self.sequence.len(),
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            stories: self.sequence.clone(),
            current_index: self.current_index,
            page: self.page,
            has_more: self.has_more,
            is_loading_more: self.is_loading_more,
            news_count: self.news_count(),
            active_component: self
                .current()
                .and_then(|s| s.news_id())
                .map(|id| self.active_component(id))
                .unwrap_or_default(),
        }
    }
}

/// Outbound view consumed by renderers and the debug router.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub stories: Vec<Story>,
    pub current_index: usize,
    pub page: u32,
    pub has_more: bool,
    pub is_loading_more: bool,
    pub news_count: usize,
    pub active_component: ActiveComponent,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::assemble::to_news;
    use crate::story::RawArticle;

    pub fn opening() -> OpeningCard {
        OpeningCard {
            greeting: "Good morning".into(),
            date_label: "Sunday, October 18".into(),
        }
    }

    pub fn news(id: &str, score: f64) -> Story {
        Story::news(to_news(RawArticle::new(id, score)))
    }

    /// State with the opening card plus the given news ids; `has_more = true`
    /// unless the ids overflow `cap`.
    pub fn state_with(ids: &[&str], cap: usize) -> FeedState {
        let mut st = FeedState::new(opening(), cap);
        let mut seq = vec![Story::Opening(opening())];
        seq.extend(ids.iter().map(|id| news(id, 1.0)));
        st.load_initial(seq, true);
        st
    }

    pub fn ids(st: &FeedState) -> Vec<String> {
        st.sequence()
            .iter()
            .filter_map(|s| s.news_id().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn initial_load_without_more_pages_appends_sentinel() {
        let mut st = FeedState::new(opening(), 10);
        st.load_initial(vec![Story::Opening(opening()), news("a", 1.0)], false);
        assert_eq!(st.sentinel_reason(), Some(CaughtUpReason::Exhausted));
        assert!(st.check_invariants().is_ok());
    }

    #[test]
    fn initial_load_respects_cap() {
        let st = state_with(&["a", "b", "c"], 2);
        assert_eq!(ids(&st), vec!["a", "b"]);
        assert!(st.check_invariants().is_ok());
    }

    #[test]
    fn oversized_initial_page_ends_feed_at_cap() {
        let mut st = FeedState::new(opening(), 2);
        let seq = vec![Story::Opening(opening()), news("a", 3.0), news("b", 2.0), news("c", 1.0)];
        assert!(st.load_initial(seq, true));
        assert!(!st.has_more());
        assert_eq!(st.sentinel_reason(), Some(CaughtUpReason::CapReached));
        assert!(st.check_invariants().is_ok());

        let mut fits = FeedState::new(opening(), 5);
        assert!(!fits.load_initial(vec![Story::Opening(opening()), news("a", 1.0)], true));
        assert!(fits.has_more());
        assert_eq!(fits.sentinel_reason(), None);
    }

    #[test]
    fn remaining_ahead_counts_only_news() {
        let mut st = state_with(&["a", "b", "c"], 10);
        st.push_sentinel(CaughtUpReason::Exhausted);
        st.set_cursor(1);
        assert_eq!(st.news_remaining_ahead(), 2);
    }

    #[test]
    fn component_selection_is_exclusive_and_validated() {
        let mut st = state_with(&["a"], 10);
        assert_eq!(st.active_component("a"), ActiveComponent::Details);
        assert!(st.select_component("a", ComponentKind::Timeline));
        assert_eq!(st.active_component("a"), ActiveComponent::Timeline);
        assert!(!st.select_component("a", ComponentKind::Map));
        assert_eq!(st.active_component("a"), ActiveComponent::Timeline);
        assert_eq!(st.active_component("missing"), ActiveComponent::None);
    }

    #[test]
    fn invariant_checker_flags_duplicates() {
        let mut st = state_with(&["a"], 10);
        st.sequence.push(news("a", 2.0));
        assert_eq!(
            st.check_invariants(),
            Err(InvariantViolation::DuplicateId("a".into()))
        );
    }

    #[test]
    fn cursor_is_clamped() {
        let mut st = state_with(&["a"], 10);
        st.set_cursor(99);
        assert_eq!(st.current_index(), 1);
    }
}
