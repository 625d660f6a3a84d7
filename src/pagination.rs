//! # Pagination & eviction
//! Appends fetched pages to the feed, enforces the memory cap and keeps the
//! "all caught up" sentinel in place. Also merges background refreshes.
//!
//! Every function here is a transition on the latest committed `FeedState`;
//! nothing captures the sequence across an await.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::state::FeedState;
use crate::story::{CaughtUpReason, Story};

/// Result of committing a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageOutcome {
    pub appended: usize,
    pub duplicates: usize,
    pub cap_hit: bool,
}

/// Claim the in-flight slot for a pagination request. Returns false (and the
/// caller must drop the request) when a load is already running.
pub fn begin_load(state: &mut FeedState) -> bool {
    if state.is_loading_more {
        return false;
    }
    state.is_loading_more = true;
    true
}

/// Release the in-flight slot after a failed fetch; the sequence is untouched.
pub fn abort_load(state: &mut FeedState) {
    state.is_loading_more = false;
}

/// Commit page `page_number`. `stories` must already be assembled and
/// read-filtered; cards in it are ignored.
pub fn apply_page(
    state: &mut FeedState,
    page_number: u32,
    stories: Vec<Story>,
    has_more: bool,
) -> PageOutcome {
    state.is_loading_more = false;
    // a cap reached while this page was in flight keeps the feed ended
    let ended_by_cap = state.sentinel_reason() == Some(CaughtUpReason::CapReached);
    state.remove_sentinel();

    let mut outcome = PageOutcome::default();
    let mut present: HashSet<String> = state
        .news_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    for s in stories {
        let Some(id) = s.news_id() else { continue };
        if !present.insert(id.to_string()) {
            outcome.duplicates += 1;
            continue;
        }
        state.sequence.push(s);
        outcome.appended += 1;
    }

    if state.news_count() > state.memory_cap {
        let before = state.news_count();
        state.truncate_to_cap();
        outcome.cap_hit = true;
        outcome.appended = outcome.appended.saturating_sub(before - state.news_count());
        info!(
            target: "feed",
            cap = state.memory_cap,
            dropped = before - state.news_count(),
            "memory cap reached, dropping tail of new page"
        );
    }

    state.page = page_number;
    let capped = outcome.cap_hit || ended_by_cap;
    state.has_more = has_more && !capped;
    if capped {
        state.push_sentinel(CaughtUpReason::CapReached);
    } else if !has_more {
        state.push_sentinel(CaughtUpReason::Exhausted);
    }
    state.set_cursor(state.current_index);

    debug!(
        target: "feed",
        page = page_number,
        appended = outcome.appended,
        duplicates = outcome.duplicates,
        has_more = state.has_more,
        len = state.len(),
        "page committed"
    );
    outcome
}

/// Whether the cursor is close enough to the tail to request the next page.
pub fn should_prefetch(state: &FeedState, remaining_threshold: usize) -> bool {
    state.has_more
        && !state.is_loading_more
        && state.current_index > 0
        && state.news_remaining_ahead() <= remaining_threshold
}

/// Merge a refreshed first page. Nothing happens unless the page carries at
/// least one id the current sequence lacks. `pinned` is an injected shared
/// article that keeps its slot right after the opening card.
///
/// On commit the refreshed stories lead, followed by the remaining stories in
/// their current order; the cursor follows the story it was on.
pub fn apply_refresh(state: &mut FeedState, fresh: Vec<Story>, pinned: Option<&str>) -> bool {
    let fresh: Vec<Story> = fresh.into_iter().filter(Story::is_news).collect();
    let has_new = {
        let present = state.news_ids();
        fresh
            .iter()
            .filter_map(|s| s.news_id())
            .any(|id| !present.contains(id))
    };
    if !has_new {
        debug!(target: "feed", "background refresh brought nothing new");
        return false;
    }

    let cursor_id = state.current().and_then(|s| s.news_id()).map(str::to_string);
    let cursor_on_sentinel = state.current().is_some_and(Story::is_sentinel);
    let sentinel = state.sentinel_reason();

    let old = std::mem::take(&mut state.sequence);
    let mut opening = None;
    let mut pinned_story = None;
    let mut rest = Vec::with_capacity(old.len());
    for s in old {
        if s.is_opening() {
            opening = Some(s);
        } else if s.is_sentinel() {
            continue;
        } else if pinned.is_some() && s.news_id() == pinned {
            pinned_story = Some(s);
        } else {
            rest.push(s);
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut next = Vec::with_capacity(rest.len() + fresh.len() + 2);
    next.extend(opening);
    if let Some(p) = pinned_story {
        if let Some(id) = p.news_id() {
            seen.insert(id.to_string());
        }
        next.push(p);
    }
    for s in fresh.into_iter().chain(rest) {
        let Some(id) = s.news_id() else { continue };
        if seen.insert(id.to_string()) {
            next.push(s);
        }
    }
    state.sequence = next;

    let cap_hit = state.truncate_to_cap();
    if cap_hit {
        state.has_more = false;
        state.push_sentinel(CaughtUpReason::CapReached);
    } else if let Some(reason) = sentinel {
        state.push_sentinel(reason);
    }

    let idx = if cursor_on_sentinel {
        state.len().saturating_sub(1)
    } else {
        cursor_id
            .as_deref()
            .and_then(|id| state.position_of(id))
            .unwrap_or(state.current_index)
    };
    state.set_cursor(idx);

    info!(target: "feed", len = state.len(), cap_hit, "background refresh committed");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[test]
    fn load_guard_drops_reentrant_requests() {
        let mut st = state_with(&["a"], 10);
        assert!(begin_load(&mut st));
        assert!(!begin_load(&mut st));
        abort_load(&mut st);
        assert!(begin_load(&mut st));
    }

    #[test]
    fn cap_already_full_admits_nothing() {
        let mut st = state_with(&["A", "B"], 2);
        assert!(begin_load(&mut st));
        let out = apply_page(&mut st, 2, vec![news("C", 1.0), news("D", 1.0)], true);
        assert_eq!(ids(&st), vec!["A", "B"]);
        assert!(out.cap_hit);
        assert_eq!(out.appended, 0);
        assert!(!st.has_more());
        assert_eq!(st.sentinel_reason(), Some(CaughtUpReason::CapReached));
        assert!(!st.is_loading_more());
        assert!(st.check_invariants().is_ok());
    }

    #[test]
    fn cap_keeps_head_and_drops_new_tail() {
        let mut st = state_with(&["A", "B"], 3);
        let out = apply_page(&mut st, 2, vec![news("C", 1.0), news("D", 1.0)], true);
        assert_eq!(ids(&st), vec!["A", "B", "C"]);
        assert_eq!(out.appended, 1);
        assert!(out.cap_hit);
    }

    #[test]
    fn page_in_flight_during_cap_refresh_keeps_feed_ended() {
        let mut st = state_with(&["a", "b", "c"], 3);
        assert!(begin_load(&mut st));
        assert!(apply_refresh(&mut st, vec![news("n", 9.0)], None));
        assert!(!st.has_more());
        assert_eq!(st.sentinel_reason(), Some(CaughtUpReason::CapReached));

        let out = apply_page(&mut st, 2, vec![news("a", 1.0)], true);
        assert!(!out.cap_hit);
        assert!(!st.has_more());
        assert_eq!(st.sentinel_reason(), Some(CaughtUpReason::CapReached));
        assert_eq!(st.news_count(), 3);
        assert!(!should_prefetch(&st, 5));
        assert!(st.check_invariants().is_ok());
    }

    #[test]
    fn last_page_appends_exhausted_sentinel_once() {
        let mut st = state_with(&["A"], 10);
        apply_page(&mut st, 2, vec![news("B", 1.0)], false);
        assert_eq!(st.sentinel_reason(), Some(CaughtUpReason::Exhausted));
        assert_eq!(st.page(), 2);
        // a late duplicate response re-appends the sentinel rather than stacking it
        apply_page(&mut st, 2, vec![news("B", 1.0)], false);
        assert_eq!(st.sequence().iter().filter(|s| s.is_sentinel()).count(), 1);
        assert!(st.check_invariants().is_ok());
    }

    #[test]
    fn ids_already_present_are_skipped() {
        let mut st = state_with(&["A", "B"], 10);
        let out = apply_page(&mut st, 2, vec![news("B", 1.0), news("C", 1.0)], true);
        assert_eq!(out.duplicates, 1);
        assert_eq!(ids(&st), vec!["A", "B", "C"]);
    }

    #[test]
    fn append_leaves_cursor_alone() {
        let mut st = state_with(&["A", "B"], 10);
        st.set_cursor(2);
        apply_page(&mut st, 2, vec![news("C", 1.0)], true);
        assert_eq!(st.current_index(), 2);
    }

    #[test]
    fn prefetch_trigger_policy() {
        let mut st = state_with(&["a", "b", "c", "d", "e", "f", "g"], 50);
        assert!(!should_prefetch(&st, 5), "never from the opening card");
        st.set_cursor(1);
        assert!(!should_prefetch(&st, 5), "six ahead");
        st.set_cursor(2);
        assert!(should_prefetch(&st, 5));
        st.is_loading_more = true;
        assert!(!should_prefetch(&st, 5));
        st.is_loading_more = false;
        st.has_more = false;
        assert!(!should_prefetch(&st, 5));
    }

    #[test]
    fn refresh_with_same_ids_is_a_no_op() {
        let mut st = state_with(&["A", "B"], 10);
        let before = st.clone();
        assert!(!apply_refresh(&mut st, vec![news("B", 9.0), news("A", 1.0)], None));
        assert_eq!(st, before);
    }

    #[test]
    fn refresh_puts_new_stories_first_and_follows_cursor() {
        let mut st = state_with(&["A", "B", "C"], 10);
        st.set_cursor(2); // on B
        assert!(apply_refresh(&mut st, vec![news("N", 5.0), news("A", 1.0)], None));
        assert_eq!(ids(&st), vec!["N", "A", "B", "C"]);
        assert_eq!(st.current().and_then(|s| s.news_id()), Some("B"));
        assert!(st.check_invariants().is_ok());
    }

    #[test]
    fn refresh_keeps_pinned_shared_article_in_slot_one() {
        let mut st = state_with(&["S", "A"], 10);
        assert!(apply_refresh(&mut st, vec![news("N", 5.0)], Some("S")));
        assert_eq!(ids(&st), vec!["S", "N", "A"]);
    }

    #[test]
    fn refresh_respects_cap_and_keeps_sentinel() {
        let mut st = state_with(&["A", "B"], 2);
        st.has_more = false;
        st.push_sentinel(CaughtUpReason::Exhausted);
        assert!(apply_refresh(&mut st, vec![news("N", 5.0)], None));
        assert_eq!(ids(&st), vec!["N", "A"]);
        assert_eq!(st.sentinel_reason(), Some(CaughtUpReason::CapReached));
        assert!(st.check_invariants().is_ok());
    }
}
