//! Windowed rendering: only stories near the cursor are materialized.
//!
//! The window is a pure function of the cursor, recomputed on every read, so
//! it cannot lag behind a rapid sequence of moves.

use std::ops::Range;

use serde::Serialize;

use crate::story::{ActiveComponent, Story};

pub const DEFAULT_WINDOW_RADIUS: usize = 3;

/// Index range of materialized stories for a cursor.
pub fn materialized_range(current: usize, len: usize, radius: usize) -> Range<usize> {
    if len == 0 {
        return 0..0;
    }
    let current = current.min(len - 1);
    current.saturating_sub(radius)..(current + radius + 1).min(len)
}

pub fn is_materialized(index: usize, current: usize, radius: usize) -> bool {
    index.abs_diff(current) <= radius
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum Slot<'a> {
    Live {
        index: usize,
        story: &'a Story,
        is_current: bool,
        active_component: ActiveComponent,
    },
    Placeholder {
        index: usize,
    },
}

impl Slot<'_> {
    pub fn is_live(&self) -> bool {
        matches!(self, Slot::Live { .. })
    }
}

/// One slot per story: live inside the window, inert placeholder outside.
pub fn view<'a, F>(sequence: &'a [Story], current: usize, radius: usize, active: F) -> Vec<Slot<'a>>
where
    F: Fn(&Story) -> ActiveComponent,
{
    let live = materialized_range(current, sequence.len(), radius);
    sequence
        .iter()
        .enumerate()
        .map(|(index, story)| {
            if live.contains(&index) {
                Slot::Live {
                    index,
                    story,
                    is_current: index == current,
                    active_component: active(story),
                }
            } else {
                Slot::Placeholder { index }
            }
        })
        .collect()
}
