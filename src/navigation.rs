//! # Navigation
//! Cursor state machine over the feed. Touch, wheel and keyboard input all
//! funnel into two saturating primitives, `advance` and `retreat`.
//!
//! Forward moves are gated by the paywall: unauthenticated readers cannot
//! advance once the cursor reaches the threshold. Backward moves are always
//! allowed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gesture::{
    key_step, wheel_step, Debounce, Direction, GestureOutcome, Key, TouchTracker, SNAP_BACK_SECS,
};
use crate::state::FeedState;

/// Transition duration for wheel and keyboard steps, seconds.
pub const STEP_TRANSITION_SECS: f64 = 0.35;
pub const DEFAULT_REARM_DELAY_MS: u64 = 350;
pub const DEFAULT_PAYWALL_THRESHOLD: usize = 10;

/// Raw input delivered by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    TouchStart { y: f64, t_ms: u64 },
    TouchMove { y: f64, t_ms: u64 },
    TouchEnd { t_ms: u64 },
    Wheel { delta_y: f64, t_ms: u64 },
    Key {
        key: Key,
        t_ms: u64,
        #[serde(default)]
        text_input_focused: bool,
    },
}

/// Effect of one input on the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Moved { from: usize, to: usize, duration_secs: f64 },
    Dragging { offset: f64 },
    SnapBack { duration_secs: f64 },
    /// Forward move absorbed by the paywall; a drag settles back in place.
    Blocked,
    Ignored,
}

impl Transition {
    pub fn moved(&self) -> bool {
        matches!(self, Transition::Moved { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Navigator {
    touch: TouchTracker,
    wheel_gate: Debounce,
    key_gate: Debounce,
    paywall_threshold: usize,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(DEFAULT_PAYWALL_THRESHOLD, DEFAULT_REARM_DELAY_MS)
    }
}

impl Navigator {
    pub fn new(paywall_threshold: usize, rearm_delay_ms: u64) -> Self {
        Self {
            touch: TouchTracker::new(),
            wheel_gate: Debounce::new(rearm_delay_ms),
            key_gate: Debounce::new(rearm_delay_ms),
            paywall_threshold,
        }
    }

    pub fn paywall_threshold(&self) -> usize {
        self.paywall_threshold
    }

    /// Jump to `index`; out-of-range requests are no-ops.
    pub fn go_to_story(&self, state: &mut FeedState, index: usize) -> bool {
        if index >= state.len() || index == state.current_index {
            return false;
        }
        state.current_index = index;
        true
    }

    fn paywalled(&self, state: &FeedState, authenticated: bool) -> bool {
        !authenticated && state.current_index >= self.paywall_threshold
    }

    pub fn advance(&self, state: &mut FeedState, authenticated: bool, duration_secs: f64) -> Transition {
        if self.paywalled(state, authenticated) {
            debug!(target: "nav", index = state.current_index, "advance blocked by paywall");
            return Transition::Blocked;
        }
        self.step_to(state, state.current_index + 1, duration_secs)
    }

    pub fn retreat(&self, state: &mut FeedState, duration_secs: f64) -> Transition {
        match state.current_index.checked_sub(1) {
            Some(to) => self.step_to(state, to, duration_secs),
            None => Transition::Ignored,
        }
    }

    fn step_to(&self, state: &mut FeedState, to: usize, duration_secs: f64) -> Transition {
        let from = state.current_index;
        if !self.go_to_story(state, to) {
            return Transition::Ignored;
        }
        debug!(target: "nav", from, to, "cursor moved");
        Transition::Moved {
            from,
            to,
            duration_secs,
        }
    }

    fn step(
        &self,
        state: &mut FeedState,
        direction: Direction,
        authenticated: bool,
        duration_secs: f64,
    ) -> Transition {
        match direction {
            Direction::Forward => self.advance(state, authenticated, duration_secs),
            Direction::Backward => self.retreat(state, duration_secs),
        }
    }

    /// Feed one input event through the gesture rules.
    pub fn handle(&mut self, state: &mut FeedState, event: InputEvent, authenticated: bool) -> Transition {
        match event {
            InputEvent::TouchStart { y, t_ms } => {
                self.touch.start(y, t_ms);
                Transition::Dragging { offset: 0.0 }
            }
            InputEvent::TouchMove { y, t_ms } => {
                if !self.touch.is_active() {
                    return Transition::Ignored;
                }
                let at_first = state.current_index == 0;
                let at_last = state.current_index + 1 >= state.len();
                Transition::Dragging {
                    offset: self.touch.drag(y, t_ms, at_first, at_last),
                }
            }
            InputEvent::TouchEnd { .. } => match self.touch.release() {
                GestureOutcome::Navigate {
                    direction,
                    duration_secs,
                } => match self.step(state, direction, authenticated, duration_secs) {
                    // hitting an end of the feed settles back in place
                    Transition::Ignored => Transition::SnapBack {
                        duration_secs: SNAP_BACK_SECS,
                    },
                    t => t,
                },
                GestureOutcome::SnapBack { duration_secs } => Transition::SnapBack { duration_secs },
            },
            InputEvent::Wheel { delta_y, t_ms } => {
                let Some(direction) = wheel_step(delta_y) else {
                    return Transition::Ignored;
                };
                if !self.wheel_gate.try_fire(t_ms) {
                    return Transition::Ignored;
                }
                self.step(state, direction, authenticated, STEP_TRANSITION_SECS)
            }
            InputEvent::Key {
                key,
                t_ms,
                text_input_focused,
            } => {
                if text_input_focused {
                    return Transition::Ignored;
                }
                let Some(direction) = key_step(key) else {
                    return Transition::Ignored;
                };
                if !self.key_gate.try_fire(t_ms) {
                    return Transition::Ignored;
                }
                self.step(state, direction, authenticated, STEP_TRANSITION_SECS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    fn key(k: Key, t_ms: u64) -> InputEvent {
        InputEvent::Key {
            key: k,
            t_ms,
            text_input_focused: false,
        }
    }

    #[test]
    fn advance_and_retreat_saturate_at_ends() {
        let nav = Navigator::new(100, 350);
        let mut st = state_with(&["a", "b"], 10);
        assert_eq!(nav.retreat(&mut st, 0.3), Transition::Ignored);
        assert!(nav.advance(&mut st, false, 0.3).moved());
        assert!(nav.advance(&mut st, false, 0.3).moved());
        assert_eq!(st.current_index(), 2);
        assert_eq!(nav.advance(&mut st, false, 0.3), Transition::Ignored);
        assert_eq!(st.current_index(), 2);
        assert!(st.check_invariants().is_ok());
    }

    #[test]
    fn go_to_out_of_range_is_a_no_op() {
        let nav = Navigator::default();
        let mut st = state_with(&["a"], 10);
        assert!(!nav.go_to_story(&mut st, 5));
        assert_eq!(st.current_index(), 0);
        assert!(nav.go_to_story(&mut st, 1));
    }

    #[test]
    fn paywall_blocks_forward_but_not_backward() {
        let nav = Navigator::new(2, 350);
        let mut st = state_with(&["a", "b", "c", "d"], 10);
        st.set_cursor(2);
        assert_eq!(nav.advance(&mut st, false, 0.3), Transition::Blocked);
        assert_eq!(st.current_index(), 2);
        assert!(nav.retreat(&mut st, 0.3).moved());
        assert_eq!(st.current_index(), 1);
        st.set_cursor(2);
        assert!(nav.advance(&mut st, true, 0.3).moved());
    }

    #[test]
    fn keys_are_debounced_and_ignored_while_typing() {
        let mut nav = Navigator::new(100, 350);
        let mut st = state_with(&["a", "b", "c"], 10);
        assert!(nav.handle(&mut st, key(Key::ArrowDown, 0), false).moved());
        assert_eq!(nav.handle(&mut st, key(Key::Space, 100), false), Transition::Ignored);
        assert!(nav.handle(&mut st, key(Key::ArrowRight, 400), false).moved());
        assert_eq!(st.current_index(), 2);

        let typing = InputEvent::Key {
            key: Key::ArrowUp,
            t_ms: 1_000,
            text_input_focused: true,
        };
        assert_eq!(nav.handle(&mut st, typing, false), Transition::Ignored);
        assert!(nav.handle(&mut st, key(Key::ArrowUp, 1_000), false).moved());
        assert_eq!(st.current_index(), 1);
    }

    #[test]
    fn one_wheel_gesture_moves_one_story() {
        let mut nav = Navigator::new(100, 350);
        let mut st = state_with(&["a", "b", "c"], 10);
        for t in [0u64, 16, 32, 48, 64] {
            nav.handle(&mut st, InputEvent::Wheel { delta_y: 90.0, t_ms: t }, false);
        }
        assert_eq!(st.current_index(), 1);
        nav.handle(&mut st, InputEvent::Wheel { delta_y: 10.0, t_ms: 500 }, false);
        assert_eq!(st.current_index(), 1);
        nav.handle(&mut st, InputEvent::Wheel { delta_y: -45.0, t_ms: 500 }, false);
        assert_eq!(st.current_index(), 0);
    }

    #[test]
    fn touch_flick_moves_forward() {
        let mut nav = Navigator::new(100, 350);
        let mut st = state_with(&["a", "b"], 10);
        nav.handle(&mut st, InputEvent::TouchStart { y: 500.0, t_ms: 0 }, false);
        nav.handle(&mut st, InputEvent::TouchMove { y: 480.0, t_ms: 10 }, false);
        nav.handle(&mut st, InputEvent::TouchMove { y: 440.0, t_ms: 20 }, false);
        let t = nav.handle(&mut st, InputEvent::TouchEnd { t_ms: 25 }, false);
        assert_eq!(
            t,
            Transition::Moved {
                from: 0,
                to: 1,
                duration_secs: 0.3
            }
        );
    }

    #[test]
    fn touch_at_paywall_is_absorbed() {
        let mut nav = Navigator::new(1, 350);
        let mut st = state_with(&["a", "b"], 10);
        st.set_cursor(1);
        nav.handle(&mut st, InputEvent::TouchStart { y: 500.0, t_ms: 0 }, false);
        nav.handle(&mut st, InputEvent::TouchMove { y: 400.0, t_ms: 400 }, false);
        let t = nav.handle(&mut st, InputEvent::TouchEnd { t_ms: 400 }, false);
        assert_eq!(t, Transition::Blocked);
        assert_eq!(st.current_index(), 1);
    }

    #[test]
    fn touch_past_last_story_snaps_back() {
        let mut nav = Navigator::new(100, 350);
        let mut st = state_with(&["a"], 10);
        st.set_cursor(1);
        nav.handle(&mut st, InputEvent::TouchStart { y: 500.0, t_ms: 0 }, false);
        nav.handle(&mut st, InputEvent::TouchMove { y: 300.0, t_ms: 100 }, false);
        let t = nav.handle(&mut st, InputEvent::TouchEnd { t_ms: 100 }, false);
        assert!(matches!(t, Transition::SnapBack { .. }));
        assert_eq!(st.current_index(), 1);
    }

    #[test]
    fn move_without_start_is_ignored() {
        let mut nav = Navigator::default();
        let mut st = state_with(&["a"], 10);
        assert_eq!(
            nav.handle(&mut st, InputEvent::TouchMove { y: 1.0, t_ms: 1 }, false),
            Transition::Ignored
        );
    }

    #[test]
    fn input_events_deserialize_from_json() {
        let ev: InputEvent =
            serde_json::from_str(r#"{"type":"key","key":"arrow_down","t_ms":5}"#).unwrap();
        assert_eq!(ev, key(Key::ArrowDown, 5));
    }
}
