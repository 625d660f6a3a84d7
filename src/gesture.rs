//! # Gesture interpretation
//! Turns raw touch, wheel and keyboard input into discrete step decisions.
//!
//! Conventions: `y` grows downwards, timestamps are milliseconds. A finger
//! moving up (negative drag) or a positive wheel delta means "forward".

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Touch samples kept for velocity estimation.
pub const SAMPLE_WINDOW: usize = 5;
/// Samples (newest) used for the release velocity.
pub const VELOCITY_SAMPLES: usize = 3;
/// px/s above which a release counts as a flick.
pub const FLICK_VELOCITY: f64 = 300.0;
/// px of drag above which a slow release still navigates.
pub const MIN_DRAG_DISTANCE: f64 = 30.0;
/// Wheel delta that triggers a step.
pub const WHEEL_THRESHOLD: f64 = 30.0;
/// Duration of a snap back to the current story, seconds.
pub const SNAP_BACK_SECS: f64 = 0.35;

const RUBBER_BAND_FACTOR: f64 = 0.4;
const RUBBER_BAND_RANGE: f64 = 500.0;
const RUBBER_BAND_MAX_DAMPING: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// What a released touch asks for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GestureOutcome {
    Navigate { direction: Direction, duration_secs: f64 },
    SnapBack { duration_secs: f64 },
}

/// Transition duration for a release velocity (px/s, sign ignored).
pub fn duration_for_velocity(v: f64) -> f64 {
    let v = v.abs();
    if v > 2000.0 {
        0.3
    } else if v > 1000.0 {
        0.35
    } else if v > 500.0 {
        0.4
    } else {
        0.45
    }
}

/// Rubber-band damping for a drag that would overscroll an end of the feed.
pub fn rubber_band(diff: f64) -> f64 {
    diff * RUBBER_BAND_FACTOR * (1.0 - (diff.abs() / RUBBER_BAND_RANGE).min(RUBBER_BAND_MAX_DAMPING))
}

/// Tracks one touch from start to release.
#[derive(Debug, Clone, Default)]
pub struct TouchTracker {
    start: Option<(f64, u64)>,
    samples: VecDeque<(f64, u64)>,
}

impl TouchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some()
    }

    pub fn start(&mut self, y: f64, t_ms: u64) {
        self.start = Some((y, t_ms));
        self.samples.clear();
        self.samples.push_back((y, t_ms));
    }

    /// Record a move and return the live drag offset. `at_first`/`at_last`
    /// say whether the cursor sits on the first/last story.
    pub fn drag(&mut self, y: f64, t_ms: u64, at_first: bool, at_last: bool) -> f64 {
        let Some((y0, _)) = self.start else {
            return 0.0;
        };
        self.samples.push_back((y, t_ms));
        while self.samples.len() > SAMPLE_WINDOW {
            self.samples.pop_front();
        }

        let diff = y - y0;
        let overscroll = (diff > 0.0 && at_first) || (diff < 0.0 && at_last);
        if overscroll {
            rubber_band(diff)
        } else {
            diff
        }
    }

    /// Release velocity in px/s, positive for an upward (forward) swipe.
    pub fn velocity(&self) -> f64 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        let (y_first, t_first) = self.samples[n.saturating_sub(VELOCITY_SAMPLES)];
        let (y_last, t_last) = self.samples[n - 1];
        let dt = t_last.saturating_sub(t_first);
        if dt == 0 {
            return 0.0;
        }
        (y_first - y_last) / dt as f64 * 1000.0
    }

    /// Finish the touch and decide. A release without a start snaps back.
    pub fn release(&mut self) -> GestureOutcome {
        let outcome = match (self.start, self.samples.back()) {
            (Some((y0, _)), Some(&(y_last, _))) => decide(y_last - y0, self.velocity()),
            _ => GestureOutcome::SnapBack {
                duration_secs: SNAP_BACK_SECS,
            },
        };
        self.start = None;
        self.samples.clear();
        outcome
    }
}

/// Navigation decision from total drag (`diff`, px) and release velocity.
pub fn decide(diff: f64, velocity: f64) -> GestureOutcome {
    let flick = velocity.abs() > FLICK_VELOCITY;
    if !flick && diff.abs() <= MIN_DRAG_DISTANCE {
        return GestureOutcome::SnapBack {
            duration_secs: SNAP_BACK_SECS,
        };
    }
    let forward = if flick { velocity > 0.0 } else { diff < 0.0 };
    GestureOutcome::Navigate {
        direction: if forward {
            Direction::Forward
        } else {
            Direction::Backward
        },
        duration_secs: duration_for_velocity(velocity),
    }
}

/// One step per wheel event past the threshold.
pub fn wheel_step(delta_y: f64) -> Option<Direction> {
    if delta_y.abs() <= WHEEL_THRESHOLD {
        return None;
    }
    Some(if delta_y > 0.0 {
        Direction::Forward
    } else {
        Direction::Backward
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    ArrowDown,
    ArrowUp,
    ArrowLeft,
    ArrowRight,
    Space,
    Other,
}

pub fn key_step(key: Key) -> Option<Direction> {
    match key {
        Key::ArrowDown | Key::ArrowRight | Key::Space => Some(Direction::Forward),
        Key::ArrowUp | Key::ArrowLeft => Some(Direction::Backward),
        Key::Other => None,
    }
}

/// Re-arm gate: after a step is accepted, further steps are dropped (not
/// queued) until the delay has passed.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    delay_ms: u64,
    armed_at: Option<u64>,
}

impl Debounce {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            armed_at: None,
        }
    }

    /// Whether input at `now_ms` is honored. Does NOT mutate state.
    pub fn ready(&self, now_ms: u64) -> bool {
        match self.armed_at {
            None => true,
            Some(at) => now_ms >= at,
        }
    }

    /// Record an accepted step at `now_ms`.
    pub fn trigger(&mut self, now_ms: u64) {
        self.armed_at = Some(now_ms.saturating_add(self.delay_ms));
    }

    /// `ready` + `trigger` in one go.
    pub fn try_fire(&mut self, now_ms: u64) -> bool {
        if !self.ready(now_ms) {
            return false;
        }
        self.trigger(now_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upward_flick_at_1500_px_per_s_goes_forward_in_350ms() {
        let mut t = TouchTracker::new();
        t.start(600.0, 0);
        t.drag(590.0, 10, false, false);
        t.drag(570.0, 20, false, false);
        t.drag(555.0, 30, false, false);
        t.drag(540.0, 40, false, false);
        // last three: (570,20) .. (540,40) => 30px / 20ms
        assert!((t.velocity() - 1500.0).abs() < 1e-9);
        assert_eq!(
            t.release(),
            GestureOutcome::Navigate {
                direction: Direction::Forward,
                duration_secs: 0.35
            }
        );
        assert!(!t.is_active());
    }

    #[test]
    fn duration_table() {
        assert_eq!(duration_for_velocity(2500.0), 0.3);
        assert_eq!(duration_for_velocity(-1200.0), 0.35);
        assert_eq!(duration_for_velocity(600.0), 0.4);
        assert_eq!(duration_for_velocity(500.0), 0.45);
    }

    #[test]
    fn slow_long_drag_uses_distance_sign() {
        assert_eq!(
            decide(45.0, 100.0),
            GestureOutcome::Navigate {
                direction: Direction::Backward,
                duration_secs: 0.45
            }
        );
    }

    #[test]
    fn flick_direction_wins_over_drag_direction() {
        match decide(40.0, 800.0) {
            GestureOutcome::Navigate { direction, .. } => assert_eq!(direction, Direction::Forward),
            other => panic!("expected navigation, got {other:?}"),
        }
    }

    #[test]
    fn short_slow_drag_snaps_back() {
        assert_eq!(
            decide(-20.0, 120.0),
            GestureOutcome::SnapBack {
                duration_secs: SNAP_BACK_SECS
            }
        );
    }

    #[test]
    fn drag_tracks_one_to_one_inside_feed() {
        let mut t = TouchTracker::new();
        t.start(300.0, 0);
        assert_eq!(t.drag(200.0, 16, true, false), -100.0);
    }

    #[test]
    fn overscroll_is_damped() {
        let mut t = TouchTracker::new();
        t.start(300.0, 0);
        // pulling down on the first story
        let off = t.drag(400.0, 16, true, false);
        assert!((off - 100.0 * 0.4 * 0.8).abs() < 1e-9);
        // damping saturates at half
        assert!((rubber_band(-1000.0) - (-1000.0 * 0.4 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn sample_window_is_bounded() {
        let mut t = TouchTracker::new();
        t.start(0.0, 0);
        for i in 1..20u64 {
            t.drag(i as f64, i * 10, false, false);
        }
        assert_eq!(t.samples.len(), SAMPLE_WINDOW);
    }

    #[test]
    fn release_without_start_snaps_back() {
        let mut t = TouchTracker::new();
        assert!(matches!(t.release(), GestureOutcome::SnapBack { .. }));
    }

    #[test]
    fn wheel_and_keys() {
        assert_eq!(wheel_step(31.0), Some(Direction::Forward));
        assert_eq!(wheel_step(-80.0), Some(Direction::Backward));
        assert_eq!(wheel_step(30.0), None);
        assert_eq!(key_step(Key::Space), Some(Direction::Forward));
        assert_eq!(key_step(Key::ArrowLeft), Some(Direction::Backward));
        assert_eq!(key_step(Key::Other), None);
    }

    #[test]
    fn debounce_drops_input_inside_delay() {
        let mut d = Debounce::new(350);
        assert!(d.try_fire(1_000));
        assert!(!d.try_fire(1_200));
        assert!(!d.try_fire(1_349));
        assert!(d.try_fire(1_350));
    }
}
