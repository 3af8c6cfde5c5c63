//! Local-player awareness
//!
//! When the local player is one of the actors, the dialogue only continues
//! while the player stays close to the other actors and keeps them in view.
//! The check is sampled every [`PLAYER_CHECK_INTERVAL`] seconds; a failing
//! check has to persist for the configured grace time before it aborts.

use crate::config::AwarenessConfig;
use crate::geometry::{flat_direction, Aabb};
use crate::time::Seconds;
use crate::AbortReason;
use glam::Vec3;

/// Seconds between two awareness samples
pub const PLAYER_CHECK_INTERVAL: Seconds = 0.2;

/// Where the player is and where it is looking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    pub position: Vec3,
    pub eye_position: Vec3,
    pub eye_direction: Vec3,
}

/// Another actor of the session as seen by the observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Watched {
    pub position: Vec3,
    pub bounds: Aabb,
}

/// Outcome of one awareness sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// The view gate passed
    pub looking: bool,
    /// The distance gate passed
    pub in_range: bool,
}

impl Verdict {
    /// Verdict for cases with nothing to check
    pub const TRIVIAL: Verdict = Verdict {
        looking: true,
        in_range: true,
    };

    /// Both gates passed
    pub fn aware(&self) -> bool {
        self.looking && self.in_range
    }
}

/// Sample awareness of `observer` towards the other actors
///
/// `camera_visible` tells whether the combined bounds of the other actors
/// are on screen; it counts as looking even outside the view cone.
pub fn evaluate(
    config: &AwarenessConfig,
    observer: &Observer,
    others: &[Watched],
    camera_visible: impl Fn(&Aabb) -> bool,
) -> Verdict {
    if !config.distance_gate_enabled() && !config.angle_gate_enabled() {
        return Verdict::TRIVIAL;
    }

    let spot_cos = config.angle.to_radians().cos();
    let view_dir = flat_direction(observer.eye_direction);

    let mut group = Aabb::empty();
    let mut looking_at = 0usize;
    for other in others {
        group.add(&other.bounds);
        let to_other = flat_direction(other.position - observer.eye_position);
        if let (Some(view), Some(to_other)) = (view_dir, to_other) {
            let dot = view.dot(to_other).clamp(-1.0, 1.0);
            if spot_cos <= dot {
                looking_at += 1;
            }
        }
    }

    if group.is_empty() {
        return Verdict::TRIVIAL;
    }

    let distance_sq = observer.position.distance_squared(group.center());
    let in_range = distance_sq <= config.distance * config.distance;
    let visible = camera_visible(&group);
    let looking = others.is_empty() || looking_at > 0;

    Verdict {
        looking: !config.angle_gate_enabled() || visible || looking,
        in_range: !config.distance_gate_enabled() || in_range,
    }
}

/// Awareness state of a local-player context
#[derive(Debug, Clone, PartialEq)]
pub struct Awareness {
    aware: bool,
    looking: bool,
    in_range: bool,
    grace_timer: Seconds,
    check_timer: Seconds,
}

impl Awareness {
    /// Fresh state: aware, first sample due immediately
    pub fn new(grace_time: Seconds) -> Self {
        Self {
            aware: true,
            looking: true,
            in_range: true,
            grace_timer: grace_time,
            check_timer: 0.0,
        }
    }

    /// Advance by `dt`, sampling through `probe` when a check is due
    ///
    /// `probe` returns `None` when there is nothing to check, which counts
    /// as aware. Returns `false` once the grace period has run out.
    pub fn update(
        &mut self,
        dt: Seconds,
        grace_time: Seconds,
        probe: impl FnOnce() -> Option<Verdict>,
    ) -> bool {
        self.check_timer -= dt;
        if self.check_timer <= 0.0 {
            self.check_timer = PLAYER_CHECK_INTERVAL;
            let verdict = probe().unwrap_or(Verdict::TRIVIAL);
            self.looking = verdict.looking;
            self.in_range = verdict.in_range;
            self.aware = verdict.aware();
        }

        if self.aware {
            self.grace_timer = grace_time;
            true
        } else {
            self.grace_timer -= dt;
            self.grace_timer > 0.0
        }
    }

    /// The player is judged aware
    pub fn is_aware(&self) -> bool {
        self.aware
    }

    /// The view gate passed on the last sample
    pub fn is_looking(&self) -> bool {
        self.looking
    }

    /// The distance gate passed on the last sample
    pub fn is_in_range(&self) -> bool {
        self.in_range
    }

    /// Seconds left before an unaware player aborts the dialogue
    pub fn grace_remaining(&self) -> Seconds {
        self.grace_timer
    }

    /// Abort reason for a failed check
    pub fn failure_reason(&self) -> AbortReason {
        if self.in_range {
            AbortReason::PlayerOutOfView
        } else {
            AbortReason::PlayerOutOfRange
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer_at_origin_facing_x() -> Observer {
        Observer {
            position: Vec3::ZERO,
            eye_position: Vec3::new(0.0, 0.0, 1.7),
            eye_direction: Vec3::X,
        }
    }

    fn watched_at(position: Vec3) -> Watched {
        Watched {
            position,
            bounds: Aabb::around(position, 0.5),
        }
    }

    fn gated(distance: f32, angle: f32) -> AwarenessConfig {
        AwarenessConfig {
            distance,
            angle,
            grace_time: 1.0,
        }
    }

    #[test]
    fn test_disabled_gates_are_always_aware() {
        let far_behind = [watched_at(Vec3::new(-500.0, 0.0, 0.0))];
        let verdict = evaluate(
            &AwarenessConfig::disabled(),
            &observer_at_origin_facing_x(),
            &far_behind,
            |_| false,
        );
        assert!(verdict.aware());
    }

    #[test]
    fn test_distance_gate() {
        let config = gated(5.0, 0.0);
        let observer = observer_at_origin_facing_x();
        let near = evaluate(&config, &observer, &[watched_at(Vec3::new(3.0, 0.0, 0.0))], |_| false);
        let far = evaluate(&config, &observer, &[watched_at(Vec3::new(30.0, 0.0, 0.0))], |_| false);
        assert!(near.aware());
        assert!(!far.in_range);
        assert!(far.looking);
    }

    #[test]
    fn test_view_cone_and_camera_visibility() {
        let config = gated(0.0, 30.0);
        let behind = [watched_at(Vec3::new(-4.0, 0.0, 0.0))];
        let ahead = [watched_at(Vec3::new(4.0, 1.0, 0.0))];

        assert!(evaluate(&config, &observer_at_origin_facing_x(), &ahead, |_| false).looking);
        assert!(!evaluate(&config, &observer_at_origin_facing_x(), &behind, |_| false).looking);
        assert!(evaluate(&config, &observer_at_origin_facing_x(), &behind, |_| true).looking);
    }

    #[test]
    fn test_no_others_is_trivially_aware() {
        let verdict = evaluate(&gated(1.0, 10.0), &observer_at_origin_facing_x(), &[], |_| false);
        assert_eq!(verdict, Verdict::TRIVIAL);
    }

    #[test]
    fn test_grace_timer_runs_out_while_unaware() {
        let mut awareness = Awareness::new(0.5);
        let unaware = Verdict {
            looking: false,
            in_range: true,
        };

        assert!(awareness.update(0.125, 0.5, || Some(unaware)));
        assert!(awareness.update(0.125, 0.5, || Some(unaware)));
        assert!(awareness.update(0.125, 0.5, || Some(unaware)));
        assert!(!awareness.update(0.125, 0.5, || Some(unaware)));
        assert_eq!(awareness.failure_reason(), AbortReason::PlayerOutOfView);
    }

    #[test]
    fn test_becoming_aware_restores_grace() {
        let mut awareness = Awareness::new(1.0);
        let out_of_range = Verdict {
            looking: true,
            in_range: false,
        };
        awareness.update(0.3, 1.0, || Some(out_of_range));
        assert!(awareness.grace_remaining() < 1.0);
        assert_eq!(awareness.failure_reason(), AbortReason::PlayerOutOfRange);

        awareness.update(0.3, 1.0, || Some(Verdict::TRIVIAL));
        assert!(awareness.is_aware());
        assert_eq!(awareness.grace_remaining(), 1.0);
    }

    #[test]
    fn test_samples_at_check_interval() {
        let mut awareness = Awareness::new(1.0);
        let mut samples = 0;
        for _ in 0..6 {
            awareness.update(0.15, 1.0, || {
                samples += 1;
                None
            });
        }
        // every other 0.15s update crosses the 0.2s interval
        assert_eq!(samples, 3);
    }
}
