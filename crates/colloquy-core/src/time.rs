//! Session time
//!
//! Dialogue playback runs on wall-clock seconds rather than discrete ticks:
//! the host hands every update a frame delta, and the session samples "now"
//! once per update so every context of that session sees the same time.

use serde::{Deserialize, Serialize};

/// Seconds of session time
pub type Seconds = f32;

/// Session clock sampled once per update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionClock {
    /// Current session time in seconds
    now: Seconds,
    /// Number of updates processed
    frame: u64,
}

impl SessionClock {
    /// Create a new clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by a frame delta
    ///
    /// Negative deltas are ignored so time never runs backwards.
    pub fn advance(&mut self, dt: Seconds) {
        if dt > 0.0 {
            self.now += dt;
        }
        self.frame += 1;
    }

    /// Current session time
    pub fn now(&self) -> Seconds {
        self.now
    }

    /// Number of updates processed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Rewind to time zero
    pub fn reset(&mut self) {
        self.now = 0.0;
        self.frame = 0;
    }
}

/// A pending "play the next line after a delay" request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextLine {
    /// Session time at which the request was made
    pub requested_at: Seconds,
    /// Requested delay in seconds
    pub delay: Seconds,
}

impl NextLine {
    /// Session time at which the next line becomes due
    pub fn deadline(&self) -> Seconds {
        self.requested_at + self.delay.max(0.0)
    }
}

/// The single next-line slot of a session
///
/// A newer request replaces an older one. Every request is also kept in an
/// issue log until drained, so the session can journal it.
#[derive(Debug, Clone, Default)]
pub struct NextLineSchedule {
    pending: Option<NextLine>,
    issued: Vec<NextLine>,
}

impl NextLineSchedule {
    /// Create an empty schedule
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request to play the next line `delay` seconds after `now`
    pub fn schedule(&mut self, now: Seconds, delay: Seconds) {
        let request = NextLine {
            requested_at: now,
            delay,
        };
        self.pending = Some(request);
        self.issued.push(request);
    }

    /// The currently pending request
    pub fn pending(&self) -> Option<NextLine> {
        self.pending
    }

    /// Check whether the pending request has elapsed
    pub fn is_due(&self, now: Seconds) -> bool {
        self.pending.is_some_and(|next| now >= next.deadline())
    }

    /// Take the pending request if it has elapsed
    pub fn take_due(&mut self, now: Seconds) -> Option<NextLine> {
        if self.is_due(now) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Drop the pending request
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Drain the requests issued since the last drain
    pub fn drain_issued(&mut self) -> std::vec::Drain<'_, NextLine> {
        self.issued.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advance() {
        let mut clock = SessionClock::new();
        clock.advance(0.5);
        clock.advance(0.25);
        assert_eq!(clock.now(), 0.75);
        assert_eq!(clock.frame(), 2);

        clock.advance(-1.0);
        assert_eq!(clock.now(), 0.75);
    }

    #[test]
    fn test_schedule_replaces_pending() {
        let mut schedule = NextLineSchedule::new();
        schedule.schedule(1.0, 2.0);
        schedule.schedule(1.5, 0.5);

        assert_eq!(schedule.pending().map(|n| n.delay), Some(0.5));
        assert!(!schedule.is_due(1.9));
        assert!(schedule.is_due(2.0));
        assert_eq!(schedule.drain_issued().count(), 2);
    }

    #[test]
    fn test_take_due() {
        let mut schedule = NextLineSchedule::new();
        schedule.schedule(0.0, 1.0);
        assert!(schedule.take_due(0.5).is_none());
        let next = schedule.take_due(1.0).expect("due");
        assert_eq!(next.deadline(), 1.0);
        assert!(schedule.pending().is_none());
    }
}
