//! Playback phases, abort reasons and the cancellation sub-state

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of playing a single line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for a line
    #[default]
    Idle,
    /// Per-line setup
    NewLine,
    /// Turning towards the look-at target
    LookAt,
    /// Starting the body animation
    Anim,
    /// Starting the voice
    ScheduleSoundPlay,
    /// Starting the facial expression
    SoundFacial,
    /// Requesting the next line
    EndLine,
    /// Terminal until the context is reset
    Aborted,
}

impl Phase {
    /// Number of phases a line steps through, `Idle` to `EndLine` inclusive
    pub const LINE_PHASES: usize = 7;

    /// Successor in the line sequence; `EndLine` wraps to `Idle`
    pub fn next(self) -> Phase {
        match self {
            Phase::Idle => Phase::NewLine,
            Phase::NewLine => Phase::LookAt,
            Phase::LookAt => Phase::Anim,
            Phase::Anim => Phase::ScheduleSoundPlay,
            Phase::ScheduleSoundPlay => Phase::SoundFacial,
            Phase::SoundFacial => Phase::EndLine,
            Phase::EndLine => Phase::Idle,
            Phase::Aborted => Phase::Aborted,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::NewLine => "NewLine",
            Phase::LookAt => "LookAt",
            Phase::Anim => "Anim",
            Phase::ScheduleSoundPlay => "ScheduleSoundPlay",
            Phase::SoundFacial => "SoundFacial",
            Phase::EndLine => "EndLine",
            Phase::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a context stopped playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    /// The actor's entity no longer exists
    EntityDestroyed,
    /// The actor died
    ActorDead,
    /// The AI took the actor back (alertness or goal-pipe removal)
    AIAborted,
    /// The local player walked away
    PlayerOutOfRange,
    /// The local player looked away
    PlayerOutOfView,
}

impl AbortReason {
    /// Check if the voice must be stopped regardless of actor overrides
    pub fn always_stops_sound(&self) -> bool {
        matches!(self, AbortReason::ActorDead | AbortReason::EntityDestroyed)
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbortReason::EntityDestroyed => "entity destroyed",
            AbortReason::ActorDead => "actor dead",
            AbortReason::AIAborted => "aborted by AI",
            AbortReason::PlayerOutOfRange => "player out of range",
            AbortReason::PlayerOutOfView => "player out of view",
        };
        f.write_str(name)
    }
}

/// Cancellation sub-state of a context
///
/// `Owed` is entered by `begin_session`; cancelling moves through
/// `InProgress` back to `Clear`. A cancel request in any state but `Owed`
/// is a no-op, which makes cancellation idempotent and non-reentrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelState {
    /// Nothing to release
    #[default]
    Clear,
    /// A session is running and must be cancelled before teardown
    Owed,
    /// The cancel routine is running
    InProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_sequence_wraps_to_idle() {
        let mut phase = Phase::Idle;
        let mut visited = Vec::new();
        for _ in 0..Phase::LINE_PHASES {
            phase = phase.next();
            visited.push(phase);
        }
        assert_eq!(visited.first(), Some(&Phase::NewLine));
        assert_eq!(visited.last(), Some(&Phase::Idle));
        assert_eq!(Phase::Aborted.next(), Phase::Aborted);
    }

    #[test]
    fn test_abort_reason_stops_sound() {
        assert!(AbortReason::ActorDead.always_stops_sound());
        assert!(AbortReason::EntityDestroyed.always_stops_sound());
        assert!(!AbortReason::PlayerOutOfView.always_stops_sound());
    }
}
