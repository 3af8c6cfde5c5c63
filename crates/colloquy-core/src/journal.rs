//! Session journal
//!
//! Records what a session did and when: lines handed to actors, phase
//! transitions, aborts, next-line requests and session boundaries. Two runs that see the
//! same lines and the same collaborator responses produce the same journal,
//! which makes it the reference for replay comparisons and debugging.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut session = DialogSession::new(SessionId(1), "intro", config, backends);
//! session.journal_mut().start_recording();
//! session.begin();
//! session.update(0.016);
//! for (from, to) in session.journal().transitions_for(ActorRole(1)) {
//!     println!("{from} -> {to}");
//! }
//! ```

use crate::phase::{AbortReason, Phase};
use crate::time::Seconds;
use crate::ActorRole;
use serde::{Deserialize, Serialize};

/// A phase change of one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    /// The actor whose context changed
    pub actor: ActorRole,
    /// Phase before the change
    pub from: Phase,
    /// Phase after the change
    pub to: Phase,
    /// Set when the change is an abort
    pub reason: Option<AbortReason>,
}

/// A journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// The session began
    SessionBegan { time: Seconds },
    /// A line was handed to an actor
    LinePlayed { time: Seconds, actor: ActorRole },
    /// A context changed phase
    Transition { time: Seconds, change: PhaseChange },
    /// The next line was requested
    NextLineScheduled { time: Seconds, delay: Seconds },
    /// The session ended
    SessionEnded { time: Seconds },
}

/// Configuration for the journal
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Whether recording is enabled
    pub recording_enabled: bool,
    /// Maximum number of entries to keep (0 = unlimited)
    pub max_entries: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            recording_enabled: false,
            max_entries: 4096,
        }
    }
}

/// The journal of one session
#[derive(Debug, Clone, Default)]
pub struct Journal {
    config: JournalConfig,
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Create a journal that is not recording yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: JournalConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    /// Start recording
    pub fn start_recording(&mut self) {
        self.config.recording_enabled = true;
    }

    /// Stop recording
    pub fn stop_recording(&mut self) {
        self.config.recording_enabled = false;
    }

    /// Check if recording is enabled
    pub fn is_recording(&self) -> bool {
        self.config.recording_enabled
    }

    /// Record an entry
    pub fn record(&mut self, entry: JournalEntry) {
        if !self.config.recording_enabled {
            return;
        }
        self.entries.push(entry);
        self.enforce_limits();
    }

    /// All recorded entries, oldest first
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Phase transitions of one actor, oldest first
    pub fn transitions_for(&self, actor: ActorRole) -> Vec<(Phase, Phase)> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Transition { change, .. } if change.actor == actor => {
                    Some((change.from, change.to))
                }
                _ => None,
            })
            .collect()
    }

    /// Recorded aborts as (actor, reason)
    pub fn aborts(&self) -> Vec<(ActorRole, AbortReason)> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Transition { change, .. } => {
                    change.reason.map(|reason| (change.actor, reason))
                }
                _ => None,
            })
            .collect()
    }

    /// Actors that were handed a line, in order
    pub fn lines_played(&self) -> Vec<ActorRole> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::LinePlayed { actor, .. } => Some(*actor),
                _ => None,
            })
            .collect()
    }

    /// Delays of all recorded next-line requests
    pub fn scheduled_delays(&self) -> Vec<Seconds> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::NextLineScheduled { delay, .. } => Some(*delay),
                _ => None,
            })
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn enforce_limits(&mut self) {
        if self.config.max_entries > 0 && self.entries.len() > self.config.max_entries {
            let excess = self.entries.len() - self.config.max_entries;
            self.entries.drain(0..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(from: Phase, to: Phase) -> PhaseChange {
        PhaseChange {
            actor: ActorRole(1),
            from,
            to,
            reason: None,
        }
    }

    #[test]
    fn test_not_recording_by_default() {
        let mut journal = Journal::new();
        journal.record(JournalEntry::SessionBegan { time: 0.0 });
        assert!(journal.is_empty());
    }

    #[test]
    fn test_transitions_for_actor() {
        let mut journal = Journal::new();
        journal.start_recording();
        journal.record(JournalEntry::Transition {
            time: 0.0,
            change: change(Phase::Idle, Phase::NewLine),
        });
        journal.record(JournalEntry::Transition {
            time: 0.0,
            change: PhaseChange {
                actor: ActorRole(2),
                ..change(Phase::Idle, Phase::NewLine)
            },
        });
        journal.record(JournalEntry::NextLineScheduled {
            time: 0.0,
            delay: 1.5,
        });
        journal.record(JournalEntry::LinePlayed {
            time: 1.5,
            actor: ActorRole(2),
        });

        assert_eq!(journal.lines_played(), vec![ActorRole(2)]);
        assert_eq!(
            journal.transitions_for(ActorRole(1)),
            vec![(Phase::Idle, Phase::NewLine)]
        );
        assert_eq!(journal.scheduled_delays(), vec![1.5]);
    }

    #[test]
    fn test_max_entries() {
        let mut journal = Journal::with_config(JournalConfig {
            recording_enabled: true,
            max_entries: 2,
        });
        for i in 0..5 {
            journal.record(JournalEntry::SessionBegan { time: i as f32 });
        }
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.entries()[0], JournalEntry::SessionBegan { time: 3.0 });
    }

    #[test]
    fn test_aborts() {
        let mut journal = Journal::new();
        journal.start_recording();
        journal.record(JournalEntry::Transition {
            time: 1.0,
            change: PhaseChange {
                reason: Some(AbortReason::ActorDead),
                ..change(Phase::LookAt, Phase::Aborted)
            },
        });
        assert_eq!(journal.aborts(), vec![(ActorRole(1), AbortReason::ActorDead)]);
    }
}
