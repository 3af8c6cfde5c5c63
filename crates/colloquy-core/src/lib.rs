//! Colloquy Core - Dialogue line playback for scripted conversations
//!
//! This crate drives actors through scripted lines of dialogue:
//! - Actor roles, world entities and context identifiers
//! - Line descriptors (look-at, animation, voice, facial expression)
//! - The per-actor playback state machine ([`ActorPlaybackContext`])
//! - Sessions that bind actors and tick them ([`DialogSession`])
//! - Local-player awareness checks with a grace period
//! - A journal of phase transitions for replay comparisons
//!
//! ## Collaborators
//!
//! The crate does not animate, play audio or run AI itself. It talks to the
//! host through the traits in [`backend`] and receives their callbacks as
//! [`ContextEvent`]s posted to a session's [`EventSender`]:
//!
//! ```text
//! DialogSession
//!  │
//!  ├── ActorPlaybackContext[] ── AnimationGraph / AudioSystem / AiSystem
//!  │                             FacialAnimation / World
//!  │
//!  └── EventInbox ◄── EventSender (any thread)
//! ```
//!
//! ## Testing Feature
//!
//! Enable the `testing` feature for recording mock collaborators:
//! ```toml
//! colloquy-core = { version = "0.1", features = ["testing"] }
//! ```

pub mod awareness;
pub mod backend;
mod config;
mod error;
mod geometry;
pub mod handle;
mod identity;
pub mod journal;
mod line;
mod phase;
pub mod playback;
mod session;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use awareness::Awareness;
pub use backend::{
    AiKind, AiSystem, AnimEvent, AnimInput, AnimationGraph, AudioSystem, Backends, ContextEvent,
    EntityEvent, Envelope, EventSender, FacialAnimation, GoalPipeEvent, SignalData, World,
};
pub use config::{
    ActorFlags, AiBehaviourMode, AlertnessInterruptMode, AwarenessConfig, SessionConfig,
    DEFAULT_AWARENESS_GRACE_TIME,
};
pub use error::{Error, Result};
pub use geometry::{flat_direction, Aabb};
pub use identity::{ActorRole, ContextId, EntityId, SessionId};
pub use journal::{Journal, JournalConfig, JournalEntry, PhaseChange};
pub use line::{AudioCueId, FacialExpression, LineDescriptor, LineFlags};
pub use phase::{AbortReason, CancelState, Phase};
pub use playback::{ActorPlaybackContext, LookAtTarget, TickEnv};
pub use session::{DialogSession, Roster, SessionState};
pub use time::{NextLine, NextLineSchedule, Seconds, SessionClock};
