//! Session configuration
//!
//! Every session-wide tunable lives in [`SessionConfig`], which is handed to
//! the session (and shared with its contexts) at construction. Configurations
//! can be written by hand or loaded from RON:
//!
//! ```
//! use colloquy_core::{AiBehaviourMode, SessionConfig};
//!
//! let config = SessionConfig::from_ron_str(
//!     "(awareness: (distance: 8.0, angle: 45.0, grace_time: 2.0), ai_behaviour: InterruptMedium)",
//! )
//! .unwrap();
//! assert_eq!(config.ai_behaviour, AiBehaviourMode::InterruptMedium);
//! assert!(config.awareness.distance_gate_enabled());
//! ```

use crate::error::{Error, Result};
use crate::time::Seconds;
use crate::ActorRole;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default grace period before an unaware local player aborts the dialogue
pub const DEFAULT_AWARENESS_GRACE_TIME: Seconds = 3.0;

/// Local-player awareness tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwarenessConfig {
    /// Maximum distance (meters) to the other actors; `<= 0` disables the gate
    pub distance: f32,
    /// View cone half-angle (degrees); `<= 0` disables the gate
    pub angle: f32,
    /// Seconds the player may stay unaware before the dialogue aborts
    pub grace_time: Seconds,
}

impl AwarenessConfig {
    /// Awareness checks that never fail
    pub fn disabled() -> Self {
        Self {
            distance: 0.0,
            angle: 0.0,
            grace_time: DEFAULT_AWARENESS_GRACE_TIME,
        }
    }

    /// Check if the distance gate is active
    pub fn distance_gate_enabled(&self) -> bool {
        self.distance > 0.0
    }

    /// Check if the view-angle gate is active
    pub fn angle_gate_enabled(&self) -> bool {
        self.angle > 0.0
    }
}

impl Default for AwarenessConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// At which AI alertness level an actor drops out of the dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertnessInterruptMode {
    /// Alertness never interrupts
    #[default]
    Never,
    /// Interrupt once the actor is alerted (level 1 and above)
    Alerted,
    /// Interrupt only once the actor is in combat (level 2 and above)
    Combat,
}

impl AlertnessInterruptMode {
    /// Minimum alertness level that interrupts, if any
    pub fn threshold(&self) -> Option<u8> {
        match self {
            AlertnessInterruptMode::Never => None,
            AlertnessInterruptMode::Alerted => Some(1),
            AlertnessInterruptMode::Combat => Some(2),
        }
    }
}

/// How strongly the dialogue takes over the actors' AI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AiBehaviourMode {
    /// Send `ACT_ANIM`: the AI yields fully for the whole session
    InterruptAlways,
    /// Send `ACT_DIALOG` and `ACT_DIALOG_OVER` when released
    #[default]
    InterruptMedium,
    /// Leave the AI alone; no look-at or body animation is driven
    InterruptNever,
}

impl AiBehaviourMode {
    /// Signal sent to the AI when the session begins
    pub fn begin_signal(&self) -> Option<&'static str> {
        match self {
            AiBehaviourMode::InterruptAlways => Some("ACT_ANIM"),
            AiBehaviourMode::InterruptMedium => Some("ACT_DIALOG"),
            AiBehaviourMode::InterruptNever => None,
        }
    }
}

/// Per-actor overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorFlags {
    /// Keep playing when the actor dies
    pub no_actor_dead_abort: bool,
    /// Let the voice finish when the line is cancelled
    pub no_abort_sound: bool,
    /// Ignore goal-pipe removal by the AI
    pub no_ai_abort: bool,
}

/// Configuration shared by a session and all of its playback contexts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local-player awareness tunables
    pub awareness: AwarenessConfig,
    /// Alertness level that aborts an actor
    pub alertness_interrupt: AlertnessInterruptMode,
    /// How the session takes over the actors' AI
    pub ai_behaviour: AiBehaviourMode,
    /// Per-actor overrides
    pub actor_flags: IndexMap<ActorRole, ActorFlags>,
}

impl SessionConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a RON string
    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: SessionConfig = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Check the configuration for values the playback machine cannot honor
    pub fn validate(&self) -> Result<()> {
        let awareness = &self.awareness;
        if !awareness.distance.is_finite() || !awareness.angle.is_finite() {
            return Err(Error::InvalidConfig(
                "awareness distance and angle must be finite".to_string(),
            ));
        }
        if awareness.angle > 180.0 {
            return Err(Error::InvalidConfig(format!(
                "awareness angle {} exceeds 180 degrees",
                awareness.angle
            )));
        }
        if awareness.grace_time.is_nan() || awareness.grace_time < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "awareness grace time {} must be non-negative",
                awareness.grace_time
            )));
        }
        Ok(())
    }

    /// Overrides for an actor (defaults when none are configured)
    pub fn flags_for(&self, role: ActorRole) -> ActorFlags {
        self.actor_flags.get(&role).copied().unwrap_or_default()
    }

    /// Set the overrides for an actor
    pub fn with_actor_flags(mut self, role: ActorRole, flags: ActorFlags) -> Self {
        self.actor_flags.insert(role, flags);
        self
    }

    /// Check if the session may drive look-at
    pub fn allows_look_at(&self) -> bool {
        self.ai_behaviour != AiBehaviourMode::InterruptNever
    }

    /// Check if the session may drive body animation
    pub fn allows_anim(&self) -> bool {
        self.ai_behaviour != AiBehaviourMode::InterruptNever
    }
}
