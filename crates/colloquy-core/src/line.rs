//! Line descriptors: immutable data for one scripted dialogue line
//!
//! Lines are produced by script loading (outside this crate) and shared
//! read-only with the playback contexts through an `Arc`.

use crate::time::Seconds;
use crate::ActorRole;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle of an audio trigger (voice cue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioCueId(pub u32);

impl fmt::Display for AudioCueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cue:{}", self.0)
    }
}

/// Behavior flags of a line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFlags {
    /// Drop any one-line or sticky look-at target
    pub reset_look_at: bool,
    /// Keep the look-at target across following lines
    pub look_at_sticky: bool,
    /// Drive the animation through the graph's "Signal" input instead of "Action"
    pub anim_signal: bool,
    /// Play the animation through exact positioning (AI goal pipe)
    pub exact_positioning: bool,
    /// Clear the current facial expression
    pub reset_facial: bool,
}

/// Facial expression played with a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialExpression {
    /// Effector name in the facial library
    pub name: String,
    /// Blend weight
    pub weight: f32,
    /// Fade time in seconds
    pub fade_time: Seconds,
}

impl FacialExpression {
    /// Create a new expression
    pub fn new(name: impl Into<String>, weight: f32, fade_time: Seconds) -> Self {
        Self {
            name: name.into(),
            weight,
            fade_time,
        }
    }
}

/// One scripted line of dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDescriptor {
    /// The speaking actor
    pub actor: ActorRole,
    /// Actor to look at while speaking
    #[serde(default)]
    pub look_at: Option<ActorRole>,
    /// Behavior flags
    #[serde(default)]
    pub flags: LineFlags,
    /// Body animation; empty means no animation on this line
    #[serde(default)]
    pub animation: String,
    /// Voice cue
    #[serde(default)]
    pub audio: Option<AudioCueId>,
    /// Facial expression
    #[serde(default)]
    pub facial: Option<FacialExpression>,
    /// Seconds to wait before the next line may be requested
    #[serde(default)]
    pub post_line_delay: Seconds,
}

impl LineDescriptor {
    /// Create an empty line for an actor
    pub fn new(actor: ActorRole) -> Self {
        Self {
            actor,
            look_at: None,
            flags: LineFlags::default(),
            animation: String::new(),
            audio: None,
            facial: None,
            post_line_delay: 0.0,
        }
    }

    /// Set a one-line look-at target
    pub fn with_look_at(mut self, target: ActorRole) -> Self {
        self.look_at = Some(target);
        self
    }

    /// Set a look-at target that persists across lines
    pub fn with_sticky_look_at(mut self, target: ActorRole) -> Self {
        self.look_at = Some(target);
        self.flags.look_at_sticky = true;
        self
    }

    /// Set the body animation
    pub fn with_animation(mut self, name: impl Into<String>) -> Self {
        self.animation = name.into();
        self
    }

    /// Set the voice cue
    pub fn with_audio(mut self, cue: AudioCueId) -> Self {
        self.audio = Some(cue);
        self
    }

    /// Set the facial expression
    pub fn with_facial(mut self, expression: FacialExpression) -> Self {
        self.facial = Some(expression);
        self
    }

    /// Set the post-line delay
    pub fn with_delay(mut self, delay: Seconds) -> Self {
        self.post_line_delay = delay;
        self
    }

    /// Replace the flags
    pub fn with_flags(mut self, flags: LineFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Check if the line has a body animation
    pub fn has_animation(&self) -> bool {
        !self.animation.is_empty()
    }

    /// Check if the line has a voice cue
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Check if the line touches the facial expression at all
    pub fn has_facial(&self) -> bool {
        self.facial.is_some() || self.flags.reset_facial
    }
}
