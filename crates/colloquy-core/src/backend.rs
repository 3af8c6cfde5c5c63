//! Collaborator contracts
//!
//! The playback machine does not animate, play audio, run AI or query the
//! world itself. It talks to the host engine through the traits below, which
//! take `&self` so a single implementation can be shared by every context
//! (implementations use interior mutability where they need it).
//!
//! Completion signals flow the other way as [`ContextEvent`] values. They are
//! addressed to a [`ContextId`] and may be produced on any thread through an
//! [`EventSender`]; the owning session drains them at the start of its next
//! update.

use crate::geometry::Aabb;
use crate::line::AudioCueId;
use crate::{ContextId, EntityId};
use crossbeam::channel::{self, Receiver, Sender};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Animation-graph query handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub u32);

/// AI goal-pipe handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalPipeId(pub u32);

/// Audio aux object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuxObjectId(pub u32);

/// Facial effector handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectorId(pub u32);

/// Facial effector channel handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacialChannelId(pub u32);

/// Animation-graph input driven by a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimInput {
    /// One-shot signal input
    Signal,
    /// Looping action input
    Action,
}

impl AnimInput {
    /// Input name as known to the animation graph
    pub fn name(&self) -> &'static str {
        match self {
            AnimInput::Signal => "Signal",
            AnimInput::Action => "Action",
        }
    }
}

/// Animation graph of the actors' skeletons
pub trait AnimationGraph {
    /// Set a graph input; returns the query tracking when it takes effect
    fn set_input(&self, entity: EntityId, input: AnimInput, value: &str) -> Option<QueryId>;
    /// Query completion of leaving the current state
    fn query_leave_state(&self, entity: EntityId) -> Option<QueryId>;
    /// Query completion of the next change of an input
    fn query_change_input(&self, entity: EntityId, input: AnimInput) -> Option<QueryId>;
    /// Start delivering [`AnimEvent`]s for `entity` to `context`; `false` if the actor has no graph
    fn add_listener(&self, entity: EntityId, context: ContextId) -> bool;
    /// Stop delivering events
    fn remove_listener(&self, entity: EntityId, context: ContextId);
}

/// Audio engine executing voice triggers
pub trait AudioSystem {
    /// Create an aux object (emitter) on the actor
    fn create_aux_object(&self, entity: EntityId) -> AuxObjectId;
    /// Deliver trigger-finished callbacks for the aux object, tagged with `token`
    fn add_listener(&self, entity: EntityId, aux: AuxObjectId, token: ContextId);
    /// Stop delivering callbacks for the aux object
    fn remove_listener(&self, entity: EntityId, aux: AuxObjectId);
    /// Destroy the aux object
    fn remove_aux_object(&self, entity: EntityId, aux: AuxObjectId);
    /// Execute a trigger; `false` if it failed synchronously
    fn execute_trigger(
        &self,
        entity: EntityId,
        cue: AudioCueId,
        aux: AuxObjectId,
        token: ContextId,
    ) -> bool;
    /// Stop a running trigger
    fn stop_trigger(&self, entity: EntityId, cue: AudioCueId, aux: AuxObjectId);
    /// Move the aux object relative to the entity
    fn set_aux_object_offset(&self, entity: EntityId, aux: AuxObjectId, offset: Vec3);
}

/// Kind of AI object attached to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiKind {
    /// No AI on the entity
    None,
    /// An AI actor that runs goal pipes
    Actor,
    /// The player; takes no goal pipes
    Player,
}

/// Extra data sent with an AI signal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalData {
    /// Goal pipe the signal should run in
    pub goal_pipe: Option<GoalPipeId>,
    /// Object name (animation for exact positioning)
    pub object_name: Option<String>,
    /// Integer payload (signal-vs-action flag for exact positioning)
    pub int_value: i32,
    /// Float payload (direction tolerance)
    pub float_value: f32,
    /// Primary point payload (start radius)
    pub point: Vec3,
    /// Secondary point payload (target radius in `x`)
    pub point2: Vec3,
}

impl SignalData {
    /// Empty extra data
    pub fn new() -> Self {
        Self::default()
    }
}

/// AI system executing goal pipes and look-at
pub trait AiSystem {
    /// Kind of AI on an entity
    fn kind(&self, entity: EntityId) -> AiKind;
    /// Current alertness level, if the entity has an AI proxy
    fn alertness(&self, entity: EntityId) -> Option<u8>;
    /// Allocate a fresh goal-pipe id
    fn allocate_goal_pipe_id(&self) -> GoalPipeId;
    /// Deliver [`GoalPipeEvent`]s for `pipe` to `context`
    fn register_goal_pipe_listener(&self, entity: EntityId, pipe: GoalPipeId, context: ContextId);
    /// Stop delivering goal-pipe events
    fn unregister_goal_pipe_listener(
        &self,
        entity: EntityId,
        pipe: GoalPipeId,
        context: ContextId,
    );
    /// Send a signal to the entity's AI
    fn send_signal(&self, entity: EntityId, priority: i32, name: &str, data: SignalData);
    /// Remove a sub-pipe
    fn remove_sub_pipe(&self, entity: EntityId, pipe: GoalPipeId, keep_inserted: bool);
    /// Cancel a sub-pipe
    fn cancel_sub_pipe(&self, entity: EntityId, pipe: GoalPipeId);
    /// Aim the actor's look-at; `None` if it is not an AI actor, otherwise whether the target is reached
    fn set_look_at(&self, entity: EntityId, target: Vec3) -> Option<bool>;
    /// Clear the actor's look-at
    fn reset_look_at(&self, entity: EntityId);
    /// Set the reference point used by exact positioning
    fn set_ref_point(&self, entity: EntityId, position: Vec3, direction: Vec3);
    /// Movement direction of the AI
    fn move_dir(&self, entity: EntityId) -> Vec3;
    /// AI position, used as look-at target
    fn position(&self, entity: EntityId) -> Option<Vec3>;
}

/// Facial animation of the actors
pub trait FacialAnimation {
    /// Look up an effector by name; `None` if unknown
    fn find_effector(&self, entity: EntityId, name: &str) -> Option<EffectorId>;
    /// Start blending an effector in
    fn start_effector_channel(
        &self,
        entity: EntityId,
        effector: EffectorId,
        weight: f32,
        fade_time: f32,
    ) -> Option<FacialChannelId>;
    /// Fade a channel out
    fn stop_effector_channel(&self, entity: EntityId, channel: FacialChannelId, fade_time: f32);
}

/// World and camera queries
pub trait World {
    /// Check if the entity still exists
    fn exists(&self, entity: EntityId) -> bool;
    /// Check if the entity is an actor that has died
    fn is_dead(&self, entity: EntityId) -> bool;
    /// Check if the entity is the locally controlled player
    fn is_local_player(&self, entity: EntityId) -> bool;
    /// World position
    fn position(&self, entity: EntityId) -> Option<Vec3>;
    /// World bounds
    fn bounds(&self, entity: EntityId) -> Option<Aabb>;
    /// Eye position and view direction
    fn eye(&self, entity: EntityId) -> Option<(Vec3, Vec3)>;
    /// Voice emitter offset relative to the entity (voice attachment or head)
    fn voice_offset(&self, entity: EntityId) -> Option<Vec3>;
    /// Check if the bounds are visible to the view camera
    fn is_visible(&self, bounds: &Aabb) -> bool;
    /// Deliver [`EntityEvent`]s for `entity` to `context`
    fn add_entity_listener(&self, entity: EntityId, context: ContextId);
    /// Stop delivering entity events
    fn remove_entity_listener(&self, entity: EntityId, context: ContextId);
}

/// The set of collaborators a session plays through
#[derive(Clone)]
pub struct Backends {
    pub animation: Rc<dyn AnimationGraph>,
    pub audio: Rc<dyn AudioSystem>,
    pub ai: Rc<dyn AiSystem>,
    pub facial: Rc<dyn FacialAnimation>,
    pub world: Rc<dyn World>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Backends")
    }
}

/// Animation-graph callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimEvent {
    /// A query finished
    QueryComplete { query: QueryId, succeeded: bool },
    /// The actor's graph state was destroyed
    StateDestroyed,
}

/// Goal-pipe callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalPipeEvent {
    Deselected,
    Removed,
    Finished,
    Suspended,
    Resumed,
    AnimStarted,
    RefPointMoved,
}

/// Entity lifecycle callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    /// The entity is being destroyed
    Done,
    /// The entity is being reset (editor/game mode switch)
    Reset,
}

/// A callback addressed to one playback context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEvent {
    Animation(AnimEvent),
    GoalPipe { pipe: GoalPipeId, event: GoalPipeEvent },
    AudioTriggerFinished,
    Entity(EntityEvent),
}

/// An event plus the context it is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub context: ContextId,
    pub event: ContextEvent,
}

/// Cloneable, thread-safe handle for delivering collaborator callbacks to a session
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Envelope>,
}

impl EventSender {
    /// Post an event; returns `false` if the session is gone
    pub fn send(&self, context: ContextId, event: ContextEvent) -> bool {
        self.tx.send(Envelope { context, event }).is_ok()
    }
}

/// Receiving end owned by the session
#[derive(Debug)]
pub(crate) struct EventInbox {
    rx: Receiver<Envelope>,
    tx: Sender<Envelope>,
}

impl EventInbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { rx, tx }
    }

    pub(crate) fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn drain(&self) -> impl Iterator<Item = Envelope> + '_ {
        self.rx.try_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventSender>();
    }

    #[test]
    fn test_inbox_drains_in_order() {
        let inbox = EventInbox::new();
        let sender = inbox.sender();
        let ctx = ContextId(5);

        let handle = std::thread::spawn(move || {
            sender.send(ctx, ContextEvent::AudioTriggerFinished);
            sender.send(ctx, ContextEvent::Entity(EntityEvent::Done));
        });
        handle.join().unwrap();

        let events: Vec<_> = inbox.drain().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                ContextEvent::AudioTriggerFinished,
                ContextEvent::Entity(EntityEvent::Done)
            ]
        );
    }

    #[test]
    fn test_anim_input_names() {
        assert_eq!(AnimInput::Signal.name(), "Signal");
        assert_eq!(AnimInput::Action.name(), "Action");
    }
}
