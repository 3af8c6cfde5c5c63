//! Scoped external handles
//!
//! Every resource a context acquires from a collaborator is wrapped in a
//! guard whose `Drop` performs the matching release call. Releasing is then
//! just dropping (or overwriting) the `Option` that holds the guard, and a
//! handle can never be released twice or leaked on an early return.

use crate::backend::{
    AiSystem, AnimationGraph, AudioSystem, AuxObjectId, FacialAnimation, FacialChannelId,
    GoalPipeId, World,
};
use crate::{ContextId, EntityId};
use std::fmt;
use std::rc::Rc;

/// Registration as animation-graph listener
pub struct AnimListener {
    entity: EntityId,
    context: ContextId,
    armed: bool,
    animation: Rc<dyn AnimationGraph>,
}

impl AnimListener {
    /// Register `context` for the entity's animation events
    ///
    /// Returns `None` when the actor has no animation graph.
    pub fn register(
        animation: &Rc<dyn AnimationGraph>,
        entity: EntityId,
        context: ContextId,
    ) -> Option<Self> {
        animation.add_listener(entity, context).then(|| Self {
            entity,
            context,
            armed: true,
            animation: Rc::clone(animation),
        })
    }

    /// Drop without unregistering, for when the graph state is already gone
    pub fn forget(mut self) {
        self.armed = false;
    }
}

impl Drop for AnimListener {
    fn drop(&mut self) {
        if self.armed {
            self.animation.remove_listener(self.entity, self.context);
        }
    }
}

impl fmt::Debug for AnimListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimListener")
            .field("entity", &self.entity)
            .finish()
    }
}

/// How a goal pipe is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeRelease {
    /// Remove the sub-pipe
    Remove,
    /// Cancel the sub-pipe, then remove it without keeping inserted goals
    CancelAndRemove,
}

/// A goal pipe issued to an AI actor
pub struct GoalPipe {
    id: GoalPipeId,
    entity: EntityId,
    context: ContextId,
    listening: bool,
    release: PipeRelease,
    ai: Rc<dyn AiSystem>,
}

impl GoalPipe {
    /// Take ownership of an allocated pipe
    pub fn new(
        ai: &Rc<dyn AiSystem>,
        id: GoalPipeId,
        entity: EntityId,
        context: ContextId,
        release: PipeRelease,
    ) -> Self {
        Self {
            id,
            entity,
            context,
            listening: false,
            release,
            ai: Rc::clone(ai),
        }
    }

    /// Register the owning context for this pipe's events
    pub fn listen(&mut self) {
        if !self.listening {
            self.ai
                .register_goal_pipe_listener(self.entity, self.id, self.context);
            self.listening = true;
        }
    }

    /// The pipe id
    pub fn id(&self) -> GoalPipeId {
        self.id
    }
}

impl Drop for GoalPipe {
    fn drop(&mut self) {
        if self.listening {
            self.ai
                .unregister_goal_pipe_listener(self.entity, self.id, self.context);
        }
        match self.release {
            PipeRelease::Remove => self.ai.remove_sub_pipe(self.entity, self.id, true),
            PipeRelease::CancelAndRemove => {
                self.ai.cancel_sub_pipe(self.entity, self.id);
                self.ai.remove_sub_pipe(self.entity, self.id, false);
            }
        }
    }
}

impl fmt::Debug for GoalPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalPipe")
            .field("id", &self.id)
            .field("entity", &self.entity)
            .field("release", &self.release)
            .finish()
    }
}

/// A running facial effector channel
pub struct FacialChannel {
    id: FacialChannelId,
    entity: EntityId,
    fade_time: f32,
    facial: Rc<dyn FacialAnimation>,
}

impl FacialChannel {
    /// Take ownership of a started channel
    pub fn new(facial: &Rc<dyn FacialAnimation>, id: FacialChannelId, entity: EntityId) -> Self {
        Self {
            id,
            entity,
            fade_time: 0.0,
            facial: Rc::clone(facial),
        }
    }

    /// Fade the channel out over `fade_time` seconds
    pub fn stop(mut self, fade_time: f32) {
        self.fade_time = fade_time;
    }

    /// The channel id
    pub fn id(&self) -> FacialChannelId {
        self.id
    }
}

impl Drop for FacialChannel {
    fn drop(&mut self) {
        self.facial
            .stop_effector_channel(self.entity, self.id, self.fade_time);
    }
}

impl fmt::Debug for FacialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacialChannel").field("id", &self.id).finish()
    }
}

/// The audio aux object a context speaks through
pub struct SpeechEmitter {
    id: AuxObjectId,
    entity: EntityId,
    audio: Rc<dyn AudioSystem>,
}

impl SpeechEmitter {
    /// Create an aux object on the entity and listen for trigger-finished callbacks
    pub fn create(audio: &Rc<dyn AudioSystem>, entity: EntityId, token: ContextId) -> Self {
        let id = audio.create_aux_object(entity);
        audio.add_listener(entity, id, token);
        Self {
            id,
            entity,
            audio: Rc::clone(audio),
        }
    }

    /// The aux object id
    pub fn id(&self) -> AuxObjectId {
        self.id
    }
}

impl Drop for SpeechEmitter {
    fn drop(&mut self) {
        self.audio.remove_listener(self.entity, self.id);
        self.audio.remove_aux_object(self.entity, self.id);
    }
}

impl fmt::Debug for SpeechEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechEmitter").field("id", &self.id).finish()
    }
}

/// Registration for entity lifecycle events
pub struct EntityListener {
    entity: EntityId,
    context: ContextId,
    world: Rc<dyn World>,
}

impl EntityListener {
    /// Register `context` for the entity's lifecycle events
    pub fn register(world: &Rc<dyn World>, entity: EntityId, context: ContextId) -> Self {
        world.add_entity_listener(entity, context);
        Self {
            entity,
            context,
            world: Rc::clone(world),
        }
    }
}

impl Drop for EntityListener {
    fn drop(&mut self) {
        self.world.remove_entity_listener(self.entity, self.context);
    }
}

impl fmt::Debug for EntityListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityListener")
            .field("entity", &self.entity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockBackends};

    #[test]
    fn test_goal_pipe_released_once() {
        let mock = MockBackends::new();
        let backends = mock.backends();
        let entity = EntityId(1);
        let ctx = ContextId(9);

        let mut pipe = GoalPipe::new(&backends.ai, GoalPipeId(4), entity, ctx, PipeRelease::Remove);
        pipe.listen();
        pipe.listen();
        drop(pipe);

        let calls = mock.calls();
        assert_eq!(
            calls,
            vec![
                Call::RegisterPipeListener(GoalPipeId(4)),
                Call::UnregisterPipeListener(GoalPipeId(4)),
                Call::RemoveSubPipe(GoalPipeId(4), true),
            ]
        );
    }

    #[test]
    fn test_cancel_and_remove_order() {
        let mock = MockBackends::new();
        let backends = mock.backends();
        let pipe = GoalPipe::new(
            &backends.ai,
            GoalPipeId(2),
            EntityId(1),
            ContextId(1),
            PipeRelease::CancelAndRemove,
        );
        drop(pipe);
        assert_eq!(
            mock.calls(),
            vec![
                Call::CancelSubPipe(GoalPipeId(2)),
                Call::RemoveSubPipe(GoalPipeId(2), false),
            ]
        );
    }

    #[test]
    fn test_facial_channel_fades_with_stop_time() {
        let mock = MockBackends::new();
        let backends = mock.backends();
        let channel = FacialChannel::new(&backends.facial, FacialChannelId(3), EntityId(1));
        channel.stop(0.4);
        assert_eq!(
            mock.calls(),
            vec![Call::StopFacialChannel(FacialChannelId(3), 0.4)]
        );
    }

    #[test]
    fn test_forgotten_anim_listener_skips_release() {
        let mock = MockBackends::new();
        mock.with_entity(EntityId(1), |_| {});
        let backends = mock.backends();
        let listener = AnimListener::register(&backends.animation, EntityId(1), ContextId(1));
        assert!(listener.is_some());
        mock.clear_calls();
        if let Some(listener) = listener {
            listener.forget();
        }
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_anim_listener_requires_graph() {
        let mock = MockBackends::new();
        mock.set_has_anim_graph(EntityId(1), false);
        let backends = mock.backends();
        assert!(AnimListener::register(&backends.animation, EntityId(1), ContextId(1)).is_none());
    }
}
