//! Scriptable in-memory collaborators for tests
//!
//! [`MockBackends`] implements every collaborator trait over one shared
//! state. Tests script entity state (existence, death, alertness, positions)
//! and collaborator answers (trigger success, look-at reached), then inspect
//! the ordered [`Call`] log.

use crate::backend::{
    AiKind, AiSystem, AnimInput, AnimationGraph, AudioSystem, AuxObjectId, Backends, EffectorId,
    FacialAnimation, FacialChannelId, GoalPipeId, QueryId, SignalData, World,
};
use crate::geometry::Aabb;
use crate::line::AudioCueId;
use crate::{ContextId, EntityId};
use glam::Vec3;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A collaborator call, in the order it was made
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddAnimListener(EntityId),
    RemoveAnimListener(EntityId),
    SetInput(EntityId, AnimInput, String),
    QueryLeaveState(EntityId),
    QueryChangeInput(EntityId, AnimInput),
    CreateAuxObject(EntityId),
    AddAudioListener(AuxObjectId),
    RemoveAudioListener(AuxObjectId),
    RemoveAuxObject(AuxObjectId),
    ExecuteTrigger(EntityId, AudioCueId),
    StopTrigger(EntityId, AudioCueId),
    SetAuxOffset(AuxObjectId, Vec3),
    SendSignal(EntityId, String, SignalData),
    RegisterPipeListener(GoalPipeId),
    UnregisterPipeListener(GoalPipeId),
    RemoveSubPipe(GoalPipeId, bool),
    CancelSubPipe(GoalPipeId),
    SetLookAt(EntityId, Vec3),
    ResetLookAt(EntityId),
    SetRefPoint(EntityId, Vec3, Vec3),
    StartFacialChannel(EntityId, EffectorId),
    StopFacialChannel(FacialChannelId, f32),
    AddEntityListener(EntityId),
    RemoveEntityListener(EntityId),
}

/// Scripted state of one entity
#[derive(Debug, Clone)]
pub struct MockEntity {
    pub exists: bool,
    pub dead: bool,
    pub local_player: bool,
    pub ai: AiKind,
    pub alertness: Option<u8>,
    pub position: Vec3,
    pub eye_direction: Vec3,
    pub has_anim_graph: bool,
}

impl Default for MockEntity {
    fn default() -> Self {
        Self {
            exists: true,
            dead: false,
            local_player: false,
            ai: AiKind::Actor,
            alertness: Some(0),
            position: Vec3::ZERO,
            eye_direction: Vec3::X,
            has_anim_graph: true,
        }
    }
}

#[derive(Debug)]
struct MockState {
    entities: HashMap<EntityId, MockEntity>,
    calls: Vec<Call>,
    trigger_succeeds: bool,
    look_at_reached: bool,
    camera_visible: bool,
    missing_effectors: HashSet<String>,
    next_id: u32,
    last_query: Option<QueryId>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
            calls: Vec::new(),
            trigger_succeeds: true,
            look_at_reached: true,
            camera_visible: false,
            missing_effectors: HashSet::new(),
            next_id: 1,
            last_query: None,
        }
    }
}

impl MockState {
    fn entity(&self, id: EntityId) -> Option<&MockEntity> {
        self.entities.get(&id).filter(|entity| entity.exists)
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-memory implementation of every collaborator
#[derive(Debug, Clone, Default)]
pub struct MockBackends {
    state: Rc<RefCell<MockState>>,
}

impl MockBackends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborator bundle backed by this mock
    pub fn backends(&self) -> Backends {
        Backends {
            animation: Rc::new(self.clone()),
            audio: Rc::new(self.clone()),
            ai: Rc::new(self.clone()),
            facial: Rc::new(self.clone()),
            world: Rc::new(self.clone()),
        }
    }

    /// Add an AI actor at `position`
    pub fn spawn(&self, id: EntityId, position: Vec3) {
        self.state.borrow_mut().entities.insert(
            id,
            MockEntity {
                position,
                ..MockEntity::default()
            },
        );
    }

    /// Add the local player at `position`, looking along `eye_direction`
    pub fn spawn_player(&self, id: EntityId, position: Vec3, eye_direction: Vec3) {
        self.state.borrow_mut().entities.insert(
            id,
            MockEntity {
                position,
                eye_direction,
                local_player: true,
                ai: AiKind::Player,
                ..MockEntity::default()
            },
        );
    }

    /// Edit an entity's scripted state, creating it if needed
    pub fn with_entity(&self, id: EntityId, edit: impl FnOnce(&mut MockEntity)) {
        edit(self.state.borrow_mut().entities.entry(id).or_default());
    }

    pub fn despawn(&self, id: EntityId) {
        self.with_entity(id, |entity| entity.exists = false);
    }

    pub fn set_dead(&self, id: EntityId, dead: bool) {
        self.with_entity(id, |entity| entity.dead = dead);
    }

    pub fn set_alertness(&self, id: EntityId, level: u8) {
        self.with_entity(id, |entity| entity.alertness = Some(level));
    }

    pub fn set_ai_kind(&self, id: EntityId, kind: AiKind) {
        self.with_entity(id, |entity| entity.ai = kind);
    }

    pub fn set_position(&self, id: EntityId, position: Vec3) {
        self.with_entity(id, |entity| entity.position = position);
    }

    pub fn set_has_anim_graph(&self, id: EntityId, present: bool) {
        self.with_entity(id, |entity| entity.has_anim_graph = present);
    }

    /// Whether `execute_trigger` reports success
    pub fn set_trigger_succeeds(&self, succeeds: bool) {
        self.state.borrow_mut().trigger_succeeds = succeeds;
    }

    /// Whether `set_look_at` reports the target as reached
    pub fn set_look_at_reached(&self, reached: bool) {
        self.state.borrow_mut().look_at_reached = reached;
    }

    pub fn set_camera_visible(&self, visible: bool) {
        self.state.borrow_mut().camera_visible = visible;
    }

    /// Make `find_effector` fail for `name`
    pub fn remove_effector(&self, name: &str) {
        self.state
            .borrow_mut()
            .missing_effectors
            .insert(name.to_string());
    }

    /// The most recently issued animation query
    pub fn last_query(&self) -> Option<QueryId> {
        self.state.borrow().last_query
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Number of logged calls matching `pred`
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|call| pred(*call)).count()
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn query(&self, entity: EntityId) -> Option<QueryId> {
        let mut state = self.state.borrow_mut();
        if !state.entity(entity).is_some_and(|e| e.has_anim_graph) {
            return None;
        }
        let query = QueryId(state.alloc());
        state.last_query = Some(query);
        Some(query)
    }
}

impl AnimationGraph for MockBackends {
    fn set_input(&self, entity: EntityId, input: AnimInput, value: &str) -> Option<QueryId> {
        self.log(Call::SetInput(entity, input, value.to_string()));
        self.query(entity)
    }

    fn query_leave_state(&self, entity: EntityId) -> Option<QueryId> {
        self.log(Call::QueryLeaveState(entity));
        self.query(entity)
    }

    fn query_change_input(&self, entity: EntityId, input: AnimInput) -> Option<QueryId> {
        self.log(Call::QueryChangeInput(entity, input));
        self.query(entity)
    }

    fn add_listener(&self, entity: EntityId, _context: ContextId) -> bool {
        let present = self
            .state
            .borrow()
            .entity(entity)
            .is_some_and(|e| e.has_anim_graph);
        if present {
            self.log(Call::AddAnimListener(entity));
        }
        present
    }

    fn remove_listener(&self, entity: EntityId, _context: ContextId) {
        self.log(Call::RemoveAnimListener(entity));
    }
}

impl AudioSystem for MockBackends {
    fn create_aux_object(&self, entity: EntityId) -> AuxObjectId {
        self.log(Call::CreateAuxObject(entity));
        AuxObjectId(self.state.borrow_mut().alloc())
    }

    fn add_listener(&self, _entity: EntityId, aux: AuxObjectId, _token: ContextId) {
        self.log(Call::AddAudioListener(aux));
    }

    fn remove_listener(&self, _entity: EntityId, aux: AuxObjectId) {
        self.log(Call::RemoveAudioListener(aux));
    }

    fn remove_aux_object(&self, _entity: EntityId, aux: AuxObjectId) {
        self.log(Call::RemoveAuxObject(aux));
    }

    fn execute_trigger(
        &self,
        entity: EntityId,
        cue: AudioCueId,
        _aux: AuxObjectId,
        _token: ContextId,
    ) -> bool {
        self.log(Call::ExecuteTrigger(entity, cue));
        self.state.borrow().trigger_succeeds
    }

    fn stop_trigger(&self, entity: EntityId, cue: AudioCueId, _aux: AuxObjectId) {
        self.log(Call::StopTrigger(entity, cue));
    }

    fn set_aux_object_offset(&self, _entity: EntityId, aux: AuxObjectId, offset: Vec3) {
        self.log(Call::SetAuxOffset(aux, offset));
    }
}

impl AiSystem for MockBackends {
    fn kind(&self, entity: EntityId) -> AiKind {
        self.state
            .borrow()
            .entity(entity)
            .map_or(AiKind::None, |e| e.ai)
    }

    fn alertness(&self, entity: EntityId) -> Option<u8> {
        self.state.borrow().entity(entity).and_then(|e| e.alertness)
    }

    fn allocate_goal_pipe_id(&self) -> GoalPipeId {
        GoalPipeId(self.state.borrow_mut().alloc())
    }

    fn register_goal_pipe_listener(&self, _entity: EntityId, pipe: GoalPipeId, _context: ContextId) {
        self.log(Call::RegisterPipeListener(pipe));
    }

    fn unregister_goal_pipe_listener(
        &self,
        _entity: EntityId,
        pipe: GoalPipeId,
        _context: ContextId,
    ) {
        self.log(Call::UnregisterPipeListener(pipe));
    }

    fn send_signal(&self, entity: EntityId, _priority: i32, name: &str, data: SignalData) {
        self.log(Call::SendSignal(entity, name.to_string(), data));
    }

    fn remove_sub_pipe(&self, _entity: EntityId, pipe: GoalPipeId, keep_inserted: bool) {
        self.log(Call::RemoveSubPipe(pipe, keep_inserted));
    }

    fn cancel_sub_pipe(&self, _entity: EntityId, pipe: GoalPipeId) {
        self.log(Call::CancelSubPipe(pipe));
    }

    fn set_look_at(&self, entity: EntityId, target: Vec3) -> Option<bool> {
        if self.kind(entity) != AiKind::Actor {
            return None;
        }
        self.log(Call::SetLookAt(entity, target));
        Some(self.state.borrow().look_at_reached)
    }

    fn reset_look_at(&self, entity: EntityId) {
        self.log(Call::ResetLookAt(entity));
    }

    fn set_ref_point(&self, entity: EntityId, position: Vec3, direction: Vec3) {
        self.log(Call::SetRefPoint(entity, position, direction));
    }

    fn move_dir(&self, entity: EntityId) -> Vec3 {
        self.state
            .borrow()
            .entity(entity)
            .map_or(Vec3::X, |e| e.eye_direction)
    }

    fn position(&self, entity: EntityId) -> Option<Vec3> {
        World::position(self, entity)
    }
}

impl FacialAnimation for MockBackends {
    fn find_effector(&self, entity: EntityId, name: &str) -> Option<EffectorId> {
        let mut state = self.state.borrow_mut();
        if state.entity(entity).is_none() || state.missing_effectors.contains(name) {
            return None;
        }
        Some(EffectorId(state.alloc()))
    }

    fn start_effector_channel(
        &self,
        entity: EntityId,
        effector: EffectorId,
        _weight: f32,
        _fade_time: f32,
    ) -> Option<FacialChannelId> {
        self.log(Call::StartFacialChannel(entity, effector));
        Some(FacialChannelId(self.state.borrow_mut().alloc()))
    }

    fn stop_effector_channel(&self, _entity: EntityId, channel: FacialChannelId, fade_time: f32) {
        self.log(Call::StopFacialChannel(channel, fade_time));
    }
}

impl World for MockBackends {
    fn exists(&self, entity: EntityId) -> bool {
        self.state.borrow().entity(entity).is_some()
    }

    fn is_dead(&self, entity: EntityId) -> bool {
        self.state.borrow().entity(entity).is_some_and(|e| e.dead)
    }

    fn is_local_player(&self, entity: EntityId) -> bool {
        self.state
            .borrow()
            .entity(entity)
            .is_some_and(|e| e.local_player)
    }

    fn position(&self, entity: EntityId) -> Option<Vec3> {
        self.state.borrow().entity(entity).map(|e| e.position)
    }

    fn bounds(&self, entity: EntityId) -> Option<Aabb> {
        self.state
            .borrow()
            .entity(entity)
            .map(|e| Aabb::around(e.position, 0.5))
    }

    fn eye(&self, entity: EntityId) -> Option<(Vec3, Vec3)> {
        self.state
            .borrow()
            .entity(entity)
            .map(|e| (e.position + Vec3::Z * 1.7, e.eye_direction))
    }

    fn voice_offset(&self, entity: EntityId) -> Option<Vec3> {
        self.state.borrow().entity(entity).map(|_| Vec3::Z * 1.6)
    }

    fn is_visible(&self, _bounds: &Aabb) -> bool {
        self.state.borrow().camera_visible
    }

    fn add_entity_listener(&self, entity: EntityId, _context: ContextId) {
        self.log(Call::AddEntityListener(entity));
    }

    fn remove_entity_listener(&self, entity: EntityId, _context: ContextId) {
        self.log(Call::RemoveEntityListener(entity));
    }
}
