//! Per-actor line playback
//!
//! An [`ActorPlaybackContext`] drives one actor through the phases of a line
//! (look-at, animation, voice, facial expression) and owns every handle it
//! acquires from the collaborators while doing so. It is ticked by its
//! [`DialogSession`](crate::DialogSession) and receives collaborator
//! callbacks through [`ActorPlaybackContext::handle_event`].
//!
//! Callbacks only update bookkeeping. Phase changes happen in
//! [`ActorPlaybackContext::update`], [`ActorPlaybackContext::play_line`] and
//! [`ActorPlaybackContext::abort`].

use crate::awareness::{self, Awareness, Observer, Verdict, Watched};
use crate::backend::{
    AiKind, AnimEvent, AnimInput, Backends, ContextEvent, EntityEvent, GoalPipeEvent, GoalPipeId,
    QueryId, SignalData,
};
use crate::config::{ActorFlags, AiBehaviourMode, SessionConfig};
use crate::geometry::{flat_direction, Aabb};
use crate::handle::{
    AnimListener, EntityListener, FacialChannel, GoalPipe, PipeRelease, SpeechEmitter,
};
use crate::journal::PhaseChange;
use crate::line::LineDescriptor;
use crate::phase::{AbortReason, CancelState, Phase};
use crate::session::Roster;
use crate::time::{NextLineSchedule, Seconds};
use crate::{ActorRole, ContextId, EntityId};
use glam::Vec3;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Seconds to wait for a look-at before giving up on it
pub const LOOKAT_TIMEOUT: Seconds = 1.0;
/// Seconds to wait for an animation to start
pub const ANIM_TIMEOUT: Seconds = 1.0;
/// Seconds to wait for a voice trigger to start
pub const SOUND_TIMEOUT: Seconds = 1.0;
/// Next-line delay requested when a voice trigger fails
pub const SOUND_RETRY_DELAY: Seconds = 2.0;
/// Gap between the end of a voice line and the next line
pub const AUDIO_FINISHED_GAP: Seconds = 0.2;
/// Priority of every AI signal a context sends
pub const AI_SIGNAL_PRIORITY: i32 = 10;

const SIGNAL_ANIMEX: &str = "ACT_ANIMEX";
const SIGNAL_DIALOG_OVER: &str = "ACT_DIALOG_OVER";

const EXACT_START_RADIUS: f32 = 0.1;
const EXACT_DIRECTION_TOLERANCE: f32 = 5.0;
const EXACT_TARGET_RADIUS: f32 = 0.05;

const HEAD_HEIGHT: Vec3 = Vec3::new(0.0, 0.0, 1.7);

/// Where an actor is told to look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookAtTarget {
    #[default]
    None,
    /// Look until reached or timed out, for the current line only
    Once(ActorRole),
    /// Keep looking across lines until a line resets it
    Sticky(ActorRole),
}

/// Session state a context sees while it is ticked
pub struct TickEnv<'a> {
    /// Session time, sampled once per tick
    pub now: Seconds,
    /// Actors of the session
    pub roster: &'a Roster,
    /// Where next-line requests go
    pub schedule: &'a mut NextLineSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Timers {
    look_at: Seconds,
    anim: Seconds,
    sound: Seconds,
}

impl Timers {
    fn armed() -> Self {
        Self {
            look_at: LOOKAT_TIMEOUT,
            anim: ANIM_TIMEOUT,
            sound: SOUND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    anim_scheduled: bool,
    anim_started: bool,
    sound_scheduled: bool,
    sound_started: bool,
    has_scheduled_next_line: bool,
}

/// Playback state of one actor in a session
#[derive(Debug)]
pub struct ActorPlaybackContext {
    id: ContextId,
    role: ActorRole,
    entity: EntityId,
    is_local_player: bool,
    config: Rc<SessionConfig>,
    flags: ActorFlags,
    backends: Backends,

    line: Option<Arc<LineDescriptor>>,
    phase: Phase,
    timers: Timers,
    progress: Progress,

    look_at: LookAtTarget,
    look_at_needs_reset: bool,
    awareness: Awareness,

    cancel: CancelState,
    abort_reason: Option<AbortReason>,
    abort_from_ai: bool,
    entity_destroyed: bool,

    anim_use_signal: bool,
    anim_use_exact_positioning: bool,
    anim_query: Option<QueryId>,
    anim_listener: Option<AnimListener>,
    primary_pipe: Option<GoalPipe>,
    positioning_pipe: Option<GoalPipe>,
    facial_channel: Option<FacialChannel>,
    entity_listener: Option<EntityListener>,
    speech: Option<SpeechEmitter>,

    transitions: Vec<PhaseChange>,
}

impl ActorPlaybackContext {
    /// Create an idle context for `role` played by `entity`
    pub fn new(
        role: ActorRole,
        entity: EntityId,
        config: Rc<SessionConfig>,
        backends: Backends,
    ) -> Self {
        let is_local_player = backends.world.is_local_player(entity);
        let flags = config.flags_for(role);
        let grace_time = config.awareness.grace_time;
        let context = Self {
            id: ContextId::next(),
            role,
            entity,
            is_local_player,
            config,
            flags,
            backends,
            line: None,
            phase: Phase::Idle,
            timers: Timers::armed(),
            progress: Progress::default(),
            look_at: LookAtTarget::None,
            look_at_needs_reset: false,
            awareness: Awareness::new(grace_time),
            cancel: CancelState::Clear,
            abort_reason: None,
            abort_from_ai: false,
            entity_destroyed: false,
            anim_use_signal: false,
            anim_use_exact_positioning: false,
            anim_query: None,
            anim_listener: None,
            primary_pipe: None,
            positioning_pipe: None,
            facial_channel: None,
            entity_listener: None,
            speech: None,
            transitions: Vec::new(),
        };
        debug!(context = %context.id, actor = %role, entity = %entity, "created playback context");
        context
    }

    /// Return to the freshly constructed state
    ///
    /// Live handles are released. The speech emitter is kept; it lives as
    /// long as the context.
    pub fn reset_state(&mut self) {
        self.stop_sound();
        self.line = None;
        self.phase = Phase::Idle;
        self.timers = Timers::armed();
        self.progress = Progress::default();
        self.look_at = LookAtTarget::None;
        self.look_at_needs_reset = false;
        self.awareness = Awareness::new(self.config.awareness.grace_time);
        self.cancel = CancelState::Clear;
        self.abort_reason = None;
        self.abort_from_ai = false;
        self.entity_destroyed = false;
        self.anim_use_signal = false;
        self.anim_use_exact_positioning = false;
        self.anim_query = None;
        self.anim_listener = None;
        self.primary_pipe = None;
        self.positioning_pipe = None;
        self.facial_channel = None;
        self.entity_listener = None;
    }

    /// Prepare the actor for the session
    pub fn begin_session(&mut self) {
        info!(context = %self.id, actor = %self.role, "begin session");
        self.reset_state();

        self.entity_listener = Some(EntityListener::register(
            &self.backends.world,
            self.entity,
            self.id,
        ));

        if let Some(signal) = self.config.ai_behaviour.begin_signal() {
            self.primary_pipe =
                self.issue_goal_pipe(signal, SignalData::new(), PipeRelease::Remove);
            if self.primary_pipe.is_none() && self.backends.ai.kind(self.entity) == AiKind::None
            {
                debug!(context = %self.id, "actor has no AI, skipping {signal}");
            }
        }

        self.cancel = CancelState::Owed;
    }

    /// Release everything the session acquired
    pub fn end_session(&mut self) {
        self.cancel_current(true);
        info!(context = %self.id, actor = %self.role, "end session");
    }

    /// Advance by `dt` seconds
    ///
    /// Returns `true` while the context is healthy and `false` once it is
    /// aborted. Several phases may complete within one tick; `dt` is only
    /// applied to the first of them.
    pub fn update(&mut self, dt: Seconds, env: &mut TickEnv<'_>) -> bool {
        if self.is_aborted() {
            return false;
        }

        if self.entity_destroyed || !self.backends.world.exists(self.entity) {
            self.abort(true, AbortReason::EntityDestroyed);
            return false;
        }

        if let Some(threshold) = self.config.alertness_interrupt.threshold() {
            let alertness = self.backends.ai.alertness(self.entity);
            if alertness.is_some_and(|level| level >= threshold) {
                debug!(context = %self.id, ?alertness, threshold, "actor alerted");
                self.abort(true, AbortReason::AIAborted);
                return false;
            }
        }

        if !self.flags.no_actor_dead_abort && self.backends.world.is_dead(self.entity) {
            self.abort(true, AbortReason::ActorDead);
            return false;
        }

        if self.is_local_player && !self.check_awareness(dt, env.roster) {
            let reason = self.awareness.failure_reason();
            self.abort(true, reason);
            return false;
        }

        if self.abort_from_ai {
            self.abort_from_ai = false;
            self.abort(true, AbortReason::AIAborted);
            return false;
        }

        if self.config.allows_look_at() {
            self.do_sticky_look_at(env.roster);
        }

        let mut dt = dt;
        let mut steps = 0usize;
        loop {
            let Some(line) = self.line.clone() else {
                break;
            };
            let advance = match self.phase {
                Phase::Idle | Phase::Aborted => false,
                Phase::NewLine => self.step_new_line(&line, env),
                Phase::LookAt => self.step_look_at(dt, &line, env),
                Phase::Anim => self.step_anim(dt, &line, env),
                Phase::ScheduleSoundPlay => self.step_schedule_sound(dt, &line, env),
                Phase::SoundFacial => self.step_sound_facial(&line),
                Phase::EndLine => self.step_end_line(&line, env),
            };
            if !advance {
                if self.is_still_playing() {
                    self.update_voice_position();
                }
                break;
            }

            self.advance_phase();
            dt = 0.0;
            steps += 1;
            if steps > Phase::LINE_PHASES {
                error!(context = %self.id, phase = %self.phase, "phase loop did not settle");
                break;
            }
        }

        true
    }

    /// Start playing `line`
    ///
    /// Returns `false` if the context is aborted; an aborted context only
    /// plays again after [`reset_state`](Self::reset_state) or a new session.
    pub fn play_line(&mut self, line: Arc<LineDescriptor>) -> bool {
        if self.is_aborted() {
            warn!(context = %self.id, actor = %self.role, "cannot play a line on an aborted context");
            return false;
        }
        debug!(context = %self.id, actor = %self.role, "play line");
        self.line = Some(line);
        self.set_phase(Phase::NewLine, None);
        true
    }

    /// Release all handles and return to `Idle`
    ///
    /// Runs only when a cancel is owed, so repeated calls are no-ops.
    /// `reset_states` also puts the animation graph back into a neutral
    /// state.
    pub fn cancel_current(&mut self, reset_states: bool) {
        let from = self.phase;
        if self.run_cancel(reset_states) && from != Phase::Idle {
            self.transitions.push(PhaseChange {
                actor: self.role,
                from,
                to: Phase::Idle,
                reason: None,
            });
        }
    }

    /// Abort the context
    ///
    /// With `cancel`, handles are released as by
    /// [`cancel_current`](Self::cancel_current). The context stays
    /// `Aborted` either way.
    pub fn abort(&mut self, cancel: bool, reason: AbortReason) {
        info!(context = %self.id, actor = %self.role, %reason, "aborting");
        let from = self.phase;
        self.phase = Phase::Aborted;
        self.abort_reason = Some(reason);
        if cancel {
            self.run_cancel(true);
        }
        self.phase = Phase::Aborted;
        self.abort_reason = Some(reason);
        if from != Phase::Aborted {
            self.transitions.push(PhaseChange {
                actor: self.role,
                from,
                to: Phase::Aborted,
                reason: Some(reason),
            });
        }
    }

    /// Apply a collaborator callback
    ///
    /// Returns the delay of a next-line request when the event asks for
    /// one (a finished voice line).
    pub fn handle_event(&mut self, event: ContextEvent) -> Option<Seconds> {
        match event {
            ContextEvent::Animation(AnimEvent::QueryComplete { query, succeeded }) => {
                self.on_query_complete(query, succeeded);
                None
            }
            ContextEvent::Animation(AnimEvent::StateDestroyed) => {
                debug!(context = %self.id, "animation state destroyed");
                if let Some(listener) = self.anim_listener.take() {
                    listener.forget();
                }
                self.anim_query = None;
                self.progress.anim_started = false;
                None
            }
            ContextEvent::GoalPipe { pipe, event } => {
                self.on_goal_pipe_event(pipe, event);
                None
            }
            ContextEvent::AudioTriggerFinished => self.on_trigger_finished(),
            ContextEvent::Entity(EntityEvent::Done | EntityEvent::Reset) => {
                debug!(context = %self.id, entity = %self.entity, "entity going away");
                self.entity_destroyed = true;
                None
            }
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_local_player(&self) -> bool {
        self.is_local_player
    }

    /// Check if the context is aborted
    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    /// Check if the voice of the current line is playing
    pub fn is_still_playing(&self) -> bool {
        self.progress.sound_started && self.line.as_ref().is_some_and(|line| line.has_audio())
    }

    pub fn cancel_state(&self) -> CancelState {
        self.cancel
    }

    pub fn look_at(&self) -> LookAtTarget {
        self.look_at
    }

    pub fn awareness(&self) -> &Awareness {
        &self.awareness
    }

    pub fn current_line(&self) -> Option<&Arc<LineDescriptor>> {
        self.line.as_ref()
    }

    /// Check if the current animation has been seen to start
    pub fn anim_started(&self) -> bool {
        self.progress.anim_started
    }

    /// Check if the current line already requested the next one
    pub fn has_scheduled_next_line(&self) -> bool {
        self.progress.has_scheduled_next_line
    }

    /// Take the phase changes recorded since the last call
    pub fn take_transitions(&mut self) -> Vec<PhaseChange> {
        std::mem::take(&mut self.transitions)
    }

    fn set_phase(&mut self, to: Phase, reason: Option<AbortReason>) {
        let from = self.phase;
        self.phase = to;
        if from != to {
            self.transitions.push(PhaseChange {
                actor: self.role,
                from,
                to,
                reason,
            });
        }
    }

    fn advance_phase(&mut self) {
        let next = self.phase.next();
        debug!(context = %self.id, from = %self.phase, to = %next, "phase advance");
        self.set_phase(next, None);
    }

    fn step_new_line(&mut self, line: &LineDescriptor, env: &mut TickEnv<'_>) -> bool {
        self.progress = Progress::default();
        self.timers = Timers::armed();

        if line.flags.reset_look_at {
            self.look_at = LookAtTarget::None;
        } else if let Some(target) = line.look_at {
            self.look_at = if line.flags.look_at_sticky {
                LookAtTarget::Sticky(target)
            } else {
                LookAtTarget::Once(target)
            };
        }

        if self.config.allows_look_at() {
            self.do_sticky_look_at(env.roster);
        }
        true
    }

    fn step_look_at(&mut self, dt: Seconds, line: &LineDescriptor, env: &mut TickEnv<'_>) -> bool {
        if !self.config.allows_look_at() {
            return true;
        }
        // exact positioning turns the actor itself
        if line.flags.exact_positioning {
            return true;
        }
        self.track_look_at(dt, env.roster)
    }

    fn step_anim(&mut self, dt: Seconds, line: &LineDescriptor, env: &mut TickEnv<'_>) -> bool {
        let mut advance = true;
        if self.config.allows_look_at() {
            advance = self.track_look_at(dt, env.roster);
        }

        if self.config.allows_anim() && line.has_animation() {
            advance = false;
            if !self.progress.anim_scheduled {
                self.progress.anim_started = false;
                self.progress.anim_scheduled = true;
                self.start_animation(line, env.roster);
            } else {
                self.timers.anim -= dt;
                advance = self.timers.anim <= 0.0 || self.progress.anim_started;
                if advance {
                    debug!(
                        context = %self.id,
                        started = self.progress.anim_started,
                        "animation phase done"
                    );
                }
            }
        }
        advance
    }

    fn step_schedule_sound(
        &mut self,
        dt: Seconds,
        line: &LineDescriptor,
        env: &mut TickEnv<'_>,
    ) -> bool {
        let Some(cue) = line.audio else {
            return true;
        };

        if !self.progress.sound_scheduled {
            let token = self.id;
            let entity = self.entity;
            let audio = &self.backends.audio;
            let aux = self
                .speech
                .get_or_insert_with(|| SpeechEmitter::create(audio, entity, token))
                .id();
            self.update_voice_position();

            self.progress.sound_scheduled = true;
            self.progress.has_scheduled_next_line = true;
            if self.backends.audio.execute_trigger(entity, cue, aux, token) {
                debug!(context = %self.id, ?cue, "voice started");
                self.progress.sound_started = true;
                true
            } else {
                warn!(context = %self.id, ?cue, "voice trigger failed");
                self.progress.sound_started = false;
                env.schedule.schedule(env.now, SOUND_RETRY_DELAY);
                false
            }
        } else {
            self.timers.sound -= dt;
            let timed_out = self.timers.sound <= 0.0;
            if timed_out || self.progress.sound_started {
                if timed_out {
                    debug!(context = %self.id, "voice timed out");
                    self.stop_trigger();
                    self.progress.sound_started = false;
                }
                true
            } else {
                false
            }
        }
    }

    fn step_sound_facial(&mut self, line: &LineDescriptor) -> bool {
        if line.has_facial() && self.backends.world.exists(self.entity) {
            let (name, weight, fade_time) = line
                .facial
                .as_ref()
                .map_or(("", 1.0, 0.0), |facial| {
                    (facial.name.as_str(), facial.weight, facial.fade_time)
                });
            self.do_facial_expression(name, weight, fade_time);
        }
        true
    }

    fn step_end_line(&mut self, line: &LineDescriptor, env: &mut TickEnv<'_>) -> bool {
        if !self.progress.has_scheduled_next_line {
            self.progress.has_scheduled_next_line = true;
            env.schedule.schedule(env.now, line.post_line_delay);
        }
        true
    }

    /// Drive a one-line look-at; returns `true` once it is done
    fn track_look_at(&mut self, dt: Seconds, roster: &Roster) -> bool {
        let LookAtTarget::Once(target) = self.look_at else {
            return true;
        };
        self.timers.look_at -= dt;
        let reached = self.do_look_at(target, roster);
        if reached || self.timers.look_at <= 0.0 {
            debug!(context = %self.id, reached, "look-at done");
            self.look_at = LookAtTarget::None;
            true
        } else {
            false
        }
    }

    fn do_sticky_look_at(&mut self, roster: &Roster) {
        if let LookAtTarget::Sticky(target) = self.look_at {
            self.do_look_at(target, roster);
        }
    }

    /// Point the actor at `target`; returns `true` once the AI reports it reached
    fn do_look_at(&mut self, target: ActorRole, roster: &Roster) -> bool {
        let ai = &self.backends.ai;
        if ai.kind(self.entity) != AiKind::Actor {
            return false;
        }

        let target_position = roster
            .entity(target)
            .filter(|entity| self.backends.world.exists(*entity))
            .and_then(|entity| {
                ai.position(entity)
                    .or_else(|| self.backends.world.position(entity))
            });

        match target_position {
            Some(position) => {
                self.look_at_needs_reset = true;
                ai.set_look_at(self.entity, position).unwrap_or(false)
            }
            None => {
                ai.reset_look_at(self.entity);
                self.look_at_needs_reset = false;
                true
            }
        }
    }

    fn start_animation(&mut self, line: &LineDescriptor, roster: &Roster) {
        self.anim_use_signal = line.flags.anim_signal;
        self.anim_use_exact_positioning = line.flags.exact_positioning;
        if self.anim_use_exact_positioning {
            self.start_positioned_animation(line, roster);
        } else {
            self.start_graph_animation(line);
        }
    }

    fn start_graph_animation(&mut self, line: &LineDescriptor) {
        let animation = &self.backends.animation;
        let Some(listener) = AnimListener::register(animation, self.entity, self.id) else {
            warn!(context = %self.id, entity = %self.entity, "actor has no animation graph");
            return;
        };
        self.anim_listener = Some(listener);

        let input = if self.anim_use_signal {
            AnimInput::Signal
        } else {
            AnimInput::Action
        };
        self.anim_query = animation.set_input(self.entity, input, &line.animation);
        debug!(
            context = %self.id,
            input = input.name(),
            animation = %line.animation,
            query = ?self.anim_query,
            "animation requested"
        );
    }

    fn start_positioned_animation(&mut self, line: &LineDescriptor, roster: &Roster) {
        let ai = &self.backends.ai;
        if ai.kind(self.entity) != AiKind::Actor {
            return;
        }
        let Some(position) = self.backends.world.position(self.entity) else {
            return;
        };

        let towards_target = line
            .look_at
            .and_then(|target| roster.entity(target))
            .and_then(|entity| self.backends.world.position(entity))
            .and_then(|target| flat_direction(target - position));
        let direction = towards_target.unwrap_or_else(|| ai.move_dir(self.entity));
        ai.set_ref_point(self.entity, position, direction);

        let data = SignalData {
            object_name: Some(line.animation.clone()),
            int_value: i32::from(self.anim_use_signal),
            float_value: EXACT_DIRECTION_TOLERANCE,
            point: Vec3::splat(EXACT_START_RADIUS),
            point2: Vec3::new(EXACT_TARGET_RADIUS, 0.0, 0.0),
            ..SignalData::new()
        };
        self.positioning_pipe = None;
        self.positioning_pipe =
            self.issue_goal_pipe(SIGNAL_ANIMEX, data, PipeRelease::CancelAndRemove);
        debug!(context = %self.id, animation = %line.animation, "exact positioning requested");
    }

    /// Send `signal` with a fresh goal pipe the context listens on
    ///
    /// Only AI actors get pipes; the player and entities without AI get `None`.
    fn issue_goal_pipe(
        &self,
        signal: &str,
        mut data: SignalData,
        release: PipeRelease,
    ) -> Option<GoalPipe> {
        let ai = &self.backends.ai;
        if ai.kind(self.entity) != AiKind::Actor {
            return None;
        }
        let id = ai.allocate_goal_pipe_id();
        let mut pipe = GoalPipe::new(ai, id, self.entity, self.id, release);
        pipe.listen();
        data.goal_pipe = Some(id);
        ai.send_signal(self.entity, AI_SIGNAL_PRIORITY, signal, data);
        Some(pipe)
    }

    fn send_dialog_over(&self) {
        let ai = &self.backends.ai;
        if ai.kind(self.entity) != AiKind::Actor {
            return;
        }
        let data = SignalData {
            goal_pipe: Some(ai.allocate_goal_pipe_id()),
            ..SignalData::new()
        };
        ai.send_signal(self.entity, AI_SIGNAL_PRIORITY, SIGNAL_DIALOG_OVER, data);
    }

    fn do_facial_expression(&mut self, name: &str, weight: f32, fade_time: Seconds) -> bool {
        let facial = &self.backends.facial;
        let effector = if name.is_empty() {
            None
        } else {
            match facial.find_effector(self.entity, name) {
                Some(effector) => Some(effector),
                None => {
                    warn!(context = %self.id, expression = name, "unknown facial expression");
                    return false;
                }
            }
        };

        if let Some(channel) = self.facial_channel.take() {
            channel.stop(fade_time);
        }
        if let Some(effector) = effector {
            self.facial_channel = facial
                .start_effector_channel(self.entity, effector, weight, fade_time)
                .map(|channel| FacialChannel::new(facial, channel, self.entity));
        }
        true
    }

    fn stop_sound(&mut self) {
        if !self.is_still_playing() {
            return;
        }
        self.stop_trigger();
        self.progress.sound_started = false;
    }

    /// Stop the line's trigger on the emitter, whether or not it was seen to start
    fn stop_trigger(&self) {
        let (Some(line), Some(speech)) = (&self.line, &self.speech) else {
            return;
        };
        if let Some(cue) = line.audio {
            if self.backends.world.exists(self.entity) {
                self.backends.audio.stop_trigger(self.entity, cue, speech.id());
            }
        }
    }

    fn update_voice_position(&self) {
        let Some(speech) = &self.speech else {
            return;
        };
        let world = &self.backends.world;
        if !world.exists(self.entity) {
            return;
        }
        let offset = world.voice_offset(self.entity).unwrap_or(HEAD_HEIGHT);
        self.backends
            .audio
            .set_aux_object_offset(self.entity, speech.id(), offset);
    }

    fn reset_anim_graph(&self) {
        let animation = &self.backends.animation;
        if self.anim_use_signal {
            if !self.progress.anim_started {
                animation.set_input(self.entity, AnimInput::Signal, "none");
            }
        } else {
            animation.set_input(self.entity, AnimInput::Action, "idle");
        }
    }

    /// The cancel routine; returns `false` when no cancel was owed
    fn run_cancel(&mut self, reset_states: bool) -> bool {
        match self.cancel {
            CancelState::Owed => {}
            CancelState::InProgress => {
                warn!(context = %self.id, "re-entrant cancel ignored");
                return false;
            }
            CancelState::Clear => return false,
        }
        self.cancel = CancelState::InProgress;
        debug!(context = %self.id, reset_states, "cancelling");

        let alive = self.backends.world.exists(self.entity);

        if let Some(listener) = self.anim_listener.take() {
            drop(listener);
            if reset_states && alive {
                self.reset_anim_graph();
            }
        }
        self.anim_query = None;
        self.progress.anim_started = false;

        if alive && self.look_at_needs_reset {
            self.backends.ai.reset_look_at(self.entity);
        }
        self.look_at_needs_reset = false;

        if let Some(pipe) = self.primary_pipe.take() {
            if alive && self.config.ai_behaviour == AiBehaviourMode::InterruptMedium {
                self.send_dialog_over();
            }
            drop(pipe);
        }
        self.positioning_pipe = None;

        if alive {
            self.do_facial_expression("", 1.0, 0.0);
        } else {
            self.facial_channel = None;
        }

        let forced_stop = self.is_aborted()
            && self
                .abort_reason
                .is_some_and(|reason| reason.always_stops_sound());
        if !self.flags.no_abort_sound || forced_stop {
            self.stop_sound();
        }

        self.entity_listener = None;
        self.phase = Phase::Idle;
        self.cancel = CancelState::Clear;
        true
    }

    fn on_query_complete(&mut self, query: QueryId, succeeded: bool) {
        if self.anim_query != Some(query) {
            return;
        }
        if !succeeded && !(self.progress.anim_started && !self.anim_use_signal) {
            return;
        }

        let animation = &self.backends.animation;
        if !self.progress.anim_started {
            debug!(context = %self.id, ?query, "animation started");
            self.progress.anim_started = true;
            self.anim_query = if self.anim_use_signal {
                animation.query_leave_state(self.entity)
            } else {
                animation.query_change_input(self.entity, AnimInput::Action)
            };
        } else {
            debug!(context = %self.id, ?query, "animation finished");
            self.anim_listener = None;
            self.anim_query = None;
            self.progress.anim_started = false;
        }
    }

    fn on_goal_pipe_event(&mut self, pipe: GoalPipeId, event: GoalPipeEvent) {
        let is_primary = self.primary_pipe.as_ref().is_some_and(|p| p.id() == pipe);
        let is_positioning = self
            .positioning_pipe
            .as_ref()
            .is_some_and(|p| p.id() == pipe);
        if !is_primary && !is_positioning {
            return;
        }

        match event {
            GoalPipeEvent::Deselected | GoalPipeEvent::Removed if is_primary => {
                if self.flags.no_ai_abort {
                    debug!(context = %self.id, ?event, "primary pipe lost, abort suppressed");
                } else {
                    debug!(context = %self.id, ?event, "primary pipe lost");
                    self.abort_from_ai = true;
                }
            }
            GoalPipeEvent::AnimStarted => {
                debug!(context = %self.id, ?pipe, "positioned animation started");
                self.progress.anim_started = true;
            }
            _ => {}
        }
    }

    fn on_trigger_finished(&mut self) -> Option<Seconds> {
        self.progress.sound_started = false;
        if self.is_aborted() {
            return None;
        }
        let line = self.line.as_ref()?;
        let delay = AUDIO_FINISHED_GAP + line.post_line_delay.max(0.0);
        debug!(context = %self.id, delay, "voice finished");
        Some(delay)
    }

    fn check_awareness(&mut self, dt: Seconds, roster: &Roster) -> bool {
        let grace_time = self.config.awareness.grace_time;
        let config = &self.config;
        let backends = &self.backends;
        let (role, entity) = (self.role, self.entity);
        self.awareness.update(dt, grace_time, || {
            sample_awareness(config, backends, role, entity, roster)
        })
    }
}

impl Drop for ActorPlaybackContext {
    fn drop(&mut self) {
        self.stop_sound();
        self.cancel_current(true);
    }
}

/// One awareness sample of the local player against the other actors
fn sample_awareness(
    config: &SessionConfig,
    backends: &Backends,
    role: ActorRole,
    entity: EntityId,
    roster: &Roster,
) -> Option<Verdict> {
    let awareness = &config.awareness;
    if !awareness.distance_gate_enabled() && !awareness.angle_gate_enabled() {
        return None;
    }

    let world = &backends.world;
    let position = world.position(entity)?;
    let (eye_position, eye_direction) = world.eye(entity)?;
    let observer = Observer {
        position,
        eye_position,
        eye_direction,
    };

    let others: Vec<Watched> = roster
        .iter()
        .filter(|(other, _)| *other != role)
        .filter_map(|(_, other)| {
            let position = world.position(other)?;
            let bounds = world
                .bounds(other)
                .unwrap_or_else(|| Aabb::around(position, 0.0));
            Some(Watched { position, bounds })
        })
        .collect();

    Some(awareness::evaluate(awareness, &observer, &others, |bounds| {
        world.is_visible(bounds)
    }))
}
