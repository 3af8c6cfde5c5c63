//! Dialogue sessions
//!
//! A [`DialogSession`] binds actor roles to world entities, owns one
//! [`ActorPlaybackContext`] per actor and ticks them all with one session
//! clock. Collaborator callbacks are posted through an [`EventSender`] from
//! any thread and applied at the start of the next tick.

use crate::backend::{Backends, Envelope, EventInbox, EventSender};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::journal::{Journal, JournalEntry};
use crate::line::LineDescriptor;
use crate::phase::AbortReason;
use crate::playback::{ActorPlaybackContext, TickEnv};
use crate::time::{NextLine, NextLineSchedule, Seconds, SessionClock};
use crate::{ActorRole, ContextId, EntityId, SessionId};
use indexmap::IndexMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Actor roles of a session and the entities playing them
#[derive(Debug, Clone, Default)]
pub struct Roster {
    actors: IndexMap<ActorRole, EntityId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `role` to `entity`; returns `false` if the role is taken
    pub fn insert(&mut self, role: ActorRole, entity: EntityId) -> bool {
        if self.actors.contains_key(&role) {
            return false;
        }
        self.actors.insert(role, entity);
        true
    }

    pub fn remove(&mut self, role: ActorRole) -> Option<EntityId> {
        self.actors.shift_remove(&role)
    }

    pub fn entity(&self, role: ActorRole) -> Option<EntityId> {
        self.actors.get(&role).copied()
    }

    pub fn contains(&self, role: ActorRole) -> bool {
        self.actors.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Roles and entities in binding order
    pub fn iter(&self) -> impl Iterator<Item = (ActorRole, EntityId)> + '_ {
        self.actors.iter().map(|(role, entity)| (*role, *entity))
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Created,
    Running,
    Ended,
}

/// One running dialogue
pub struct DialogSession {
    id: SessionId,
    name: String,
    state: SessionState,
    config: Rc<SessionConfig>,
    backends: Backends,
    clock: SessionClock,
    roster: Roster,
    contexts: IndexMap<ActorRole, ActorPlaybackContext>,
    schedule: NextLineSchedule,
    journal: Journal,
    inbox: EventInbox,
}

impl DialogSession {
    /// Create a session with no actors
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        config: SessionConfig,
        backends: Backends,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            state: SessionState::Created,
            config: Rc::new(config),
            backends,
            clock: SessionClock::new(),
            roster: Roster::new(),
            contexts: IndexMap::new(),
            schedule: NextLineSchedule::new(),
            journal: Journal::new(),
            inbox: EventInbox::new(),
        }
    }

    /// Bind `role` to `entity` and create its playback context
    ///
    /// Actors added to a running session begin immediately.
    pub fn add_actor(&mut self, role: ActorRole, entity: EntityId) -> Result<ContextId> {
        if !self.roster.insert(role, entity) {
            return Err(Error::DuplicateActor(role));
        }
        let mut context = ActorPlaybackContext::new(
            role,
            entity,
            Rc::clone(&self.config),
            self.backends.clone(),
        );
        if self.state == SessionState::Running {
            context.begin_session();
        }
        let id = context.id();
        self.contexts.insert(role, context);
        debug!(session = %self.id, actor = %role, entity = %entity, "actor added");
        Ok(id)
    }

    /// Remove an actor; its context is cancelled and released
    pub fn remove_actor(&mut self, role: ActorRole) -> Result<()> {
        let context = self
            .contexts
            .shift_remove(&role)
            .ok_or(Error::UnknownActor(role))?;
        self.roster.remove(role);
        drop(context);
        debug!(session = %self.id, actor = %role, "actor removed");
        Ok(())
    }

    /// Start the session
    pub fn begin(&mut self) {
        info!(session = %self.id, name = %self.name, actors = self.roster.len(), "session begin");
        self.state = SessionState::Running;
        self.schedule.clear();
        for context in self.contexts.values_mut() {
            context.begin_session();
        }
        self.journal.record(JournalEntry::SessionBegan {
            time: self.clock.now(),
        });
    }

    /// End the session, releasing everything the actors hold
    pub fn end(&mut self) {
        for context in self.contexts.values_mut() {
            context.end_session();
        }
        self.drain_transitions();
        self.state = SessionState::Ended;
        self.schedule.clear();
        self.journal.record(JournalEntry::SessionEnded {
            time: self.clock.now(),
        });
        info!(session = %self.id, name = %self.name, "session end");
    }

    /// Advance the session by `dt` seconds
    ///
    /// Pending callbacks are applied first, then every context is ticked in
    /// the order its actor was added. Returns `false` once any actor is
    /// aborted.
    pub fn update(&mut self, dt: Seconds) -> bool {
        if self.state != SessionState::Running {
            return !self.is_aborted();
        }

        // a negative step would rewind every context timer
        let dt = dt.max(0.0);
        self.clock.advance(dt);
        let now = self.clock.now();

        let pending: Vec<Envelope> = self.inbox.drain().collect();
        for envelope in pending {
            self.dispatch(envelope);
        }

        for context in self.contexts.values_mut() {
            let mut env = TickEnv {
                now,
                roster: &self.roster,
                schedule: &mut self.schedule,
            };
            context.update(dt, &mut env);
        }
        self.drain_transitions();

        !self.is_aborted()
    }

    /// Start playing `line` on its actor
    ///
    /// Returns `Ok(false)` if the actor is aborted.
    pub fn play_line(&mut self, line: impl Into<Arc<LineDescriptor>>) -> Result<bool> {
        let line = line.into();
        let context = self
            .contexts
            .get_mut(&line.actor)
            .ok_or(Error::UnknownActor(line.actor))?;
        let actor = line.actor;
        let started = context.play_line(line);
        if started {
            self.journal.record(JournalEntry::LinePlayed {
                time: self.clock.now(),
                actor,
            });
        }
        self.drain_transitions();
        Ok(started)
    }

    /// Request the next line `delay` seconds from now
    pub fn schedule_next_line(&mut self, delay: Seconds) {
        self.schedule.schedule(self.clock.now(), delay);
        self.drain_transitions();
    }

    /// The pending next-line request
    pub fn pending_next_line(&self) -> Option<NextLine> {
        self.schedule.pending()
    }

    /// Take the next-line request if its delay has elapsed
    pub fn take_due_next_line(&mut self) -> Option<NextLine> {
        self.schedule.take_due(self.clock.now())
    }

    /// Handle for posting collaborator callbacks to this session
    pub fn event_sender(&self) -> EventSender {
        self.inbox.sender()
    }

    /// Apply one callback immediately
    pub fn dispatch(&mut self, envelope: Envelope) {
        let Some(context) = self
            .contexts
            .values_mut()
            .find(|context| context.id() == envelope.context)
        else {
            warn!(session = %self.id, context = %envelope.context, "event for unknown context");
            return;
        };
        if let Some(delay) = context.handle_event(envelope.event) {
            self.schedule.schedule(self.clock.now(), delay);
        }
    }

    /// Cancel every actor's current line
    pub fn cancel_all(&mut self, reset_states: bool) {
        for context in self.contexts.values_mut() {
            context.cancel_current(reset_states);
        }
        self.drain_transitions();
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session time in seconds
    pub fn now(&self) -> Seconds {
        self.clock.now()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn context(&self, role: ActorRole) -> Option<&ActorPlaybackContext> {
        self.contexts.get(&role)
    }

    pub fn context_mut(&mut self, role: ActorRole) -> Option<&mut ActorPlaybackContext> {
        self.contexts.get_mut(&role)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ActorPlaybackContext> {
        self.contexts.values()
    }

    /// Check if any actor is aborted
    pub fn is_aborted(&self) -> bool {
        self.contexts.values().any(|context| context.is_aborted())
    }

    /// Reason of the first aborted actor
    pub fn abort_reason(&self) -> Option<(ActorRole, AbortReason)> {
        self.contexts
            .values()
            .find_map(|context| context.abort_reason().map(|reason| (context.role(), reason)))
    }

    /// Check if any actor's voice is still playing
    pub fn is_still_playing(&self) -> bool {
        self.contexts.values().any(|context| context.is_still_playing())
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    fn drain_transitions(&mut self) {
        let time = self.clock.now();
        for context in self.contexts.values_mut() {
            for change in context.take_transitions() {
                self.journal.record(JournalEntry::Transition { time, change });
            }
        }
        for next in self.schedule.drain_issued() {
            self.journal.record(JournalEntry::NextLineScheduled {
                time: next.requested_at,
                delay: next.delay,
            });
        }
    }
}

impl std::fmt::Debug for DialogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("actors", &self.roster.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextEvent, GoalPipeEvent};
    use crate::line::AudioCueId;
    use crate::phase::Phase;
    use crate::playback::AUDIO_FINISHED_GAP;
    use crate::testing::MockBackends;
    use glam::Vec3;

    const SPEAKER: ActorRole = ActorRole(1);
    const LISTENER: ActorRole = ActorRole(2);

    fn session() -> (MockBackends, DialogSession) {
        let mock = MockBackends::new();
        mock.spawn(EntityId(10), Vec3::ZERO);
        mock.spawn(EntityId(20), Vec3::new(2.0, 0.0, 0.0));
        let mut session = DialogSession::new(
            SessionId(1),
            "gate_guard",
            SessionConfig::default(),
            mock.backends(),
        );
        session.journal_mut().start_recording();
        session.add_actor(SPEAKER, EntityId(10)).unwrap();
        session.add_actor(LISTENER, EntityId(20)).unwrap();
        (mock, session)
    }

    #[test]
    fn test_roster_rejects_duplicates() {
        let mut roster = Roster::new();
        assert!(roster.insert(SPEAKER, EntityId(1)));
        assert!(!roster.insert(SPEAKER, EntityId(2)));
        assert_eq!(roster.entity(SPEAKER), Some(EntityId(1)));
        assert_eq!(roster.remove(SPEAKER), Some(EntityId(1)));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_duplicate_and_unknown_actors() {
        let (_mock, mut session) = session();
        assert!(matches!(
            session.add_actor(SPEAKER, EntityId(30)),
            Err(Error::DuplicateActor(role)) if role == SPEAKER
        ));
        assert!(matches!(
            session.remove_actor(ActorRole(9)),
            Err(Error::UnknownActor(_))
        ));
        assert!(matches!(
            session.play_line(LineDescriptor::new(ActorRole(9))),
            Err(Error::UnknownActor(_))
        ));
        assert_eq!(session.roster().entity(SPEAKER), Some(EntityId(10)));
    }

    #[test]
    fn test_plain_line_schedules_next_line() {
        let (_mock, mut session) = session();
        session.begin();
        assert_eq!(session.state(), SessionState::Running);
        assert!(session
            .play_line(LineDescriptor::new(SPEAKER).with_delay(0.5))
            .unwrap());

        assert!(session.update(0.25));
        assert!(session.take_due_next_line().is_none());
        assert!(session.update(0.25));
        assert!(session.update(0.25));
        let next = session.take_due_next_line().unwrap();
        assert_eq!(next.requested_at, 0.25);
        assert_eq!(next.delay, 0.5);
        assert!(session.pending_next_line().is_none());

        assert_eq!(
            session.journal().transitions_for(SPEAKER).last(),
            Some(&(Phase::EndLine, Phase::Idle))
        );
        assert_eq!(session.journal().scheduled_delays(), vec![0.5]);
        assert_eq!(session.journal().lines_played(), vec![SPEAKER]);
    }

    #[test]
    fn test_trigger_finished_from_another_thread() {
        let (_mock, mut session) = session();
        session.begin();
        session
            .play_line(
                LineDescriptor::new(SPEAKER)
                    .with_audio(AudioCueId(4))
                    .with_delay(0.25),
            )
            .unwrap();
        session.update(0.125);
        assert!(session.is_still_playing());
        assert!(session.pending_next_line().is_none());

        let context = session.context(SPEAKER).unwrap().id();
        let sender = session.event_sender();
        std::thread::spawn(move || {
            sender.send(context, ContextEvent::AudioTriggerFinished);
        })
        .join()
        .unwrap();

        session.update(0.125);
        assert!(!session.is_still_playing());
        let next = session.pending_next_line().unwrap();
        assert_eq!(next.delay, AUDIO_FINISHED_GAP + 0.25);
        assert_eq!(next.requested_at, 0.25);
    }

    #[test]
    fn test_event_for_unknown_context_is_dropped() {
        let (_mock, mut session) = session();
        session.begin();
        session.dispatch(Envelope {
            context: ContextId(u64::MAX),
            event: ContextEvent::AudioTriggerFinished,
        });
        assert!(session.pending_next_line().is_none());
        assert!(session.update(0.125));
    }

    #[test]
    fn test_abort_surfaces_on_session() {
        let (mock, mut session) = session();
        session.begin();
        session.play_line(LineDescriptor::new(LISTENER)).unwrap();
        mock.despawn(EntityId(20));

        assert!(!session.update(0.125));
        assert!(session.is_aborted());
        assert_eq!(
            session.abort_reason(),
            Some((LISTENER, AbortReason::EntityDestroyed))
        );
        assert_eq!(
            session.journal().aborts(),
            vec![(LISTENER, AbortReason::EntityDestroyed)]
        );
    }

    #[test]
    fn test_goal_pipe_removal_aborts_next_tick() {
        let (mock, mut session) = session();
        session.begin();
        let pipe = mock
            .calls()
            .into_iter()
            .find_map(|call| match call {
                crate::testing::Call::SendSignal(EntityId(10), name, data) if name == "ACT_DIALOG" => {
                    data.goal_pipe
                }
                _ => None,
            })
            .unwrap();

        let context = session.context(SPEAKER).unwrap().id();
        session.event_sender().send(
            context,
            ContextEvent::GoalPipe {
                pipe,
                event: GoalPipeEvent::Deselected,
            },
        );
        assert!(!session.update(0.125));
        assert_eq!(session.abort_reason(), Some((SPEAKER, AbortReason::AIAborted)));
    }

    #[test]
    fn test_actor_added_to_running_session_begins() {
        let (mock, mut session) = session();
        mock.spawn(EntityId(30), Vec3::ZERO);
        session.begin();
        session.add_actor(ActorRole(3), EntityId(30)).unwrap();
        assert_eq!(
            session.context(ActorRole(3)).unwrap().cancel_state(),
            crate::CancelState::Owed
        );
    }

    #[test]
    fn test_end_releases_actors() {
        let (mock, mut session) = session();
        session.begin();
        session.end();
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(
            mock.count(|call| matches!(call, crate::testing::Call::RemoveEntityListener(_))),
            2
        );
        assert!(matches!(
            session.journal().entries().last(),
            Some(JournalEntry::SessionEnded { .. })
        ));

        // ended sessions no longer tick
        assert!(session.update(1.0));
        assert_eq!(session.now(), 0.0);
    }

    #[test]
    fn test_remove_actor_cancels_context() {
        let (mock, mut session) = session();
        session.begin();
        mock.clear_calls();
        session.remove_actor(LISTENER).unwrap();
        assert!(session.context(LISTENER).is_none());
        assert!(!session.roster().contains(LISTENER));
        assert!(mock
            .calls()
            .contains(&crate::testing::Call::RemoveEntityListener(EntityId(20))));
    }

    #[test]
    fn test_negative_step_does_not_extend_timers() {
        let (_mock, mut session) = session();
        session.begin();
        session
            .play_line(LineDescriptor::new(SPEAKER).with_animation("wave"))
            .unwrap();
        session.update(0.25);
        assert_eq!(session.context(SPEAKER).unwrap().phase(), Phase::Anim);

        session.update(-5.0);
        assert_eq!(session.now(), 0.25);
        session.update(0.5);
        assert_eq!(session.context(SPEAKER).unwrap().phase(), Phase::Anim);
        session.update(0.5);
        assert_eq!(session.context(SPEAKER).unwrap().phase(), Phase::Idle);
    }
}
