//! Hub - Owns dialogue sessions and their channel slots
//!
//! Every session the hub creates requests a slot on a channel. A session
//! begins once its request is current, is ticked while it runs, and gives
//! its slot to the next waiting session when it finishes or aborts.
//!
//! Which line to play next is decided by the caller: the hub only reports
//! [`HubEvent::NextLineDue`] when a session's next-line delay has elapsed.

use crate::arbiter::BufferedChannelArbiter;
use crate::config::ArbiterConfig;
use crate::error::{Error, Result};
use crate::request::{ChannelId, RequestId};
use colloquy_core::{
    AbortReason, ActorRole, Backends, DialogSession, NextLine, Seconds, SessionConfig, SessionId,
};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

/// Something the caller has to react to after [`Hub::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HubEvent {
    /// The session got its channel slot and began
    Started(SessionId),
    /// The session is ready for its next line
    NextLineDue { session: SessionId, line: NextLine },
    /// An actor aborted; the session was finished
    Aborted {
        session: SessionId,
        actor: ActorRole,
        reason: AbortReason,
    },
}

struct Slot {
    session: DialogSession,
    channel: ChannelId,
    request: RequestId,
    started: bool,
}

/// Owner of all running dialogue sessions
///
/// ```
/// use colloquy_hub::{ArbiterConfig, Hub};
/// use colloquy_core::testing::MockBackends;
///
/// let mock = MockBackends::new();
/// let mut hub = Hub::new(&ArbiterConfig::with_channels(["tavern"]), mock.backends()).unwrap();
/// let session = hub.create_session("greeting", Default::default(), Some("tavern")).unwrap();
/// assert!(!hub.is_waiting(session).unwrap());
/// ```
pub struct Hub {
    arbiter: BufferedChannelArbiter,
    backends: Backends,
    slots: IndexMap<SessionId, Slot>,
    next_session: u64,
}

impl Hub {
    /// Create a hub with the configured channels
    pub fn new(config: &ArbiterConfig, backends: Backends) -> Result<Self> {
        Ok(Self {
            arbiter: BufferedChannelArbiter::from_config(config)?,
            backends,
            slots: IndexMap::new(),
            next_session: 1,
        })
    }

    /// Create a session and request a slot on `channel`
    ///
    /// `None` plays without a channel. The session begins on the first
    /// [`update`](Self::update) after its request is current, so actors can
    /// be added through [`session_mut`](Self::session_mut) first.
    pub fn create_session(
        &mut self,
        name: &str,
        config: SessionConfig,
        channel: Option<&str>,
    ) -> Result<SessionId> {
        let channel = match channel {
            Some(channel_name) => self
                .arbiter
                .channel_by_name(channel_name)
                .ok_or_else(|| Error::UnknownChannel(channel_name.to_string()))?,
            None => ChannelId::NONE,
        };
        config.validate()?;

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let request = self.arbiter.play(channel, name)?;
        let session = DialogSession::new(id, name, config, self.backends.clone());
        self.slots.insert(
            id,
            Slot {
                session,
                channel,
                request,
                started: false,
            },
        );
        info!(session = %id, %channel, %request, dialog = name, "session created");
        Ok(id)
    }

    /// Check if the session still waits for its channel
    pub fn is_waiting(&self, id: SessionId) -> Result<bool> {
        let slot = self.slots.get(&id).ok_or(Error::UnknownSession(id))?;
        Ok(self.arbiter.is_dialog_waiting(slot.channel, slot.request))
    }

    /// Get a session
    pub fn session(&self, id: SessionId) -> Result<&DialogSession> {
        self.slots
            .get(&id)
            .map(|slot| &slot.session)
            .ok_or(Error::UnknownSession(id))
    }

    /// Get a session mutably, e.g. to add actors or play lines
    pub fn session_mut(&mut self, id: SessionId) -> Result<&mut DialogSession> {
        self.slots
            .get_mut(&id)
            .map(|slot| &mut slot.session)
            .ok_or(Error::UnknownSession(id))
    }

    /// Number of sessions, waiting ones included
    pub fn session_count(&self) -> usize {
        self.slots.len()
    }

    pub fn arbiter(&self) -> &BufferedChannelArbiter {
        &self.arbiter
    }

    /// Start sessions whose slot became current and tick the running ones
    pub fn update(&mut self, dt: Seconds) -> Vec<HubEvent> {
        let mut events = Vec::new();
        let mut aborted = Vec::new();

        for (id, slot) in self.slots.iter_mut() {
            if !slot.started {
                if self.arbiter.is_dialog_waiting(slot.channel, slot.request) {
                    continue;
                }
                slot.session.begin();
                slot.started = true;
                events.push(HubEvent::Started(*id));
            }

            if !slot.session.update(dt) {
                if let Some((actor, reason)) = slot.session.abort_reason() {
                    warn!(session = %id, %actor, %reason, "session aborted");
                    events.push(HubEvent::Aborted {
                        session: *id,
                        actor,
                        reason,
                    });
                }
                aborted.push(*id);
                continue;
            }

            if let Some(line) = slot.session.take_due_next_line() {
                events.push(HubEvent::NextLineDue { session: *id, line });
            }
        }

        for id in aborted {
            if let Ok(Some(promoted)) = self.finish_session(id) {
                debug!(session = %promoted, "promoted after abort");
            }
        }
        events
    }

    /// End a session and hand its channel to the next waiting one
    ///
    /// Returns the session whose request was promoted; it begins on the
    /// next [`update`](Self::update).
    pub fn finish_session(&mut self, id: SessionId) -> Result<Option<SessionId>> {
        let mut slot = self
            .slots
            .shift_remove(&id)
            .ok_or(Error::UnknownSession(id))?;
        if slot.started {
            slot.session.end();
        }
        info!(session = %id, "session finished");

        let promoted = self
            .arbiter
            .notify_dialog_done(slot.channel, slot.request)
            .and_then(|request| {
                self.slots
                    .iter()
                    .find(|(_, waiting)| waiting.request == request)
                    .map(|(waiting_id, _)| *waiting_id)
            });
        Ok(promoted)
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("arbiter", &self.arbiter)
            .field("sessions", &self.slots.len())
            .finish()
    }
}
