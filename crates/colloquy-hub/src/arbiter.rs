//! Buffered channel arbitration
//!
//! Dialogues that share a channel must not talk over each other. Each
//! channel has at most one current request; later requests wait in FIFO
//! order and are promoted when the current one is done.

use crate::config::ArbiterConfig;
use crate::error::{Error, Result};
use crate::request::{ChannelId, RequestId};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Default)]
struct Channel {
    name: String,
    current: Option<RequestId>,
    waiting: VecDeque<RequestId>,
}

/// Serializes dialogue requests per channel
#[derive(Debug, Default)]
pub struct BufferedChannelArbiter {
    channels: Vec<Channel>,
}

impl BufferedChannelArbiter {
    /// Create an arbiter with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an arbiter with the configured channels
    pub fn from_config(config: &ArbiterConfig) -> Result<Self> {
        config.validate()?;
        let mut arbiter = Self::new();
        for name in &config.channels {
            arbiter.add_channel(name)?;
        }
        Ok(arbiter)
    }

    /// Add a channel
    pub fn add_channel(&mut self, name: &str) -> Result<ChannelId> {
        if self.channel_by_name(name).is_some() {
            return Err(Error::DuplicateChannel(name.to_string()));
        }
        let id = ChannelId(self.channels.len() as u32);
        self.channels.push(Channel {
            name: name.to_string(),
            ..Channel::default()
        });
        Ok(id)
    }

    /// Look up a channel by name
    pub fn channel_by_name(&self, name: &str) -> Option<ChannelId> {
        self.channels
            .iter()
            .position(|channel| channel.name == name)
            .map(|index| ChannelId(index as u32))
    }

    /// Name of a channel
    pub fn channel_name(&self, channel: ChannelId) -> Option<&str> {
        self.channels
            .get(channel.0 as usize)
            .map(|channel| channel.name.as_str())
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Request to play a dialogue on `channel`
    ///
    /// The request is current right away if the channel is free or is
    /// [`ChannelId::NONE`]; otherwise it waits and the caller polls
    /// [`is_dialog_waiting`](Self::is_dialog_waiting).
    pub fn play(&mut self, channel: ChannelId, name: &str) -> Result<RequestId> {
        let request = RequestId::next();
        if channel.is_none() {
            debug!(%request, dialog = name, "playing without channel");
            return Ok(request);
        }

        let lane = self.lane_mut(channel)?;
        if lane.current.is_none() {
            lane.current = Some(request);
            debug!(%request, %channel, dialog = name, "channel free, playing");
        } else {
            lane.waiting.push_back(request);
            debug!(
                %request,
                %channel,
                dialog = name,
                position = lane.waiting.len(),
                "channel busy, waiting"
            );
        }
        Ok(request)
    }

    /// Check if `request` is still queued behind another dialogue
    pub fn is_dialog_waiting(&self, channel: ChannelId, request: RequestId) -> bool {
        self.channels
            .get(channel.0 as usize)
            .is_some_and(|lane| lane.waiting.contains(&request))
    }

    /// Release `request`
    ///
    /// If it was current, the head of the queue is promoted and returned.
    /// A request that was still waiting is just dropped from the queue.
    pub fn notify_dialog_done(&mut self, channel: ChannelId, request: RequestId) -> Option<RequestId> {
        if channel.is_none() {
            return None;
        }
        let lane = self.channels.get_mut(channel.0 as usize)?;
        if lane.current == Some(request) {
            lane.current = lane.waiting.pop_front();
            debug!(%request, %channel, promoted = ?lane.current, "dialog done");
            lane.current
        } else {
            if let Some(index) = lane.waiting.iter().position(|waiting| *waiting == request) {
                lane.waiting.remove(index);
                debug!(%request, %channel, "waiting dialog withdrawn");
            }
            None
        }
    }

    /// Check if nothing is playing on `channel`
    pub fn is_buffer_free(&self, channel: ChannelId) -> bool {
        if channel.is_none() {
            return true;
        }
        !self
            .channels
            .get(channel.0 as usize)
            .is_some_and(|lane| lane.current.is_some())
    }

    /// The request currently playing on `channel`
    pub fn current(&self, channel: ChannelId) -> Option<RequestId> {
        self.channels
            .get(channel.0 as usize)
            .and_then(|lane| lane.current)
    }

    /// Requests waiting on `channel`, oldest first
    pub fn waiting(&self, channel: ChannelId) -> Vec<RequestId> {
        self.channels
            .get(channel.0 as usize)
            .map(|lane| lane.waiting.iter().copied().collect())
            .unwrap_or_default()
    }

    fn lane_mut(&mut self, channel: ChannelId) -> Result<&mut Channel> {
        self.channels
            .get_mut(channel.0 as usize)
            .ok_or(Error::InvalidChannel(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arbiter() -> (BufferedChannelArbiter, ChannelId) {
        let mut arbiter = BufferedChannelArbiter::new();
        let channel = arbiter.add_channel("tavern").unwrap();
        (arbiter, channel)
    }

    #[test]
    fn test_free_channel_plays_immediately() {
        let (mut arbiter, channel) = arbiter();
        assert!(arbiter.is_buffer_free(channel));
        let first = arbiter.play(channel, "greeting").unwrap();
        assert!(!arbiter.is_dialog_waiting(channel, first));
        assert!(!arbiter.is_buffer_free(channel));
        assert_eq!(arbiter.current(channel), Some(first));
    }

    #[test]
    fn test_second_request_waits_then_promotes() {
        let (mut arbiter, channel) = arbiter();
        let first = arbiter.play(channel, "greeting").unwrap();
        let second = arbiter.play(channel, "gossip").unwrap();
        assert!(arbiter.is_dialog_waiting(channel, second));

        assert_eq!(arbiter.notify_dialog_done(channel, first), Some(second));
        assert!(!arbiter.is_dialog_waiting(channel, second));
        assert_eq!(arbiter.current(channel), Some(second));

        assert_eq!(arbiter.notify_dialog_done(channel, second), None);
        assert!(arbiter.is_buffer_free(channel));
    }

    #[test]
    fn test_waiting_request_withdrawn() {
        let (mut arbiter, channel) = arbiter();
        let first = arbiter.play(channel, "a").unwrap();
        let second = arbiter.play(channel, "b").unwrap();
        let third = arbiter.play(channel, "c").unwrap();

        assert_eq!(arbiter.notify_dialog_done(channel, second), None);
        assert_eq!(arbiter.current(channel), Some(first));
        assert_eq!(arbiter.waiting(channel), vec![third]);
    }

    #[test]
    fn test_no_channel_never_queues() {
        let (mut arbiter, _) = arbiter();
        let a = arbiter.play(ChannelId::NONE, "a").unwrap();
        let b = arbiter.play(ChannelId::NONE, "b").unwrap();
        assert!(!arbiter.is_dialog_waiting(ChannelId::NONE, a));
        assert!(!arbiter.is_dialog_waiting(ChannelId::NONE, b));
        assert!(arbiter.is_buffer_free(ChannelId::NONE));
        assert_eq!(arbiter.notify_dialog_done(ChannelId::NONE, a), None);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut arbiter =
            BufferedChannelArbiter::from_config(&ArbiterConfig::with_channels(["a", "b"])).unwrap();
        let a = arbiter.channel_by_name("a").unwrap();
        let b = arbiter.channel_by_name("b").unwrap();
        arbiter.play(a, "one").unwrap();
        let other = arbiter.play(b, "two").unwrap();
        assert!(!arbiter.is_dialog_waiting(b, other));
        assert_eq!(arbiter.channel_name(b), Some("b"));
    }

    #[test]
    fn test_unknown_channel() {
        let (mut arbiter, _) = arbiter();
        assert!(matches!(
            arbiter.play(ChannelId(7), "x"),
            Err(Error::InvalidChannel(ChannelId(7)))
        ));
        assert!(matches!(
            arbiter.add_channel("tavern"),
            Err(Error::DuplicateChannel(_))
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Play,
        Done(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Play), (0usize..16).prop_map(Op::Done)]
    }

    proptest! {
        #[test]
        fn prop_matches_fifo_model(ops in prop::collection::vec(op(), 1..64)) {
            let (mut arbiter, channel) = arbiter();
            let mut issued: Vec<RequestId> = Vec::new();
            let mut model: VecDeque<RequestId> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Play => {
                        let request = arbiter.play(channel, "dialog").unwrap();
                        if let Some(last) = issued.last() {
                            prop_assert!(request > *last);
                        }
                        issued.push(request);
                        model.push_back(request);
                    }
                    Op::Done(index) => {
                        let Some(request) = issued.get(index).copied() else {
                            continue;
                        };
                        let was_current = model.front() == Some(&request);
                        model.retain(|queued| *queued != request);
                        let promoted = arbiter.notify_dialog_done(channel, request);
                        if was_current {
                            prop_assert_eq!(promoted, model.front().copied());
                        } else {
                            prop_assert_eq!(promoted, None);
                        }
                    }
                }

                prop_assert_eq!(arbiter.current(channel), model.front().copied());
                let waiting: Vec<RequestId> = model.iter().skip(1).copied().collect();
                prop_assert_eq!(arbiter.waiting(channel), waiting);
                for request in &issued {
                    let queued = model.iter().skip(1).any(|waiting| waiting == request);
                    prop_assert_eq!(arbiter.is_dialog_waiting(channel, *request), queued);
                }
            }
        }
    }
}
