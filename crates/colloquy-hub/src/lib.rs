//! Colloquy Hub - Channel arbitration for dialogue sessions
//!
//! This crate keeps dialogues that share a channel from talking over each
//! other and owns the sessions that play them.
//!
//! ## Architecture
//!
//! ```text
//! Hub (owns sessions)
//!  │
//!  ├── BufferedChannelArbiter ← one current request per channel, FIFO queue
//!  │
//!  └── DialogSession[] ← from colloquy-core
//!       └── ActorPlaybackContext[]
//! ```
//!
//! ## Key Components
//!
//! - [`Hub`]: Creates sessions, starts them when their channel frees up
//! - [`BufferedChannelArbiter`]: Per-channel request queue
//! - [`ArbiterConfig`]: Channel names, loadable from RON
//!
//! ## Design Principles
//!
//! 1. **colloquy-core is standalone** - it does NOT know about colloquy-hub
//! 2. **Requests without a channel never wait**

mod arbiter;
mod config;
mod error;
mod hub;
mod request;

pub use arbiter::BufferedChannelArbiter;
pub use config::ArbiterConfig;
pub use error::{Error, Result};
pub use hub::{Hub, HubEvent};
pub use request::{ChannelId, RequestId};
