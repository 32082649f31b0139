//! Wire types for the hub's client<->server WebSocket protocol.
//!
//! Inbound frames are a single weakly-typed JSON object on the wire; per the
//! redesign notes this crate turns that into a tagged [`ClientFrameKind`] at
//! parse time instead of threading an `any`-typed map through the rest of the
//! system. Parsing *is* the structural validator: anything that doesn't
//! satisfy the expected frame shape is rejected here.

pub mod error;
pub mod frame;
pub mod presence;

pub use error::{ErrorKind, FrameError};
pub use frame::{
    AckFrame, BatchBroadcastFrame, BatchBroadcastItem, BatchSubscribeFrame, BatchUnsubscribeFrame,
    ClientEventFrame, ClientFrameKind, HeartbeatFrame, ParsedFrame, RawFrame, ServerFrame,
    SubscribeFrame, UnsubscribeFrame,
};
pub use presence::{PresenceData, PresenceId, PresenceMember};

/// Reserved channel-name prefixes. The rest are public.
pub mod prefixes {
    pub const PRIVATE: &str = "private-";
    pub const PRESENCE: &str = "presence-";
}

/// Visibility class of a channel, derived from its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelClass {
    Public,
    Private,
    Presence,
}

impl ChannelClass {
    /// `presence-` wins over `private-` when (hypothetically) both prefixes
    /// would match -- they can't, since prefix matching is mutually
    /// exclusive, but presence is checked first to make that priority explicit.
    pub fn of(channel_name: &str) -> Self {
        if channel_name.starts_with(prefixes::PRESENCE) {
            ChannelClass::Presence
        } else if channel_name.starts_with(prefixes::PRIVATE) {
            ChannelClass::Private
        } else {
            ChannelClass::Public
        }
    }

    pub fn requires_authorization(self) -> bool {
        !matches!(self, ChannelClass::Public)
    }

    pub fn is_presence(self) -> bool {
        matches!(self, ChannelClass::Presence)
    }
}
