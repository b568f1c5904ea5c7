//! Per-channel connection state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of one socket connection.
///
/// Valid moves: `Disconnected -> Connecting`, `Connecting -> Connected`,
/// `Connecting -> Disconnected` (attempt failed), `Connected -> Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ChannelState {
    /// Check whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: ChannelState) -> bool {
        use ChannelState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ChannelState::Connecting,
            2 => ChannelState::Connected,
            _ => ChannelState::Disconnected,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Atomically readable channel state. Written only by the owning channel's loop.
#[derive(Debug)]
pub struct SharedState(AtomicU8);

impl SharedState {
    pub fn new() -> Self {
        Self(AtomicU8::new(ChannelState::Disconnected as u8))
    }

    pub fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ChannelState::Connected
    }

    /// Move to `next`. Invalid moves are logged and still applied; the loop that
    /// owns the state is the only writer, so a bad move is a bug there.
    pub fn transition(&self, channel: &str, next: ChannelState) {
        let prev = ChannelState::from_u8(self.0.swap(next as u8, Ordering::SeqCst));
        if prev != next && !prev.can_transition_to(next) {
            log::warn!("{} channel: unexpected state change {} -> {}", channel, prev, next);
        } else {
            log::debug!("{} channel: {} -> {}", channel, prev, next);
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
