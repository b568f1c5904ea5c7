//! Two-sided rendezvous for connect and disconnect signals.
//!
//! Each channel reports its own connects and disconnects. A unified signal
//! fires only once both sides have reported the same direction; after firing,
//! that direction's flags clear for the next cycle. A disconnect from one side
//! while the other has not disconnected yet asks the caller to force the other
//! side down, so the two connections are always renegotiated together.

/// Which channel raised a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Command,
    Events,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Command => Side::Events,
            Side::Events => Side::Command,
        }
    }
}

/// What to do after a connect signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAction {
    /// The other side has not connected yet.
    Wait,
    /// Both sides are up; fire the unified connect.
    Fire,
}

/// What to do after a disconnect signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectAction {
    /// Tear down the named side so it reconnects too.
    ForceReconnect(Side),
    /// Both sides are down; fire the unified disconnect.
    Fire,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Flags {
    command: bool,
    events: bool,
}

impl Flags {
    fn set(&mut self, side: Side) {
        match side {
            Side::Command => self.command = true,
            Side::Events => self.events = true,
        }
    }

    fn get(&self, side: Side) -> bool {
        match side {
            Side::Command => self.command,
            Side::Events => self.events,
        }
    }

    fn clear(&mut self) {
        *self = Flags::default();
    }
}

/// Rendezvous flags for both directions.
#[derive(Debug, Default, Clone)]
pub struct Rendezvous {
    connected: Flags,
    disconnected: Flags,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(&mut self, side: Side) -> ConnectAction {
        self.connected.set(side);
        if self.connected.get(side.other()) {
            self.connected.clear();
            // disconnects reported before this cycle belong to the previous one
            self.disconnected.clear();
            ConnectAction::Fire
        } else {
            ConnectAction::Wait
        }
    }

    pub fn disconnected(&mut self, side: Side) -> DisconnectAction {
        self.disconnected.set(side);
        if self.disconnected.get(side.other()) {
            self.disconnected.clear();
            DisconnectAction::Fire
        } else {
            DisconnectAction::ForceReconnect(side.other())
        }
    }

    /// True if `side` has connected and is waiting for the other.
    pub fn is_waiting_on_connect(&self, side: Side) -> bool {
        self.connected.get(side)
    }
}
