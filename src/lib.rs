//! dbxbridge - client for a local file-sync daemon
//!
//! Talks to the daemon over two Unix sockets: a command socket for
//! request/reply traffic and an event socket for pushed notifications. Both
//! reconnect on their own; [`DaemonClient`] joins them into one connected view.

pub mod client;
pub mod command;
pub mod error;
pub mod events;
pub mod hooks;
pub mod ipc;
pub mod reactor;
pub mod rendezvous;
pub mod socket;
pub mod state;

pub use client::{ClientConfig, DaemonClient};
pub use command::{
    CancelHandle, Command, CommandChannel, CommandChannelConfig, FileInfo, FileInfoRequest,
    FileStatus, FolderTag, GeneralCommand,
};
pub use error::{BridgeError, Result};
pub use events::{EventChannel, EventChannelConfig, EventChannelHandle};
pub use hooks::HookId;
pub use ipc::{Args, Response};
pub use state::ChannelState;
