//! Command channel: request/reply traffic on the daemon's command socket.
//!
//! - `types`: queued commands, file-info results, status and tag enums
//! - `transaction`: one request and its reply over a framed stream
//! - `channel`: the public handle, config and hooks
//! - `worker`: the task that owns the socket

pub mod channel;
pub mod transaction;
pub mod types;
mod worker;

pub use channel::{CommandChannel, CommandChannelConfig};
pub use types::{
    CancelHandle, Command, FileInfo, FileInfoCallback, FileInfoRequest, FileStatus, FolderTag,
    GeneralCommand, ReplyCallback,
};
