//! Message types for the daemon's line protocol.
//!
//! Both sockets speak the same framing: a name line, zero or more
//! `key\tvalue\tvalue...` argument lines, and a terminating `done` line.
//! Command replies prefix the argument block with an `ok` header line.

use std::collections::BTreeMap;

/// Terminates every argument block.
pub const DONE: &str = "done";

/// Header line of a successful command reply.
pub const OK: &str = "ok";

/// More argument lines than this in one transaction means the peer is broken or hostile.
pub const MAX_ARG_LINES: usize = 20;

/// Ordered mapping of argument key to its values.
pub type Args = BTreeMap<String, Vec<String>>;

/// Arguments returned by the daemon on an `ok` reply.
pub type Response = Args;

/// A command sent over the command socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command name (e.g. "get_emblems", "icon_overlay_file_status").
    pub name: String,
    /// Command arguments.
    pub args: Args,
}

impl Request {
    /// Create a request with arguments.
    pub fn new(name: impl Into<String>, args: Args) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Create a request with no arguments.
    pub fn simple(name: impl Into<String>) -> Self {
        Self::new(name, Args::new())
    }

    /// Create a request carrying a single `path` argument.
    pub fn with_path(name: impl Into<String>, path: &str) -> Self {
        let mut args = Args::new();
        args.insert("path".to_string(), vec![path.to_string()]);
        Self::new(name, args)
    }
}

/// One complete name + argument block read off a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Event (or command) name from the first line.
    pub name: String,
    /// Decoded arguments.
    pub args: Args,
}

/// First line of a command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseHeader {
    /// `ok`: argument lines follow.
    Ok,
    /// Anything else: the daemon refused; the carried line is what it said.
    Failed(String),
}

impl ResponseHeader {
    /// Check if the daemon accepted the command.
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseHeader::Ok)
    }
}
