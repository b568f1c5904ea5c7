//! CLI command definitions using clap.
//!
//! Subcommands:
//! - status: wait for the daemon and report the connection
//! - send: run a general command
//! - file-info: look up sync status for a path
//! - watch: print pushed events

use clap::{Parser, Subcommand};
use dbxbridge::Args;
use std::path::PathBuf;

/// Events watched when none are named.
pub const DEFAULT_WATCH_EVENTS: &[&str] = &["shell_touch"];

/// dbxbridge - talk to the local sync daemon
#[derive(Parser, Debug)]
#[command(name = "dbxbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the daemon's sockets (overrides config)
    #[arg(short, long, global = true)]
    pub socket_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait for the daemon and print whether both sockets are up
    Status,

    /// Send a command and print the reply
    Send {
        /// Command name
        command: String,

        /// Arguments as key=value; repeat a key to pass several values
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,

        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show sync status and emblems for a path
    FileInfo {
        path: PathBuf,

        /// Treat the path as a folder (also asks for its folder tag)
        #[arg(short, long)]
        dir: bool,
    },

    /// Print events pushed by the daemon until interrupted
    Watch {
        /// Event name to watch; may be repeated
        #[arg(short, long = "event")]
        events: Vec<String>,
    },
}

/// Parse `key=value`. The value may be empty or contain further `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing key in '{}'", s)),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Group pairs by key, keeping values in command-line order.
pub fn collect_args(pairs: &[(String, String)]) -> Args {
    let mut args = Args::new();
    for (key, value) in pairs {
        args.entry(key.clone()).or_default().push(value.clone());
    }
    args
}

/// Events to register for `watch`.
pub fn watch_events(requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        DEFAULT_WATCH_EVENTS.iter().map(|e| e.to_string()).collect()
    } else {
        requested.to_vec()
    }
}
