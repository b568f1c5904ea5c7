//! Scripted fake daemon for integration tests.
//!
//! Binds the two daemon sockets inside a temp dir. Tests accept connections
//! and script the daemon side by hand.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use dbxbridge::ClientConfig;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct FakeDaemon {
    dir: TempDir,
    command: UnixListener,
    events: UnixListener,
}

impl FakeDaemon {
    /// Bind both sockets. Must run inside a tokio runtime.
    pub fn bind() -> Self {
        let dir = TempDir::new().unwrap();
        let command = UnixListener::bind(dir.path().join("command_socket")).unwrap();
        let events = UnixListener::bind(dir.path().join("iface_socket")).unwrap();
        Self { dir, command, events }
    }

    pub fn socket_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Client config pointing at this daemon, with short timeouts.
    pub fn config(&self) -> ClientConfig {
        fast_config(self.socket_dir())
    }

    pub async fn accept_command(&self) -> CommandPeer {
        let (stream, _) = tokio::time::timeout(WAIT, self.command.accept())
            .await
            .expect("no command connection")
            .unwrap();
        CommandPeer {
            reader: BufReader::new(stream),
        }
    }

    pub async fn accept_events(&self) -> UnixStream {
        let (stream, _) = tokio::time::timeout(WAIT, self.events.accept())
            .await
            .expect("no event connection")
            .unwrap();
        stream
    }
}

pub fn fast_config(dir: &Path) -> ClientConfig {
    let mut config = ClientConfig::with_socket_dir(dir);
    config.command.connect_timeout_ms = 200;
    config.command.io_timeout_ms = 1000;
    config.command.retry_delay_ms = 50;
    config.command.idle_poll_ms = 20;
    config.events.connect_timeout_ms = 200;
    config.events.retry_delay_ms = 50;
    config
}

/// Daemon end of a command connection.
pub struct CommandPeer {
    reader: BufReader<UnixStream>,
}

impl CommandPeer {
    /// Read one request: name, argument lines, `done`. Empty on EOF.
    pub async fn read_request(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
                .await
                .expect("no request from client")
                .unwrap();
            if n == 0 {
                return lines;
            }
            let line = line.trim_end_matches('\n').to_string();
            let done = line == "done";
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    pub async fn reply(&mut self, raw: &str) {
        self.reader.get_mut().write_all(raw.as_bytes()).await.unwrap();
    }

    /// True once the client has closed its end.
    pub async fn closed_by_client(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            tokio::time::timeout(WAIT, self.reader.read_line(&mut line)).await,
            Ok(Ok(0))
        )
    }
}

/// Poll `cond` until it holds or [`WAIT`] runs out.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
