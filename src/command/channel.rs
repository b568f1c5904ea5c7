//! Public handle for the command socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::types::{CancelHandle, Command, FileInfo, FileInfoRequest, GeneralCommand};
use crate::command::worker::Worker;
use crate::error::{BridgeError, Result};
use crate::hooks::{HookId, HookList};
use crate::ipc::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::ipc::messages::{Args, Response};
use crate::reactor::ReactorHandle;
use crate::socket::daemon_dir;
use crate::state::{ChannelState, SharedState};

/// Configuration for the command channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandChannelConfig {
    /// Path to the daemon's command socket.
    pub socket_path: PathBuf,
    /// How long a single connect attempt may take.
    pub connect_timeout_ms: u64,
    /// Read/write timeout inside a transaction.
    pub io_timeout_ms: u64,
    /// Pause between failed connect attempts.
    pub retry_delay_ms: u64,
    /// How often an idle connection is checked.
    pub idle_poll_ms: u64,
    /// Longest line accepted from the daemon.
    pub max_line_length: usize,
}

impl Default for CommandChannelConfig {
    fn default() -> Self {
        Self {
            socket_path: daemon_dir().join("command_socket"),
            connect_timeout_ms: 1000,
            io_timeout_ms: 3000,
            retry_delay_ms: 1000,
            idle_poll_ms: 100,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl CommandChannelConfig {
    /// Create config with custom socket path.
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// State shared between the handle and the worker task.
pub(crate) struct CommandShared {
    pub(crate) config: CommandChannelConfig,
    pub(crate) state: SharedState,
    pub(crate) on_connect: HookList<()>,
    pub(crate) on_disconnect: HookList<()>,
    pub(crate) on_attempt: HookList<u32>,
    pub(crate) reactor: ReactorHandle,
    pub(crate) shutdown: CancellationToken,
    pending: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

/// Queue commands for the daemon.
///
/// Cloning is cheap; every clone feeds the same worker. Completions and hooks
/// run on the reactor, never on the caller's stack.
#[derive(Clone)]
pub struct CommandChannel {
    queue: mpsc::UnboundedSender<Command>,
    shared: Arc<CommandShared>,
}

impl CommandChannel {
    /// The channel stops when `shutdown` fires. [`CommandChannel::shutdown`]
    /// stops only this channel.
    pub fn new(
        config: CommandChannelConfig,
        reactor: ReactorHandle,
        shutdown: CancellationToken,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        Self {
            queue,
            shared: Arc::new(CommandShared {
                config,
                state: SharedState::new(),
                on_connect: HookList::new(),
                on_disconnect: HookList::new(),
                on_attempt: HookList::new(),
                reactor,
                shutdown: shutdown.child_token(),
                pending: Mutex::new(Some(rx)),
            }),
        }
    }

    pub fn config(&self) -> &CommandChannelConfig {
        &self.shared.config
    }

    pub fn socket_path(&self) -> &Path {
        &self.shared.config.socket_path
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    /// Spawn the worker. Fails with `AlreadyStarted` on a second call.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let rx = self.shared.pending.lock().take().ok_or(BridgeError::AlreadyStarted)?;
        let worker = Worker::new(Arc::clone(&self.shared), rx);
        Ok(tokio::spawn(worker.run()))
    }

    /// Stop the worker. Queued commands are failed.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    /// Queue a command. If the worker is gone the command fails immediately.
    pub fn enqueue(&self, command: impl Into<Command>) {
        if let Err(mpsc::error::SendError(command)) = self.queue.send(command.into()) {
            log::debug!("command queue closed, failing {}", command.label());
            self.shared.reactor.post_or_run(move || command.fail());
        }
    }

    /// Drop the connection and reconnect. Does nothing unless connected.
    pub fn force_reconnect(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        log::debug!("forcing command channel to reconnect");
        self.queue.send(Command::Reset).is_ok()
    }

    /// Send a command with no arguments and ignore the reply.
    pub fn send_simple(&self, name: impl Into<String>) {
        self.enqueue(GeneralCommand::new(name));
    }

    pub fn send_with_args<F>(&self, name: impl Into<String>, args: Args, on_complete: F)
    where
        F: FnOnce(Option<Response>) + Send + 'static,
    {
        self.enqueue(
            GeneralCommand::new(name)
                .with_args(args)
                .on_complete(on_complete),
        );
    }

    /// Ask for the status of `path`. The returned handle cancels delivery.
    pub fn request_file_info<F>(
        &self,
        path: impl Into<PathBuf>,
        is_directory: bool,
        on_complete: F,
    ) -> CancelHandle
    where
        F: FnOnce(FileInfo) + Send + 'static,
    {
        let request = FileInfoRequest::new(path, is_directory).on_complete(on_complete);
        let handle = request.cancel_handle();
        self.enqueue(request);
        handle
    }

    pub fn on_connect<F>(&self, hook: F) -> HookId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.on_connect.add(move |()| hook())
    }

    pub fn on_disconnect<F>(&self, hook: F) -> HookId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.on_disconnect.add(move |()| hook())
    }

    /// Called after every failed connect with the attempt number (1, 2, ...).
    pub fn on_connection_attempt<F>(&self, hook: F) -> HookId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.shared.on_attempt.add(hook)
    }

    pub fn remove_connect_hook(&self, id: HookId) -> bool {
        self.shared.on_connect.remove(id)
    }

    pub fn remove_disconnect_hook(&self, id: HookId) -> bool {
        self.shared.on_disconnect.remove(id)
    }

    pub fn remove_connection_attempt_hook(&self, id: HookId) -> bool {
        self.shared.on_attempt.remove(id)
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("socket_path", &self.shared.config.socket_path)
            .field("state", &self.shared.state.get())
            .finish()
    }
}
