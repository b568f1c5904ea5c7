//! Event channel: reads daemon-pushed transactions and dispatches them.
//!
//! The loop connects to the event socket, decodes transactions as bytes
//! arrive, and runs the matching handler inline before reading further. A
//! failed connect is retried after `retry_delay`; a lost connection is
//! retried at once. Nothing about failed attempts is reported.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::events::dispatch::DispatchTable;
use crate::hooks::{HookId, HookList};
use crate::ipc::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::ipc::messages::Args;
use crate::ipc::transaction::TransactionDecoder;
use crate::socket::{connect_with_timeout, daemon_dir};
use crate::state::{ChannelState, SharedState};

const CHANNEL: &str = "event";

/// Configuration for the event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventChannelConfig {
    /// Path to the daemon's event socket.
    pub socket_path: PathBuf,
    pub connect_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub max_line_length: usize,
}

impl Default for EventChannelConfig {
    fn default() -> Self {
        Self {
            socket_path: daemon_dir().join("iface_socket"),
            connect_timeout_ms: 1000,
            retry_delay_ms: 1000,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl EventChannelConfig {
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Disconnected,
    Shutdown,
}

struct EventShared {
    state: SharedState,
    on_connect: HookList<()>,
    on_disconnect: HookList<()>,
    reset_tx: mpsc::UnboundedSender<()>,
}

/// The event loop, before it is started.
///
/// Handlers must be registered before [`EventChannel::start`]; starting
/// consumes the channel, so the dispatch table cannot change afterwards.
pub struct EventChannel {
    config: EventChannelConfig,
    dispatch: DispatchTable,
    shared: Arc<EventShared>,
    reset_rx: mpsc::UnboundedReceiver<()>,
    shutdown: CancellationToken,
}

impl EventChannel {
    pub fn new(config: EventChannelConfig, shutdown: CancellationToken) -> Self {
        let (reset_tx, reset_rx) = mpsc::unbounded_channel();
        Self {
            config,
            dispatch: DispatchTable::new(),
            shared: Arc::new(EventShared {
                state: SharedState::new(),
                on_connect: HookList::new(),
                on_disconnect: HookList::new(),
                reset_tx,
            }),
            reset_rx,
            shutdown,
        }
    }

    pub fn config(&self) -> &EventChannelConfig {
        &self.config
    }

    /// Register the handler for `name`.
    pub fn register_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.dispatch.register(name, handler);
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// Handle for state queries, hooks and reconnects; usable after start.
    pub fn handle(&self) -> EventChannelHandle {
        EventChannelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Spawn the event loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.shared.state.transition(CHANNEL, ChannelState::Connecting);
            let connect_timeout = self.config.connect_timeout();
            match connect_with_timeout(&self.config.socket_path, connect_timeout).await {
                Ok(stream) => {
                    // resets requested against an earlier connection
                    while self.reset_rx.try_recv().is_ok() {}

                    self.shared.state.transition(CHANNEL, ChannelState::Connected);
                    info!(socket = %self.config.socket_path.display(), "event channel connected");
                    self.shared.on_connect.invoke(());

                    let exit = self.serve(stream).await;

                    self.shared.state.transition(CHANNEL, ChannelState::Disconnected);
                    info!("event channel disconnected");
                    self.shared.on_disconnect.invoke(());

                    if exit == Exit::Shutdown {
                        break;
                    }
                }
                Err(e) => {
                    self.shared.state.transition(CHANNEL, ChannelState::Disconnected);
                    trace!(error = %e, "event connect failed");

                    let shutdown = self.shutdown.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_delay()) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }
        debug!("event channel stopped");
    }

    async fn serve(&mut self, stream: UnixStream) -> Exit {
        let mut reader = FramedRead::new(
            stream,
            TransactionDecoder::with_max_line_length(self.config.max_line_length),
        );
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Exit::Shutdown,
                Some(()) = self.reset_rx.recv() => {
                    info!("event channel reset requested");
                    return Exit::Disconnected;
                }
                next = reader.next() => match next {
                    Some(Ok(transaction)) => {
                        trace!(
                            event = %transaction.name,
                            args = transaction.args.len(),
                            "event received"
                        );
                        self.dispatch.dispatch(&transaction);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "bad event transaction, dropping connection");
                        return Exit::Disconnected;
                    }
                    None => return Exit::Disconnected,
                },
            }
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("socket_path", &self.config.socket_path)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// Shared view of a (possibly running) event channel.
#[derive(Clone)]
pub struct EventChannelHandle {
    shared: Arc<EventShared>,
}

impl EventChannelHandle {
    pub fn state(&self) -> ChannelState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    /// Drop the current connection and reconnect. Does nothing unless connected.
    pub fn force_reconnect(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        debug!("forcing event channel to reconnect");
        self.shared.reset_tx.send(()).is_ok()
    }

    /// Hooks run on the event task, in registration order.
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

    pub fn remove_connect_hook(&self, id: HookId) -> bool {
        self.shared.on_connect.remove(id)
    }

    pub fn remove_disconnect_hook(&self, id: HookId) -> bool {
        self.shared.on_disconnect.remove(id)
    }
}

impl std::fmt::Debug for EventChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannelHandle")
            .field("state", &self.shared.state.get())
            .finish()
    }
}
