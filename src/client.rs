//! Daemon client: one command channel plus one event channel behind a single
//! connected/disconnected view.
//!
//! Each channel reports its own connects and disconnects to a shared
//! [`Rendezvous`]. The unified connect fires once both are up. When one side
//! drops, the other is forced down too, and the unified disconnect fires once
//! both have reported. Unified hooks run on whichever task raised the last
//! channel signal: the reactor for the command side, the event task for the
//! event side.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{CancelHandle, Command, CommandChannel, CommandChannelConfig, FileInfo};
use crate::error::{BridgeError, Result};
use crate::events::{EventChannel, EventChannelConfig, EventChannelHandle};
use crate::hooks::{HookId, HookList};
use crate::ipc::messages::{Args, Response};
use crate::reactor::Reactor;
use crate::rendezvous::{ConnectAction, DisconnectAction, Rendezvous, Side};

/// Configuration for both channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub command: CommandChannelConfig,
    pub events: EventChannelConfig,
}

impl ClientConfig {
    /// Point both channels at sockets inside `dir`, using the daemon's file names.
    pub fn with_socket_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            command: CommandChannelConfig::with_socket(dir.join("command_socket")),
            events: EventChannelConfig::with_socket(dir.join("iface_socket")),
        }
    }
}

struct Coordination {
    rendezvous: Mutex<Rendezvous>,
    connected: AtomicBool,
    on_connect: HookList<()>,
    on_disconnect: HookList<()>,
    command: CommandChannel,
    events: EventChannelHandle,
}

impl Coordination {
    fn channel_connected(&self, side: Side) {
        let action = self.rendezvous.lock().connected(side);
        debug!(side = ?side, action = ?action, "channel connected");

        if action == ConnectAction::Fire && !self.connected.swap(true, Ordering::SeqCst) {
            info!("connected to daemon");
            self.on_connect.invoke(());
        }
    }

    fn channel_disconnected(&self, side: Side) {
        let action = self.rendezvous.lock().disconnected(side);
        debug!(side = ?side, action = ?action, "channel disconnected");

        match action {
            DisconnectAction::ForceReconnect(Side::Command) => {
                self.command.force_reconnect();
            }
            DisconnectAction::ForceReconnect(Side::Events) => {
                self.events.force_reconnect();
            }
            DisconnectAction::Fire => {
                if self.connected.swap(false, Ordering::SeqCst) {
                    info!("disconnected from daemon");
                    self.on_disconnect.invoke(());
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && self.command.is_connected()
            && self.events.is_connected()
    }
}

/// Client for the sync daemon.
///
/// Register event handlers and hooks, then call [`DaemonClient::start`] from
/// inside a tokio runtime. Commands may be queued before or after starting.
pub struct DaemonClient {
    inner: Arc<Coordination>,
    events: Option<EventChannel>,
    reactor: Option<Reactor>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DaemonClient {
    pub fn new(config: ClientConfig) -> Self {
        let shutdown = CancellationToken::new();
        let reactor = Reactor::new();
        let command = CommandChannel::new(config.command, reactor.handle(), shutdown.clone());
        let events = EventChannel::new(config.events, shutdown.clone());

        let inner = Arc::new(Coordination {
            rendezvous: Mutex::new(Rendezvous::new()),
            connected: AtomicBool::new(false),
            on_connect: HookList::new(),
            on_disconnect: HookList::new(),
            command,
            events: events.handle(),
        });

        wire(&inner);

        Self {
            inner,
            events: Some(events),
            reactor: Some(reactor),
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Create client with default socket locations.
    pub fn with_default_config() -> Self {
        Self::new(ClientConfig::default())
    }

    /// Register the handler for a pushed event. Only allowed before start.
    pub fn register_handler<F>(&mut self, name: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let events = self.events.as_mut().ok_or(BridgeError::AlreadyStarted)?;
        events.register_handler(name, handler);
        Ok(())
    }

    /// Spawn the reactor, the command worker and the event loop.
    pub fn start(&mut self) -> Result<()> {
        if self.reactor.is_none() || self.events.is_none() {
            return Err(BridgeError::AlreadyStarted);
        }
        let command = self.inner.command.start()?;
        let (Some(reactor), Some(events)) = (self.reactor.take(), self.events.take()) else {
            return Err(BridgeError::AlreadyStarted);
        };

        self.tasks.push(tokio::spawn(reactor.run(self.shutdown.clone())));
        self.tasks.push(command);
        self.tasks.push(events.start());
        info!(
            command = %self.inner.command.socket_path().display(),
            "daemon client started"
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.events.is_none()
    }

    /// Stop every task and wait for them. Queued commands are failed.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::warn!("client task ended abnormally: {}", e);
            }
        }
        debug!("daemon client stopped");
    }

    /// True while both channels are up and the unified connect has fired.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Force both channels to reconnect. Does nothing unless connected.
    pub fn force_reconnect(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        info!("forcing client to reconnect");
        self.inner.command.force_reconnect();
        self.inner.events.force_reconnect();
        true
    }

    /// Unified connect hooks, in registration order.
    pub fn on_connect<F>(&self, hook: F) -> HookId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.on_connect.add(move |()| hook())
    }

    pub fn on_disconnect<F>(&self, hook: F) -> HookId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.on_disconnect.add(move |()| hook())
    }

    pub fn remove_connect_hook(&self, id: HookId) -> bool {
        self.inner.on_connect.remove(id)
    }

    pub fn remove_disconnect_hook(&self, id: HookId) -> bool {
        self.inner.on_disconnect.remove(id)
    }

    /// Called after each failed command-socket connect with the attempt number.
    pub fn on_connection_attempt<F>(&self, hook: F) -> HookId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.inner.command.on_connection_attempt(hook)
    }

    pub fn enqueue(&self, command: impl Into<Command>) {
        self.inner.command.enqueue(command);
    }

    pub fn send_simple(&self, name: impl Into<String>) {
        self.inner.command.send_simple(name);
    }

    pub fn send_with_args<F>(&self, name: impl Into<String>, args: Args, on_complete: F)
    where
        F: FnOnce(Option<Response>) + Send + 'static,
    {
        self.inner.command.send_with_args(name, args, on_complete);
    }

    pub fn request_file_info<F>(
        &self,
        path: impl Into<PathBuf>,
        is_directory: bool,
        on_complete: F,
    ) -> CancelHandle
    where
        F: FnOnce(FileInfo) + Send + 'static,
    {
        self.inner
            .command
            .request_file_info(path, is_directory, on_complete)
    }

    pub fn command_channel(&self) -> &CommandChannel {
        &self.inner.command
    }

    pub fn event_channel(&self) -> &EventChannelHandle {
        &self.inner.events
    }
}

impl Drop for DaemonClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonClient")
            .field("command", &self.inner.command)
            .field("events", &self.inner.events)
            .field("connected", &self.is_connected())
            .field("started", &self.is_started())
            .finish()
    }
}

/// Route both channels' signals into the rendezvous. Hooks hold weak
/// references; the channels are owned by the coordination itself.
fn wire(inner: &Arc<Coordination>) {
    let weak = Arc::downgrade(inner);
    inner
        .command
        .on_connect(signal(&weak, |c| c.channel_connected(Side::Command)));
    inner
        .command
        .on_disconnect(signal(&weak, |c| c.channel_disconnected(Side::Command)));
    inner
        .events
        .on_connect(signal(&weak, |c| c.channel_connected(Side::Events)));
    inner
        .events
        .on_disconnect(signal(&weak, |c| c.channel_disconnected(Side::Events)));
}

fn signal<F>(weak: &Weak<Coordination>, f: F) -> impl Fn() + Send + Sync + 'static
where
    F: Fn(&Coordination) + Send + Sync + 'static,
{
    let weak = weak.clone();
    move || {
        if let Some(inner) = weak.upgrade() {
            f(&inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_socket_dir() {
        let config = ClientConfig::with_socket_dir("/tmp/dbx");
        assert_eq!(config.command.socket_path, PathBuf::from("/tmp/dbx/command_socket"));
        assert_eq!(config.events.socket_path, PathBuf::from("/tmp/dbx/iface_socket"));
    }

    #[test]
    fn test_client_config_yaml_sections() {
        let yaml = "command:\n  io_timeout_ms: 250\nevents:\n  retry_delay_ms: 10\n";
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.command.io_timeout_ms, 250);
        assert_eq!(config.events.retry_delay_ms, 10);
        assert_eq!(config.command.idle_poll_ms, 100);
    }

    #[tokio::test]
    async fn test_register_after_start_rejected() {
        let mut client = DaemonClient::new(ClientConfig::with_socket_dir("/nonexistent"));
        client.register_handler("shell_touch", |_| {}).unwrap();
        client.start().unwrap();
        assert!(client.is_started());

        assert!(matches!(
            client.register_handler("late", |_| {}),
            Err(BridgeError::AlreadyStarted)
        ));
        assert!(matches!(client.start(), Err(BridgeError::AlreadyStarted)));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_start_keeps_client_startable() {
        let mut client = DaemonClient::new(ClientConfig::with_socket_dir("/nonexistent"));
        let stray = client.command_channel().start().unwrap();

        assert!(matches!(client.start(), Err(BridgeError::AlreadyStarted)));
        assert!(!client.is_started());
        client.register_handler("shell_touch", |_| {}).unwrap();

        client.shutdown().await;
        stray.await.unwrap();
    }

    #[tokio::test]
    async fn test_force_reconnect_while_disconnected_is_noop() {
        let mut client = DaemonClient::new(ClientConfig::with_socket_dir("/nonexistent"));
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        client.on_disconnect(move || fired_clone.store(true, Ordering::SeqCst));
        client.start().unwrap();

        assert!(!client.is_connected());
        assert!(!client.force_reconnect());
        client.shutdown().await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_rendezvous_fires_unified_hooks_once() {
        let client = DaemonClient::new(ClientConfig::with_socket_dir("/nonexistent"));
        let ups = Arc::new(Mutex::new(0));
        let downs = Arc::new(Mutex::new(0));
        let ups_clone = Arc::clone(&ups);
        let downs_clone = Arc::clone(&downs);
        client.on_connect(move || *ups_clone.lock() += 1);
        client.on_disconnect(move || *downs_clone.lock() += 1);

        client.inner.channel_connected(Side::Command);
        assert_eq!(*ups.lock(), 0);
        client.inner.channel_connected(Side::Events);
        assert_eq!(*ups.lock(), 1);

        client.inner.channel_disconnected(Side::Events);
        assert_eq!(*downs.lock(), 0);
        client.inner.channel_disconnected(Side::Command);
        assert_eq!(*downs.lock(), 1);
    }

    #[test]
    fn test_unified_hooks_run_in_order_and_can_be_removed() {
        let client = DaemonClient::new(ClientConfig::with_socket_dir("/nonexistent"));
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&order);
        let b = Arc::clone(&order);
        let first = client.on_connect(move || a.lock().push("first"));
        client.on_connect(move || b.lock().push("second"));

        client.inner.channel_connected(Side::Events);
        client.inner.channel_connected(Side::Command);
        assert_eq!(*order.lock(), vec!["first", "second"]);

        assert!(client.remove_connect_hook(first));
        client.inner.channel_disconnected(Side::Command);
        client.inner.channel_disconnected(Side::Events);
        client.inner.channel_connected(Side::Command);
        client.inner.channel_connected(Side::Events);
        assert_eq!(*order.lock(), vec!["first", "second", "second"]);
    }
}
