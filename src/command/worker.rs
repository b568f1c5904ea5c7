//! The command worker task.
//!
//! Owns the command socket. Connects with retry, pulls commands off the
//! queue one at a time, runs each transaction, and hands results and hooks
//! to the reactor. While idle it polls the socket so a daemon restart is
//! noticed without waiting for the next command.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::command::channel::CommandShared;
use crate::command::transaction::{file_info, send_request};
use crate::command::types::Command;
use crate::error::{BridgeError, Result};
use crate::ipc::codec::LineCodec;
use crate::socket::connect_with_timeout;
use crate::state::ChannelState;

const CHANNEL: &str = "command";

type CommandStream = Framed<UnixStream, LineCodec>;

/// Why the serve loop returned.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Disconnected,
    Shutdown,
}

pub(crate) struct Worker {
    shared: Arc<CommandShared>,
    queue: mpsc::UnboundedReceiver<Command>,
    /// Commands pulled off the queue at connect time, served before the queue.
    backlog: VecDeque<Command>,
}

impl Worker {
    pub(crate) fn new(shared: Arc<CommandShared>, queue: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            shared,
            queue,
            backlog: VecDeque::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        let config = self.shared.config.clone();
        let mut attempts: u32 = 0;

        loop {
            if self.shared.shutdown.is_cancelled() {
                break;
            }

            self.shared.state.transition(CHANNEL, ChannelState::Connecting);
            match connect_with_timeout(&config.socket_path, config.connect_timeout()).await {
                Ok(stream) => {
                    attempts = 0;
                    self.discard_stale_resets();
                    self.shared.state.transition(CHANNEL, ChannelState::Connected);
                    info!(socket = %config.socket_path.display(), "command channel connected");
                    self.post(|shared| shared.on_connect.invoke(()));

                    let mut framed =
                        Framed::new(stream, LineCodec::with_max_length(config.max_line_length));
                    let exit = self.serve(&mut framed).await;
                    drop(framed);

                    self.shared.state.transition(CHANNEL, ChannelState::Disconnected);
                    info!("command channel disconnected");
                    self.post(|shared| shared.on_disconnect.invoke(()));

                    if exit == Exit::Shutdown {
                        break;
                    }
                }
                Err(e) => {
                    attempts = attempts.saturating_add(1);
                    self.shared.state.transition(CHANNEL, ChannelState::Disconnected);
                    debug!(attempt = attempts, error = %e, "command connect failed");
                    self.post(move |shared| shared.on_attempt.invoke(attempts));
                    self.fail_queued();

                    let shutdown = self.shared.shutdown.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(config.retry_delay()) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        self.queue.close();
        self.fail_queued();
        debug!("command worker stopped");
    }

    /// Process commands until the connection fails, a reset arrives, or shutdown.
    async fn serve(&mut self, framed: &mut CommandStream) -> Exit {
        let config = self.shared.config.clone();
        let shutdown = self.shared.shutdown.clone();

        loop {
            if shutdown.is_cancelled() {
                return Exit::Shutdown;
            }
            if let Some(command) = self.backlog.pop_front() {
                if !self.dispatch(framed, command).await {
                    return Exit::Disconnected;
                }
                continue;
            }

            let next = tokio::select! {
                _ = shutdown.cancelled() => return Exit::Shutdown,
                next = tokio::time::timeout(config.idle_poll(), self.queue.recv()) => next,
            };

            let command = match next {
                Ok(Some(command)) => command,
                Ok(None) => return Exit::Shutdown,
                Err(_) => {
                    if let Err(e) = check_connection(framed) {
                        warn!(error = %e, "command socket went bad while idle");
                        self.fail_queued();
                        return Exit::Disconnected;
                    }
                    continue;
                }
            };

            if !self.dispatch(framed, command).await {
                return Exit::Disconnected;
            }
        }
    }

    /// Handle one dequeued command. Returns false when the connection must be
    /// dropped; everything still queued has then already been failed.
    async fn dispatch(&mut self, framed: &mut CommandStream, command: Command) -> bool {
        if matches!(command, Command::Reset) {
            info!("command channel reset requested");
            self.fail_queued();
            return false;
        }

        debug!(command = command.label(), "running command");
        if let Err(e) = self.execute(framed, command).await {
            warn!(error = %e, "command failed, dropping connection");
            self.fail_queued();
            return false;
        }
        true
    }

    /// Drop resets queued while no connection was up. They were aimed at a
    /// connection that is already gone and must not tear down the new one.
    fn discard_stale_resets(&mut self) {
        let mut dropped = 0;
        while let Ok(command) = self.queue.try_recv() {
            if matches!(command, Command::Reset) {
                dropped += 1;
            } else {
                self.backlog.push_back(command);
            }
        }
        if dropped > 0 {
            debug!(count = dropped, "discarded stale reset requests");
        }
    }

    /// Run one command and deliver its result.
    ///
    /// On error the command has already been failed; the caller drops the socket.
    async fn execute(&mut self, framed: &mut CommandStream, command: Command) -> Result<()> {
        let io_timeout = self.shared.config.io_timeout();

        match command {
            Command::Reset => Ok(()),
            Command::General(cmd) => {
                match send_request(framed, cmd.request(), io_timeout).await {
                    Ok(reply) => {
                        self.shared.reactor.post_or_run(move || cmd.complete(reply));
                        Ok(())
                    }
                    Err(e) => {
                        self.shared.reactor.post_or_run(move || cmd.complete(None));
                        Err(e)
                    }
                }
            }
            Command::FileInfo(req) => {
                match file_info(framed, &req.path, req.is_directory, io_timeout).await {
                    Ok(info) => {
                        self.shared.reactor.post_or_run(move || req.complete(info));
                        Ok(())
                    }
                    Err(e) => {
                        let command = Command::FileInfo(req);
                        self.shared.reactor.post_or_run(move || command.fail());
                        Err(e)
                    }
                }
            }
        }
    }

    /// Fail every command currently in the queue.
    fn fail_queued(&mut self) {
        let mut failed = 0;
        let backlog = std::mem::take(&mut self.backlog);
        let queued = std::iter::from_fn(|| self.queue.try_recv().ok());
        for command in backlog.into_iter().chain(queued) {
            if matches!(command, Command::Reset) {
                continue;
            }
            failed += 1;
            self.shared.reactor.post_or_run(move || command.fail());
        }
        if failed > 0 {
            debug!(count = failed, "failed queued commands");
        }
    }

    fn post<F>(&self, f: F)
    where
        F: FnOnce(&CommandShared) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.shared.reactor.post(move || f(&shared));
    }
}

/// Poll an idle socket. Any unsolicited data, EOF, or error means the
/// connection can no longer be trusted.
fn check_connection(framed: &mut CommandStream) -> Result<()> {
    if !framed.read_buffer().is_empty() {
        return Err(BridgeError::ProtocolViolation(
            "unsolicited data on command socket".into(),
        ));
    }

    let mut probe = [0u8; 1];
    match framed.get_ref().try_read(&mut probe) {
        Ok(0) => Err(BridgeError::TransactionIo("daemon closed command socket".into())),
        Ok(_) => Err(BridgeError::ProtocolViolation(
            "unsolicited data on command socket".into(),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e.into()),
    }
}
