//! Cross-context job queue.
//!
//! The command worker never calls user code directly. It posts jobs (hook
//! invocations, command completions) here and the reactor runs them one at a
//! time, in post order, on its own task.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A unit of work handed to the reactor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable posting side of a [`Reactor`].
#[derive(Clone, Debug)]
pub struct ReactorHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl ReactorHandle {
    /// Queue `job` for the reactor. Returns false if the reactor is gone.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// Queue `job`, or run it right here if the reactor is gone.
    pub fn post_or_run<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(mpsc::error::SendError(job)) = self.tx.send(Box::new(job)) {
            job();
        }
    }
}

/// Runs posted jobs in order.
pub struct Reactor {
    rx: mpsc::UnboundedReceiver<Job>,
    handle: ReactorHandle,
}

impl Reactor {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            handle: ReactorHandle { tx },
        }
    }

    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Run every job that is already queued, without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Run jobs until `shutdown` fires, then drain what is left.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                job = self.rx.recv() => match job {
                    Some(job) => job(),
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    // later posts fail and run inline at the caller
                    self.rx.close();
                    let drained = self.run_pending();
                    log::debug!("reactor stopping, ran {} pending jobs", drained);
                    break;
                }
            }
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}
