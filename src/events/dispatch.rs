//! Event name to handler lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ipc::messages::{Args, Transaction};

/// Handler for one pushed event.
pub type EventHandler = Arc<dyn Fn(&Args) + Send + Sync>;

/// Handlers keyed by event name. Built before the event channel starts and
/// read-only afterwards.
#[derive(Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<String, EventHandler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`, replacing any earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            log::debug!("replaced handler for event {}", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `transaction`. Returns false if none is registered.
    pub fn dispatch(&self, transaction: &Transaction) -> bool {
        match self.handlers.get(&transaction.name) {
            Some(handler) => {
                handler(&transaction.args);
                true
            }
            None => {
                log::debug!("no handler for event {}", transaction.name);
                false
            }
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("DispatchTable").field("events", &names).finish()
    }
}
