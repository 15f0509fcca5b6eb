//! The receiving side of a module.
//!
//! Every connector keeps a weak back-reference to its module's `Inbox`.
//! Producers append updates here and fire the module's data-changed
//! condition; the module thread drains them on its next wake.

use crate::graph::data::Payload;
use crate::sync::{lock, Condition};
use std::sync::Mutex;

/// One delivery to an input connector. `payload == None` means the data
/// became absent (the input was disconnected).
#[derive(Debug, Clone)]
pub struct Update {
    /// Registration index of the input connector.
    pub input: usize,
    /// Name of the input connector.
    pub connector: String,
    pub payload: Option<Payload>,
}

impl Update {
    pub fn is_absent(&self) -> bool {
        self.payload.is_none()
    }
}

pub struct Inbox {
    module: String,
    pending: Mutex<Vec<Update>>,
    data_changed: Condition,
}

impl Inbox {
    pub fn new(module: impl Into<String>, data_changed: Condition) -> Self {
        Self {
            module: module.into(),
            pending: Mutex::new(Vec::new()),
            data_changed,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn data_changed(&self) -> &Condition {
        &self.data_changed
    }

    pub(crate) fn push(&self, update: Update) {
        lock(&self.pending).push(update);
        self.data_changed.notify();
    }

    /// Take every pending update, ordered by input registration index.
    /// Updates for the same input keep their arrival order.
    pub fn drain(&self) -> Vec<Update> {
        let mut updates = std::mem::take(&mut *lock(&self.pending));
        updates.sort_by_key(|u| u.input);
        updates
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("module", &self.module)
            .field("pending", &self.pending_len())
            .finish()
    }
}
