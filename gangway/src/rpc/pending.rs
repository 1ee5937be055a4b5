//! PendingTable: request correlation for one endpoint.
//!
//! Maps locally-issued request ids to the slot awaiting their completion.
//! Each id is consumed by at most one Resolve/Reject; a completion for an
//! absent id is silently dropped (a duplicate, or a late reply after
//! cancellation — not an error). No entry survives its completion or
//! cancellation: a leaked entry is a forever-pending call.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::CallError;
use crate::wire::{RequestId, ResolvePayload};

use super::slot::ReplySlot;

/// Completion value for one pending operation: the Resolve payload (absent
/// for bare acknowledgements) or the failure that ended it.
pub type CallResult = Result<Option<ResolvePayload>, CallError>;

/// Per-endpoint map from request id to pending completion slot.
#[derive(Default)]
pub struct PendingTable {
    next_id: Cell<RequestId>,
    entries: std::cell::RefCell<HashMap<RequestId, Rc<ReplySlot<CallResult>>>>,
}

impl PendingTable {
    /// Create an empty table. Ids start at 0 per endpoint instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next request id.
    pub fn allocate(&self) -> RequestId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Register a pending entry.
    ///
    /// Must happen before the corresponding message is sent: the peer could
    /// otherwise reply before the entry exists and the reply would be
    /// dropped as late.
    pub fn register(&self, id: RequestId, slot: Rc<ReplySlot<CallResult>>) {
        let previous = self.entries.borrow_mut().insert(id, slot);
        debug_assert!(previous.is_none(), "request id {id} registered twice");
    }

    /// Complete and remove the entry for `id`.
    ///
    /// Returns false when no entry exists; the message is dropped without
    /// side effects.
    pub fn complete(&self, id: RequestId, result: CallResult) -> bool {
        match self.entries.borrow_mut().remove(&id) {
            Some(slot) => {
                slot.complete(result);
                true
            }
            None => {
                tracing::trace!(req_id = id, "dropping completion for unknown request id");
                false
            }
        }
    }

    /// Remove the entry for `id` without completing it (consumer-side
    /// cancellation bookkeeping).
    pub fn remove(&self, id: RequestId) -> bool {
        self.entries.borrow_mut().remove(&id).is_some()
    }

    /// Reject every pending entry with clones of `error` and empty the
    /// table: the channel-failure sweep, so nothing stays pending forever
    /// on a dead transport.
    pub fn fail_all(&self, error: &CallError) {
        let drained: Vec<_> = self.entries.borrow_mut().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "rejecting all pending requests");
        }
        for (_, slot) in drained {
            slot.complete(Err(error.clone()));
        }
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no entries are outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
