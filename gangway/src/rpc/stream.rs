//! Consumer-side stream handle with pull discipline and cancellation.
//!
//! A [`RemoteStream`] reuses the request id of the call that opened it: each
//! `RequestNextItem` re-registers that id in the pending table and awaits
//! exactly one `Resolve`/`Reject`, so at most one pull is ever in flight.
//! Dropping the handle before exhaustion sends a single fire-and-forget
//! `CancelIterator` and stops processing replies for the id.

use std::rc::Rc;

use serde_json::Value;

use crate::error::CallError;
use crate::wire::{RequestId, ResolvePayload, WireMessage};

use super::endpoint::Shared;
use super::slot::ReplySlot;

/// Handle to a stream opened on the peer.
pub struct RemoteStream {
    shared: Rc<Shared>,
    req_id: RequestId,
    finished: bool,
}

impl RemoteStream {
    pub(crate) fn new(shared: Rc<Shared>, req_id: RequestId) -> RemoteStream {
        RemoteStream {
            shared,
            req_id,
            finished: false,
        }
    }

    /// Pull the next item.
    ///
    /// `None` means the producer is exhausted. An `Err` item ends the
    /// stream; so does exhaustion, and further calls return `None` without
    /// touching the channel.
    pub async fn next(&mut self) -> Option<Result<Value, CallError>> {
        if self.finished {
            return None;
        }

        let slot = Rc::new(ReplySlot::new());
        self.shared.pending.register(self.req_id, slot.clone());
        if let Err(error) = self
            .shared
            .send(&WireMessage::RequestNextItem { req_id: self.req_id })
        {
            self.shared.pending.remove(self.req_id);
            self.finished = true;
            return Some(Err(error));
        }

        match slot.take().await {
            Ok(Some(ResolvePayload::Item { done: true, .. })) => {
                self.finished = true;
                None
            }
            Ok(Some(ResolvePayload::Item {
                done: false,
                value: Some(value),
            })) => Some(Ok(value)),
            Ok(Some(ResolvePayload::Item {
                done: false,
                value: None,
            })) => {
                self.finished = true;
                Some(Err(CallError::Protocol {
                    message: "stream item step carried no value".to_string(),
                }))
            }
            Ok(Some(ResolvePayload::Return { .. })) | Ok(None) => {
                self.finished = true;
                Some(Err(CallError::Protocol {
                    message: "unexpected payload for a stream pull".to_string(),
                }))
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }

    /// Drain the remaining items into a vector, stopping at the first error.
    pub async fn collect(&mut self) -> Result<Vec<Value>, CallError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }
}

impl Drop for RemoteStream {
    /// Abandoning an unfinished stream cancels it on the producer. No reply
    /// is expected; a late `Resolve` for the id finds no pending entry and
    /// is dropped.
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.shared.pending.remove(self.req_id);
        if let Err(error) = self
            .shared
            .send(&WireMessage::CancelIterator { req_id: self.req_id })
        {
            tracing::debug!(req_id = self.req_id, %error, "cancel not delivered");
        }
    }
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream")
            .field("req_id", &self.req_id)
            .field("finished", &self.finished)
            .finish()
    }
}
