//! Endpoint: message dispatch, inbound invocation, and the handshake.
//!
//! Two identical endpoints run this logic over one channel; which local
//! object each exposes is configuration, not a distinct code path. All
//! protocol state lives behind a single shared `Rc` touched only from the
//! channel's message callback and from local call sites — single-threaded
//! cooperative, no locks within one endpoint.
//!
//! Invariant observed throughout: no `RefCell` borrow is held across a
//! channel send or a host-method invocation, because delivery may be
//! synchronous and re-enter the dispatcher.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::Value;

use crate::channel::{Channel, ChannelMessage};
use crate::error::CallError;
use crate::fault::Fault;
use crate::surface::{describe, describe_flat, resolve_method, HostObject, Outcome, StreamSource};
use crate::wire::{RequestId, ResolvePayload, Surface, SurfaceNode, WireMessage};

use super::pending::PendingTable;
use super::remote::RemoteObject;
use super::slot::ReplySlot;

/// Which surface encoding the handshake advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceEncoding {
    /// Serialize the whole host graph: nested objects, plain data, and
    /// method markers in place.
    #[default]
    Structural,
    /// Enumerate only the callable member names at the root.
    Flat,
}

/// Producer-side handle for an in-progress multi-result call.
struct ActiveStream {
    source: Box<dyn StreamSource>,
}

/// State shared between the endpoint, its remote stubs, and the channel
/// callbacks.
pub(crate) struct Shared {
    channel: Rc<dyn Channel>,
    pub(crate) pending: PendingTable,
    streams: RefCell<HashMap<RequestId, ActiveStream>>,
    host: Option<Rc<HostObject>>,
    encoding: SurfaceEncoding,
    peer_surface: ReplySlot<Result<Surface, CallError>>,
    failure: RefCell<Option<CallError>>,
}

impl Shared {
    /// Encode and send one message, surfacing failure to the caller.
    pub(crate) fn send(&self, message: &WireMessage) -> Result<(), CallError> {
        if let Some(error) = &*self.failure.borrow() {
            return Err(error.clone());
        }
        let encoded = message.encode().map_err(|e| CallError::Serialization {
            message: e.to_string(),
        })?;
        self.channel.send(encoded).map_err(CallError::from)
    }

    /// Send a reply the peer is waiting on; a broken send here cannot be
    /// reported to the peer, so it is logged instead.
    fn send_reply(&self, message: &WireMessage) {
        if let Err(error) = self.send(message) {
            tracing::warn!(%error, "failed to send reply");
        }
    }

    /// Entry point for every delivered channel message.
    fn handle_raw(&self, message: ChannelMessage) {
        if self.failure.borrow().is_some() {
            return;
        }
        let Some(message) = WireMessage::decode(&message) else {
            tracing::trace!("ignoring unrelated channel traffic");
            return;
        };
        self.handle(message);
    }

    fn handle(&self, message: WireMessage) {
        match message {
            WireMessage::Initiate { req_id, surface } => self.handle_initiate(req_id, surface),
            WireMessage::Request { req_id, path, args } => self.handle_request(req_id, path, args),
            WireMessage::Resolve { req_id, value } => {
                self.pending.complete(req_id, Ok(value));
            }
            WireMessage::Reject { req_id, error } => {
                self.pending.complete(req_id, Err(CallError::Faulted(error)));
            }
            WireMessage::RequestNextItem { req_id } => self.handle_next_item(req_id),
            WireMessage::CancelIterator { req_id } => self.handle_cancel(req_id),
        }
    }

    fn handle_initiate(&self, req_id: RequestId, surface: Surface) {
        match surface.validate() {
            Ok(()) => {
                if !self.peer_surface.complete(Ok(surface)) {
                    tracing::debug!(req_id, "duplicate initiate; surface already received");
                }
                self.send_reply(&WireMessage::Resolve { req_id, value: None });
            }
            Err(error) => {
                let fault = Fault::new(format!("rejected surface: {error}"));
                self.peer_surface.complete(Err(CallError::Protocol {
                    message: fault.message.clone(),
                }));
                self.send_reply(&WireMessage::Reject {
                    req_id,
                    error: fault,
                });
            }
        }
    }

    fn handle_request(&self, req_id: RequestId, path: Vec<String>, args: Vec<Value>) {
        tracing::debug!(req_id, path = path.join("."), "inbound request");

        let Some(host) = self.host.as_ref().map(Rc::clone) else {
            self.send_reply(&WireMessage::Reject {
                req_id,
                error: Fault::new("endpoint exposes no host"),
            });
            return;
        };

        let method = match resolve_method(&host, &path) {
            Ok(method) => method,
            Err(fault) => {
                self.send_reply(&WireMessage::Reject {
                    req_id,
                    error: fault,
                });
                return;
            }
        };

        // No borrows held here; the method body may call back into us.
        match method.invoke(args) {
            Ok(Outcome::Single(value)) => self.send_reply(&WireMessage::Resolve {
                req_id,
                value: Some(ResolvePayload::Return { value }),
            }),
            Ok(Outcome::Stream(source)) => {
                // Register before the bare "stream opened" resolve so the
                // first RequestNextItem always finds the entry.
                self.streams
                    .borrow_mut()
                    .insert(req_id, ActiveStream { source });
                self.send_reply(&WireMessage::Resolve {
                    req_id,
                    value: None,
                });
            }
            Err(fault) => self.send_reply(&WireMessage::Reject {
                req_id,
                error: fault,
            }),
        }
    }

    fn handle_next_item(&self, req_id: RequestId) {
        let entry = self.streams.borrow_mut().remove(&req_id);
        let Some(mut stream) = entry else {
            // CancelIterator and this request crossed in flight: the stream
            // is already cancelled, which is not a protocol error and gets
            // no synthesized Reject.
            tracing::debug!(req_id, "next-item for absent stream (cancelled)");
            return;
        };

        match stream.source.next_item() {
            Some(Ok(value)) => {
                self.streams.borrow_mut().insert(req_id, stream);
                self.send_reply(&WireMessage::Resolve {
                    req_id,
                    value: Some(ResolvePayload::Item {
                        done: false,
                        value: Some(value),
                    }),
                });
            }
            None => {
                self.send_reply(&WireMessage::Resolve {
                    req_id,
                    value: Some(ResolvePayload::Item {
                        done: true,
                        value: None,
                    }),
                });
            }
            Some(Err(fault)) => {
                self.send_reply(&WireMessage::Reject {
                    req_id,
                    error: fault,
                });
            }
        }
    }

    fn handle_cancel(&self, req_id: RequestId) {
        let removed = self.streams.borrow_mut().remove(&req_id);
        match removed {
            Some(mut stream) => {
                tracing::debug!(req_id, "cancelling active stream");
                stream.source.cancel();
            }
            // Already completed naturally, or a duplicate cancel.
            None => tracing::trace!(req_id, "cancel for absent stream (no-op)"),
        }
    }

    /// Channel-failure sweep: reject everything pending, fail an unfinished
    /// handshake, run stream cancellation hooks, ignore further messages.
    fn fail(&self, error: CallError) {
        {
            let mut failure = self.failure.borrow_mut();
            if failure.is_some() {
                return;
            }
            *failure = Some(error.clone());
        }
        tracing::warn!(%error, "channel failed; sweeping endpoint state");

        self.pending.fail_all(&error);
        self.peer_surface.complete(Err(error));

        let streams: Vec<_> = {
            let mut streams = self.streams.borrow_mut();
            streams.drain().collect()
        };
        for (_, mut stream) in streams {
            stream.source.cancel();
        }
    }
}

/// One side of the connection: dispatcher plus tables over one channel.
pub struct Endpoint {
    shared: Rc<Shared>,
}

impl Endpoint {
    /// Attach to a channel, exposing `host` (or nothing) with the default
    /// structural surface encoding.
    pub fn bind(channel: Rc<dyn Channel>, host: Option<Rc<HostObject>>) -> Endpoint {
        Self::bind_with(channel, host, SurfaceEncoding::default())
    }

    /// Attach to a channel with an explicit surface encoding.
    ///
    /// Installs the channel's message and failure callbacks; the endpoint is
    /// ready to answer the peer from this point on, before any handshake.
    pub fn bind_with(
        channel: Rc<dyn Channel>,
        host: Option<Rc<HostObject>>,
        encoding: SurfaceEncoding,
    ) -> Endpoint {
        let shared = Rc::new(Shared {
            channel: Rc::clone(&channel),
            pending: PendingTable::new(),
            streams: RefCell::new(HashMap::new()),
            host,
            encoding,
            peer_surface: ReplySlot::new(),
            failure: RefCell::new(None),
        });

        let weak = Rc::downgrade(&shared);
        channel.on_message(Box::new(move |message| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_raw(message);
            }
        }));

        let weak = Rc::downgrade(&shared);
        channel.on_failure(Box::new(move |error| {
            if let Some(shared) = weak.upgrade() {
                shared.fail(CallError::from(error));
            }
        }));

        Endpoint { shared }
    }

    /// Run this endpoint's direction of the capability exchange: publish the
    /// local surface, await the peer's acknowledgement, then await the
    /// peer's own surface and return the remote stub built from it.
    ///
    /// One round trip per direction; when both sides expose a host, each
    /// runs its own exchange over the same channel and the messages
    /// interleave freely, correlated by request id. Call at most once per
    /// endpoint.
    pub async fn handshake(&self) -> Result<RemoteObject, CallError> {
        let shared = &self.shared;
        {
            let failure = shared.failure.borrow();
            if let Some(error) = &*failure {
                return Err(error.clone());
            }
        }

        let surface = match (&shared.host, shared.encoding) {
            (Some(host), SurfaceEncoding::Structural) => describe(host),
            (Some(host), SurfaceEncoding::Flat) => describe_flat(host),
            // An endpoint with nothing to expose still initiates, so the
            // peer's handshake completes in one round trip.
            (None, _) => Surface::Tree {
                nodes: vec![SurfaceNode {
                    members: BTreeMap::new(),
                }],
            },
        };

        let req_id = shared.pending.allocate();
        let slot = Rc::new(ReplySlot::new());
        shared.pending.register(req_id, slot.clone());
        if let Err(error) = shared.send(&WireMessage::Initiate { req_id, surface }) {
            shared.pending.remove(req_id);
            return Err(error);
        }

        match slot.take().await? {
            None => {}
            Some(_) => {
                return Err(CallError::Protocol {
                    message: "handshake acknowledgement carried a payload".to_string(),
                });
            }
        }

        let surface = shared.peer_surface.take().await?;
        Ok(RemoteObject::from_surface(Rc::clone(shared), surface))
    }

    /// Number of locally-issued requests still awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Number of streams this endpoint is currently producing.
    pub fn active_stream_count(&self) -> usize {
        self.shared.streams.borrow().len()
    }
}
