//! Remote stubs: navigating and invoking the peer's exposed surface.
//!
//! A [`RemoteObject`] is a cursor over the peer's serialized node table. It
//! holds no live references to peer state — only the table, a node index,
//! and the member path walked so far — so circular peer graphs cost nothing
//! here. Invocation sends a `Request` carrying that path and hands back a
//! [`PendingCall`] future; registration in the pending table happens before
//! the send, so even an instantly-delivered reply finds its slot.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use serde_json::Value;

use crate::error::CallError;
use crate::wire::{RequestId, ResolvePayload, Surface, SurfaceMember, SurfaceNode, WireMessage};

use super::endpoint::Shared;
use super::pending::CallResult;
use super::slot::ReplySlot;
use super::stream::RemoteStream;

/// Stub for one object in the peer's exposed graph.
///
/// Cloning is cheap; clones share the underlying endpoint and node table.
#[derive(Clone)]
pub struct RemoteObject {
    shared: Rc<Shared>,
    nodes: Rc<Vec<SurfaceNode>>,
    node: usize,
    path: Vec<String>,
}

impl RemoteObject {
    /// Build the root stub from a validated surface.
    pub(crate) fn from_surface(shared: Rc<Shared>, surface: Surface) -> RemoteObject {
        RemoteObject {
            shared,
            nodes: Rc::new(surface.into_nodes()),
            node: 0,
            path: Vec::new(),
        }
    }

    fn members(&self) -> &SurfaceNode {
        &self.nodes[self.node]
    }

    fn joined_path(&self, name: &str) -> String {
        let mut joined = self.path.join(".");
        if !joined.is_empty() {
            joined.push('.');
        }
        joined.push_str(name);
        joined
    }

    /// Whether the peer exposes a callable member `name` on this object.
    pub fn has_method(&self, name: &str) -> bool {
        matches!(
            self.members().members.get(name),
            Some(SurfaceMember::Method)
        )
    }

    /// Names of the callable members on this object, in surface order.
    pub fn method_names(&self) -> Vec<String> {
        self.members()
            .members
            .iter()
            .filter_map(|(name, member)| match member {
                SurfaceMember::Method => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Plain data exposed under `name`, if any.
    pub fn data(&self, name: &str) -> Option<Value> {
        match self.members().members.get(name) {
            Some(SurfaceMember::Data { value }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Descend into the nested object exposed under `name`.
    ///
    /// Following a circular reference yields a stub for the same node; the
    /// accumulated path grows, the table does not.
    pub fn object(&self, name: &str) -> Option<RemoteObject> {
        match self.members().members.get(name) {
            Some(SurfaceMember::Object { node }) => {
                let mut path = self.path.clone();
                path.push(name.to_string());
                Some(RemoteObject {
                    shared: Rc::clone(&self.shared),
                    nodes: Rc::clone(&self.nodes),
                    node: *node,
                    path,
                })
            }
            _ => None,
        }
    }

    /// Invoke the callable member `name` with `args`.
    ///
    /// The request goes out eagerly; the returned future only waits for its
    /// completion. Calling a name the surface does not mark callable fails
    /// locally, without touching the channel.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<PendingCall, CallError> {
        if !self.has_method(name) {
            return Err(CallError::NoSuchMethod {
                path: self.joined_path(name),
            });
        }

        let mut path = self.path.clone();
        path.push(name.to_string());

        let req_id = self.shared.pending.allocate();
        let slot = Rc::new(ReplySlot::new());
        self.shared.pending.register(req_id, slot.clone());
        tracing::debug!(req_id, path = path.join("."), "outbound request");
        if let Err(error) = self.shared.send(&WireMessage::Request { req_id, path, args }) {
            self.shared.pending.remove(req_id);
            return Err(error);
        }

        Ok(PendingCall {
            shared: Rc::clone(&self.shared),
            req_id,
            slot,
        })
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("node", &self.node)
            .field("path", &self.path)
            .finish()
    }
}

/// An in-flight call, resolved by the dispatcher when the matching Resolve
/// or Reject arrives.
///
/// Dropping the future abandons the wait; the pending entry is cleaned up
/// when the reply eventually arrives (or the channel fails).
pub struct PendingCall {
    shared: Rc<Shared>,
    req_id: RequestId,
    slot: Rc<ReplySlot<CallResult>>,
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("req_id", &self.req_id)
            .finish()
    }
}

impl Future for PendingCall {
    type Output = Result<CallReturn, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match self.slot.poll_take(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        let outcome = match result {
            Ok(Some(ResolvePayload::Return { value })) => Ok(CallReturn::Value(value)),
            // A bare resolve to a call means the peer opened a stream.
            Ok(None) => Ok(CallReturn::Stream(RemoteStream::new(
                Rc::clone(&self.shared),
                self.req_id,
            ))),
            Ok(Some(ResolvePayload::Item { .. })) => Err(CallError::Protocol {
                message: "stream item delivered to a call awaiting its return value".to_string(),
            }),
            Err(error) => Err(error),
        };
        Poll::Ready(outcome)
    }
}

/// How a completed call resolved: the result kind the peer decided when the
/// method returned.
#[derive(Debug)]
pub enum CallReturn {
    /// A single value.
    Value(Value),
    /// A stream handle; pull items with [`RemoteStream::next`].
    Stream(RemoteStream),
}

impl CallReturn {
    /// Unwrap a single value, failing if the peer opened a stream instead.
    pub fn into_value(self) -> Result<Value, CallError> {
        match self {
            CallReturn::Value(value) => Ok(value),
            CallReturn::Stream(_) => Err(CallError::Protocol {
                message: "call resolved to a stream, not a single value".to_string(),
            }),
        }
    }

    /// Unwrap a stream handle, failing if the peer returned a single value.
    pub fn into_stream(self) -> Result<RemoteStream, CallError> {
        match self {
            CallReturn::Stream(stream) => Ok(stream),
            CallReturn::Value(_) => Err(CallError::Protocol {
                message: "call resolved to a single value, not a stream".to_string(),
            }),
        }
    }
}
