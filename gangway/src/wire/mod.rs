//! Wire protocol: the closed set of message shapes crossing the channel.
//!
//! Every message carries a request identifier for correlation. Identifiers
//! are scoped to the endpoint that allocated them; the two endpoints' id
//! spaces are independent and never compared to each other.
//!
//! Messages travel as structured JSON values. A delivered value that does
//! not decode as one of these shapes is ignored rather than treated as an
//! error, which lets a channel carry unrelated traffic alongside the
//! protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::ChannelMessage;
use crate::fault::Fault;

/// Per-endpoint monotonic correlation key.
pub type RequestId = u64;

/// One member position in a serialized surface node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurfaceMember {
    /// Plain data exposed alongside methods.
    Data {
        /// The cloned value.
        value: Value,
    },
    /// A callable member; the function itself never crosses the channel,
    /// only this marker at its path.
    Method,
    /// A nested object, referenced by index into the node table.
    Object {
        /// Index of the referenced node.
        node: usize,
    },
}

/// One object in a serialized surface: its named members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceNode {
    /// Member name to member description.
    pub members: BTreeMap<String, SurfaceMember>,
}

/// The serialized shape of an exposed object graph.
///
/// Two encodings are accepted. `Flat` enumerates the callable member names
/// reachable at the root. `Tree` serializes the whole graph as a node table:
/// nested objects are referenced by index, so a graph reachable twice is
/// emitted once, and circular graphs serialize without recursion. Node 0 is
/// the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// Callable member names at the root, nothing nested.
    Flat(Vec<String>),
    /// Full structural clone as a node table.
    Tree {
        /// Node table; node 0 is the root.
        nodes: Vec<SurfaceNode>,
    },
}

impl Surface {
    /// Check structural well-formedness: a non-empty node table whose object
    /// references all stay in range.
    pub fn validate(&self) -> Result<(), WireError> {
        match self {
            Surface::Flat(_) => Ok(()),
            Surface::Tree { nodes } => {
                if nodes.is_empty() {
                    return Err(WireError::MalformedSurface {
                        message: "empty node table".to_string(),
                    });
                }
                for (index, node) in nodes.iter().enumerate() {
                    for (name, member) in &node.members {
                        if let SurfaceMember::Object { node: target } = member {
                            if *target >= nodes.len() {
                                return Err(WireError::MalformedSurface {
                                    message: format!(
                                        "node {index} member {name} references node {target} \
                                         out of range ({} nodes)",
                                        nodes.len()
                                    ),
                                });
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Normalize to a node table. A flat surface becomes a single root node
    /// whose every name is a method marker.
    pub fn into_nodes(self) -> Vec<SurfaceNode> {
        match self {
            Surface::Tree { nodes } => nodes,
            Surface::Flat(names) => {
                let members = names
                    .into_iter()
                    .map(|name| (name, SurfaceMember::Method))
                    .collect();
                vec![SurfaceNode { members }]
            }
        }
    }
}

/// Payload of a successful [`WireMessage::Resolve`].
///
/// The result kind is decided once, on the producing endpoint: a plain
/// return value or one step of a stream. A `Resolve` carrying no payload at
/// all is a bare acknowledgement (handshake ack, or "stream opened").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvePayload {
    /// The call's single return value.
    Return {
        /// The returned value.
        value: Value,
    },
    /// One step of a stream opened by the same request id.
    Item {
        /// True when the producer is exhausted; `value` is then absent.
        done: bool,
        /// The produced element, absent on the final step.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

/// The closed message set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    /// "Here is what I expose; acknowledge."
    Initiate {
        /// Correlation id allocated by the sender.
        req_id: RequestId,
        /// The sender's exposed surface.
        surface: Surface,
    },
    /// "Invoke the member at `path` with `args`."
    Request {
        /// Correlation id allocated by the sender.
        req_id: RequestId,
        /// Member names from the surface root to the callable.
        path: Vec<String>,
        /// Call arguments.
        args: Vec<Value>,
    },
    /// "Call or iteration step succeeded."
    Resolve {
        /// Id of the request being completed.
        req_id: RequestId,
        /// Result payload; absent for bare acknowledgements.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<ResolvePayload>,
    },
    /// "Call or iteration step failed."
    Reject {
        /// Id of the request being completed.
        req_id: RequestId,
        /// The serialized failure.
        error: Fault,
    },
    /// "Produce the next item of the stream opened by this id."
    RequestNextItem {
        /// Id of the opening request.
        req_id: RequestId,
    },
    /// "Stop producing; release resources." Fire-and-forget, no reply.
    CancelIterator {
        /// Id of the opening request.
        req_id: RequestId,
    },
}

impl WireMessage {
    /// Encode into a channel message.
    pub fn encode(&self) -> Result<ChannelMessage, WireError> {
        serde_json::to_value(self).map_err(|e| WireError::Encode {
            message: e.to_string(),
        })
    }

    /// Decode a delivered channel message.
    ///
    /// Returns `None` for anything outside the message set; such traffic is
    /// ignored by the dispatcher.
    pub fn decode(message: &ChannelMessage) -> Option<WireMessage> {
        serde_json::from_value(message.clone()).ok()
    }
}

/// Wire-level error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WireError {
    /// A value could not be encoded for transmission.
    #[error("encode failed: {message}")]
    Encode {
        /// Details from the serializer.
        message: String,
    },

    /// A received surface descriptor is structurally invalid.
    #[error("malformed surface: {message}")]
    MalformedSurface {
        /// Details about the malformation.
        message: String,
    },
}
