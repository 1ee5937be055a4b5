//! # Gangway
//!
//! Symmetric RPC over a single bidirectional message channel.
//!
//! Both sides of a connection run the same [`Endpoint`]; there is no client
//! or server role. Each endpoint may expose a [`HostObject`] graph, and each
//! obtains a [`RemoteObject`] stub for whatever the peer exposes after a
//! capability handshake. Calls correlate by per-endpoint request ids,
//! methods resolve to a single value or a pull-based stream, and failures
//! travel as structured [`Fault`]s.
//!
//! This crate provides:
//! - **Channel**: The minimal transport contract ([`Channel`]) plus an
//!   in-process [`LocalChannel`] pair
//! - **Wire format**: The closed JSON message set with circular-safe
//!   surface serialization
//! - **Surface**: Explicitly-declared host object graphs and path dispatch
//! - **RPC primitives**: Handshake, request correlation, streaming with
//!   cancellation

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// The transport contract and the in-process channel pair.
pub mod channel;

/// Consumer-facing call errors.
pub mod error;

/// Structured, serializable failure values.
pub mod fault;

/// Endpoints, pending-call correlation, remote stubs, and streams.
pub mod rpc;

/// Host-side object graphs and their serialization.
pub mod surface;

/// The wire message set.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Channel exports
pub use channel::{Channel, ChannelError, ChannelMessage, LocalChannel};

// Error exports
pub use error::CallError;
pub use fault::Fault;

// Surface exports
pub use surface::{HostObject, IterSource, Outcome, StreamSource};

// RPC exports
pub use rpc::{CallReturn, Endpoint, PendingCall, RemoteObject, RemoteStream, SurfaceEncoding};

// Wire exports
pub use wire::{RequestId, ResolvePayload, Surface, WireMessage};
