//! The exposed-object model: what an endpoint offers to its peer.
//!
//! A host states its callable surface explicitly — members are registered by
//! name, never discovered by reflection — so the surface is fixed when the
//! handshake serializes it, and inbound dispatch is a plain tree walk.

mod describe;
mod host;

pub use describe::{describe, describe_flat};
pub(crate) use describe::resolve_method;
pub use host::{HostMember, HostMethod, HostObject, IterSource, Outcome, StreamSource};
