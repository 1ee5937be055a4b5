//! Request correlation, dispatch, and the consumer-side call surface.
//!
//! [`Endpoint`] owns one side of the connection: it decodes every delivered
//! message, answers inbound requests against the local host graph, and
//! completes the [`PendingTable`] entries of outbound ones. [`RemoteObject`]
//! and [`RemoteStream`] are the consumer-facing handles built on top.

mod endpoint;
mod pending;
mod remote;
mod slot;
mod stream;

pub use endpoint::{Endpoint, SurfaceEncoding};
pub use pending::{CallResult, PendingTable};
pub use remote::{CallReturn, PendingCall, RemoteObject};
pub use slot::ReplySlot;
pub use stream::RemoteStream;
