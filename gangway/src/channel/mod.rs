//! The message channel contract consumed by the RPC core.
//!
//! A channel is anything that can carry discrete structured messages between
//! two endpoints: a worker, a socket, a pipe. The core only requires:
//!
//! - `send`: best-effort enqueue of one message
//! - `on_message`: delivery of the peer's messages, in send order, each
//!   exactly once
//! - `on_failure`: an out-of-band signal that the channel is permanently
//!   broken, fired at most once per channel lifetime
//!
//! Messages are structured JSON values; the core ignores any delivered value
//! that does not parse as one of its wire messages, so a channel may carry
//! unrelated traffic alongside the protocol.

mod local;

pub use local::LocalChannel;

use serde_json::Value;

/// The unit of transmission: one structured message.
pub type ChannelMessage = Value;

/// Errors reported by a channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// The channel is permanently broken (e.g. the peer process terminated).
    #[error("channel closed: {reason}")]
    Closed {
        /// Reason the channel reported.
        reason: String,
    },

    /// A single send could not be enqueued.
    #[error("send failed: {reason}")]
    SendFailed {
        /// Reason the channel reported.
        reason: String,
    },
}

/// A bidirectional, message-oriented transport between two endpoints.
///
/// Implementations promise: a sent message is eventually delivered to the
/// peer's `on_message` handler in send order, or never (channel failure) —
/// never duplicated, never reordered relative to other messages on the same
/// channel instance.
pub trait Channel {
    /// Enqueue one message for the peer. May itself fail; the failure is
    /// surfaced to the specific operation that attempted the send.
    fn send(&self, message: ChannelMessage) -> Result<(), ChannelError>;

    /// Install the handler invoked for every message the peer sent.
    ///
    /// Messages that arrive before a handler is installed must be buffered
    /// and replayed, in order, once one is.
    fn on_message(&self, handler: Box<dyn Fn(ChannelMessage)>);

    /// Install the handler invoked once if the channel permanently fails.
    fn on_failure(&self, handler: Box<dyn Fn(ChannelError)>);
}
