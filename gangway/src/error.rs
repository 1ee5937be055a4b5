//! Error types surfaced to callers of the RPC layer.

use crate::channel::ChannelError;
use crate::fault::Fault;

/// Errors surfaced at a call site (an awaited call, a stream step, or the
/// handshake).
///
/// Every failure of a remote operation lands at the exact call site that
/// triggered it; nothing is silently dropped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// The exposed method itself failed; the fault carries the original
    /// message, stack, and enumerable fields.
    #[error("remote fault: {0}")]
    Faulted(Fault),

    /// No member at the requested path is marked callable on the surface.
    #[error("no such method: {path}")]
    NoSuchMethod {
        /// Dot-joined path that failed to resolve.
        path: String,
    },

    /// The peer violated the protocol (unexpected payload shape for the
    /// pending operation).
    #[error("protocol violation: {message}")]
    Protocol {
        /// Details about the violation.
        message: String,
    },

    /// A value could not be serialized for transmission.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Details about the serialization failure.
        message: String,
    },

    /// The channel failed before the operation completed.
    #[error("channel closed: {reason}")]
    ChannelClosed {
        /// Reason reported by the channel's failure signal.
        reason: String,
    },

    /// The outbound send for this specific operation failed.
    #[error("send failed: {reason}")]
    SendFailed {
        /// Reason reported by the channel.
        reason: String,
    },
}

impl From<Fault> for CallError {
    fn from(fault: Fault) -> Self {
        CallError::Faulted(fault)
    }
}

impl From<ChannelError> for CallError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed { reason } => CallError::ChannelClosed { reason },
            ChannelError::SendFailed { reason } => CallError::SendFailed { reason },
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faulted_display_carries_message() {
        let err = CallError::from(Fault::new("boom"));
        assert_eq!(err.to_string(), "remote fault: boom");
    }

    #[test]
    fn test_channel_error_conversion() {
        let err: CallError = ChannelError::Closed {
            reason: "peer terminated".into(),
        }
        .into();
        assert!(matches!(err, CallError::ChannelClosed { .. }));

        let err: CallError = ChannelError::SendFailed {
            reason: "buffer gone".into(),
        }
        .into();
        assert!(matches!(err, CallError::SendFailed { .. }));
    }
}
