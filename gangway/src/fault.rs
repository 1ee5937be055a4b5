//! Fault: the serialized form of a failure crossing the channel.
//!
//! Generic structural cloning does not reliably carry `message` and `stack`
//! across a message boundary, so failures get dedicated handling: an exposed
//! method that fails produces a [`Fault`] carrying the message, an optional
//! stack rendering, and every enumerable field the failure value had. The
//! receiving endpoint hands the fault to the caller as an error value that
//! prints like a local failure.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A failure value in transmissible form.
///
/// Produced on the endpoint where a method failed, consumed on the endpoint
/// that awaited the call. Extra fields round-trip verbatim, so a fault
/// carrying `code = 42` exposes `code = 42` on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    /// Human-readable description of the failure.
    pub message: String,

    /// Stack rendering captured where the failure occurred, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Enumerable fields of the original failure value.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Fault {
    /// Create a fault with the given message and no extra fields.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            fields: BTreeMap::new(),
        }
    }

    /// Attach a stack rendering.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attach an enumerable field.
    ///
    /// Values that cannot be serialized are skipped rather than aborting the
    /// fault itself; a fault must always be transmissible.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.fields.insert(name.into(), value);
        }
        self
    }

    /// Look up an enumerable field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Fault {}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Fault::new(format!("serialization failed: {err}"))
    }
}
