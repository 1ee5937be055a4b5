//! Host-side object graph: the local half of a capability exchange.
//!
//! A [`HostObject`] holds named members: plain data, callable methods, and
//! nested objects. Nested objects are shared `Rc`s, so the same object may
//! appear at several positions and graphs may be circular
//! (`a.child("self", a.clone())`); serialization deduplicates by identity.
//!
//! Methods return an explicit [`Outcome`] — a single value or a stream
//! handle — decided once when the method returns, or fail with a
//! [`Fault`]. Streams are pulled one element at a time by the remote
//! consumer and carry an early-termination hook for cancellation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::fault::Fault;

/// Result of invoking a host method: the explicit sum the protocol needs,
/// instead of duck-typed detection of iterable results.
pub enum Outcome {
    /// A single return value.
    Single(Value),
    /// A lazily-pulled sequence of values.
    Stream(Box<dyn StreamSource>),
}

impl Outcome {
    /// Build a single-value outcome from anything serializable.
    ///
    /// Serialization failure surfaces as the call's fault, never silently.
    pub fn single(value: impl Serialize) -> Result<Outcome, Fault> {
        Ok(Outcome::Single(serde_json::to_value(value)?))
    }

    /// Build a stream outcome from a source.
    pub fn stream(source: impl StreamSource + 'static) -> Outcome {
        Outcome::Stream(Box::new(source))
    }

    /// Build a stream outcome from an iterator of values.
    pub fn items<I>(iter: I) -> Outcome
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        Outcome::Stream(Box::new(IterSource::new(iter.into_iter())))
    }
}

/// Producer side of a streaming method result.
///
/// Pulled strictly one element at a time; the consumer never receives an
/// element it has not asked for.
pub trait StreamSource {
    /// Pull the next element. `None` means exhausted; an `Err` step ends the
    /// stream with a fault delivered to the consumer.
    fn next_item(&mut self) -> Option<Result<Value, Fault>>;

    /// Early-termination hook, invoked once if the consumer cancels before
    /// exhaustion. Release held resources here.
    fn cancel(&mut self) {}
}

/// Adapts any iterator of values into a [`StreamSource`].
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I> {
    /// Wrap an iterator.
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I: Iterator<Item = Value>> StreamSource for IterSource<I> {
    fn next_item(&mut self) -> Option<Result<Value, Fault>> {
        self.iter.next().map(Ok)
    }
}

/// A callable member of a host object.
pub struct HostMethod {
    f: Box<dyn Fn(Vec<Value>) -> Result<Outcome, Fault>>,
}

impl std::fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMethod").finish_non_exhaustive()
    }
}

impl HostMethod {
    pub(crate) fn invoke(&self, args: Vec<Value>) -> Result<Outcome, Fault> {
        (self.f)(args)
    }
}

/// One named member of a [`HostObject`].
#[derive(Clone)]
pub enum HostMember {
    /// Plain data, cloned into the surface at handshake time.
    Data(Value),
    /// A callable, marked (not transmitted) in the surface.
    Method(Rc<HostMethod>),
    /// A nested object, shared by reference.
    Object(Rc<HostObject>),
}

/// An exposable object: a named-member map behind interior mutability so
/// circular graphs can be wired up after construction.
#[derive(Default)]
pub struct HostObject {
    members: RefCell<BTreeMap<String, HostMember>>,
}

impl HostObject {
    /// Create an empty host object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose plain data under `name`.
    pub fn data(&self, name: impl Into<String>, value: impl Serialize) -> Result<(), Fault> {
        let value = serde_json::to_value(value)?;
        self.members
            .borrow_mut()
            .insert(name.into(), HostMember::Data(value));
        Ok(())
    }

    /// Expose a callable under `name`.
    pub fn method(
        &self,
        name: impl Into<String>,
        f: impl Fn(Vec<Value>) -> Result<Outcome, Fault> + 'static,
    ) {
        self.members.borrow_mut().insert(
            name.into(),
            HostMember::Method(Rc::new(HostMethod { f: Box::new(f) })),
        );
    }

    /// Expose a nested object under `name`. Passing a clone of an ancestor's
    /// `Rc` creates a circular graph, which serializes by reference.
    pub fn child(&self, name: impl Into<String>, object: Rc<HostObject>) {
        self.members
            .borrow_mut()
            .insert(name.into(), HostMember::Object(object));
    }

    /// Look up one member by name.
    pub(crate) fn member(&self, name: &str) -> Option<HostMember> {
        self.members.borrow().get(name).cloned()
    }

    /// Snapshot the member map, used when serializing the surface.
    pub(crate) fn snapshot(&self) -> BTreeMap<String, HostMember> {
        self.members.borrow().clone()
    }
}
