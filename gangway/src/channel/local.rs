//! In-process channel pair for tests and same-process endpoints.
//!
//! [`LocalChannel::pair`] returns two connected halves. Delivery is
//! synchronous: `send` on one half invokes the other half's message handler
//! before returning. Messages sent before the peer installed a handler are
//! buffered and replayed in order, preserving the channel contract.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use super::{Channel, ChannelError, ChannelMessage};

/// One half of an in-process channel pair.
pub struct LocalChannel {
    inner: Rc<Inner>,
}

struct Inner {
    peer: RefCell<Weak<Inner>>,
    handler: RefCell<Option<Box<dyn Fn(ChannelMessage)>>>,
    on_failure: RefCell<Option<Box<dyn Fn(ChannelError)>>>,
    backlog: RefCell<VecDeque<ChannelMessage>>,
    failed: RefCell<Option<ChannelError>>,
}

impl Inner {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            peer: RefCell::new(Weak::new()),
            handler: RefCell::new(None),
            on_failure: RefCell::new(None),
            backlog: RefCell::new(VecDeque::new()),
            failed: RefCell::new(None),
        })
    }

    /// Deliver one message from the peer: hand it to the handler, or buffer
    /// it until one is installed. Messages after failure are dropped.
    fn deliver(&self, message: ChannelMessage) {
        if self.failed.borrow().is_some() {
            tracing::trace!("dropping delivery on failed channel");
            return;
        }
        // Multiple shared borrows are fine if the handler re-enters deliver.
        let handler = self.handler.borrow();
        match &*handler {
            Some(handler) => handler(message),
            None => {
                drop(handler);
                self.backlog.borrow_mut().push_back(message);
            }
        }
    }

    /// Mark this half failed and fire its failure handler once.
    fn fail(&self, error: ChannelError) {
        {
            let mut failed = self.failed.borrow_mut();
            if failed.is_some() {
                return;
            }
            *failed = Some(error.clone());
        }
        let on_failure = self.on_failure.borrow();
        if let Some(on_failure) = &*on_failure {
            on_failure(error);
        }
    }
}

impl LocalChannel {
    /// Create a connected pair of channel halves.
    pub fn pair() -> (LocalChannel, LocalChannel) {
        let a = Inner::new();
        let b = Inner::new();
        *a.peer.borrow_mut() = Rc::downgrade(&b);
        *b.peer.borrow_mut() = Rc::downgrade(&a);
        (LocalChannel { inner: a }, LocalChannel { inner: b })
    }

    /// Permanently break the channel, firing both halves' failure handlers.
    ///
    /// Subsequent sends fail and buffered or in-flight deliveries are
    /// dropped, mimicking an abruptly terminated peer.
    pub fn break_channel(&self, reason: &str) {
        let error = ChannelError::Closed {
            reason: reason.to_string(),
        };
        if let Some(peer) = self.inner.peer.borrow().upgrade() {
            peer.fail(error.clone());
        }
        self.inner.fail(error);
    }
}

impl Channel for LocalChannel {
    fn send(&self, message: ChannelMessage) -> Result<(), ChannelError> {
        if let Some(error) = &*self.inner.failed.borrow() {
            return Err(ChannelError::SendFailed {
                reason: error.to_string(),
            });
        }
        match self.inner.peer.borrow().upgrade() {
            Some(peer) => {
                peer.deliver(message);
                Ok(())
            }
            None => Err(ChannelError::SendFailed {
                reason: "peer endpoint dropped".to_string(),
            }),
        }
    }

    fn on_message(&self, handler: Box<dyn Fn(ChannelMessage)>) {
        *self.inner.handler.borrow_mut() = Some(handler);
        // Replay anything the peer sent before we were listening.
        loop {
            let Some(message) = self.inner.backlog.borrow_mut().pop_front() else {
                break;
            };
            self.inner.deliver(message);
        }
    }

    fn on_failure(&self, handler: Box<dyn Fn(ChannelError)>) {
        *self.inner.on_failure.borrow_mut() = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_send_delivers_to_peer_handler() {
        let (a, b) = LocalChannel::pair();
        let seen: Rc<RefCell<Vec<ChannelMessage>>> = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = seen.clone();
        b.on_message(Box::new(move |msg| seen_clone.borrow_mut().push(msg)));

        a.send(json!({"hello": 1})).expect("send");
        assert_eq!(seen.borrow().as_slice(), &[json!({"hello": 1})]);
    }

    #[test]
    fn test_messages_before_handler_are_buffered_in_order() {
        let (a, b) = LocalChannel::pair();
        a.send(json!(1)).expect("send");
        a.send(json!(2)).expect("send");

        let seen: Rc<RefCell<Vec<ChannelMessage>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        b.on_message(Box::new(move |msg| seen_clone.borrow_mut().push(msg)));

        assert_eq!(seen.borrow().as_slice(), &[json!(1), json!(2)]);
    }

    #[test]
    fn test_break_channel_fires_both_failure_handlers_once() {
        let (a, b) = LocalChannel::pair();
        let fired: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));

        for half in [&a, &b] {
            let fired_clone = fired.clone();
            half.on_failure(Box::new(move |_| *fired_clone.borrow_mut() += 1));
        }

        a.break_channel("peer terminated");
        a.break_channel("peer terminated");
        assert_eq!(*fired.borrow(), 2);
    }

    #[test]
    fn test_send_after_failure_errors() {
        let (a, b) = LocalChannel::pair();
        b.on_message(Box::new(|_| {}));

        a.break_channel("gone");
        assert!(a.send(json!(1)).is_err());
    }

    #[test]
    fn test_send_to_dropped_peer_errors() {
        let (a, b) = LocalChannel::pair();
        drop(b);
        assert!(a.send(json!(1)).is_err());
    }
}
