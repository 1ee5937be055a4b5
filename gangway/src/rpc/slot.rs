//! ReplySlot: a one-shot cell with waker-based notification.
//!
//! The suspension point for every pending operation: a call registers a slot
//! before its request is sent, the dispatcher completes it when the matching
//! Resolve or Reject arrives, and the caller's future wakes. Uses `RefCell`
//! for the single-threaded runtime — no locks within one endpoint.

use std::cell::RefCell;
use std::future::poll_fn;
use std::task::{Context, Poll, Waker};

/// One-shot value cell shared between a waiting future and the dispatcher.
pub struct ReplySlot<T> {
    inner: RefCell<SlotInner<T>>,
}

struct SlotInner<T> {
    /// The delivered value, if not yet taken.
    value: Option<T>,

    /// Waker of the consumer, registered while waiting.
    waker: Option<Waker>,

    /// Set once the first `complete` lands; later completions are dropped.
    completed: bool,
}

impl<T> Default for ReplySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReplySlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(SlotInner {
                value: None,
                waker: None,
                completed: false,
            }),
        }
    }

    /// Deliver the value, waking the waiting consumer.
    ///
    /// A slot completes at most once; a second delivery is dropped and
    /// reported by the `false` return.
    pub fn complete(&self, value: T) -> bool {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            if inner.completed {
                return false;
            }
            inner.completed = true;
            inner.value = Some(value);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Whether a value has been delivered (even if already taken).
    pub fn is_completed(&self) -> bool {
        self.inner.borrow().completed
    }

    /// Poll for the delivered value, registering the waker while pending.
    pub fn poll_take(&self, cx: &mut Context<'_>) -> Poll<T> {
        let mut inner = self.inner.borrow_mut();
        match inner.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    /// Wait for the delivered value.
    ///
    /// Never resolves if no one completes the slot; abandoning the wait is
    /// the caller's concern (a stalled peer leaves calls pending forever
    /// unless the channel's failure signal fires).
    pub async fn take(&self) -> T {
        poll_fn(|cx| self.poll_take(cx)).await
    }
}
