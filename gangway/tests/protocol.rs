//! Wire-level tests against a scripted channel.
//!
//! These tests drive an endpoint through the [`Channel`] trait directly,
//! asserting the exact JSON shapes it emits and its tolerance for hostile
//! delivery orders: instant replies, reordering, and duplicates.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};

use gangway::{
    Channel, ChannelError, ChannelMessage, Endpoint, Fault, HostObject, Outcome, RemoteObject,
    ResolvePayload, Surface, WireMessage,
};

/// Channel half that records sends and lets the test inject deliveries.
#[derive(Default)]
struct ScriptedChannel {
    sent: RefCell<Vec<ChannelMessage>>,
    handler: RefCell<Option<Box<dyn Fn(ChannelMessage)>>>,
}

impl ScriptedChannel {
    fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn sent_raw(&self) -> Vec<ChannelMessage> {
        self.sent.borrow().clone()
    }

    fn deliver(&self, message: WireMessage) {
        let encoded = message.encode().expect("encode");
        let handler = self.handler.borrow();
        handler.as_ref().expect("handler installed")(encoded);
    }
}

impl Channel for ScriptedChannel {
    fn send(&self, message: ChannelMessage) -> Result<(), ChannelError> {
        self.sent.borrow_mut().push(message);
        Ok(())
    }

    fn on_message(&self, handler: Box<dyn Fn(ChannelMessage)>) {
        *self.handler.borrow_mut() = Some(handler);
    }

    fn on_failure(&self, _handler: Box<dyn Fn(ChannelError)>) {}
}

/// Complete the endpoint's handshake by hand, playing the peer: ack its
/// Initiate and publish a flat surface with the given method names.
async fn scripted_handshake(
    endpoint: &Endpoint,
    channel: &ScriptedChannel,
    methods: &[&str],
) -> RemoteObject {
    let handshake = endpoint.handshake();
    tokio::pin!(handshake);

    let poll = futures_poll_once(handshake.as_mut()).await;
    assert!(poll.is_none(), "handshake must wait for the peer");

    channel.deliver(WireMessage::Resolve {
        req_id: 0,
        value: None,
    });
    channel.deliver(WireMessage::Initiate {
        req_id: 0,
        surface: Surface::Flat(methods.iter().map(|m| m.to_string()).collect()),
    });

    handshake.await.expect("handshake")
}

/// Poll a future exactly once.
async fn futures_poll_once<F: std::future::Future>(
    future: std::pin::Pin<&mut F>,
) -> Option<F::Output> {
    let mut future = Some(future);
    std::future::poll_fn(move |cx| {
        let output = match future.take().expect("polled once").poll(cx) {
            std::task::Poll::Ready(output) => Some(output),
            std::task::Poll::Pending => None,
        };
        std::task::Poll::Ready(output)
    })
    .await
}

#[tokio::test]
async fn test_request_wire_shape() {
    let channel = ScriptedChannel::new();
    let endpoint = Endpoint::bind(channel.clone(), None);
    let remote = scripted_handshake(&endpoint, &channel, &["add"]).await;

    let _call = remote
        .invoke("add", vec![json!(1), json!(2)])
        .expect("invoke");

    let raw = channel.sent_raw();
    let request = raw.last().expect("request sent");
    assert_eq!(request["kind"], "request");
    assert_eq!(request["req_id"], 1, "ids are monotonic after the handshake");
    assert_eq!(request["path"], json!(["add"]));
    assert_eq!(request["args"], json!([1, 2]));
}

#[tokio::test]
async fn test_initiate_wire_shape_for_empty_host() {
    let channel = ScriptedChannel::new();
    let endpoint = Endpoint::bind(channel.clone(), None);

    let handshake = endpoint.handshake();
    tokio::pin!(handshake);
    futures_poll_once(handshake.as_mut()).await;

    let raw = channel.sent_raw();
    let initiate = &raw[0];
    assert_eq!(initiate["kind"], "initiate");
    assert_eq!(initiate["req_id"], 0, "handshake takes the first id");
    // An endpoint with no host still publishes a (single, empty) root node.
    assert_eq!(initiate["surface"]["tree"]["nodes"], json!([{"members": {}}]));
}

#[tokio::test]
async fn test_structural_surface_wire_shape() {
    let host = Rc::new(HostObject::new());
    host.data("version", 2).expect("data");
    host.method("ping", |_| Outcome::single("pong"));
    host.child("this", host.clone());

    let channel = ScriptedChannel::new();
    let endpoint = Endpoint::bind(channel.clone(), Some(host));

    let handshake = endpoint.handshake();
    tokio::pin!(handshake);
    futures_poll_once(handshake.as_mut()).await;

    let raw = channel.sent_raw();
    let nodes = &raw[0]["surface"]["tree"]["nodes"];
    assert_eq!(
        nodes,
        &json!([{
            "members": {
                "ping": {"kind": "method"},
                "this": {"kind": "object", "node": 0},
                "version": {"kind": "data", "value": 2},
            }
        }]),
        "circular member serializes as an index, not a nested copy"
    );
}

#[tokio::test]
async fn test_reordered_replies_correlate_by_id() {
    let channel = ScriptedChannel::new();
    let endpoint = Endpoint::bind(channel.clone(), None);
    let remote = scripted_handshake(&endpoint, &channel, &["get"]).await;

    let first = remote.invoke("get", vec![json!("a")]).expect("invoke");
    let second = remote.invoke("get", vec![json!("b")]).expect("invoke");

    // Peer answers in reverse order.
    channel.deliver(WireMessage::Resolve {
        req_id: 2,
        value: Some(ResolvePayload::Return { value: json!("b") }),
    });
    channel.deliver(WireMessage::Resolve {
        req_id: 1,
        value: Some(ResolvePayload::Return { value: json!("a") }),
    });

    let first = first.await.expect("call").into_value().expect("value");
    let second = second.await.expect("call").into_value().expect("value");
    assert_eq!(first, json!("a"));
    assert_eq!(second, json!("b"));
}

#[tokio::test]
async fn test_reply_delivered_within_send_is_not_lost() {
    /// Channel whose send answers the request before returning, the worst
    /// legal ordering: registration must already have happened.
    struct EchoChannel {
        handler: RefCell<Option<Box<dyn Fn(ChannelMessage)>>>,
    }

    impl Channel for EchoChannel {
        fn send(&self, message: ChannelMessage) -> Result<(), ChannelError> {
            let Some(decoded) = WireMessage::decode(&message) else {
                return Ok(());
            };
            let reply = match decoded {
                WireMessage::Initiate { req_id, .. } => Some(WireMessage::Resolve {
                    req_id,
                    value: None,
                }),
                WireMessage::Request { req_id, args, .. } => Some(WireMessage::Resolve {
                    req_id,
                    value: Some(ResolvePayload::Return {
                        value: Value::Array(args),
                    }),
                }),
                _ => None,
            };
            if let Some(reply) = reply {
                let handler = self.handler.borrow();
                if let Some(handler) = &*handler {
                    handler(reply.encode().expect("encode"));
                }
            }
            Ok(())
        }

        fn on_message(&self, handler: Box<dyn Fn(ChannelMessage)>) {
            *self.handler.borrow_mut() = Some(handler);
        }

        fn on_failure(&self, _handler: Box<dyn Fn(ChannelError)>) {}
    }

    let channel = Rc::new(EchoChannel {
        handler: RefCell::new(None),
    });
    let endpoint = Endpoint::bind(channel.clone(), None);

    let handshake = endpoint.handshake();
    tokio::pin!(handshake);
    futures_poll_once(handshake.as_mut()).await;
    // The echo peer acked instantly; publish its surface to finish.
    {
        let handler = channel.handler.borrow();
        let initiate = WireMessage::Initiate {
            req_id: 0,
            surface: Surface::Flat(vec!["echo".to_string()]),
        };
        handler.as_ref().expect("handler")(initiate.encode().expect("encode"));
    }
    let remote = handshake.await.expect("handshake");

    let result = remote
        .invoke("echo", vec![json!(7)])
        .expect("invoke")
        .await
        .expect("call")
        .into_value()
        .expect("value");
    assert_eq!(result, json!([7]));
    assert_eq!(endpoint.pending_count(), 0);
}

#[tokio::test]
async fn test_duplicate_resolve_does_not_disturb_later_calls() {
    let channel = ScriptedChannel::new();
    let endpoint = Endpoint::bind(channel.clone(), None);
    let remote = scripted_handshake(&endpoint, &channel, &["get"]).await;

    let call = remote.invoke("get", vec![]).expect("invoke");
    channel.deliver(WireMessage::Resolve {
        req_id: 1,
        value: Some(ResolvePayload::Return { value: json!(1) }),
    });
    // Duplicate and late rejects for the same id: dropped.
    channel.deliver(WireMessage::Resolve {
        req_id: 1,
        value: Some(ResolvePayload::Return { value: json!(999) }),
    });
    channel.deliver(WireMessage::Reject {
        req_id: 1,
        error: Fault::new("late"),
    });

    let result = call.await.expect("call").into_value().expect("value");
    assert_eq!(result, json!(1));
    assert_eq!(endpoint.pending_count(), 0);
}

#[tokio::test]
async fn test_stream_pull_discipline_on_the_wire() {
    let channel = ScriptedChannel::new();
    let endpoint = Endpoint::bind(channel.clone(), None);
    let remote = scripted_handshake(&endpoint, &channel, &["feed"]).await;

    let call = remote.invoke("feed", vec![]).expect("invoke");
    channel.deliver(WireMessage::Resolve {
        req_id: 1,
        value: None,
    });
    let mut stream = call.await.expect("call").into_stream().expect("stream");

    let sends_before = channel.sent_raw().len();
    {
        let pull = stream.next();
        tokio::pin!(pull);
        futures_poll_once(pull.as_mut()).await;

        // Exactly one RequestNextItem, and none before the first pull.
        let raw = channel.sent_raw();
        assert_eq!(raw.len(), sends_before + 1);
        assert_eq!(raw.last().expect("sent")["kind"], "request_next_item");
        assert_eq!(raw.last().expect("sent")["req_id"], 1);

        channel.deliver(WireMessage::Resolve {
            req_id: 1,
            value: Some(ResolvePayload::Item {
                done: false,
                value: Some(json!("x")),
            }),
        });
        assert_eq!(pull.await.expect("item").expect("ok"), json!("x"));
    }

    // Dropping mid-stream emits exactly one CancelIterator.
    drop(stream);
    let raw = channel.sent_raw();
    assert_eq!(raw.last().expect("sent")["kind"], "cancel_iterator");
    assert_eq!(raw.last().expect("sent")["req_id"], 1);
    let cancels = raw
        .iter()
        .filter(|m| m["kind"] == "cancel_iterator")
        .count();
    assert_eq!(cancels, 1);
    assert_eq!(endpoint.pending_count(), 0);
}

#[tokio::test]
async fn test_exhausted_stream_sends_no_cancel() {
    let channel = ScriptedChannel::new();
    let endpoint = Endpoint::bind(channel.clone(), None);
    let remote = scripted_handshake(&endpoint, &channel, &["feed"]).await;

    let call = remote.invoke("feed", vec![]).expect("invoke");
    channel.deliver(WireMessage::Resolve {
        req_id: 1,
        value: None,
    });
    let mut stream = call.await.expect("call").into_stream().expect("stream");

    {
        let pull = stream.next();
        tokio::pin!(pull);
        futures_poll_once(pull.as_mut()).await;
        channel.deliver(WireMessage::Resolve {
            req_id: 1,
            value: Some(ResolvePayload::Item {
                done: true,
                value: None,
            }),
        });
        assert!(pull.await.is_none());
    }

    drop(stream);
    let cancels = channel
        .sent_raw()
        .iter()
        .filter(|m| m["kind"] == "cancel_iterator")
        .count();
    assert_eq!(cancels, 0, "natural exhaustion needs no cancel");
}
