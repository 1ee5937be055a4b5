//! Calculator Example: symmetric RPC over an in-process channel pair.
//!
//! Two endpoints share one channel. The "service" side exposes a calculator
//! object graph; the "client" side exposes a small logger object of its own,
//! which the service calls back into — there is no fixed caller/callee role.
//!
//! # Key Features
//!
//! - Explicit host graphs: members registered by name, no reflection
//! - Circular graph (`calc.this` points back at the root) serialized by index
//! - A streaming method pulled one item at a time, then cancelled early
//!
//! # Run
//!
//! ```bash
//! cargo run --example calculator
//! ```

use std::rc::Rc;

use serde_json::{json, Value};

use gangway::{CallError, Endpoint, Fault, HostObject, LocalChannel, Outcome};

// ============================================================================
// Host graphs
// ============================================================================

fn calculator_host() -> Rc<HostObject> {
    let host = Rc::new(HostObject::new());
    host.data("name", "calculator")
        .unwrap_or_else(|e| panic!("expose name: {e}"));

    host.method("add", |args| {
        let (a, b) = two_numbers(&args)?;
        Outcome::single(a + b)
    });
    host.method("div", |args| {
        let (a, b) = two_numbers(&args)?;
        if b == 0.0 {
            return Err(Fault::new("division by zero").with_field("dividend", a));
        }
        Outcome::single(a / b)
    });
    host.method("multiples", |args| {
        let (base, count) = two_numbers(&args)?;
        let items = (1..=count as i64).map(move |n| json!(base * n as f64));
        Ok(Outcome::items(items))
    });

    // Circular reference back to the root: serialized once, by index.
    host.child("this", host.clone());
    host
}

fn logger_host() -> Rc<HostObject> {
    let host = Rc::new(HostObject::new());
    host.method("log", |args| {
        for line in &args {
            println!("  [peer says] {line}");
        }
        Outcome::single(Value::Null)
    });
    host
}

fn two_numbers(args: &[Value]) -> Result<(f64, f64), Fault> {
    let a = args
        .first()
        .and_then(Value::as_f64)
        .ok_or_else(|| Fault::new("first argument must be a number"))?;
    let b = args
        .get(1)
        .and_then(Value::as_f64)
        .ok_or_else(|| Fault::new("second argument must be a number"))?;
    Ok((a, b))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CallError> {
    let (left, right) = LocalChannel::pair();
    let service = Endpoint::bind(Rc::new(left), Some(calculator_host()));
    let client = Endpoint::bind(Rc::new(right), Some(logger_host()));

    // Both sides exchange surfaces over the same channel: the service ends
    // up with a stub for the client's logger, the client with a stub for
    // the calculator.
    let (logger, calc) = tokio::join!(service.handshake(), client.handshake());
    let logger = logger?;
    let calc = calc?;

    println!("connected to {}", calc.data("name").unwrap_or_default());
    println!("remote methods: {:?}", calc.method_names());

    // Plain call.
    let sum = calc
        .invoke("add", vec![json!(2), json!(40)])?
        .await?
        .into_value()?;
    println!("2 + 40 = {sum}");

    // A call routed through the circular reference resolves identically.
    let through_cycle = calc
        .object("this")
        .ok_or_else(|| CallError::Protocol {
            message: "missing circular member".to_string(),
        })?
        .invoke("add", vec![json!(1), json!(1)])?
        .await?
        .into_value()?;
    println!("this.add(1, 1) = {through_cycle}");

    // A remote fault arrives as a structured error, not a dead channel.
    match calc.invoke("div", vec![json!(1), json!(0)])?.await {
        Err(CallError::Faulted(fault)) => println!("div(1, 0) faulted: {fault}"),
        other => println!("div(1, 0) unexpectedly returned: {other:?}"),
    }

    // Streaming: pull three multiples, then drop the handle to cancel the
    // producer early.
    let mut multiples = calc
        .invoke("multiples", vec![json!(7), json!(100)])?
        .await?
        .into_stream()?;
    for _ in 0..3 {
        if let Some(item) = multiples.next().await {
            println!("next multiple of 7: {}", item?);
        }
    }
    drop(multiples);
    println!("stream cancelled after three items");

    // Symmetry: the calculator side invokes the client's exposed surface.
    logger
        .invoke("log", vec![json!("thanks for calling")])?
        .await?
        .into_value()?;

    Ok(())
}
