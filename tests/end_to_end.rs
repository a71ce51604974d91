//! End-to-end scenarios: a router plus clients over real UNIX sockets.
//!
//! Most tests host the router and all clients on one loop, which keeps
//! them deterministic; a final test runs the router and clients on
//! separate threads with a loop each, the way separate processes would.
//!
//! Ordering fence: messages from one client are handled FIFO by the
//! router, so a `lookup` reply proves every request the client sent
//! before it has been processed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use serde_bytes::ByteBuf;
use tokio::io::AsyncWriteExt;

use routio::control::{ControlErrorCode, ControlMessage};
use routio::message::WireType;
use routio::protocol::{chunk_payload, ChunkHeader, CONTROL_CHANNEL};
use routio::router::RouterConfig;
use routio::transport::{scratch_socket_path, Endpoint, Stream};
use routio::{
    Client, IoLoop, Router, RoutioError, SubscriberOptions, TypedPublisher, TypedSubscriber,
};

fn unix_endpoint() -> Endpoint {
    Endpoint::Unix(scratch_socket_path())
}

/// Drive the loop until `done` or a generous cap.
fn pump_until(io: &IoLoop, mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if done() {
            return true;
        }
        io.wait(Duration::from_millis(5));
    }
    done()
}

/// Wait until the router has processed everything `client` sent so far.
fn fence(io: &IoLoop, client: &Client, alias: &str) {
    let hit = Rc::new(Cell::new(false));
    let flag = hit.clone();
    client.lookup(alias, move |_| flag.set(true)).unwrap();
    assert!(pump_until(io, || hit.get()), "router did not answer lookup");
}

#[test]
fn publish_subscribe_fifo_and_fan_out() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let _router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();
    let c = Client::connect(&io, &endpoint, "c").unwrap();

    let got_b = Rc::new(RefCell::new(Vec::new()));
    let got_c = Rc::new(RefCell::new(Vec::new()));

    let sink = got_b.clone();
    let _sub_b = TypedSubscriber::<i32>::new(&b, "tick", move |m| {
        assert_eq!(m.header.source, "a");
        sink.borrow_mut().push(m.value);
    })
    .unwrap();
    let sink = got_c.clone();
    let _sub_c = TypedSubscriber::<i32>::new(&c, "tick", move |m| {
        sink.borrow_mut().push(m.value);
    })
    .unwrap();

    fence(&io, &b, "tick");
    fence(&io, &c, "tick");

    let ticks = TypedPublisher::<i32>::new(&a, "tick").unwrap();
    ticks.send(&1).unwrap();
    ticks.send(&2).unwrap();
    ticks.send(&3).unwrap();

    assert!(pump_until(&io, || got_b.borrow().len() >= 3 && got_c.borrow().len() >= 3));

    // FIFO per publisher-subscriber pair, exactly one copy each.
    assert_eq!(*got_b.borrow(), vec![1, 2, 3]);
    assert_eq!(*got_c.borrow(), vec![1, 2, 3]);
}

#[test]
fn type_mismatch_rejected_without_collateral() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let _router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();
    let c = Client::connect(&io, &endpoint, "c").unwrap();

    let got_b = Rc::new(RefCell::new(Vec::new()));
    let sink = got_b.clone();
    let _sub_b =
        TypedSubscriber::<i32>::new(&b, "tick", move |m| sink.borrow_mut().push(m.value)).unwrap();
    fence(&io, &b, "tick");

    let ticks = TypedPublisher::<i32>::new(&a, "tick").unwrap();
    ticks.send(&1).unwrap();
    assert!(pump_until(&io, || !got_b.borrow().is_empty()));

    // C tries the same alias with a different type.
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    c.on_error(move |code, alias, _reason| {
        sink.borrow_mut().push((code, alias.to_string()));
    });

    let got_c = Rc::new(RefCell::new(Vec::new()));
    let sink = got_c.clone();
    let _sub_c =
        TypedSubscriber::<String>::new(&c, "tick", move |m| sink.borrow_mut().push(m.value))
            .unwrap();

    assert!(pump_until(&io, || !errors.borrow().is_empty()));
    assert_eq!(errors.borrow()[0].0, ControlErrorCode::TypeMismatch);
    assert_eq!(errors.borrow()[0].1, "tick");

    // A and B are unaffected.
    ticks.send(&2).unwrap();
    assert!(pump_until(&io, || got_b.borrow().len() >= 2));
    assert_eq!(*got_b.borrow(), vec![1, 2]);
    assert!(got_c.borrow().is_empty());
}

#[test]
fn rejected_publisher_fails_fast_on_later_sends() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let _router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let c = Client::connect(&io, &endpoint, "c").unwrap();

    // A fixes the channel type before C shows up.
    let _ticks = TypedPublisher::<i32>::new(&a, "tick").unwrap();
    fence(&io, &a, "tick");

    let errors = Rc::new(Cell::new(0u32));
    let sink = errors.clone();
    c.on_error(move |code, alias, _reason| {
        assert_eq!(code, ControlErrorCode::TypeMismatch);
        assert_eq!(alias, "tick");
        sink.set(sink.get() + 1);
    });

    let strings = TypedPublisher::<String>::new(&c, "tick").unwrap();
    // Queued speculatively while the declaration is still in flight.
    strings.send(&"early".to_string()).unwrap();

    assert!(pump_until(&io, || errors.get() > 0));

    // The rejection cleared the declaration; later sends fail fast
    // instead of queueing forever.
    assert!(matches!(
        strings.send(&"late".to_string()),
        Err(RoutioError::Protocol(_))
    ));
}

#[test]
fn resubscribe_after_channel_gc_rebinds() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();

    // The first subscription is the channel's only member, so dropping
    // it collects the channel.
    let first = TypedSubscriber::<i32>::new(&b, "tick", |_| {}).unwrap();
    fence(&io, &b, "tick");
    first.unsubscribe().unwrap();
    fence(&io, &b, "tick");
    assert_eq!(router.statistics().channels, 0);

    // Resubscribing gets a fresh channel number; the new handler must
    // bind to it, not to the collected one.
    let got = Rc::new(RefCell::new(Vec::new()));
    let sink = got.clone();
    let _second =
        TypedSubscriber::<i32>::new(&b, "tick", move |m| sink.borrow_mut().push(m.value)).unwrap();
    fence(&io, &b, "tick");

    let ticks = TypedPublisher::<i32>::new(&a, "tick").unwrap();
    ticks.send(&9).unwrap();
    assert!(pump_until(&io, || !got.borrow().is_empty()));
    assert_eq!(*got.borrow(), vec![9]);
}

#[test]
fn chunked_payload_arrives_whole() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let _router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();

    let got = Rc::new(RefCell::new(Vec::new()));
    let sink = got.clone();
    let _sub = TypedSubscriber::<ByteBuf>::new(&b, "frame", move |m| {
        sink.borrow_mut().push(m.value.into_vec());
    })
    .unwrap();
    fence(&io, &b, "frame");

    // 200 KiB spans four 64 KiB chunks.
    let blob: Vec<u8> = (0..200 * 1024).map(|i| (i % 251) as u8).collect();
    let frames = TypedPublisher::<ByteBuf>::new(&a, "frame").unwrap();
    frames.send(&ByteBuf::from(blob.clone())).unwrap();

    assert!(pump_until(&io, || !got.borrow().is_empty()));
    assert_eq!(got.borrow().len(), 1, "one callback for one payload");
    assert_eq!(got.borrow()[0], blob);
}

#[test]
fn framing_error_terminates_only_the_offender() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();

    let got = Rc::new(RefCell::new(Vec::new()));
    let sink = got.clone();
    let _sub =
        TypedSubscriber::<i32>::new(&b, "tick", move |m| sink.borrow_mut().push(m.value)).unwrap();
    fence(&io, &b, "tick");

    let ticks = TypedPublisher::<i32>::new(&a, "tick").unwrap();
    ticks.send(&1).unwrap();
    assert!(pump_until(&io, || got.borrow().len() >= 1));

    // A third connection handshakes, then sends an ill-formed frame
    // (chunk_length > total_length).
    let (_raw_r, mut raw_w) = io
        .block_on(Stream::connect(&endpoint))
        .unwrap()
        .into_split();
    io.block_on(async {
        let hello = ControlMessage::Handshake {
            label: "mangler".to_string(),
        };
        let mut wire = Vec::new();
        for chunk in chunk_payload(CONTROL_CHANNEL, hello.encode().unwrap().into()) {
            wire.extend_from_slice(&chunk.encode());
        }
        wire.extend_from_slice(&ChunkHeader::new(9, 4, 0, 8).encode());
        wire.extend_from_slice(&[0u8; 8]);
        raw_w.write_all(&wire).await.unwrap();
    });

    // The offender is dropped; A and B keep working.
    assert!(pump_until(&io, || {
        let stats = router.statistics();
        stats.connections_accepted == 3 && stats.connections_active == 2
    }));
    ticks.send(&2).unwrap();
    assert!(pump_until(&io, || got.borrow().len() >= 2));
    assert_eq!(*got.borrow(), vec![1, 2]);
}

#[test]
fn self_delivery_suppressed_unless_loopback() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let _router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();

    let echoed = Rc::new(RefCell::new(Vec::new()));
    let silent = Rc::new(Cell::new(0u32));

    let sink = echoed.clone();
    let _echo = TypedSubscriber::<i32>::with_options(
        &a,
        "echo",
        SubscriberOptions {
            loopback: true,
            lossy: false,
        },
        move |m| sink.borrow_mut().push(m.value),
    )
    .unwrap();

    let counter = silent.clone();
    let _mute = TypedSubscriber::<i32>::new(&a, "mute", move |_| counter.set(counter.get() + 1))
        .unwrap();
    fence(&io, &a, "echo");
    fence(&io, &a, "mute");

    let echo_pub = TypedPublisher::<i32>::new(&a, "echo").unwrap();
    let mute_pub = TypedPublisher::<i32>::new(&a, "mute").unwrap();
    echo_pub.send(&7).unwrap();
    mute_pub.send(&7).unwrap();

    assert!(pump_until(&io, || !echoed.borrow().is_empty()));
    assert_eq!(*echoed.borrow(), vec![7]);

    // Extra settles time: the suppressed delivery must never arrive.
    for _ in 0..20 {
        io.wait(Duration::from_millis(5));
    }
    assert_eq!(silent.get(), 0);
}

#[test]
fn unsubscribe_stops_delivery() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let _router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();

    let got = Rc::new(RefCell::new(Vec::new()));
    let sink = got.clone();
    let sub =
        TypedSubscriber::<i32>::new(&b, "tick", move |m| sink.borrow_mut().push(m.value)).unwrap();
    fence(&io, &b, "tick");

    let ticks = TypedPublisher::<i32>::new(&a, "tick").unwrap();
    ticks.send(&1).unwrap();
    assert!(pump_until(&io, || got.borrow().len() >= 1));

    sub.unsubscribe().unwrap();
    fence(&io, &b, "tick");

    ticks.send(&2).unwrap();
    for _ in 0..20 {
        io.wait(Duration::from_millis(5));
    }
    assert_eq!(*got.borrow(), vec![1]);
}

#[test]
fn subscriber_disconnect_does_not_affect_publisher() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let router = Router::bind(&io, &endpoint).unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();
    let c = Client::connect(&io, &endpoint, "c").unwrap();

    let got_b = Rc::new(Cell::new(0u32));
    let got_c = Rc::new(RefCell::new(Vec::new()));

    let counter = got_b.clone();
    let _sub_b = TypedSubscriber::<ByteBuf>::new(&b, "frame", move |_| {
        counter.set(counter.get() + 1)
    })
    .unwrap();
    let sink = got_c.clone();
    let _sub_c = TypedSubscriber::<ByteBuf>::new(&c, "frame", move |m| {
        sink.borrow_mut().push(m.value.len())
    })
    .unwrap();
    fence(&io, &b, "frame");
    fence(&io, &c, "frame");

    let frames = TypedPublisher::<ByteBuf>::new(&a, "frame").unwrap();
    let blob = ByteBuf::from(vec![9u8; 150 * 1024]);
    frames.send(&blob).unwrap();
    assert!(pump_until(&io, || got_b.get() >= 1 && got_c.borrow().len() >= 1));

    // B goes away mid-stream of life; A's next publish still lands at C.
    b.disconnect();
    assert!(pump_until(&io, || router.statistics().connections_active == 2));

    frames.send(&blob).unwrap();
    assert!(pump_until(&io, || got_c.borrow().len() >= 2));
    assert_eq!(*got_c.borrow(), vec![150 * 1024, 150 * 1024]);
}

#[test]
fn slow_subscriber_disconnected_at_high_water() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let router = Router::bind_with(
        &io,
        &endpoint,
        RouterConfig {
            high_water_bytes: 32 * 1024,
            ..RouterConfig::default()
        },
    )
    .unwrap();

    let a = Client::connect(&io, &endpoint, "a").unwrap();

    // A raw subscriber that handshakes, subscribes, and never reads.
    let (_raw_r, mut raw_w) = io
        .block_on(Stream::connect(&endpoint))
        .unwrap()
        .into_split();
    io.block_on(async {
        let mut wire = Vec::new();
        let hello = ControlMessage::Handshake {
            label: "sloth".to_string(),
        };
        for chunk in chunk_payload(CONTROL_CHANNEL, hello.encode().unwrap().into()) {
            wire.extend_from_slice(&chunk.encode());
        }
        let subscribe = ControlMessage::Subscribe {
            alias: "blast".to_string(),
            type_id: ByteBuf::type_identifier(),
            loopback: false,
            lossy: false,
        };
        for chunk in chunk_payload(CONTROL_CHANNEL, subscribe.encode().unwrap().into()) {
            wire.extend_from_slice(&chunk.encode());
        }
        raw_w.write_all(&wire).await.unwrap();
    });

    // The sloth's subscribe has landed once the channel resolves.
    let mut subscribed = false;
    for _ in 0..100 {
        let answer: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));
        let probe = answer.clone();
        a.lookup("blast", move |info| probe.set(Some(info.is_some()))).unwrap();
        assert!(pump_until(&io, || answer.get().is_some()));
        if answer.get() == Some(true) {
            subscribed = true;
            break;
        }
        io.wait(Duration::from_millis(5));
    }
    assert!(subscribed, "raw subscribe never reached the directory");

    let blaster = TypedPublisher::<ByteBuf>::new(&a, "blast").unwrap();
    let blob = ByteBuf::from(vec![0u8; 8 * 1024]);
    for _ in 0..200 {
        blaster.send(&blob).unwrap();
        io.wait(Duration::from_millis(1));
        if router.statistics().backpressure_disconnects > 0 {
            break;
        }
    }

    assert!(pump_until(&io, || {
        router.statistics().backpressure_disconnects >= 1
    }));
}

#[test]
fn handler_churn_leaves_router_healthy() {
    let io = IoLoop::new().unwrap();
    let endpoint = unix_endpoint();
    let router = Router::bind(&io, &endpoint).unwrap();

    for round in 0..10 {
        let label = format!("churn-{round}");
        let client = Client::connect(&io, &endpoint, &label).unwrap();
        let _sub = TypedSubscriber::<i32>::new(&client, "churn", |_| {}).unwrap();
        fence(&io, &client, "churn");
        client.disconnect();
        assert!(pump_until(&io, || router.statistics().connections_active == 0));
    }

    // Channel was collected every time its last member left.
    assert_eq!(router.statistics().channels, 0);

    // A fresh pair still works.
    let a = Client::connect(&io, &endpoint, "a").unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();
    let got = Rc::new(Cell::new(0));
    let sink = got.clone();
    let _sub = TypedSubscriber::<i32>::new(&b, "churn", move |m| sink.set(m.value)).unwrap();
    fence(&io, &b, "churn");
    TypedPublisher::<i32>::new(&a, "churn").unwrap().send(&42).unwrap();
    assert!(pump_until(&io, || got.get() == 42));
}

#[test]
fn router_and_clients_on_separate_threads() {
    let endpoint = unix_endpoint();
    let stop = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::channel();

    let router_thread = std::thread::spawn({
        let endpoint = endpoint.clone();
        let stop = stop.clone();
        move || {
            let io = IoLoop::new().unwrap();
            let _router = Router::bind(&io, &endpoint).unwrap();
            ready_tx.send(()).unwrap();
            while !stop.load(Ordering::SeqCst) {
                if !io.wait(Duration::from_millis(10)) {
                    break;
                }
            }
        }
    });
    ready_rx.recv().unwrap();

    // Subscribe on this thread's loop before the publisher starts, so
    // no message is fanned out to an empty channel.
    let io = IoLoop::new().unwrap();
    let b = Client::connect(&io, &endpoint, "b").unwrap();
    let got = Rc::new(RefCell::new(Vec::new()));
    let sink = got.clone();
    let _sub =
        TypedSubscriber::<i32>::new(&b, "tick", move |m| sink.borrow_mut().push(m.value)).unwrap();
    fence(&io, &b, "tick");

    let publisher_thread = std::thread::spawn({
        let endpoint = endpoint.clone();
        move || {
            let io = IoLoop::new().unwrap();
            let a = Client::connect(&io, &endpoint, "a").unwrap();
            let ticks = TypedPublisher::<i32>::new(&a, "tick").unwrap();
            for n in 1..=5 {
                ticks.send(&n).unwrap();
            }
            // Keep the connection alive long enough to flush and route.
            for _ in 0..100 {
                io.wait(Duration::from_millis(10));
            }
        }
    });

    assert!(pump_until(&io, || got.borrow().len() >= 5));
    assert_eq!(*got.borrow(), vec![1, 2, 3, 4, 5]);

    publisher_thread.join().unwrap();
    stop.store(true, Ordering::SeqCst);
    router_thread.join().unwrap();
}
