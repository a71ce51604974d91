//! Periodic integer ticker.
//!
//! Start a router, then run one publisher and any number of subscribers:
//!
//! ```text
//! routio-router /tmp/routio.sock
//! cargo run --example ticker -- /tmp/routio.sock pub
//! cargo run --example ticker -- /tmp/routio.sock sub
//! ```

use std::time::Duration;

use routio::transport::Endpoint;
use routio::{Client, IoLoop, TypedPublisher, TypedSubscriber};

fn main() -> routio::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "/tmp/routio.sock".to_string());
    let role = args.next().unwrap_or_else(|| "sub".to_string());

    let io = IoLoop::new()?;
    let client = Client::connect(&io, &Endpoint::unix(&path), &format!("ticker-{role}"))?;

    if role == "pub" {
        let ticks = TypedPublisher::<i32>::new(&client, "tick")?;
        let mut n = 0;
        while io.wait(Duration::from_millis(500)) {
            ticks.send(&n)?;
            println!("tick {n}");
            n += 1;
        }
    } else {
        let _sub = TypedSubscriber::<i32>::new(&client, "tick", |m| {
            println!("tick {} from {}", m.value, m.header.source);
        })?;
        while io.wait(Duration::from_millis(500)) {}
    }

    Ok(())
}
