//! Tiny chat client over a shared "chat" channel.
//!
//! ```text
//! routio-router /tmp/routio.sock
//! cargo run --example chat -- /tmp/routio.sock alice
//! cargo run --example chat -- /tmp/routio.sock bob
//! ```
//!
//! Lines typed on stdin are published; lines from other peers are
//! printed. Stdin is read on a helper thread so the loop never blocks.

use std::sync::mpsc;
use std::time::Duration;

use routio::transport::Endpoint;
use routio::{Client, IoLoop, TypedPublisher, TypedSubscriber};

fn main() -> routio::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "/tmp/routio.sock".to_string());
    let name = args.next().unwrap_or_else(|| "anon".to_string());

    let io = IoLoop::new()?;
    let client = Client::connect(&io, &Endpoint::unix(&path), &name)?;

    let _incoming = TypedSubscriber::<String>::new(&client, "chat", |m| {
        println!("<{}> {}", m.header.source, m.value);
    })?;
    let outgoing = TypedPublisher::<String>::new(&client, "chat")?;

    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let mut line = String::new();
        while std::io::stdin().read_line(&mut line).is_ok() {
            if line.is_empty() {
                return;
            }
            let _ = line_tx.send(line.trim_end().to_string());
            line.clear();
        }
    });

    while io.wait(Duration::from_millis(100)) {
        for line in line_rx.try_iter() {
            outgoing.send(&line)?;
        }
    }

    Ok(())
}
