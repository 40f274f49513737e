//! # pipe_receiver
//!
//! Runs a command and ingests its zero-delimited standard output as UTF-8
//! events, using the command line as the source identifier.
//!
//! Run with:
//! ```sh
//! cargo run --bin pipe_receiver -- printf 'one\000two\000three\000'
//! ```

use anyhow::{bail, Result};
use eventwire_core::{decoder::Utf8Decoder, sink::EventSink};
use eventwire_observability::{init_tracing, LogConfig};
use eventwire_sink::BoundedEventSink;
use eventwire_stream::{spawn_process_producer, ProducerConfig};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&LogConfig::default());

    let mut args = std::env::args().skip(1);
    let Some(program) = args.next() else {
        bail!("usage: pipe_receiver <command> [args...]");
    };

    let sink = Arc::new(BoundedEventSink::<String>::default());
    let process = spawn_process_producer(
        &program,
        args,
        ProducerConfig::delimited(),
        Arc::new(Utf8Decoder),
        Arc::clone(&sink) as Arc<dyn EventSink<String>>,
    )?;

    let status = process.wait().await;
    info!(?status, "command finished");

    for wrapper in sink.drain() {
        match wrapper.event() {
            Some(line) => println!("#{:<4} {}", wrapper.local_id, line),
            None => println!("-- end of {} --", wrapper.source),
        }
    }
    let stats = sink.stats();
    println!("{} events buffered, {} evicted", stats.admitted, stats.evicted);
    Ok(())
}
