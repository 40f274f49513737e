//! # tcp_receiver
//!
//! Listens for framed JSON events over TCP, prints every admitted event and
//! reports ingestion counters through `eventwire-observability`.
//!
//! Run with:
//! ```sh
//! cargo run --bin tcp_receiver
//!
//! # Length-prefixed peers promising a heartbeat every 5s:
//! EVENTWIRE_HEARTBEAT_MS=5000 cargo run --bin tcp_receiver
//!
//! # Zero-delimited peers, typed graphs restricted to two types:
//! EVENTWIRE_FRAMING=delimited \
//! EVENTWIRE_ALLOWED_TYPES=app.LoggingEvent,app.ThrowableInfo \
//!   cargo run --bin tcp_receiver
//!
//! # Ignore one noisy host (its end-of-stream markers still show up):
//! EVENTWIRE_DENY=10.0.0.9 LOG_JSON=1 cargo run --bin tcp_receiver
//! ```

use anyhow::{bail, Context, Result};
use eventwire_core::{
    decoder::{Decoder, JsonDecoder, JsonPointerUpdater},
    sink::EventSink,
};
use eventwire_guard::{AllowList, GuardMode, GuardedDecoder, WhitelistGuard};
use eventwire_observability::{init_tracing, IngestMetrics, LogConfig};
use eventwire_sink::{BoundedEventSink, SinkConfig, SourceFilter};
use eventwire_stream::{ProducerConfig, TcpEventReceiver};
use opentelemetry::global;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const STATS_EVERY: Duration = Duration::from_secs(10);

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn producer_config() -> Result<ProducerConfig> {
    let heartbeat_ms: u64 = match std::env::var("EVENTWIRE_HEARTBEAT_MS") {
        Ok(raw) => raw.parse().context("EVENTWIRE_HEARTBEAT_MS must be an integer")?,
        Err(_) => 0,
    };
    let config = match std::env::var("EVENTWIRE_FRAMING").as_deref() {
        Ok("delimited") => ProducerConfig::delimited(),
        Ok("length-prefixed") | Err(_) => {
            ProducerConfig::length_prefixed(Some(Duration::from_millis(heartbeat_ms)))
        }
        Ok(other) => bail!("unknown framing '{other}' (expected length-prefixed or delimited)"),
    };
    Ok(config)
}

fn decoder() -> Arc<dyn Decoder<Value>> {
    let allowed = env_list("EVENTWIRE_ALLOWED_TYPES");
    if allowed.is_empty() {
        return Arc::new(JsonDecoder::<Value>::new());
    }
    let mode = if std::env::var("EVENTWIRE_GUARD_DRY_RUN").is_ok() {
        GuardMode::DryRun
    } else {
        GuardMode::Enforce
    };
    let guard = WhitelistGuard::new(AllowList::new(allowed), mode);
    info!(?guard, "typed-graph guard enabled");
    Arc::new(GuardedDecoder::<Value>::new(Arc::new(guard)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Logging and metrics ───────────────────────────────────────────────
    let log_config = LogConfig {
        json: std::env::var("LOG_JSON").is_ok(),
        ..LogConfig::default()
    }
    .with_component("eventwire-stream", "debug");
    init_tracing(&log_config);

    // No meter provider is installed here, so the global meter is a no-op.
    let meter = global::meter("eventwire-demo");
    let metrics = IngestMetrics::new(&meter);

    // ── 2. Sink, decoder and receiver ────────────────────────────────────────
    let deny = env_list("EVENTWIRE_DENY");
    let filter = if deny.is_empty() {
        SourceFilter::None
    } else {
        SourceFilter::deny(deny)
    };
    let sink = Arc::new(BoundedEventSink::<Value>::new(
        SinkConfig::with_capacity(50_000).with_filter(filter),
    ));

    let addr = std::env::var("EVENTWIRE_ADDR").unwrap_or_else(|_| "127.0.0.1:4560".into());
    let receiver = TcpEventReceiver::bind(
        addr.as_str(),
        producer_config()?,
        decoder(),
        Arc::clone(&sink) as Arc<dyn EventSink<Value>>,
    )
    .await
    .with_context(|| format!("binding {addr}"))?
    .with_updater(Arc::new(JsonPointerUpdater::new("/application")));
    let receiver = Arc::new(receiver);

    println!("Eventwire TCP receiver on {}", receiver.local_addr()?);
    println!("Press Ctrl-C to stop.");
    let server = tokio::spawn(Arc::clone(&receiver).run());

    // ── 3. Consume until Ctrl-C ──────────────────────────────────────────────
    let mut stats_tick = tokio::time::interval(STATS_EVERY);
    let mut last_producer = receiver.stats();
    let mut last_sink = sink.stats();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sink.wait_for_events() => {
                for wrapper in sink.drain() {
                    match wrapper.event() {
                        Some(event) => println!("[{} #{}] {}", wrapper.source, wrapper.local_id, event),
                        None => println!("[{}] stream ended after {} events", wrapper.source, wrapper.local_id - 1),
                    }
                }
            }
            _ = stats_tick.tick() => {
                let producer = receiver.stats();
                let sink_stats = sink.stats();
                metrics.record_producer("all", &producer.delta_since(&last_producer));
                metrics.record_sink(&sink_stats.delta_since(&last_sink));
                info!(
                    connections = receiver.connections_accepted(),
                    active = receiver.active_producers(),
                    events = producer.events_emitted,
                    decode_errors = producer.decode_errors,
                    violations = producer.security_violations,
                    buffered = sink_stats.len,
                    evicted = sink_stats.evicted,
                    "ingestion stats"
                );
                last_producer = producer;
                last_sink = sink_stats;
            }
        }
    }

    // ── 4. Shut down ─────────────────────────────────────────────────────────
    receiver.shutdown();
    server.await?;
    let total = receiver.stats();
    println!(
        "Stopped: {} connections, {} events, {} decode errors",
        receiver.connections_accepted(),
        total.events_emitted,
        total.decode_errors
    );
    Ok(())
}
