//! Ingest events from a child process's standard output.

use crate::config::ProducerConfig;
use crate::producer::EventProducer;
use eventwire_core::{
    decoder::Decoder, error::ProducerError, sink::EventSink, source::SourceIdentifier,
};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A producer bound to a spawned command, plus the task that reaps it.
pub struct ProcessProducer<T> {
    producer: Arc<EventProducer<T>>,
    reaper: JoinHandle<Option<ExitStatus>>,
}

impl<T: Send + 'static> ProcessProducer<T> {
    pub fn producer(&self) -> &EventProducer<T> {
        &self.producer
    }

    /// Close the producer; the reaper then kills the child.
    pub fn close(&self) -> bool {
        self.producer.close()
    }

    /// Wait for the producer to finish and the child to be reaped.
    /// Returns the child's exit status if it could be collected.
    pub async fn wait(self) -> Option<ExitStatus> {
        self.producer.join().await;
        match self.reaper.await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "process reaper failed");
                None
            }
        }
    }
}

/// Spawn `program` with `args` and start a producer on its stdout.
///
/// The primary source identifier is the full command line. Once the
/// producer finishes (end of output, fatal error or `close()`), the child
/// is killed if it is still running and then reaped.
pub fn spawn_process_producer<T, I, S>(
    program: &str,
    args: I,
    config: ProducerConfig,
    decoder: Arc<dyn Decoder<T>>,
    sink: Arc<dyn EventSink<T>>,
) -> Result<ProcessProducer<T>, ProducerError>
where
    T: Send + 'static,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let command_line = std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProducerError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or_else(|| ProducerError::NoStdout {
        command: command_line.clone(),
    })?;

    info!(command = %command_line, pid = ?child.id(), "process spawned");

    let producer = Arc::new(EventProducer::new(
        stdout,
        SourceIdentifier::new(command_line.clone()),
        config,
        decoder,
        sink,
    ));
    producer.start()?;

    let reaper = {
        let producer = Arc::clone(&producer);
        tokio::spawn(async move {
            producer.closed().await;
            let status = match child.try_wait() {
                Ok(Some(status)) => Ok(status),
                _ => {
                    debug!(command = %command_line, "killing process");
                    if let Err(e) = child.start_kill() {
                        debug!(command = %command_line, error = %e, "kill failed");
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(status) => {
                    info!(command = %command_line, %status, "process reaped");
                    Some(status)
                }
                Err(e) => {
                    warn!(command = %command_line, error = %e, "could not reap process");
                    None
                }
            }
        })
    };

    Ok(ProcessProducer { producer, reaper })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eventwire_core::{event::EventWrapper, Utf8Decoder};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventWrapper<String>>>);

    #[async_trait]
    impl EventSink<String> for Collect {
        async fn add(&self, wrapper: EventWrapper<String>) {
            self.0.lock().unwrap().push(wrapper);
        }
    }

    #[tokio::test]
    async fn reads_delimited_stdout() {
        let sink = Arc::new(Collect::default());
        let process = spawn_process_producer(
            "printf",
            ["one\\000two\\000"],
            ProducerConfig::delimited(),
            Arc::new(Utf8Decoder),
            Arc::clone(&sink) as Arc<dyn EventSink<String>>,
        )
        .unwrap();

        let status = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap();
        assert!(status.is_some());

        let got = sink.0.lock().unwrap();
        let events: Vec<_> = got.iter().filter_map(|w| w.event().cloned()).collect();
        assert_eq!(events, vec!["one".to_string(), "two".to_string()]);
        assert!(got.last().unwrap().is_sentinel());
        assert_eq!(got[0].source.primary(), "printf one\\000two\\000");
    }

    #[tokio::test]
    async fn close_kills_long_running_child() {
        let sink = Arc::new(Collect::default());
        let process = spawn_process_producer(
            "sleep",
            ["30"],
            ProducerConfig::delimited(),
            Arc::new(Utf8Decoder),
            Arc::clone(&sink) as Arc<dyn EventSink<String>>,
        )
        .unwrap();

        assert!(process.close());
        let status = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let err = spawn_process_producer::<String, _, &str>(
            "/nonexistent/eventwire-test-binary",
            [],
            ProducerConfig::delimited(),
            Arc::new(Utf8Decoder),
            Arc::new(Collect::default()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ProducerError::Spawn { .. }));
    }
}
