//! Router task that fans out recorded chunks to sinks.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::sink::Sink;
use crate::{AudioChunk, EventCallback, SplutterError, SplutterEvent};

/// Channel capacity for router commands.
/// Only need 1 since commands are rare (just Stop).
const COMMAND_CHANNEL_CAPACITY: usize = 1;

/// Command sent to the router task.
pub enum RouterCommand {
    /// Drain queued chunks, stop all sinks, and exit.
    Stop,
}

/// The router receives recorded chunks and forwards them to all sinks.
pub struct Router {
    sinks: Vec<Arc<dyn Sink>>,
    event_callback: Option<EventCallback>,
}

impl Router {
    /// Creates a new router with the given sinks.
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self {
            sinks,
            event_callback: None,
        }
    }

    /// Sets the event callback.
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Sends an event to the callback if configured.
    fn emit_event(&self, event: SplutterEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    /// Writes a chunk to a single sink. Failures are reported, not retried.
    async fn write_to_sink(&self, sink: &Arc<dyn Sink>, chunk: &AudioChunk) {
        if let Err(e) = sink.write(chunk).await {
            tracing::warn!(
                sink = sink.name(),
                channel = chunk.channel,
                sequence = chunk.sequence,
                error = %e,
                "sink write failed"
            );
            self.emit_event(SplutterEvent::SinkError {
                sink_name: sink.name().to_string(),
                error: e.to_string(),
            });
        }
    }

    /// Writes a chunk to all sinks concurrently.
    pub async fn write_chunk(&self, chunk: &AudioChunk) {
        let futures: Vec<_> = self
            .sinks
            .iter()
            .map(|sink| self.write_to_sink(sink, chunk))
            .collect();

        futures::future::join_all(futures).await;
    }

    /// Starts all sinks.
    ///
    /// Returns an error if any sink fails to start.
    pub async fn start_sinks(&self) -> Result<(), SplutterError> {
        for sink in &self.sinks {
            sink.on_start()
                .await
                .map_err(|e| SplutterError::SinkStartFailed {
                    sink_name: sink.name().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Stops all sinks.
    pub async fn stop_sinks(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.on_stop().await {
                self.emit_event(SplutterEvent::SinkError {
                    sink_name: sink.name().to_string(),
                    error: format!("Error during shutdown: {e}"),
                });
            }
        }
    }

    /// Runs the router, reading from a channel and writing to sinks.
    ///
    /// Exits on [`RouterCommand::Stop`], or once both channels are closed.
    pub async fn run(
        self,
        mut chunk_rx: mpsc::Receiver<AudioChunk>,
        mut cmd_rx: mpsc::Receiver<RouterCommand>,
    ) {
        loop {
            tokio::select! {
                Some(chunk) = chunk_rx.recv() => {
                    self.write_chunk(&chunk).await;
                }
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        RouterCommand::Stop => {
                            // Drain remaining chunks
                            while let Ok(chunk) = chunk_rx.try_recv() {
                                self.write_chunk(&chunk).await;
                            }
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        self.stop_sinks().await;
        tracing::debug!(sinks = self.sinks.len(), "router stopped");
    }
}

/// Handle to a router running on the tokio runtime.
pub struct RouterHandle {
    commands: mpsc::Sender<RouterCommand>,
    task: JoinHandle<()>,
}

impl RouterHandle {
    /// Drains queued chunks, stops every sink, and waits for the task to exit.
    pub async fn stop(self) -> Result<(), SplutterError> {
        // A closed channel means the router already exited.
        let _ = self.commands.send(RouterCommand::Stop).await;
        self.task
            .await
            .map_err(|e| SplutterError::BackendError(format!("router task failed: {e}")))
    }

    /// Returns `true` once the router task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts every sink, then spawns the router on the current runtime.
///
/// # Errors
///
/// Returns `SinkStartFailed` if a sink fails to start; nothing is spawned then.
pub async fn spawn_router(
    router: Router,
    chunk_rx: mpsc::Receiver<AudioChunk>,
) -> Result<RouterHandle, SplutterError> {
    router.start_sinks().await?;

    let (commands, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let task = tokio::spawn(router.run(chunk_rx, cmd_rx));
    Ok(RouterHandle { commands, task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event_callback, SinkError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestSink {
        name: String,
        write_count: AtomicUsize,
        fail_count: AtomicUsize,
        fail_start: bool,
        stopped: AtomicBool,
    }

    impl TestSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                write_count: AtomicUsize::new(0),
                fail_count: AtomicUsize::new(0),
                fail_start: false,
                stopped: AtomicBool::new(false),
            }
        }

        fn failing(name: &str, fail_times: usize) -> Self {
            Self {
                fail_count: AtomicUsize::new(fail_times),
                ..Self::new(name)
            }
        }

        fn writes(&self) -> usize {
            self.write_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sink for TestSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_start(&self) -> Result<(), SinkError> {
            if self.fail_start {
                return Err(SinkError::custom("no disk"));
            }
            Ok(())
        }

        async fn write(&self, _chunk: &AudioChunk) -> Result<(), SinkError> {
            let remaining = self.fail_count.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_count.fetch_sub(1, Ordering::SeqCst);
                return Err(SinkError::custom("intentional failure"));
            }
            self.write_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), SinkError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn chunk(sequence: u64) -> AudioChunk {
        AudioChunk::new(vec![0.0; 128], 0, sequence, 48000)
    }

    #[tokio::test]
    async fn test_router_writes_to_all_sinks() {
        let sink1 = Arc::new(TestSink::new("sink1"));
        let sink2 = Arc::new(TestSink::new("sink2"));

        let router = Router::new(vec![sink1.clone(), sink2.clone()]);
        router.write_chunk(&chunk(0)).await;

        assert_eq!(sink1.writes(), 1);
        assert_eq!(sink2.writes(), 1);
    }

    #[tokio::test]
    async fn test_router_does_not_retry() {
        let sink = Arc::new(TestSink::failing("sink", 1));
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let router = Router::new(vec![sink.clone()])
            .with_event_callback(event_callback(move |e| events_clone.lock().push(e)));

        router.write_chunk(&chunk(0)).await;
        router.write_chunk(&chunk(1)).await;

        // First chunk lost, second written.
        assert_eq!(sink.writes(), 1);
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            SplutterEvent::SinkError { sink_name, .. } if sink_name == "sink"
        ));
    }

    #[tokio::test]
    async fn test_router_run_stops_on_command() {
        let sink = Arc::new(TestSink::new("sink"));
        let router = Router::new(vec![sink.clone()]);

        let (chunk_tx, chunk_rx) = mpsc::channel(10);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);

        chunk_tx.send(chunk(0)).await.unwrap();
        chunk_tx.send(chunk(1)).await.unwrap();
        cmd_tx.send(RouterCommand::Stop).await.unwrap();

        router.run(chunk_rx, cmd_rx).await;

        assert_eq!(sink.writes(), 2);
        assert!(sink.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawned_router_drains_on_stop() {
        let sink = Arc::new(TestSink::new("sink"));
        let (chunk_tx, chunk_rx) = mpsc::channel(10);

        let handle = spawn_router(Router::new(vec![sink.clone()]), chunk_rx)
            .await
            .unwrap();
        chunk_tx.send(chunk(0)).await.unwrap();
        drop(chunk_tx);

        handle.stop().await.unwrap();
        assert_eq!(sink.writes(), 1);
        assert!(sink.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_router_fails_on_sink_start() {
        let sink = Arc::new(TestSink {
            fail_start: true,
            ..TestSink::new("broken")
        });
        let (_chunk_tx, chunk_rx) = mpsc::channel(10);

        let result = spawn_router(Router::new(vec![sink]), chunk_rx).await;

        assert!(matches!(
            result,
            Err(SplutterError::SinkStartFailed { sink_name, .. }) if sink_name == "broken"
        ));
    }
}
