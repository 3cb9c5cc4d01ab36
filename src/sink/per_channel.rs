//! Per-input-channel fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::sink::Sink;
use crate::{AudioChunk, SinkError};

/// A sink that hands each chunk to the sinks routed for its input channel.
///
/// Every recorded input can get its own destinations, such as one
/// [`SequenceFileSink`](crate::SequenceFileSink) directory per channel.
/// Chunks from channels without a route are skipped. A sink routed for
/// several channels is started and stopped once.
///
/// # Example
///
/// ```no_run
/// use splutter::{PerChannelSink, SequenceFileSink};
/// use std::sync::Arc;
///
/// let sink = PerChannelSink::new()
///     .route(0, Arc::new(SequenceFileSink::new("take-1/vocals")))
///     .route(1, Arc::new(SequenceFileSink::new("take-1/guitar")));
/// ```
pub struct PerChannelSink {
    name: String,
    routes: BTreeMap<usize, Vec<Arc<dyn Sink>>>,
}

impl PerChannelSink {
    /// Creates a sink with no routes.
    pub fn new() -> Self {
        Self::with_name("per-channel")
    }

    /// Creates a sink with no routes and a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: BTreeMap::new(),
        }
    }

    /// Adds `sink` as a destination for input `channel`.
    #[must_use]
    pub fn route(mut self, channel: usize, sink: Arc<dyn Sink>) -> Self {
        self.routes.entry(channel).or_default().push(sink);
        self
    }

    /// Number of sinks routed for `channel`.
    pub fn routes_for(&self, channel: usize) -> usize {
        self.routes.get(&channel).map_or(0, Vec::len)
    }

    /// Every routed sink once, in channel order.
    fn distinct(&self) -> Vec<&Arc<dyn Sink>> {
        let mut sinks: Vec<&Arc<dyn Sink>> = Vec::new();
        for sink in self.routes.values().flatten() {
            if !sinks.iter().any(|known| Arc::ptr_eq(known, sink)) {
                sinks.push(sink);
            }
        }
        sinks
    }
}

impl Default for PerChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for PerChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&self) -> Result<(), SinkError> {
        for sink in self.distinct() {
            sink.on_start().await?;
        }
        Ok(())
    }

    async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
        let Some(sinks) = self.routes.get(&chunk.channel) else {
            return Ok(());
        };

        let results =
            futures::future::join_all(sinks.iter().map(|sink| sink.write(chunk))).await;

        let mut first_error = None;
        for (sink, result) in sinks.iter().zip(results) {
            if let Err(e) = result {
                tracing::debug!(
                    sink = sink.name(),
                    channel = chunk.channel,
                    sequence = chunk.sequence,
                    error = %e,
                    "routed write failed"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn on_stop(&self) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in self.distinct() {
            if let Err(e) = sink.on_stop().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
