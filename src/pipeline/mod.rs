//! Chunk delivery pipeline.
//!
//! Recorded chunks leave the engine thread through a bounded queue and are
//! fanned out to sinks on the tokio runtime:
//!
//! ```text
//! Engine Thread → chunk_forwarder → mpsc queue → Router Task → Sinks
//! ```
//!
//! - **Forwarder**: Non-blocking `try_send`; drops and reports when the queue is full
//! - **Router**: Fans out chunks to all registered sinks, without retries
//!
//! The forwarder ensures the engine callback never blocks.

mod forwarder;
mod router;

pub use forwarder::{chunk_forwarder, DEFAULT_CHUNK_QUEUE};
pub use router::{spawn_router, Router, RouterCommand, RouterHandle};
