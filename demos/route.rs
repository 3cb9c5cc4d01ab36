//! Routing and recording demo.
//!
//! Lists audio devices, monitors input channel 0 on output 0, and records
//! input channel 0 into numbered `.f32` files for a few seconds.
//!
//! Run with: cargo run --example route -- [input-device] [output-dir]
//!
//! Set `RUST_LOG=splutter=debug` to watch graph edits and state changes.

use std::sync::Arc;
use std::time::Duration;

use splutter::pipeline::{chunk_forwarder, spawn_router, Router, DEFAULT_CHUNK_QUEUE};
use splutter::{
    event_callback, list_input_devices, list_output_devices, Audio, CpalBackend, CpalInput,
    SequenceFileSink, Sink,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const RECORD_SECONDS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("splutter=info".parse()?))
        .init();

    let mut args = std::env::args().skip(1);
    let input = args.next();
    let dir = args
        .next()
        .unwrap_or_else(|| format!("splutter-{}", std::process::id()));

    println!("Input devices:");
    for name in list_input_devices()? {
        println!("  {name}");
    }
    println!("Output devices:");
    for name in list_output_devices()? {
        println!("  {name}");
    }

    let events = event_callback(|e| tracing::warn!(?e, "splutter event"));

    let (tx, rx) = mpsc::channel(DEFAULT_CHUNK_QUEUE);
    let files = Arc::new(SequenceFileSink::new(&dir).channel(0));
    let sinks: Vec<Arc<dyn Sink>> = vec![files.clone()];
    let router = spawn_router(Router::new(sinks).with_event_callback(events.clone()), rx).await?;

    let mut audio = Audio::builder(CpalBackend::new().on_event(events.clone()))
        .chunk_callback(chunk_forwarder(tx, Some(events)))
        .on_channel_state_change(|index, state| println!("channel {index}: {state}"))
        .build()?;

    audio.resume()?;
    let stream = input.map_or_else(CpalInput::default_device, CpalInput::device);
    let channels = audio.handle_input_stream(stream)?;
    println!(
        "{channels} input channel(s), {} output channel(s) at {} Hz",
        audio.output_channel_count(),
        audio.sample_rate().unwrap_or_default()
    );

    audio.unmute_output_for_input(0, 0)?;
    audio.record_channel(0)?;

    println!("Recording input 0 to {dir}/ for {RECORD_SECONDS} seconds...");
    tokio::time::sleep(Duration::from_secs(RECORD_SECONDS)).await;

    audio.close()?;
    router.stop().await?;

    println!("Saved {} file(s) to {dir}/", files.files_written().await);
    Ok(())
}
