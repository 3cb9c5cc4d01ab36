//! Integration tests for splutter.
//!
//! Routing scenarios run against `MockBackend`. Tests that require actual
//! audio hardware are marked with `#[ignore]` and should be run manually.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use splutter::pipeline::{chunk_forwarder, spawn_router, Router};
use splutter::{
    Audio, AudioChunk, ChannelState, ConnectionState, ContextState, CpalBackend, CpalInput,
    MockBackend, MockProbe, MockStream, PerChannelSink, SequenceFileSink, Sink, SinkError,
    SplutterError,
};
use tokio::sync::mpsc;

/// A test sink that counts writes.
struct CountingSink {
    name: String,
    count: AtomicUsize,
}

impl CountingSink {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for CountingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, _chunk: &AudioChunk) -> Result<(), SinkError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn two_channel_audio() -> (Audio<MockBackend>, MockProbe) {
    let backend = MockBackend::new(2);
    let probe = backend.probe();
    let mut audio = Audio::builder(backend).buffer_size(256).build().unwrap();
    audio.resume().unwrap();
    assert_eq!(audio.handle_input_stream(MockStream::new(2)).unwrap(), 2);
    (audio, probe)
}

#[test]
fn test_record_then_unmute_then_stop_scenario() {
    let (mut audio, _probe) = two_channel_audio();

    audio.record_channel(0).unwrap();
    assert_eq!(audio.connection(0, 0), ConnectionState::Connected);
    assert_eq!(audio.channel_state(0), Some(ChannelState::Recording));

    audio.unmute_output_for_input(0, 1).unwrap();
    assert_eq!(audio.connection(0, 1), ConnectionState::Connected);
    // The muted recording's default edge gives way to the chosen output.
    assert_eq!(audio.connection(0, 0), ConnectionState::NotConnected);
    assert_eq!(
        audio.channel_state(0),
        Some(ChannelState::OutputtingAndRecording)
    );

    audio.stop_record_channel(0).unwrap();
    assert_eq!(audio.channel_state(0), Some(ChannelState::Outputting));
    assert_eq!(audio.connected_outputs(0), vec![1]);
}

#[test]
fn test_stop_all_after_mixed_commands() {
    let (mut audio, probe) = two_channel_audio();

    audio.unmute_output_for_input(0, 0).unwrap();
    audio.unmute_output_for_input(0, 1).unwrap();
    audio.record_channel(0).unwrap();
    audio.record_channel(1).unwrap();
    audio.mute_output_for_input(1, 0).unwrap();

    audio.stop_all().unwrap();

    assert!(audio.connections().is_clear());
    for channel in audio.channels() {
        assert!(channel.is_muted());
        assert!(!channel.is_recording());
        assert!(probe.merger_inputs_from(channel.output_node()).is_empty());
    }
    assert_eq!(probe.context_state(), Some(ContextState::Suspended));
}

#[test]
fn test_listener_observes_transitions_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let mut audio = Audio::builder(MockBackend::new(2))
        .buffer_size(256)
        .on_channel_state_change(move |index, state| seen_clone.lock().push((index, state)))
        .build()
        .unwrap();
    audio.resume().unwrap();
    audio.handle_input_stream(MockStream::new(2)).unwrap();

    audio.record_channel(1).unwrap();
    audio.unmute_output_for_input(1, 0).unwrap();
    audio.mute_output_for_input(1, 0).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (1, ChannelState::Recording),
            (1, ChannelState::OutputtingAndRecording),
            (1, ChannelState::Recording),
        ]
    );
}

#[test]
fn test_unknown_channel_is_error() {
    let (mut audio, _probe) = two_channel_audio();
    let err = audio.record_channel(9).unwrap_err();
    assert!(matches!(err, SplutterError::UnknownInputChannel { .. }));
    assert_eq!(err.to_string(), "unknown input channel 9 (2 available)");
}

#[tokio::test]
async fn test_recorded_blocks_reach_sequence_files() {
    let temp = tempfile::tempdir().unwrap();
    let counter = Arc::new(CountingSink::new("counter"));
    let files = Arc::new(SequenceFileSink::new(temp.path()).channel(0));
    let sinks: Vec<Arc<dyn Sink>> = vec![counter.clone(), files.clone()];

    let (tx, rx) = mpsc::channel(16);
    let router = spawn_router(Router::new(sinks), rx).await.unwrap();

    let backend = MockBackend::new(2);
    let probe = backend.probe();
    let mut audio = Audio::builder(backend)
        .buffer_size(256)
        .chunk_callback(chunk_forwarder(tx, None))
        .build()
        .unwrap();
    audio.resume().unwrap();
    audio.handle_input_stream(MockStream::new(2)).unwrap();
    audio.record_channel(0).unwrap();
    audio.record_channel(1).unwrap();

    // Drive the processors as the engine thread would.
    let node0 = audio.channel(0).unwrap().output_node();
    let node1 = audio.channel(1).unwrap().output_node();
    for _ in 0..3 {
        probe.process_block(node0, &[0.5; 256]).unwrap();
        probe.process_block(node1, &[-0.5; 256]).unwrap();
    }

    audio.close().unwrap();
    router.stop().await.unwrap();

    assert_eq!(counter.count(), 6);
    assert_eq!(files.files_written().await, 3);

    let bytes = std::fs::read(temp.path().join("0000003.f32")).unwrap();
    assert_eq!(bytes.len(), 256 * 4);
    assert_eq!(&bytes[..4], &0.5f32.to_le_bytes());
}

#[tokio::test]
async fn test_each_input_records_into_its_own_directory() {
    let temp = tempfile::tempdir().unwrap();
    let first = Arc::new(SequenceFileSink::new(temp.path().join("in-0")));
    let second = Arc::new(SequenceFileSink::new(temp.path().join("in-1")));
    let lanes = PerChannelSink::new()
        .route(0, first.clone())
        .route(1, second.clone());
    let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(lanes)];

    let (tx, rx) = mpsc::channel(16);
    let router = spawn_router(Router::new(sinks), rx).await.unwrap();

    let backend = MockBackend::new(2);
    let probe = backend.probe();
    let mut audio = Audio::builder(backend)
        .buffer_size(256)
        .chunk_callback(chunk_forwarder(tx, None))
        .build()
        .unwrap();
    audio.resume().unwrap();
    audio.handle_input_stream(MockStream::new(2)).unwrap();
    audio.record_channel(0).unwrap();
    audio.record_channel(1).unwrap();

    let node0 = audio.channel(0).unwrap().output_node();
    let node1 = audio.channel(1).unwrap().output_node();
    probe.process_block(node0, &[0.25; 256]).unwrap();
    probe.process_block(node1, &[-0.25; 256]).unwrap();
    probe.process_block(node1, &[-0.25; 256]).unwrap();

    audio.close().unwrap();
    router.stop().await.unwrap();

    assert_eq!(first.files_written().await, 1);
    assert_eq!(second.files_written().await, 2);
    let bytes = std::fs::read(temp.path().join("in-1").join("0000002.f32")).unwrap();
    assert_eq!(&bytes[..4], &(-0.25f32).to_le_bytes());
}

#[test]
#[ignore = "requires audio hardware"]
fn test_cpal_default_devices() {
    let mut audio = Audio::builder(CpalBackend::new())
        .buffer_size(1024)
        .build()
        .unwrap();
    audio.resume().unwrap();
    assert!(audio.output_channel_count() > 0);

    let channels = audio
        .handle_input_stream(CpalInput::default_device())
        .unwrap();
    assert!(channels > 0);

    audio.unmute_output_for_input(0, 0).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(200));
    audio.close().unwrap();
}
