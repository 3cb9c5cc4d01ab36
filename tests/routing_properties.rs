//! Property-based tests for the routing coordinator.
//!
//! Random command sequences run against `MockBackend`. After every step the
//! connection matrix must match the merger edges the mock actually holds.

use proptest::prelude::*;
use splutter::{Audio, ContextState, MockBackend, MockProbe, MockStream, SplutterError};

const INPUTS: usize = 3;
const OUTPUTS: usize = 3;

#[derive(Debug, Clone)]
enum Command {
    Record(usize),
    Stop(usize),
    Unmute(usize, usize),
    Mute(usize, usize),
    /// Attach a new stream with this many channels.
    Restream(usize),
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        (0..INPUTS).prop_map(Command::Record),
        (0..INPUTS).prop_map(Command::Stop),
        (0..INPUTS, 0..OUTPUTS).prop_map(|(i, o)| Command::Unmute(i, o)),
        (0..INPUTS, 0..OUTPUTS).prop_map(|(i, o)| Command::Mute(i, o)),
        (1..=INPUTS).prop_map(Command::Restream),
    ]
}

fn started() -> (Audio<MockBackend>, MockProbe) {
    let backend = MockBackend::new(OUTPUTS);
    let probe = backend.probe();
    let mut audio = Audio::builder(backend).buffer_size(256).build().unwrap();
    audio.resume().unwrap();
    audio
        .handle_input_stream(MockStream::new(INPUTS))
        .unwrap();
    (audio, probe)
}

fn apply(audio: &mut Audio<MockBackend>, command: &Command) -> Result<(), SplutterError> {
    match *command {
        Command::Record(input) => audio.record_channel(input),
        Command::Stop(input) => audio.stop_record_channel(input),
        Command::Unmute(input, output) => audio.unmute_output_for_input(input, output),
        Command::Mute(input, output) => audio.mute_output_for_input(input, output),
        Command::Restream(channels) => audio
            .handle_input_stream(MockStream::new(channels))
            .map(|_| ()),
    }
}

/// Matrix rows equal the mock's merger inputs, and recording keeps an edge.
fn check_wiring(audio: &Audio<MockBackend>, probe: &MockProbe) -> Result<(), TestCaseError> {
    for channel in audio.channels() {
        let index = channel.index();
        let wired: Vec<usize> = probe
            .merger_inputs_from(channel.output_node())
            .into_iter()
            .collect();
        let connected = audio.connected_outputs(index);
        prop_assert_eq!(&wired, &connected, "input {} drifted", index);
        if channel.is_recording() {
            prop_assert!(
                !connected.is_empty(),
                "input {} records with no edge to the merger",
                index
            );
        }
    }
    Ok(())
}

proptest! {
    /// Property: the matrix never drifts from the graph, whatever the command order
    #[test]
    fn matrix_tracks_graph_after_every_command(
        commands in prop::collection::vec(command(), 0..32)
    ) {
        let (mut audio, probe) = started();
        prop_assert_eq!(audio.output_channel_count(), OUTPUTS);

        for command in &commands {
            let result = apply(&mut audio, command);
            prop_assert!(result.is_ok(), "{:?} failed: {:?}", command, result);
            check_wiring(&audio, &probe)?;
        }
    }

    /// Property: stop_all leaves every cell clear and every channel muted and idle
    #[test]
    fn stop_all_resets_everything(
        commands in prop::collection::vec(command(), 0..32)
    ) {
        let (mut audio, probe) = started();
        for command in &commands {
            prop_assert!(apply(&mut audio, command).is_ok());
        }

        prop_assert!(audio.stop_all().is_ok());

        prop_assert!(audio.connections().is_clear());
        prop_assert_eq!(audio.recording_channel_count(), 0);
        for channel in audio.channels() {
            prop_assert!(channel.is_muted());
            prop_assert!(!channel.is_recording());
            prop_assert!(probe.merger_inputs_from(channel.output_node()).is_empty());
        }
        prop_assert_eq!(probe.context_state(), Some(ContextState::Suspended));
    }

    /// Property: recording a channel with no outputs always leaves it wired
    #[test]
    fn record_always_wires_an_output(
        commands in prop::collection::vec(command(), 0..16),
        input in 0..INPUTS,
    ) {
        let (mut audio, probe) = started();
        for command in &commands {
            prop_assert!(apply(&mut audio, command).is_ok());
        }

        prop_assert!(audio.record_channel(input).is_ok());

        prop_assert!(audio.channel(input).is_some_and(|c| c.is_recording()));
        prop_assert!(!audio.connected_outputs(input).is_empty());
        check_wiring(&audio, &probe)?;
    }
}
