//! CPAL-backed audio engine.
//!
//! The output device's callback drives the [`RenderGraph`]: every callback
//! renders as many quanta as the device asks for. Input devices push
//! captured frames into lock-free ring buffers that source nodes drain.
//!
//! ```text
//! CPAL input thread → Ring Buffer → source node ┐
//!                                               ├─ RenderGraph ← CPAL output thread
//! control thread (routing commands) ────────────┘
//! ```
//!
//! The output callback only ever uses `try_lock`, so a routing command in
//! progress costs one quantum of silence instead of blocking the device.

use std::collections::HashMap;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;

use crate::graph::{
    AudioBackend, AudioContext, BlockProcessor, ChannelInterpretation, ContextState, Edge, NodeId,
    RenderGraph,
};
use crate::{EngineConfig, EventCallback, SplutterError, SplutterEvent};

/// Scale between i16 and f32 samples.
const I16_SCALE: f32 = 32768.0;
/// Minimum i16 as f32 for clamping.
const I16_MIN_F32: f32 = i16::MIN as f32;
/// Maximum i16 as f32 for clamping.
const I16_MAX_F32: f32 = i16::MAX as f32;

fn backend_error(err: impl std::fmt::Display) -> SplutterError {
    SplutterError::BackendError(err.to_string())
}

/// Lists all available input devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_input_devices() -> Result<Vec<String>, SplutterError> {
    let devices = cpal::default_host().input_devices().map_err(backend_error)?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Lists all available output devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_output_devices() -> Result<Vec<String>, SplutterError> {
    let devices = cpal::default_host().output_devices().map_err(backend_error)?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}

fn find_device(
    mut devices: impl Iterator<Item = Device>,
    name: &str,
) -> Result<Device, SplutterError> {
    devices
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| SplutterError::DeviceNotFound {
            name: name.to_string(),
        })
}

fn stream_error_handler(
    events: Option<EventCallback>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        tracing::error!("Audio stream error: {}", err);
        if let Some(ref callback) = events {
            callback(SplutterEvent::StreamError {
                reason: err.to_string(),
            });
        }
    }
}

/// Selects the input device a [`CpalContext`] captures from.
///
/// Passed to [`Audio::handle_input_stream()`](crate::Audio::handle_input_stream).
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    device: Option<String>,
}

impl CpalInput {
    /// Capture from the system default input device.
    pub fn default_device() -> Self {
        Self { device: None }
    }

    /// Capture from a specific device by name.
    pub fn device(name: impl Into<String>) -> Self {
        Self {
            device: Some(name.into()),
        }
    }

    fn open(&self) -> Result<Device, SplutterError> {
        let host = cpal::default_host();
        match self.device {
            None => host
                .default_input_device()
                .ok_or(SplutterError::NoDefaultInputDevice),
            Some(ref name) => find_device(host.input_devices().map_err(backend_error)?, name),
        }
    }
}

/// An [`AudioBackend`] rendering to a CPAL output device.
///
/// # Example
///
/// ```no_run
/// use splutter::{Audio, CpalBackend, CpalInput};
///
/// let mut audio = Audio::builder(CpalBackend::new()).build()?;
/// audio.resume()?;
/// let inputs = audio.handle_input_stream(CpalInput::default_device())?;
/// println!("{inputs} input channels");
/// # Ok::<(), splutter::SplutterError>(())
/// ```
#[derive(Clone, Default)]
pub struct CpalBackend {
    output_device: Option<String>,
    config: EngineConfig,
    events: Option<EventCallback>,
}

impl CpalBackend {
    /// Renders to the system default output device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders to a specific output device by name.
    #[must_use]
    pub fn with_output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Receives device errors as [`SplutterEvent::StreamError`].
    #[must_use]
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.events = Some(callback);
        self
    }

    fn open_output(&self) -> Result<Device, SplutterError> {
        let host = cpal::default_host();
        match self.output_device {
            None => host
                .default_output_device()
                .ok_or(SplutterError::NoDefaultOutputDevice),
            Some(ref name) => find_device(host.output_devices().map_err(backend_error)?, name),
        }
    }
}

impl AudioBackend for CpalBackend {
    type Context = CpalContext;

    fn create_context(&self) -> Result<CpalContext, SplutterError> {
        let device = self.open_output()?;
        let default_config = device.default_output_config().map_err(backend_error)?;
        let sample_rate = default_config.sample_rate();
        let sample_format = default_config.sample_format();

        // Widest layout the device offers at its default rate and format.
        let max_channels = device
            .supported_output_configs()
            .map_err(backend_error)?
            .filter(|range| {
                range.sample_format() == sample_format
                    && range.min_sample_rate() <= sample_rate
                    && range.max_sample_rate() >= sample_rate
            })
            .map(|range| range.channels())
            .max()
            .unwrap_or(default_config.channels())
            .max(default_config.channels());

        let stream_config = CpalStreamConfig {
            channels: max_channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let graph = Arc::new(Mutex::new(RenderGraph::new(
            sample_rate.0,
            usize::from(max_channels),
        )));
        let output = build_output_stream(
            &device,
            &stream_config,
            sample_format,
            Arc::clone(&graph),
            self.events.clone(),
        )?;
        output.play().map_err(backend_error)?;
        graph.lock().set_running(true);

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = sample_rate.0,
            channels = max_channels,
            "audio context created"
        );

        Ok(CpalContext {
            graph,
            output: Some(output),
            inputs: HashMap::new(),
            state: ContextState::Running,
            max_output_channels: usize::from(max_channels),
            config: self.config.clone(),
            events: self.events.clone(),
        })
    }
}

fn build_output_stream(
    device: &Device,
    config: &CpalStreamConfig,
    format: SampleFormat,
    graph: Arc<Mutex<RenderGraph>>,
    events: Option<EventCallback>,
) -> Result<Stream, SplutterError> {
    let channels = usize::from(config.channels);
    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match graph.try_lock() {
                Some(mut graph) => graph.fill_interleaved(data, channels),
                None => data.fill(0.0),
            },
            stream_error_handler(events),
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    match graph.try_lock() {
                        Some(mut graph) => graph.fill_interleaved(&mut scratch, channels),
                        None => scratch.fill(0.0),
                    }
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = (sample * I16_SCALE).clamp(I16_MIN_F32, I16_MAX_F32) as i16;
                    }
                },
                stream_error_handler(events),
                None,
            )
        }
        format => {
            return Err(SplutterError::UnsupportedFormat {
                format: format!("{format:?}"),
            });
        }
    };
    stream.map_err(backend_error)
}

/// A running CPAL engine and its render graph.
///
/// Dropping the context stops every device stream.
pub struct CpalContext {
    graph: Arc<Mutex<RenderGraph>>,
    output: Option<Stream>,
    /// Capture streams, keyed by the source node they feed.
    inputs: HashMap<NodeId, Stream>,
    state: ContextState,
    max_output_channels: usize,
    config: EngineConfig,
    events: Option<EventCallback>,
}

impl CpalContext {
    fn ensure_open(&self) -> Result<(), SplutterError> {
        if self.state == ContextState::Closed {
            return Err(SplutterError::graph("context closed"));
        }
        Ok(())
    }

    fn open_capture(
        &self,
        device: &Device,
    ) -> Result<(Stream, ringbuf::HeapCons<f32>, usize), SplutterError> {
        let sample_rate = cpal::SampleRate(self.graph.lock().sample_rate());
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        // Prefer f32, then the widest channel layout, at the context rate.
        let supported = device
            .supported_input_configs()
            .map_err(backend_error)?
            .filter(|range| {
                matches!(range.sample_format(), SampleFormat::F32 | SampleFormat::I16)
                    && range.min_sample_rate() <= sample_rate
                    && range.max_sample_rate() >= sample_rate
            })
            .max_by_key(|range| (range.sample_format() == SampleFormat::F32, range.channels()))
            .ok_or_else(|| SplutterError::UnsupportedSampleRate {
                requested: sample_rate.0,
                device: device_name.clone(),
            })?
            .with_sample_rate(sample_rate);

        let sample_format = supported.sample_format();
        let config: CpalStreamConfig = supported.into();
        let channels = usize::from(config.channels);

        let capacity = (f64::from(sample_rate.0)
            * self.config.input_buffer_duration.as_secs_f64()) as usize
            * channels;
        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(channels)).split();

        let stream = match sample_format {
            SampleFormat::F32 => self.build_f32_capture(device, &config, producer)?,
            SampleFormat::I16 => self.build_i16_capture(device, &config, producer)?,
            format => {
                return Err(SplutterError::UnsupportedFormat {
                    format: format!("{format:?}"),
                });
            }
        };

        tracing::info!(
            device = %device_name,
            channels,
            "input stream opened"
        );
        Ok((stream, consumer, channels))
    }

    fn build_f32_capture(
        &self,
        device: &Device,
        config: &CpalStreamConfig,
        mut producer: ringbuf::HeapProd<f32>,
    ) -> Result<Stream, SplutterError> {
        device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Non-blocking push - drops samples if buffer is full
                    let _ = producer.push_slice(data);
                },
                stream_error_handler(self.events.clone()),
                None,
            )
            .map_err(backend_error)
    }

    fn build_i16_capture(
        &self,
        device: &Device,
        config: &CpalStreamConfig,
        mut producer: ringbuf::HeapProd<f32>,
    ) -> Result<Stream, SplutterError> {
        device
            .build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        let _ = producer.try_push(f32::from(sample) / I16_SCALE);
                    }
                },
                stream_error_handler(self.events.clone()),
                None,
            )
            .map_err(backend_error)
    }

    fn for_each_stream(
        &self,
        f: impl Fn(&Stream) -> Result<(), SplutterError>,
    ) -> Result<(), SplutterError> {
        if let Some(ref output) = self.output {
            f(output)?;
        }
        self.inputs.values().try_for_each(f)
    }
}

impl AudioContext for CpalContext {
    type Stream = CpalInput;

    fn state(&self) -> ContextState {
        self.state
    }

    fn suspend(&mut self) -> Result<(), SplutterError> {
        self.ensure_open()?;
        if self.state == ContextState::Suspended {
            return Ok(());
        }
        self.graph.lock().set_running(false);
        self.for_each_stream(|s| s.pause().map_err(backend_error))?;
        self.state = ContextState::Suspended;
        tracing::info!("audio context suspended");
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SplutterError> {
        self.ensure_open()?;
        self.for_each_stream(|s| s.play().map_err(backend_error))?;
        self.graph.lock().set_running(true);
        self.state = ContextState::Running;
        tracing::info!("audio context resumed");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SplutterError> {
        self.ensure_open()?;
        self.graph.lock().set_running(false);
        self.inputs.clear();
        self.output = None;
        self.state = ContextState::Closed;
        tracing::info!("audio context closed");
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.graph.lock().sample_rate()
    }

    fn max_output_channels(&self) -> usize {
        self.max_output_channels
    }

    fn configure_destination(
        &mut self,
        channels: usize,
        interpretation: ChannelInterpretation,
    ) -> Result<usize, SplutterError> {
        self.ensure_open()?;
        let channels = channels.min(self.max_output_channels);
        self.graph
            .lock()
            .configure_destination(channels, interpretation);
        Ok(channels)
    }

    fn destination(&self) -> NodeId {
        self.graph.lock().destination()
    }

    fn create_stream_source(
        &mut self,
        stream: CpalInput,
    ) -> Result<(NodeId, usize), SplutterError> {
        self.ensure_open()?;
        let device = stream.open()?;
        let (capture, consumer, channels) = self.open_capture(&device)?;
        if self.state == ContextState::Running {
            capture.play().map_err(backend_error)?;
        } else {
            capture.pause().map_err(backend_error)?;
        }

        let node = self.graph.lock().add_source(consumer, channels);
        self.inputs.insert(node, capture);
        Ok((node, channels))
    }

    fn create_splitter(&mut self, outputs: usize) -> Result<NodeId, SplutterError> {
        self.ensure_open()?;
        Ok(self.graph.lock().add_splitter(outputs))
    }

    fn create_merger(&mut self, inputs: usize) -> Result<NodeId, SplutterError> {
        self.ensure_open()?;
        Ok(self.graph.lock().add_merger(inputs))
    }

    fn create_lowpass(&mut self, cutoff_hz: f32, q: f32) -> Result<NodeId, SplutterError> {
        self.ensure_open()?;
        Ok(self.graph.lock().add_lowpass(cutoff_hz, q))
    }

    fn create_processor(
        &mut self,
        block_size: usize,
        processor: Box<dyn BlockProcessor>,
    ) -> Result<NodeId, SplutterError> {
        self.ensure_open()?;
        self.graph.lock().add_processor(block_size, processor)
    }

    fn connect(&mut self, edge: Edge) -> Result<(), SplutterError> {
        self.ensure_open()?;
        self.graph.lock().connect(edge)
    }

    fn disconnect(&mut self, edge: Edge) -> Result<(), SplutterError> {
        self.ensure_open()?;
        self.graph.lock().disconnect(edge)
    }

    fn release(&mut self, node: NodeId) -> Result<(), SplutterError> {
        self.ensure_open()?;
        self.graph.lock().remove_node(node)?;
        // Dropping the capture stream stops the input device.
        self.inputs.remove(&node);
        Ok(())
    }
}
