//! CoreAudio microphone capture via cpal.
//!
//! The cpal input callback runs on the OS audio thread and must never
//! block, so it only pushes into a lock-free ring. A dedicated forwarder
//! thread (named uniquely per session) drains the ring, normalizes to
//! 48 kHz stereo, and delivers frames to the sink. The cpal stream lives
//! on the forwarder thread for its whole life: it is not `Send`, and this
//! also makes teardown synchronous - joining the forwarder drops the
//! stream before `stop` returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device as CpalDevice, SampleFormat};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};

use super::OUTPUT_SAMPLE_RATE;
use crate::bridge::DeliverySink;
use crate::device::{Device, DeviceFormat, DeviceType};
use crate::format::{f32_to_i16, i16_slice_to_le_bytes, resample_stereo, to_stereo};
use crate::session::SessionState;
use crate::CaptureError;

/// Ring capacity: two seconds of native audio absorbs any forwarder
/// scheduling hiccup.
const RING_SECONDS: usize = 2;

/// Forwarder poll interval.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// How long `start` waits for the stream to come up.
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Monotonic suffix so each session's forwarder thread has a unique name.
static SESSION_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Lists input devices, marking the platform default.
pub(super) fn list_input_devices() -> Result<Vec<Device>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::backend("enumerate input devices", e))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| {
            let is_default = default_name.as_deref() == Some(name.as_str());
            Device::new(name.clone(), name, DeviceType::Input, is_default)
        })
        .collect())
}

/// Queries the active capture format of one input device.
pub(super) fn device_format(device_id: &str) -> Result<DeviceFormat, CaptureError> {
    let device = resolve_device(device_id)?;
    let config = device
        .default_input_config()
        .map_err(|e| CaptureError::backend("query input format", e))?;

    let raw_bit_depth = match config.sample_format() {
        SampleFormat::I16 | SampleFormat::U16 => 16,
        _ => 32,
    };

    Ok(DeviceFormat {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
        bit_depth: 16,
        raw_bit_depth,
    })
}

fn resolve_device(device_id: &str) -> Result<CpalDevice, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::backend("enumerate input devices", e))?;

    for device in devices {
        if device.name().is_ok_and(|name| name == device_id) {
            return Ok(device);
        }
    }
    Err(CaptureError::DeviceNotFound {
        id: device_id.to_string(),
    })
}

/// Starts a microphone session; returns once the stream is playing.
pub(super) fn start(
    device_id: &str,
    state: Arc<SessionState>,
    sink: Arc<dyn DeliverySink>,
) -> Result<JoinHandle<()>, CaptureError> {
    let id = device_id.to_string();
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    let (ready_tx, ready_rx) = mpsc::channel();

    let worker_state = Arc::clone(&state);
    let worker = thread::Builder::new()
        .name(format!("mic-capture-{seq}"))
        .spawn(move || run_session(&id, &worker_state, &*sink, &ready_tx))
        .map_err(|e| CaptureError::backend("spawn microphone thread", e))?;

    match ready_rx.recv_timeout(START_TIMEOUT) {
        Ok(Ok(())) => Ok(worker),
        Ok(Err(err)) => {
            let _ = worker.join();
            Err(err)
        }
        Err(_) => {
            state.shut_down();
            let _ = worker.join();
            Err(CaptureError::backend(
                "start microphone",
                "timed out waiting for the input stream",
            ))
        }
    }
}

/// Builds the stream, forwards until stopped, and tears down in order.
fn run_session(
    device_id: &str,
    state: &SessionState,
    sink: &dyn DeliverySink,
    ready_tx: &mpsc::Sender<Result<(), CaptureError>>,
) {
    let (stream, mut ring, native_rate, native_channels) = match open_stream(device_id) {
        Ok(parts) => parts,
        Err(err) => {
            state.shut_down();
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    if let Err(e) = stream.play() {
        state.shut_down();
        let _ = ready_tx.send(Err(CaptureError::backend("play input stream", e)));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    tracing::debug!(
        device = device_id,
        native_rate,
        native_channels,
        "microphone session running"
    );

    let frame = usize::from(native_channels);
    let mut scratch: Vec<i16> = Vec::new();
    while state.is_running() {
        thread::sleep(DRAIN_INTERVAL);

        // Drain whole frames only; a torn frame would shift every later
        // sample by one channel.
        let available = ring.occupied_len();
        let take = available - available % frame;
        if take == 0 {
            continue;
        }

        scratch.resize(take, 0);
        let popped = ring.pop_slice(&mut scratch);
        scratch.truncate(popped - popped % frame);
        if scratch.is_empty() {
            continue;
        }

        let stereo = to_stereo(&scratch, native_channels);
        let normalized = resample_stereo(&stereo, native_rate, OUTPUT_SAMPLE_RATE);
        if normalized.is_empty() {
            continue;
        }

        let bytes = i16_slice_to_le_bytes(&normalized);
        sink.on_data(&bytes);
        state.record_delivery(bytes.len());
    }

    // Stream drops here, stopping the OS callback before the thread exits.
    drop(stream);
}

type StreamParts = (cpal::Stream, ringbuf::HeapCons<i16>, u32, u16);

/// Opens the device's default input stream feeding a fresh ring.
fn open_stream(device_id: &str) -> Result<StreamParts, CaptureError> {
    let device = resolve_device(device_id)?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::backend("query input format", e))?;

    let native_rate = supported.sample_rate().0;
    let native_channels = supported.channels();
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let capacity = native_rate as usize * usize::from(native_channels) * RING_SECONDS;
    let (producer, consumer) = HeapRb::<i16>::new(capacity.max(1024)).split();

    let stream = match sample_format {
        SampleFormat::I16 => build_i16_stream(&device, &config, producer)?,
        SampleFormat::F32 => build_f32_stream(&device, &config, producer)?,
        format => {
            return Err(CaptureError::UnsupportedOperation {
                reason: format!("unsupported input sample format: {format:?}"),
            });
        }
    };

    Ok((stream, consumer, native_rate, native_channels))
}

fn build_i16_stream(
    device: &CpalDevice,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<i16>,
) -> Result<cpal::Stream, CaptureError> {
    device
        .build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                // Non-blocking; overflow drops samples rather than stalling
                // the OS audio thread.
                let _ = producer.push_slice(data);
            },
            |err| tracing::error!("input stream error: {err}"),
            None,
        )
        .map_err(|e| CaptureError::backend("build input stream", e))
}

fn build_f32_stream(
    device: &CpalDevice,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<i16>,
) -> Result<cpal::Stream, CaptureError> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let _ = producer.try_push(f32_to_i16(sample));
                }
            },
            |err| tracing::error!("input stream error: {err}"),
            None,
        )
        .map_err(|e| CaptureError::backend("build input stream", e))
}
