//! Mock capture backend for testing without hardware.
//!
//! Emits deterministic synthetic PCM from a real producer thread so the
//! full facade contract (session lifecycle, delivery ordering, error
//! reporting, post-stop silence) is exercisable in CI.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bridge::DeliverySink;
use crate::device::{Device, DeviceFormat, DeviceType};
use crate::format::{f32_to_i16, i16_slice_to_le_bytes};
use crate::permission::{PermissionKind, PermissionStatus};
use crate::session::SessionState;
use crate::CaptureBackend;
use crate::CaptureError;

/// Delivery format of the mock backend.
const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u16 = 2;

/// Frames per delivered buffer (10 ms at 48 kHz).
const BUFFER_FRAMES: usize = 480;

/// Producer pacing between buffers.
const BUFFER_INTERVAL: Duration = Duration::from_millis(10);

/// Synthetic signal emitted by a mock session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockSignal {
    /// All-zero samples, as a muted device would deliver.
    Silence,
    /// A full-scale-halved sine at the given frequency on all channels.
    Sine(f32),
}

/// Hardware-free [`CaptureBackend`] with a fixed device set.
///
/// # Example
///
/// ```
/// use pcm_capture::{AudioEngine, MockBackend};
///
/// let engine = AudioEngine::with_backend(Box::new(MockBackend::new()));
/// assert_eq!(engine.devices().unwrap().len(), 3);
/// ```
pub struct MockBackend {
    devices: Vec<Device>,
    signal: MockSignal,
    mic_granted: bool,
    /// Emit an error and terminate after this many buffers.
    fail_after_buffers: Option<u64>,
    worker: Option<JoinHandle<()>>,
    session: Option<Arc<SessionState>>,
}

impl MockBackend {
    /// Creates a mock backend with one default input, one secondary
    /// input, and one default output device.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: vec![
                Device::new("mock-mic", "Mock Microphone", DeviceType::Input, true),
                Device::new("mock-mic-2", "Mock USB Microphone", DeviceType::Input, false),
                Device::new("mock-out", "Mock Speakers", DeviceType::Output, true),
            ],
            signal: MockSignal::Silence,
            mic_granted: true,
            fail_after_buffers: None,
            worker: None,
            session: None,
        }
    }

    /// Replaces the enumerated device set.
    #[must_use]
    pub fn with_devices(mut self, devices: Vec<Device>) -> Self {
        self.devices = devices;
        self
    }

    /// Selects the synthetic signal sessions emit.
    #[must_use]
    pub fn with_signal(mut self, signal: MockSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Simulates a user who denied microphone access.
    #[must_use]
    pub fn deny_microphone(mut self) -> Self {
        self.mic_granted = false;
        self
    }

    /// Injects a device failure after `buffers` delivered buffers.
    #[must_use]
    pub fn fail_after(mut self, buffers: u64) -> Self {
        self.fail_after_buffers = Some(buffers);
        self
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        Ok(self.devices.clone())
    }

    fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError> {
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(CaptureError::DeviceNotFound {
                id: device_id.to_string(),
            });
        }
        Ok(DeviceFormat {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bit_depth: 16,
            raw_bit_depth: 32,
        })
    }

    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        state: Arc<SessionState>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<(), CaptureError> {
        if device_type == DeviceType::Input && !self.mic_granted {
            return Err(CaptureError::PermissionDenied {
                kind: PermissionKind::Microphone,
            });
        }

        tracing::debug!(device = device_id, "mock capture starting");

        let signal = self.signal;
        let fail_after = self.fail_after_buffers;
        let worker_state = Arc::clone(&state);

        let worker = thread::Builder::new()
            .name("mock-capture".into())
            .spawn(move || {
                producer_loop(&worker_state, &*sink, signal, fail_after);
            })
            .map_err(|e| CaptureError::backend("spawn mock producer", e))?;

        self.worker = Some(worker);
        self.session = Some(state);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.shut_down();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn check_permission(&self) -> PermissionStatus {
        PermissionStatus {
            mic: self.mic_granted,
            system: true,
        }
    }

    fn request_permission(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Microphone => self.mic_granted,
            PermissionKind::SystemAudio => true,
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Emits one buffer per interval until stopped or the injected failure
/// triggers.
fn producer_loop(
    state: &SessionState,
    sink: &dyn DeliverySink,
    signal: MockSignal,
    fail_after: Option<u64>,
) {
    let mut buffers_sent: u64 = 0;
    let mut sample_clock: u64 = 0;

    while state.is_running() {
        if fail_after.is_some_and(|limit| buffers_sent >= limit) {
            sink.on_error(&CaptureError::disconnected("mock device unplugged"));
            state.shut_down();
            return;
        }

        let mut samples = Vec::with_capacity(BUFFER_FRAMES * usize::from(CHANNELS));
        for _ in 0..BUFFER_FRAMES {
            let value = match signal {
                MockSignal::Silence => 0,
                MockSignal::Sine(freq) => {
                    let t = sample_clock as f32 / SAMPLE_RATE as f32;
                    f32_to_i16(0.5 * (2.0 * std::f32::consts::PI * freq * t).sin())
                }
            };
            for _ in 0..CHANNELS {
                samples.push(value);
            }
            sample_clock += 1;
        }

        let bytes = i16_slice_to_le_bytes(&samples);
        sink.on_data(&bytes);
        state.record_delivery(bytes.len());
        buffers_sent += 1;

        thread::sleep(BUFFER_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CallbackSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_sink() -> (Arc<CallbackSink>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let buffers = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let buffers_clone = Arc::clone(&buffers);
        let errors_clone = Arc::clone(&errors);
        let sink = Arc::new(CallbackSink::new(
            move |pcm| {
                assert!(!pcm.is_empty());
                assert_eq!(pcm.len() % (usize::from(CHANNELS) * 2), 0);
                buffers_clone.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                errors_clone.fetch_add(1, Ordering::SeqCst);
            },
        ));
        (sink, buffers, errors)
    }

    #[test]
    fn test_mock_delivers_whole_frames() {
        let mut backend = MockBackend::new();
        let state = Arc::new(SessionState::new());
        let (sink, buffers, errors) = counting_sink();

        backend
            .start(DeviceType::Input, "mock-mic", Arc::clone(&state), sink)
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        state.shut_down();
        backend.stop();

        assert!(buffers.load(Ordering::SeqCst) >= 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mock_failure_injection_terminates_session() {
        let mut backend = MockBackend::new().fail_after(2);
        let state = Arc::new(SessionState::new());
        let (sink, buffers, errors) = counting_sink();

        backend
            .start(DeviceType::Input, "mock-mic", Arc::clone(&state), sink)
            .unwrap();
        thread::sleep(Duration::from_millis(100));

        assert!(!state.is_running(), "failure should clear the running flag");
        assert_eq!(buffers.load(Ordering::SeqCst), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        backend.stop();
    }

    #[test]
    fn test_mock_denied_microphone() {
        let mut backend = MockBackend::new().deny_microphone();
        let state = Arc::new(SessionState::new());
        let (sink, _, _) = counting_sink();

        let err = backend
            .start(DeviceType::Input, "mock-mic", state, sink)
            .unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
        assert!(!backend.check_permission().mic);
        assert!(!backend.request_permission(PermissionKind::Microphone));
    }

    #[test]
    fn test_mock_sine_has_signal() {
        let mut backend = MockBackend::new().with_signal(MockSignal::Sine(440.0));
        let state = Arc::new(SessionState::new());

        let peak = Arc::new(AtomicUsize::new(0));
        let peak_clone = Arc::clone(&peak);
        let sink = Arc::new(CallbackSink::new(
            move |pcm| {
                for pair in pcm.chunks_exact(2) {
                    let sample = i16::from_le_bytes([pair[0], pair[1]]);
                    peak_clone.fetch_max(sample.unsigned_abs() as usize, Ordering::SeqCst);
                }
            },
            |_| {},
        ));

        backend
            .start(DeviceType::Input, "mock-mic", Arc::clone(&state), sink)
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        state.shut_down();
        backend.stop();

        assert!(peak.load(Ordering::SeqCst) > 8000, "sine should be audible");
    }

    #[test]
    fn test_mock_format_lookup() {
        let backend = MockBackend::new();
        let format = backend.device_format("mock-mic").unwrap();
        assert_eq!(format.sample_rate, SAMPLE_RATE);
        assert_eq!(format.bit_depth, 16);

        let err = backend.device_format("gone").unwrap_err();
        assert_eq!(err.code(), "DEVICE_NOT_FOUND");
    }
}
