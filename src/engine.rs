//! Engine facade over the platform capture backend.

use std::sync::Arc;

use crate::backend::{platform_backend, CaptureBackend};
use crate::bridge::DeliverySink;
use crate::device::{Device, DeviceFormat, DeviceType};
use crate::permission::{PermissionKind, PermissionStatus};
use crate::session::{SessionState, SessionStats};
use crate::CaptureError;

/// Cross-platform audio capture engine.
///
/// One engine owns one backend and at most one capture session. `start`
/// validates the `(type, id)` selector against enumeration, spins the
/// backend's producer up, and returns once the audio client is running;
/// `stop` blocks until the producer has terminated, after which neither
/// sink callback fires again.
///
/// `start` and `stop` take `&mut self`: the caller serializes them, the
/// engine does not.
///
/// # Example
///
/// ```no_run
/// use pcm_capture::{AudioEngine, DeviceType, delivery_callbacks};
///
/// let mut engine = AudioEngine::new()?;
/// let mic = engine
///     .devices()?
///     .into_iter()
///     .find(|d| d.device_type == DeviceType::Input && d.is_default)
///     .expect("no default microphone");
///
/// let sink = delivery_callbacks(
///     |pcm| println!("{} bytes", pcm.len()),
///     |err| eprintln!("capture error: {err}"),
/// );
/// engine.start(DeviceType::Input, &mic.id, sink)?;
/// std::thread::sleep(std::time::Duration::from_secs(2));
/// engine.stop();
/// # Ok::<(), pcm_capture::CaptureError>(())
/// ```
pub struct AudioEngine {
    backend: Box<dyn CaptureBackend>,
    session: Option<Arc<SessionState>>,
    last_stats: SessionStats,
}

impl AudioEngine {
    /// Creates an engine over the backend compiled for this platform.
    ///
    /// # Errors
    ///
    /// Returns `UNSUPPORTED_OPERATION` on platforms without a backend.
    pub fn new() -> Result<Self, CaptureError> {
        Ok(Self::with_backend(platform_backend()?))
    }

    /// Creates an engine over an explicit backend (tests, embedding).
    #[must_use]
    pub fn with_backend(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            session: None,
            last_stats: SessionStats::default(),
        }
    }

    /// Name of the active backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Enumerates all devices of both directions.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the platform enumeration fails.
    pub fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        self.backend.devices()
    }

    /// Queries the delivery format for a device id.
    ///
    /// # Errors
    ///
    /// Returns `DEVICE_NOT_FOUND` for unknown or empty ids.
    pub fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError> {
        if device_id.is_empty() {
            return Err(CaptureError::DeviceNotFound {
                id: device_id.to_string(),
            });
        }
        self.backend.device_format(device_id)
    }

    /// Begins a capture session on `(device_type, device_id)`.
    ///
    /// Returns after the backend's audio client is running. On failure the
    /// classified error is both reported through `sink.on_error` and
    /// returned; the session stays inactive and `on_data` never fires.
    ///
    /// # Errors
    ///
    /// `ALREADY_RECORDING` with an active session, `DEVICE_NOT_FOUND` /
    /// `DEVICE_TYPE_MISMATCH` when the selector does not resolve, plus
    /// whatever the backend reports while bringing the session up.
    pub fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<(), CaptureError> {
        match self.try_start(device_type, device_id, Arc::clone(&sink)) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(code = err.code(), "start rejected: {err}");
                sink.on_error(&err);
                Err(err)
            }
        }
    }

    fn try_start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<(), CaptureError> {
        match &self.session {
            Some(session) if session.is_running() => {
                return Err(CaptureError::AlreadyRecording);
            }
            Some(_) => {
                // Previous session died on a fatal error; reap its producer
                // before reusing the backend.
                self.backend.stop();
                if let Some(session) = self.session.take() {
                    self.last_stats = session.stats();
                }
            }
            None => {}
        }

        if device_id.is_empty() {
            return Err(CaptureError::DeviceNotFound {
                id: device_id.to_string(),
            });
        }

        let devices = self.backend.devices()?;
        let resolved = devices.iter().find(|d| d.id == device_id);
        match resolved {
            None => {
                return Err(CaptureError::DeviceNotFound {
                    id: device_id.to_string(),
                });
            }
            Some(device) if device.device_type != device_type => {
                return Err(CaptureError::DeviceTypeMismatch {
                    id: device_id.to_string(),
                    expected: device_type,
                });
            }
            Some(_) => {}
        }

        let state = Arc::new(SessionState::new());
        self.backend
            .start(device_type, device_id, Arc::clone(&state), sink)?;

        tracing::debug!(
            backend = self.backend.name(),
            device = device_id,
            "capture session started"
        );
        self.session = Some(state);
        Ok(())
    }

    /// Stops the active session, blocking until the producer terminated
    /// and platform handles are released. Idempotent; a no-op without an
    /// active session. Must not be called from the producer thread.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.shut_down();
            self.backend.stop();
            self.last_stats = session.stats();
            tracing::debug!(backend = self.backend.name(), "capture session stopped");
        }
    }

    /// Whether a session is currently active.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_running())
    }

    /// Delivery counters of the current session, or of the most recently
    /// ended one when idle.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.session
            .as_ref()
            .map_or(self.last_stats, |s| s.stats())
    }

    /// Non-prompting permission query.
    #[must_use]
    pub fn check_permission(&self) -> PermissionStatus {
        self.backend.check_permission()
    }

    /// Requests one permission from the user.
    ///
    /// May block up to 30 seconds waiting for the OS dialog. Idempotent
    /// once granted.
    #[must_use]
    pub fn request_permission(&self, kind: PermissionKind) -> bool {
        self.backend.request_permission(kind)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::bridge::CallbackSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Sink that records every error code and counts data buffers.
    fn sentinel() -> (Arc<CallbackSink>, Arc<AtomicUsize>, Arc<Mutex<Vec<&'static str>>>) {
        let buffers = Arc::new(AtomicUsize::new(0));
        let codes: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let buffers_clone = Arc::clone(&buffers);
        let codes_clone = Arc::clone(&codes);
        let sink = Arc::new(CallbackSink::new(
            move |_| {
                buffers_clone.fetch_add(1, Ordering::SeqCst);
            },
            move |err| {
                codes_clone.lock().unwrap().push(err.code());
            },
        ));
        (sink, buffers, codes)
    }

    fn engine() -> AudioEngine {
        AudioEngine::with_backend(Box::new(MockBackend::new()))
    }

    #[test]
    fn test_empty_id_is_rejected_before_spawn() {
        let mut engine = engine();
        let (sink, buffers, codes) = sentinel();

        let err = engine.start(DeviceType::Input, "", sink).unwrap_err();
        assert_eq!(err.code(), "DEVICE_NOT_FOUND");
        assert!(!engine.is_recording());
        assert_eq!(buffers.load(Ordering::SeqCst), 0);
        assert_eq!(*codes.lock().unwrap(), vec!["DEVICE_NOT_FOUND"]);
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let mut engine = engine();
        let (sink, _, codes) = sentinel();

        let err = engine
            .start(DeviceType::Output, "nonexistent", sink)
            .unwrap_err();
        assert_eq!(err.code(), "DEVICE_NOT_FOUND");
        assert_eq!(*codes.lock().unwrap(), vec!["DEVICE_NOT_FOUND"]);
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut engine = engine();
        let (sink, _, codes) = sentinel();

        // mock-mic is an input device.
        let err = engine
            .start(DeviceType::Output, "mock-mic", sink)
            .unwrap_err();
        assert_eq!(err.code(), "DEVICE_TYPE_MISMATCH");
        assert_eq!(*codes.lock().unwrap(), vec!["DEVICE_TYPE_MISMATCH"]);
    }

    #[test]
    fn test_second_start_rejected_while_active() {
        let mut engine = engine();
        let (sink1, buffers1, _) = sentinel();
        let (sink2, buffers2, codes2) = sentinel();

        engine.start(DeviceType::Input, "mock-mic", sink1).unwrap();
        let err = engine
            .start(DeviceType::Input, "mock-mic", sink2)
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RECORDING");

        // First session keeps delivering; second sink saw only the error.
        std::thread::sleep(std::time::Duration::from_millis(50));
        engine.stop();
        assert!(buffers1.load(Ordering::SeqCst) >= 1);
        assert_eq!(buffers2.load(Ordering::SeqCst), 0);
        assert_eq!(*codes2.lock().unwrap(), vec!["ALREADY_RECORDING"]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut engine = engine();
        let (sink, _, _) = sentinel();

        engine.stop();
        engine.start(DeviceType::Input, "mock-mic", sink).unwrap();
        engine.stop();
        engine.stop();
        assert!(!engine.is_recording());
    }

    #[test]
    fn test_restart_after_fatal_error() {
        let mut engine =
            AudioEngine::with_backend(Box::new(MockBackend::new().fail_after(1)));
        let (sink, _, codes) = sentinel();

        engine
            .start(DeviceType::Input, "mock-mic", Arc::clone(&sink) as Arc<dyn DeliverySink>)
            .unwrap();
        // Wait for the injected failure to land.
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(!engine.is_recording());
        assert_eq!(*codes.lock().unwrap(), vec!["DEVICE_DISCONNECTED"]);

        // The engine reaps the dead session and starts a fresh one.
        let (sink2, _, _) = sentinel();
        engine.start(DeviceType::Input, "mock-mic-2", sink2).unwrap();
        engine.stop();
    }

    #[test]
    fn test_stats_track_delivery() {
        let mut engine = engine();
        let (sink, _, _) = sentinel();

        assert_eq!(engine.stats(), SessionStats::default());
        engine.start(DeviceType::Input, "mock-mic", sink).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        engine.stop();

        let stats = engine.stats();
        assert!(stats.buffers_delivered >= 1);
        assert_eq!(stats.bytes_delivered % 4, 0);
    }

    #[test]
    fn test_permissions_forwarded() {
        let engine = AudioEngine::with_backend(Box::new(MockBackend::new().deny_microphone()));
        assert!(!engine.check_permission().mic);
        assert!(engine.check_permission().system);
        assert!(!engine.request_permission(PermissionKind::Microphone));
        assert!(engine.request_permission(PermissionKind::SystemAudio));
    }
}
