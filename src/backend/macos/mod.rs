//! macOS capture backend.
//!
//! Two engines behind one backend: microphones go through CoreAudio (via
//! cpal), the reserved `"system"` output device goes through
//! ScreenCaptureKit. Both deliver 48 kHz stereo signed 16-bit frames, so
//! consumers see one format regardless of the route.

mod microphone;
mod permissions;
mod system_audio;

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::bridge::DeliverySink;
use crate::device::{Device, DeviceFormat, DeviceType, SYSTEM_AUDIO_DEVICE_ID};
use crate::permission::{PermissionKind, PermissionStatus};
use crate::session::SessionState;
use crate::{CaptureBackend, CaptureError};

/// Delivery format forced on macOS, both routes.
pub(crate) const OUTPUT_SAMPLE_RATE: u32 = 48_000;
pub(crate) const OUTPUT_CHANNELS: u16 = 2;

/// The session currently owned by the backend.
enum ActiveSession {
    Microphone {
        worker: JoinHandle<()>,
        state: Arc<SessionState>,
    },
    SystemAudio(system_audio::SystemAudioSession),
}

/// macOS backend routing between the microphone and system-audio engines.
pub struct MacosBackend {
    active: Option<ActiveSession>,
}

impl MacosBackend {
    /// Creates the backend. Platform objects are created per session.
    #[must_use]
    pub fn new() -> Self {
        Self { active: None }
    }
}

impl Default for MacosBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MacosBackend {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        let mut devices = microphone::list_input_devices()?;
        // All rendered output collapses into the one virtual device.
        devices.push(Device::new(
            SYSTEM_AUDIO_DEVICE_ID,
            "System Audio",
            DeviceType::Output,
            true,
        ));
        Ok(devices)
    }

    fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError> {
        if device_id == SYSTEM_AUDIO_DEVICE_ID {
            return Ok(DeviceFormat::system_audio());
        }
        microphone::device_format(device_id)
    }

    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        state: Arc<SessionState>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<(), CaptureError> {
        match device_type {
            DeviceType::Input => {
                if matches!(
                    permissions::microphone_authorization(),
                    permissions::MicAuthorization::Denied
                        | permissions::MicAuthorization::Restricted
                ) {
                    return Err(CaptureError::PermissionDenied {
                        kind: PermissionKind::Microphone,
                    });
                }
                let worker = microphone::start(device_id, Arc::clone(&state), sink)?;
                self.active = Some(ActiveSession::Microphone { worker, state });
            }
            DeviceType::Output => {
                // The facade resolved the id against enumeration, and the
                // only output device is the reserved one.
                debug_assert_eq!(device_id, SYSTEM_AUDIO_DEVICE_ID);
                let session = system_audio::SystemAudioSession::start(state, sink)?;
                self.active = Some(ActiveSession::SystemAudio(session));
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        match self.active.take() {
            Some(ActiveSession::Microphone { worker, state }) => {
                state.shut_down();
                let _ = worker.join();
            }
            Some(ActiveSession::SystemAudio(session)) => {
                session.stop();
            }
            None => {}
        }
    }

    fn check_permission(&self) -> PermissionStatus {
        PermissionStatus {
            mic: permissions::microphone_authorization()
                == permissions::MicAuthorization::Authorized,
            system: permissions::screen_capture_granted(),
        }
    }

    fn request_permission(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::Microphone => permissions::request_microphone(),
            PermissionKind::SystemAudio => {
                // The CG request shows the dialog on first denial; the
                // shareable-content probe confirms the resulting state.
                permissions::request_screen_capture()
                    || system_audio::shareable_content_accessible()
            }
        }
    }
}

impl Drop for MacosBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_device_is_enumerated() {
        // Input enumeration may be empty on CI, but the reserved output
        // device is always present.
        let backend = MacosBackend::new();
        if let Ok(devices) = backend.devices() {
            let system: Vec<_> = devices
                .iter()
                .filter(|d| d.device_type == DeviceType::Output)
                .collect();
            assert_eq!(system.len(), 1);
            assert_eq!(system[0].id, SYSTEM_AUDIO_DEVICE_ID);
            assert!(system[0].is_default);
        }
    }

    #[test]
    fn test_system_format_is_fixed() {
        let backend = MacosBackend::new();
        let format = backend.device_format(SYSTEM_AUDIO_DEVICE_ID).unwrap();
        assert_eq!(format, DeviceFormat::system_audio());
    }
}
