//! Capture backend abstraction and platform factory.
//!
//! One backend is compiled per platform; [`platform_backend`] hands the
//! facade a boxed trait object so consumers never see the concrete type.
//! [`MockBackend`] is available everywhere for tests and CI hosts without
//! audio hardware.

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "windows")]
pub mod windows;

use std::sync::Arc;

use crate::bridge::DeliverySink;
use crate::device::{Device, DeviceFormat, DeviceType};
use crate::permission::{PermissionKind, PermissionStatus};
use crate::session::SessionState;
use crate::CaptureError;

pub use mock::MockBackend;

/// A platform capture backend.
///
/// The facade validates `(type, id)` against [`devices`](Self::devices)
/// before calling [`start`](Self::start), so backends may assume the
/// device resolved at enumeration time (it can still vanish before the
/// session is up, which is a start failure, or mid-session, which is a
/// `DEVICE_DISCONNECTED` on the sink).
pub trait CaptureBackend: Send {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Enumerates all devices of both directions.
    ///
    /// Callable without an active session; must not allocate long-lived
    /// platform state.
    fn devices(&self) -> Result<Vec<Device>, CaptureError>;

    /// Queries the delivery format for one device id.
    fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError>;

    /// Starts a capture session on the resolved device.
    ///
    /// Returns once the underlying audio client is running. The producer
    /// must watch `state` and exit when the flag clears; it must also
    /// clear the flag itself if it exits on a fatal error. Errors returned
    /// from this method are reported to the sink by the facade - the
    /// backend must not invoke `on_error` for them.
    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        state: Arc<SessionState>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<(), CaptureError>;

    /// Tears the session down, blocking until the producer has terminated
    /// and platform handles are released. No-op without a session.
    ///
    /// The facade clears the running flag before calling this.
    fn stop(&mut self);

    /// Non-prompting permission query.
    fn check_permission(&self) -> PermissionStatus;

    /// Requests one permission, blocking until the user responds or a
    /// 30-second timeout elapses. Returns whether it is now granted.
    fn request_permission(&self, kind: PermissionKind) -> bool;
}

/// Creates the capture backend compiled into this artifact.
///
/// # Errors
///
/// Returns `UNSUPPORTED_OPERATION` on platforms without a backend.
#[allow(unreachable_code)]
pub fn platform_backend() -> Result<Box<dyn CaptureBackend>, CaptureError> {
    #[cfg(target_os = "windows")]
    {
        return Ok(Box::new(windows::WasapiBackend::new()));
    }

    #[cfg(target_os = "macos")]
    {
        return Ok(Box::new(macos::MacosBackend::new()));
    }

    Err(CaptureError::UnsupportedOperation {
        reason: "no capture backend for this platform".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn test_factory_errors_on_unsupported_platform() {
        let err = match platform_backend() {
            Ok(_) => panic!("expected no backend on this platform"),
            Err(err) => err,
        };
        assert_eq!(err.code(), "UNSUPPORTED_OPERATION");
    }

    #[test]
    #[cfg(any(target_os = "windows", target_os = "macos"))]
    fn test_factory_returns_a_backend() {
        let backend = platform_backend().unwrap();
        assert!(!backend.name().is_empty());
    }
}
