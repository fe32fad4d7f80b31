//! Error types for pcm-capture.
//!
//! Every error carries a stable short code ([`CaptureError::code`]) that
//! survives the trip through the delivery bridge as a string, so consumers
//! can branch on it without parsing display text. Silent buffers and other
//! recoverable conditions are not errors; they are rendered as zero-filled
//! output instead.

use crate::device::DeviceType;
use crate::permission::PermissionKind;

/// Errors reported by the capture engine.
///
/// Precondition violations are returned from [`AudioEngine::start`] before
/// any producer thread exists; failures on the producer thread arrive
/// through [`DeliverySink::on_error`] and terminate the session.
///
/// [`AudioEngine::start`]: crate::AudioEngine::start
/// [`DeliverySink::on_error`]: crate::DeliverySink::on_error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The `(type, id)` pair does not resolve to any enumerated device.
    #[error("device not found: {id}")]
    DeviceNotFound {
        /// The id that failed to resolve.
        id: String,
    },

    /// The id resolves to a device of the opposite direction.
    #[error("device {id} is not an {expected} device")]
    DeviceTypeMismatch {
        /// The id that resolved to the wrong direction.
        id: String,
        /// The direction the caller asked for.
        expected: DeviceType,
    },

    /// The OS denied access to the requested source.
    ///
    /// On macOS, check System Settings > Privacy & Security > Microphone
    /// (or Screen Recording for system audio).
    #[error("permission denied for {kind} capture")]
    PermissionDenied {
        /// Which permission gate refused.
        kind: PermissionKind,
    },

    /// `start` was called while a session is already active.
    #[error("a capture session is already active")]
    AlreadyRecording,

    /// The operation needs a newer OS version or an unavailable subsystem.
    #[error("unsupported operation: {reason}")]
    UnsupportedOperation {
        /// Why the operation is unavailable.
        reason: String,
    },

    /// The capture loop hit a hard per-packet failure and terminated.
    ///
    /// Typically the device was unplugged or the audio service invalidated
    /// the stream mid-session.
    #[error("device disconnected: {context}")]
    DeviceDisconnected {
        /// Which capture-loop step failed.
        context: String,
    },

    /// Session initialization failed on the producer thread.
    #[error("{context}: {cause}")]
    BackendFailure {
        /// Which initialization step failed.
        context: String,
        /// The underlying OS error text.
        cause: String,
    },
}

impl CaptureError {
    /// Stable classification code carried to consumers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            Self::DeviceTypeMismatch { .. } => "DEVICE_TYPE_MISMATCH",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::AlreadyRecording => "ALREADY_RECORDING",
            Self::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            Self::DeviceDisconnected { .. } => "DEVICE_DISCONNECTED",
            Self::BackendFailure { .. } => "BACKEND_FAILURE",
        }
    }

    /// Creates a backend failure for the given initialization step.
    pub fn backend(context: impl Into<String>, cause: impl ToString) -> Self {
        Self::BackendFailure {
            context: context.into(),
            cause: cause.to_string(),
        }
    }

    /// Creates a disconnection error for the given capture-loop step.
    pub fn disconnected(context: impl Into<String>) -> Self {
        Self::DeviceDisconnected {
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_device_id() {
        let err = CaptureError::DeviceNotFound {
            id: "usb-mic-7".to_string(),
        };
        assert_eq!(err.to_string(), "device not found: usb-mic-7");
    }

    #[test]
    fn test_codes_are_stable() {
        let cases = [
            (
                CaptureError::DeviceNotFound { id: "x".into() },
                "DEVICE_NOT_FOUND",
            ),
            (
                CaptureError::DeviceTypeMismatch {
                    id: "x".into(),
                    expected: DeviceType::Output,
                },
                "DEVICE_TYPE_MISMATCH",
            ),
            (
                CaptureError::PermissionDenied {
                    kind: PermissionKind::Microphone,
                },
                "PERMISSION_DENIED",
            ),
            (CaptureError::AlreadyRecording, "ALREADY_RECORDING"),
            (
                CaptureError::UnsupportedOperation { reason: "x".into() },
                "UNSUPPORTED_OPERATION",
            ),
            (CaptureError::disconnected("GetBuffer"), "DEVICE_DISCONNECTED"),
            (
                CaptureError::backend("Initialize", "E_FAIL"),
                "BACKEND_FAILURE",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_type_mismatch_names_expected_direction() {
        let err = CaptureError::DeviceTypeMismatch {
            id: "speakers".into(),
            expected: DeviceType::Input,
        };
        assert_eq!(err.to_string(), "device speakers is not an input device");
    }

    #[test]
    fn test_disconnected_context() {
        let err = CaptureError::disconnected("ReleaseBuffer");
        assert_eq!(err.to_string(), "device disconnected: ReleaseBuffer");
    }
}
