//! Permission model for gated capture sources.

use std::fmt;

/// The two permission gates a platform may impose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    /// Microphone access (macOS: AVCaptureDevice authorization).
    Microphone,
    /// System-audio access (macOS: Screen Recording).
    SystemAudio,
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microphone => f.write_str("microphone"),
            Self::SystemAudio => f.write_str("system audio"),
        }
    }
}

/// Snapshot of the permission state at query time.
///
/// The state may change between calls; a `true` here does not guarantee a
/// later `start` succeeds. Platforms without permission gates (Windows)
/// report both as granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionStatus {
    /// Whether microphone capture is currently authorized.
    pub mic: bool,
    /// Whether system-audio capture is currently authorized.
    pub system: bool,
}

impl PermissionStatus {
    /// Status on platforms without permission gates.
    #[must_use]
    pub fn granted() -> Self {
        Self {
            mic: true,
            system: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_is_all_true() {
        let status = PermissionStatus::granted();
        assert!(status.mic);
        assert!(status.system);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(PermissionKind::Microphone.to_string(), "microphone");
        assert_eq!(PermissionKind::SystemAudio.to_string(), "system audio");
    }
}
