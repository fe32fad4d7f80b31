//! Device and format model shared by all backends.
//!
//! Devices live in a unified `(type, id)` address space even though the
//! platform enumerations underneath are structurally different: Windows
//! endpoints carry native endpoint identifiers in both directions, while
//! macOS collapses all output capture into the single reserved
//! [`SYSTEM_AUDIO_DEVICE_ID`] entry.

use std::fmt;
use std::str::FromStr;

use crate::CaptureError;

/// Reserved id of the virtual system-audio output device on macOS.
///
/// No real endpoint identifier collides with it in practice: Windows ids
/// are GUID-bearing endpoint strings and CoreAudio device names carry the
/// hardware product name.
pub const SYSTEM_AUDIO_DEVICE_ID: &str = "system";

/// Direction of an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// A capture endpoint (microphone, line-in).
    Input,
    /// A render endpoint, captured as loopback / system audio.
    Output,
}

impl DeviceType {
    /// Returns the wire name used in the consumer-facing API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(Self::Input),
            "output" => Ok(Self::Output),
            other => Err(CaptureError::UnsupportedOperation {
                reason: format!("unknown device type: {other}"),
            }),
        }
    }
}

/// A snapshot of one enumerated audio device.
///
/// Enumeration is on demand; a `Device` is not kept live and says nothing
/// about whether the hardware is still attached by the time a session
/// starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Platform endpoint identifier. Never empty.
    pub id: String,
    /// Human-readable device name.
    pub name: String,
    /// Direction of the device.
    pub device_type: DeviceType,
    /// Whether this is the platform default for its direction.
    pub is_default: bool,
}

impl Device {
    /// Creates a device snapshot.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        device_type: DeviceType,
        is_default: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type,
            is_default,
        }
    }
}

/// Format of the PCM a device session delivers.
///
/// `bit_depth` is always 16: every backend quantizes to interleaved
/// signed 16-bit little-endian. `raw_bit_depth` reports the native sample
/// width the device captures at before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    /// Sample rate of delivered frames in Hz.
    pub sample_rate: u32,
    /// Channels per frame.
    pub channels: u16,
    /// Delivered sample width in bits. Always 16.
    pub bit_depth: u16,
    /// Native sample width of the device in bits.
    pub raw_bit_depth: u16,
}

impl DeviceFormat {
    /// Fixed format of the macOS system-audio device.
    #[must_use]
    pub fn system_audio() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            bit_depth: 16,
            raw_bit_depth: 32,
        }
    }

    /// Bytes per delivered frame (`channels × 2`).
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        usize::from(self.channels) * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_round_trip() {
        assert_eq!("input".parse::<DeviceType>().unwrap(), DeviceType::Input);
        assert_eq!("output".parse::<DeviceType>().unwrap(), DeviceType::Output);
        assert_eq!(DeviceType::Input.to_string(), "input");
        assert_eq!(DeviceType::Output.to_string(), "output");
    }

    #[test]
    fn test_device_type_rejects_unknown() {
        let err = "surround".parse::<DeviceType>().unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OPERATION");
    }

    #[test]
    fn test_system_audio_format_is_fixed() {
        let format = DeviceFormat::system_audio();
        assert_eq!(format.sample_rate, 48_000);
        assert_eq!(format.channels, 2);
        assert_eq!(format.bit_depth, 16);
        assert_eq!(format.raw_bit_depth, 32);
    }

    #[test]
    fn test_frame_bytes() {
        let format = DeviceFormat {
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
            raw_bit_depth: 24,
        };
        assert_eq!(format.frame_bytes(), 4);
    }
}
