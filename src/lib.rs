//! # pcm-capture
//!
//! Cross-platform raw PCM capture from microphones and rendered system
//! output, delivered as interleaved signed 16-bit little-endian frames to
//! a caller-supplied sink.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pcm_capture::{AudioEngine, ChannelBridge, Delivery, DeviceType};
//!
//! let mut engine = AudioEngine::new()?;
//!
//! // Pick the default microphone from enumeration.
//! let mic = engine
//!     .devices()?
//!     .into_iter()
//!     .find(|d| d.device_type == DeviceType::Input && d.is_default)
//!     .expect("no default microphone");
//! let format = engine.device_format(&mic.id)?;
//!
//! let (bridge, mut rx) = ChannelBridge::new();
//! engine.start(DeviceType::Input, &mic.id, std::sync::Arc::new(bridge))?;
//!
//! while let Some(delivery) = rx.recv().await {
//!     match delivery {
//!         Delivery::Data(pcm) => feed_encoder(&pcm, &format),
//!         Delivery::Error(err) => break eprintln!("capture failed: {err}"),
//!     }
//! }
//! engine.stop();
//! ```
//!
//! ## Architecture
//!
//! Three layers with a strict dependency order:
//!
//! - **Backends**: one per platform (WASAPI on Windows; CoreAudio +
//!   ScreenCaptureKit on macOS). Each owns its platform resources and one
//!   real-time producer per session.
//! - **Engine facade**: [`AudioEngine`] validates device selectors,
//!   enforces the single-session rule, and joins producers on stop.
//! - **Delivery bridge**: a [`DeliverySink`] invoked from the producer
//!   thread. Buffers are borrowed for the call only; implementors copy,
//!   enqueue, and return. [`ChannelBridge`] does this into a tokio
//!   channel.
//!
//! Whatever the device's native format, delivered buffers are whole
//! frames of 16-bit little-endian PCM in strict capture order, and after
//! [`AudioEngine::stop`] returns the sink is never called again.

// unsafe_code lint is configured in Cargo.toml as "deny" to allow
// platform FFI module overrides
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
mod bridge;
mod device;
mod engine;
mod error;
pub mod format;
mod permission;
mod session;

pub use backend::{platform_backend, CaptureBackend, MockBackend};
pub use bridge::{delivery_callbacks, CallbackSink, ChannelBridge, Delivery, DeliverySink};
pub use device::{Device, DeviceFormat, DeviceType, SYSTEM_AUDIO_DEVICE_ID};
pub use engine::AudioEngine;
pub use error::CaptureError;
pub use permission::{PermissionKind, PermissionStatus};
pub use session::SessionStats;

// Re-export the mock signal type so tests can shape synthetic capture.
pub use backend::mock::MockSignal;
