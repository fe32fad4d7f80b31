//! System-audio capture via ScreenCaptureKit.
//!
//! ScreenCaptureKit carries audio alongside screen capture from macOS 13,
//! so the session is a display capture stripped to the minimum video
//! surface with `captures_audio` set. Samples arrive on an OS-managed
//! serial queue as 32-bit float, interleaved or planar; everything else
//! is dropped without stopping the stream.

use std::process::Command;
use std::sync::Arc;

use screencapturekit::cm_sample_buffer::CMSampleBuffer;
use screencapturekit::sc_content_filter::SCContentFilter;
use screencapturekit::sc_shareable_content::SCShareableContent;
use screencapturekit::sc_stream::SCStream;
use screencapturekit::sc_stream_configuration::SCStreamConfiguration;
use screencapturekit::sc_stream_output_trait::{SCStreamOutputTrait, SCStreamOutputType};

use super::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};
use crate::bridge::DeliverySink;
use crate::format::{decode_f32, interleave_planar_f32, quantize_f32_le};
use crate::permission::PermissionKind;
use crate::session::SessionState;
use crate::CaptureError;

/// First macOS release with audio in ScreenCaptureKit.
const MIN_MACOS_MAJOR: u32 = 13;

/// Whether this host's macOS carries audio in ScreenCaptureKit.
///
/// Parses `sw_vers -productVersion`; an unreadable version is treated as
/// supported and left to the actual capture calls to reject.
pub(super) fn os_supports_system_audio() -> bool {
    let Ok(output) = Command::new("sw_vers").arg("-productVersion").output() else {
        return true;
    };
    let version = String::from_utf8_lossy(&output.stdout);
    version
        .trim()
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .map_or(true, |major| major >= MIN_MACOS_MAJOR)
}

/// Probes shareable content; success means Screen Recording is granted.
pub(super) fn shareable_content_accessible() -> bool {
    SCShareableContent::get().is_ok()
}

/// A running ScreenCaptureKit audio session.
pub(super) struct SystemAudioSession {
    stream: SCStream,
    state: Arc<SessionState>,
}

impl SystemAudioSession {
    /// Builds the filter, configuration, and stream, then starts capture.
    pub(super) fn start(
        state: Arc<SessionState>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Self, CaptureError> {
        if !os_supports_system_audio() {
            return Err(CaptureError::UnsupportedOperation {
                reason: format!("system audio capture requires macOS {MIN_MACOS_MAJOR}+"),
            });
        }

        let content = SCShareableContent::get().map_err(|e| {
            if e.to_string().contains("permission") || e.to_string().contains("denied") {
                CaptureError::PermissionDenied {
                    kind: PermissionKind::SystemAudio,
                }
            } else {
                CaptureError::backend("fetch shareable content", e)
            }
        })?;

        let displays = content.displays();
        let display = displays
            .first()
            .ok_or_else(|| CaptureError::backend("select display", "no displays available"))?;

        // Whole-display capture excluding no windows: the full system mix.
        let filter = SCContentFilter::builder()
            .display(display)
            .exclude_windows(&[])
            .build();

        // Audio is the payload; video is kept at the 2x2 / 1 fps floor the
        // API allows, with the cursor off.
        let config = SCStreamConfiguration::new()
            .with_width(2)
            .with_height(2)
            .with_minimum_frame_interval(1, 1)
            .with_shows_cursor(false)
            .with_captures_audio(true)
            .with_sample_rate(OUTPUT_SAMPLE_RATE as i32)
            .with_channel_count(i32::from(OUTPUT_CHANNELS));

        let handler = AudioStreamOutput {
            state: Arc::clone(&state),
            sink,
        };

        let mut stream = SCStream::new(&filter, &config);
        stream.add_output_handler(handler, SCStreamOutputType::Audio);

        stream.start_capture().map_err(|e| {
            let text = e.to_string();
            if text.contains("permission") || text.contains("denied") {
                CaptureError::PermissionDenied {
                    kind: PermissionKind::SystemAudio,
                }
            } else {
                CaptureError::backend("start system audio capture", text)
            }
        })?;

        tracing::debug!("system audio session running");
        Ok(Self { stream, state })
    }

    /// Stops the stream and silences any in-flight callbacks.
    pub(super) fn stop(mut self) {
        // Callbacks check the flag first, so anything GCD already
        // dispatched becomes a no-op before the stream object goes away.
        self.state.shut_down();
        if let Err(e) = self.stream.stop_capture() {
            tracing::warn!("stop_capture failed: {e}");
        }
    }
}

/// Receives sample buffers on the OS serial queue.
struct AudioStreamOutput {
    state: Arc<SessionState>,
    sink: Arc<dyn DeliverySink>,
}

impl SCStreamOutputTrait for AudioStreamOutput {
    fn did_output_sample_buffer(&self, sample: CMSampleBuffer, of_type: SCStreamOutputType) {
        if !matches!(of_type, SCStreamOutputType::Audio) {
            return;
        }
        if !self.state.is_running() {
            return;
        }

        let Some(samples) = extract_f32_samples(&sample) else {
            // Unknown or non-float payload: keep the stream running.
            tracing::trace!("dropping sample buffer with unsupported format");
            return;
        };
        if samples.is_empty() {
            return;
        }

        let bytes = quantize_f32_le(&samples);
        self.sink.on_data(&bytes);
        self.state.record_delivery(bytes.len());
    }
}

/// Pulls interleaved f32 samples out of a sample buffer.
///
/// ScreenCaptureKit delivers one buffer per channel when the audio is
/// planar, so more than one buffer means interleave by frame; a single
/// buffer is already interleaved. Buffers without a usable audio format
/// description return `None`.
fn extract_f32_samples(sample: &CMSampleBuffer) -> Option<Vec<f32>> {
    // No audio format description (or no sample rate on it) means this
    // is not a PCM payload we can decode.
    sample
        .format_description()
        .and_then(|fd| fd.audio_sample_rate())?;

    let buffers = sample.audio_buffer_list()?;
    if buffers.num_buffers() == 0 {
        return None;
    }

    if buffers.num_buffers() > 1 {
        let planes: Vec<Vec<f32>> = buffers.iter().map(|b| decode_f32(b.data())).collect();
        let plane_refs: Vec<&[f32]> = planes.iter().map(Vec::as_slice).collect();
        Some(interleave_planar_f32(&plane_refs))
    } else {
        buffers.iter().next().map(|b| decode_f32(b.data()))
    }
}
