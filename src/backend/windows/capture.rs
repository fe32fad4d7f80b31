//! The WASAPI producer thread.
//!
//! Runs the whole session on one dedicated thread: COM setup, endpoint
//! resolution, shared-mode event-driven initialization (plus the loopback
//! flag for render endpoints), the packet drain loop, and teardown. The
//! facade's running flag is the only external input; every hard OS
//! failure is classified, reported once, and ends the loop.

#![allow(unsafe_code)] // WASAPI buffer access

use std::sync::mpsc;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, IMMDeviceEnumerator, AUDCLNT_BUFFERFLAGS_SILENT,
    AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_LOOPBACK,
    WAVEFORMATEX, WAVEFORMATEXTENSIBLE,
};
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use super::{
    create_enumerator, to_wide, ComSession, KSDATAFORMAT_SUBTYPE_IEEE_FLOAT,
    WAVE_FORMAT_EXTENSIBLE, WAVE_FORMAT_IEEE_FLOAT, WAVE_FORMAT_PCM,
};
use crate::bridge::DeliverySink;
use crate::format::{decode_f32, decode_pcm16, decode_pcm24, decode_pcm32, quantize_f32_le};
use crate::session::SessionState;
use crate::CaptureError;

/// Requested shared-mode buffer duration: 1 s in 100 ns units.
const BUFFER_DURATION_HNS: i64 = 10_000_000;

/// Event wait timeout; a stall longer than this just re-checks the
/// running flag.
const EVENT_TIMEOUT_MS: u32 = 2000;

/// How the device encodes samples in the mix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleEncoding {
    Float32,
    Pcm16,
    Pcm24,
    Pcm32,
    /// Anything else renders as silence instead of raw noise.
    Unknown,
}

/// Parsed subset of the mix format the loop needs per packet.
#[derive(Debug, Clone, Copy)]
struct StreamFormat {
    channels: u16,
    block_align: u16,
    encoding: SampleEncoding,
}

/// Entry point of the producer thread.
///
/// Reports initialization success or failure through `ready_tx` exactly
/// once; after a successful report, failures go to the sink instead.
pub(super) fn run_session(
    device_id: &str,
    loopback: bool,
    state: &SessionState,
    sink: &dyn DeliverySink,
    ready_tx: &mpsc::Sender<Result<(), CaptureError>>,
) {
    let _com = ComSession::init();

    let session = match SessionResources::initialize(device_id, loopback) {
        Ok(session) => {
            let _ = ready_tx.send(Ok(()));
            session
        }
        Err(err) => {
            tracing::error!(device = device_id, "capture init failed: {err}");
            state.shut_down();
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    tracing::debug!(
        device = device_id,
        loopback,
        channels = session.format.channels,
        "capture loop running"
    );

    if let Err(err) = session.drain_until_stopped(state, sink) {
        tracing::error!(device = device_id, "capture loop failed: {err}");
        state.shut_down();
        sink.on_error(&err);
    }
}

/// Everything the capture loop owns; released in `Drop` so teardown also
/// happens on the error paths.
struct SessionResources {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    mix_format: *mut WAVEFORMATEX,
    format: StreamFormat,
    event: HANDLE,
}

impl SessionResources {
    /// Brings the endpoint's audio client into running state.
    fn initialize(device_id: &str, loopback: bool) -> Result<Self, CaptureError> {
        unsafe {
            // Fresh enumerator: COM objects stay on this thread.
            let enumerator: IMMDeviceEnumerator = create_enumerator()?;

            let wide = to_wide(device_id);
            let device = enumerator
                .GetDevice(PCWSTR(wide.as_ptr()))
                .map_err(|_| CaptureError::DeviceNotFound {
                    id: device_id.to_string(),
                })?;

            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::backend("Activate", e))?;

            let mix_format = audio_client
                .GetMixFormat()
                .map_err(|e| CaptureError::backend("GetMixFormat", e))?;
            let format = parse_stream_format(&*mix_format);

            let mut stream_flags = AUDCLNT_STREAMFLAGS_EVENTCALLBACK;
            if loopback {
                stream_flags |= AUDCLNT_STREAMFLAGS_LOOPBACK;
            }

            if let Err(e) = audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                stream_flags,
                BUFFER_DURATION_HNS,
                0,
                mix_format,
                None,
            ) {
                CoTaskMemFree(Some(mix_format as *const _));
                return Err(CaptureError::backend("Initialize", e));
            }

            let event = match CreateEventW(None, false, false, None) {
                Ok(event) => event,
                Err(e) => {
                    CoTaskMemFree(Some(mix_format as *const _));
                    return Err(CaptureError::backend("CreateEvent", e));
                }
            };

            let capture_client = match audio_client_service(&audio_client) {
                Ok(client) => client,
                Err(e) => {
                    let _ = CloseHandle(event);
                    CoTaskMemFree(Some(mix_format as *const _));
                    return Err(e);
                }
            };

            // From here on Drop owns the cleanup.
            let session = Self {
                audio_client,
                capture_client,
                mix_format,
                format,
                event,
            };

            session
                .audio_client
                .SetEventHandle(session.event)
                .map_err(|e| CaptureError::backend("SetEventHandle", e))?;

            session
                .audio_client
                .Start()
                .map_err(|e| CaptureError::backend("Start", e))?;

            Ok(session)
        }
    }

    /// Waits on the buffer event and drains packets until stopped.
    fn drain_until_stopped(
        &self,
        state: &SessionState,
        sink: &dyn DeliverySink,
    ) -> Result<(), CaptureError> {
        while state.is_running() {
            let wait = unsafe { WaitForSingleObject(self.event, EVENT_TIMEOUT_MS) };
            if wait != WAIT_OBJECT_0 {
                // Timeout: the device may simply be idle.
                continue;
            }

            let mut packet_frames = unsafe {
                self.capture_client
                    .GetNextPacketSize()
                    .map_err(|_| CaptureError::disconnected("GetNextPacketSize"))?
            };

            while packet_frames != 0 {
                self.forward_packet(state, sink)?;
                packet_frames = unsafe {
                    self.capture_client
                        .GetNextPacketSize()
                        .map_err(|_| CaptureError::disconnected("GetNextPacketSize"))?
                };
            }
        }
        Ok(())
    }

    /// Fetches one packet, converts it, and delivers it.
    fn forward_packet(
        &self,
        state: &SessionState,
        sink: &dyn DeliverySink,
    ) -> Result<(), CaptureError> {
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut frames: u32 = 0;
        let mut flags: u32 = 0;

        unsafe {
            self.capture_client
                .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                .map_err(|_| CaptureError::disconnected("GetBuffer"))?;
        }

        if frames > 0 && !data.is_null() {
            let sample_count = frames as usize * usize::from(self.format.channels);
            let byte_count = frames as usize * usize::from(self.format.block_align);
            let raw = unsafe { std::slice::from_raw_parts(data, byte_count) };

            let floats = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                vec![0.0f32; sample_count]
            } else {
                match self.format.encoding {
                    SampleEncoding::Float32 => decode_f32(raw),
                    SampleEncoding::Pcm16 => decode_pcm16(raw),
                    SampleEncoding::Pcm24 => decode_pcm24(raw),
                    SampleEncoding::Pcm32 => decode_pcm32(raw),
                    SampleEncoding::Unknown => vec![0.0f32; sample_count],
                }
            };

            if !floats.is_empty() {
                let bytes = quantize_f32_le(&floats);
                sink.on_data(&bytes);
                state.record_delivery(bytes.len());
            }
        }

        unsafe {
            self.capture_client
                .ReleaseBuffer(frames)
                .map_err(|_| CaptureError::disconnected("ReleaseBuffer"))?;
        }
        Ok(())
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        unsafe {
            let _ = self.audio_client.Stop();
            let _ = CloseHandle(self.event);
            CoTaskMemFree(Some(self.mix_format as *const _));
        }
    }
}

fn audio_client_service(audio_client: &IAudioClient) -> Result<IAudioCaptureClient, CaptureError> {
    unsafe {
        audio_client
            .GetService()
            .map_err(|e| CaptureError::backend("GetService", e))
    }
}

/// Decides the per-packet decode path from the mix format.
///
/// The format tag picks the family; extensible formats defer to the
/// subformat GUID. Sample width selects the PCM layout, with anything
/// unrecognized mapped to `Unknown` so the loop emits silence rather
/// than reinterpreted noise.
fn parse_stream_format(wf: &WAVEFORMATEX) -> StreamFormat {
    let is_float = match wf.wFormatTag {
        WAVE_FORMAT_IEEE_FLOAT => true,
        WAVE_FORMAT_PCM => false,
        WAVE_FORMAT_EXTENSIBLE => unsafe {
            let ext = &*(wf as *const WAVEFORMATEX as *const WAVEFORMATEXTENSIBLE);
            let sub = std::ptr::read_unaligned(std::ptr::addr_of!(ext.SubFormat));
            sub == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
        },
        _ => false,
    };

    let encoding = if is_float {
        if wf.wBitsPerSample == 32 {
            SampleEncoding::Float32
        } else {
            SampleEncoding::Unknown
        }
    } else {
        match wf.wBitsPerSample {
            16 => SampleEncoding::Pcm16,
            24 => SampleEncoding::Pcm24,
            32 => SampleEncoding::Pcm32,
            _ => SampleEncoding::Unknown,
        }
    };

    StreamFormat {
        channels: wf.nChannels,
        block_align: wf.nBlockAlign,
        encoding,
    }
}
