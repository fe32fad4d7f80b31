//! WASAPI capture backend for Windows.
//!
//! Endpoints of both directions are captured through the shared-mode
//! event-driven audio client; render endpoints get the loopback flag so
//! the session records what the device is playing. Enumeration, format
//! queries, and the capture session each create their own COM objects on
//! the calling thread - nothing COM-backed is stored across calls, which
//! keeps the backend `Send`.

#![allow(unsafe_code)] // Win32 COM and WASAPI calls

mod capture;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{
    eCapture, eConsole, eRender, EDataFlow, IAudioClient, IMMDevice, IMMDeviceEnumerator,
    MMDeviceEnumerator, DEVICE_STATE_ACTIVE, WAVEFORMATEX, WAVEFORMATEXTENSIBLE,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    COINIT_MULTITHREADED, STGM_READ,
};

use crate::bridge::DeliverySink;
use crate::device::{Device, DeviceFormat, DeviceType};
use crate::permission::{PermissionKind, PermissionStatus};
use crate::session::SessionState;
use crate::{CaptureBackend, CaptureError};

/// How long `start` waits for the producer thread to bring the audio
/// client up before giving up.
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// WAVEFORMATEX format tags we understand.
pub(super) const WAVE_FORMAT_PCM: u16 = 1;
pub(super) const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
pub(super) const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Subformat GUID marking IEEE float inside WAVEFORMATEXTENSIBLE.
pub(super) const KSDATAFORMAT_SUBTYPE_IEEE_FLOAT: windows::core::GUID =
    windows::core::GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

/// Balances `CoInitializeEx`/`CoUninitialize` on one thread.
///
/// `S_FALSE` (already initialized) still has to be balanced; only a hard
/// failure such as `RPC_E_CHANGED_MODE` leaves nothing to undo.
pub(super) struct ComSession {
    owns: bool,
}

impl ComSession {
    pub(super) fn init() -> Self {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr.is_err() {
            tracing::warn!("CoInitializeEx failed: {hr:?}; assuming COM is already up");
        }
        Self { owns: hr.is_ok() }
    }
}

impl Drop for ComSession {
    fn drop(&mut self) {
        if self.owns {
            unsafe { CoUninitialize() };
        }
    }
}

/// Encodes a Rust string as a NUL-terminated UTF-16 buffer.
pub(super) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// WASAPI backend over the MMDevice enumeration.
pub struct WasapiBackend {
    worker: Option<JoinHandle<()>>,
    session: Option<Arc<SessionState>>,
}

impl WasapiBackend {
    /// Creates the backend. Cheap: platform objects are created per call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worker: None,
            session: None,
        }
    }
}

impl Default for WasapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for WasapiBackend {
    fn name(&self) -> &'static str {
        "wasapi"
    }

    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        let _com = ComSession::init();
        let enumerator = create_enumerator()?;

        let mut devices = unsafe { enumerate_flow(&enumerator, eCapture, DeviceType::Input)? };
        devices.extend(unsafe { enumerate_flow(&enumerator, eRender, DeviceType::Output)? });
        Ok(devices)
    }

    fn device_format(&self, device_id: &str) -> Result<DeviceFormat, CaptureError> {
        let _com = ComSession::init();
        let enumerator = create_enumerator()?;
        unsafe { query_mix_format(&enumerator, device_id) }
    }

    fn start(
        &mut self,
        device_type: DeviceType,
        device_id: &str,
        state: Arc<SessionState>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<(), CaptureError> {
        // Loopback capture is how render endpoints are recorded.
        let loopback = device_type == DeviceType::Output;
        let id = device_id.to_string();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("wasapi-capture".into())
            .spawn(move || {
                capture::run_session(&id, loopback, &thread_state, &*sink, &ready_tx);
            })
            .map_err(|e| CaptureError::backend("spawn capture thread", e))?;

        // The producer reports back once IAudioClient::Start succeeded, so
        // this returns with the client in running state.
        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                self.session = Some(state);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                state.shut_down();
                let _ = worker.join();
                Err(CaptureError::backend(
                    "start capture",
                    "timed out waiting for the audio client",
                ))
            }
        }
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
        // Windows has no capture permission gate.
        PermissionStatus::granted()
    }

    fn request_permission(&self, _kind: PermissionKind) -> bool {
        true
    }
}

impl Drop for WasapiBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(super) fn create_enumerator() -> Result<IMMDeviceEnumerator, CaptureError> {
    unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
        .map_err(|e| CaptureError::backend("create device enumerator", e))
}

/// Lists the active endpoints of one data-flow direction.
unsafe fn enumerate_flow(
    enumerator: &IMMDeviceEnumerator,
    flow: EDataFlow,
    device_type: DeviceType,
) -> Result<Vec<Device>, CaptureError> {
    let default_id = enumerator
        .GetDefaultAudioEndpoint(flow, eConsole)
        .ok()
        .and_then(|d| endpoint_id(&d));

    let collection = enumerator
        .EnumAudioEndpoints(flow, DEVICE_STATE_ACTIVE)
        .map_err(|e| CaptureError::backend("enumerate endpoints", e))?;
    let count = collection
        .GetCount()
        .map_err(|e| CaptureError::backend("count endpoints", e))?;

    let mut devices = Vec::with_capacity(count as usize);
    for i in 0..count {
        let Ok(endpoint) = collection.Item(i) else {
            continue;
        };
        let Some(id) = endpoint_id(&endpoint) else {
            continue;
        };
        let name = friendly_name(&endpoint).unwrap_or_else(|| format!("Device {i}"));
        let is_default = default_id.as_deref() == Some(id.as_str());
        devices.push(Device::new(id, name, device_type, is_default));
    }
    Ok(devices)
}

/// Reads an endpoint id, releasing the COM string allocation.
unsafe fn endpoint_id(device: &IMMDevice) -> Option<String> {
    let pwstr = device.GetId().ok()?;
    let id = pwstr.to_string().ok();
    CoTaskMemFree(Some(pwstr.0 as *const _));
    id.filter(|s| !s.is_empty())
}

/// Reads PKEY_Device_FriendlyName from the endpoint property store.
unsafe fn friendly_name(device: &IMMDevice) -> Option<String> {
    let store = device.OpenPropertyStore(STGM_READ).ok()?;
    let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
    let name = value.to_string();
    (!name.is_empty()).then_some(name)
}

/// Queries the shared-mode mix format of one endpoint.
unsafe fn query_mix_format(
    enumerator: &IMMDeviceEnumerator,
    device_id: &str,
) -> Result<DeviceFormat, CaptureError> {
    let wide = to_wide(device_id);
    let device = enumerator
        .GetDevice(PCWSTR(wide.as_ptr()))
        .map_err(|_| CaptureError::DeviceNotFound {
            id: device_id.to_string(),
        })?;

    let audio_client: IAudioClient = device
        .Activate(CLSCTX_ALL, None)
        .map_err(|e| CaptureError::backend("activate audio client", e))?;

    let mix = audio_client
        .GetMixFormat()
        .map_err(|e| CaptureError::backend("query mix format", e))?;

    let format = parse_device_format(&*mix);
    CoTaskMemFree(Some(mix as *const _));
    Ok(format)
}

/// Extracts the reportable format from a mix WAVEFORMATEX.
///
/// Extensible formats may carry a container wider than the valid sample
/// bits (24-in-32 is common); the valid-bits field wins for reporting.
unsafe fn parse_device_format(wf: &WAVEFORMATEX) -> DeviceFormat {
    let mut raw_bits = wf.wBitsPerSample;
    if wf.wFormatTag == WAVE_FORMAT_EXTENSIBLE {
        let ext = &*(wf as *const WAVEFORMATEX as *const WAVEFORMATEXTENSIBLE);
        let valid_bits =
            std::ptr::read_unaligned(std::ptr::addr_of!(ext.Samples.wValidBitsPerSample));
        if valid_bits > 0 {
            raw_bits = valid_bits;
        }
    }
    DeviceFormat {
        sample_rate: wf.nSamplesPerSec,
        channels: wf.nChannels,
        bit_depth: 16,
        raw_bit_depth: raw_bits,
    }
}
