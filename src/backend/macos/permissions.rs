//! macOS permission gates.
//!
//! Microphone capture is gated by AVCaptureDevice authorization; system
//! audio (a Core Graphics capture under the hood) is gated by Screen
//! Recording. Checks never prompt. Requests may show the system dialog
//! and block the caller until the user answers or the timeout elapses.

#![allow(unsafe_code)] // CoreGraphics FFI and Objective-C messaging

use std::sync::Arc;
use std::time::{Duration, Instant};

use block::ConcreteBlock;
use objc::runtime::{Class, Object};
use objc::{msg_send, sel, sel_impl};
use parking_lot::{Condvar, Mutex};

/// Upper bound on how long a permission request waits for the user.
pub(super) const PERMISSION_PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    /// Non-prompting Screen Recording check.
    fn CGPreflightScreenCaptureAccess() -> bool;

    /// Prompts for Screen Recording on first request; returns the
    /// resulting state.
    fn CGRequestScreenCaptureAccess() -> bool;
}

/// Whether Screen Recording is currently granted. Never prompts.
pub(super) fn screen_capture_granted() -> bool {
    unsafe { CGPreflightScreenCaptureAccess() }
}

/// Requests Screen Recording access, prompting if undetermined.
///
/// macOS typically requires an app restart before a fresh grant takes
/// effect, so a `false` here may still mean "granted after relaunch".
pub(super) fn request_screen_capture() -> bool {
    unsafe { CGRequestScreenCaptureAccess() }
}

/// AVCaptureDevice authorization states for the audio media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MicAuthorization {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

/// `AVMediaTypeAudio` is the constant string `"soun"`.
unsafe fn audio_media_type(ns_string: &Class) -> *mut Object {
    msg_send![ns_string, stringWithUTF8String: b"soun\0".as_ptr()]
}

/// Current microphone authorization. Never prompts.
pub(super) fn microphone_authorization() -> MicAuthorization {
    unsafe {
        let (Some(device_cls), Some(string_cls)) =
            (Class::get("AVCaptureDevice"), Class::get("NSString"))
        else {
            tracing::warn!("AVCaptureDevice unavailable; reporting undetermined");
            return MicAuthorization::NotDetermined;
        };

        let media_type = audio_media_type(string_cls);
        let status: i64 = msg_send![device_cls, authorizationStatusForMediaType: media_type];
        match status {
            1 => MicAuthorization::Restricted,
            2 => MicAuthorization::Denied,
            3 => MicAuthorization::Authorized,
            _ => MicAuthorization::NotDetermined,
        }
    }
}

/// Requests microphone access, prompting when undetermined.
///
/// Blocks until the completion handler fires or
/// [`PERMISSION_PROMPT_TIMEOUT`] elapses; an unanswered dialog counts as
/// not granted. Idempotent once authorized.
pub(super) fn request_microphone() -> bool {
    match microphone_authorization() {
        MicAuthorization::Authorized => return true,
        MicAuthorization::Denied | MicAuthorization::Restricted => return false,
        MicAuthorization::NotDetermined => {}
    }

    let gate = Arc::new((Mutex::new(None::<bool>), Condvar::new()));
    let handler_gate = Arc::clone(&gate);

    unsafe {
        let (Some(device_cls), Some(string_cls)) =
            (Class::get("AVCaptureDevice"), Class::get("NSString"))
        else {
            return false;
        };
        let media_type = audio_media_type(string_cls);

        let handler = ConcreteBlock::new(move |granted: bool| {
            let (result, condvar) = &*handler_gate;
            *result.lock() = Some(granted);
            condvar.notify_all();
        });
        let handler = handler.copy();

        let () = msg_send![
            device_cls,
            requestAccessForMediaType: media_type
            completionHandler: &*handler
        ];
    }

    let (result, condvar) = &*gate;
    let deadline = Instant::now() + PERMISSION_PROMPT_TIMEOUT;
    let mut guard = result.lock();
    while guard.is_none() {
        if condvar.wait_until(&mut guard, deadline).timed_out() {
            tracing::warn!("microphone permission dialog timed out");
            break;
        }
    }
    guard.unwrap_or(false)
}
