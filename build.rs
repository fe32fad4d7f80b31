//! Build script for pcm-capture.
//!
//! On macOS the microphone authorization path calls into AVFoundation via
//! the Objective-C runtime, so the framework has to be linked explicitly.
//! ScreenCaptureKit and CoreGraphics are linked by their wrapper crates.

fn main() {
    #[cfg(target_os = "macos")]
    {
        println!("cargo:rustc-link-lib=framework=AVFoundation");
        println!("cargo:rustc-link-lib=framework=Foundation");
    }
}
