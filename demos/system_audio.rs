//! Captures system output (what the machine is playing) for five seconds.
//!
//! On macOS this needs Screen Recording permission; on Windows pick any
//! render endpoint. Run with: cargo run --example system_audio

use std::sync::Arc;
use std::time::Duration;

use pcm_capture::{AudioEngine, ChannelBridge, Delivery, DeviceType, PermissionKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut engine = AudioEngine::new()?;

    if !engine.check_permission().system {
        println!("Requesting system audio permission...");
        if !engine.request_permission(PermissionKind::SystemAudio) {
            return Err("system audio permission denied".into());
        }
    }

    let output = engine
        .devices()?
        .into_iter()
        .find(|d| d.device_type == DeviceType::Output && d.is_default)
        .ok_or("no default output device")?;
    println!("Capturing system audio from {} ({})", output.name, output.id);

    let (bridge, mut rx) = ChannelBridge::new();
    engine.start(DeviceType::Output, &output.id, Arc::new(bridge))?;

    let consumer = tokio::spawn(async move {
        let mut buffers = 0usize;
        while let Some(delivery) = rx.recv().await {
            match delivery {
                Delivery::Data(_) => buffers += 1,
                Delivery::Error(err) => {
                    eprintln!("capture failed: {err} ({})", err.code());
                    break;
                }
            }
        }
        buffers
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    engine.stop();

    println!("Received {} buffers", consumer.await?);
    Ok(())
}
