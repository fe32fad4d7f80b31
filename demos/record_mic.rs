//! Records five seconds from the default microphone.
//!
//! Run with: cargo run --example record_mic

use std::sync::Arc;
use std::time::Duration;

use pcm_capture::{AudioEngine, ChannelBridge, Delivery, DeviceType};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut engine = AudioEngine::new()?;

    let devices = engine.devices()?;
    println!("Devices:");
    for device in &devices {
        println!(
            "  [{}] {} ({}){}",
            device.device_type,
            device.name,
            device.id,
            if device.is_default { " (default)" } else { "" }
        );
    }

    let mic = devices
        .into_iter()
        .find(|d| d.device_type == DeviceType::Input && d.is_default)
        .ok_or("no default microphone")?;
    let format = engine.device_format(&mic.id)?;
    println!(
        "Recording from {} at {} Hz, {} ch (native {} bit)...",
        mic.name, format.sample_rate, format.channels, format.raw_bit_depth
    );

    let (bridge, mut rx) = ChannelBridge::new();
    engine.start(DeviceType::Input, &mic.id, Arc::new(bridge))?;

    let consumer = tokio::spawn(async move {
        let mut total = 0usize;
        while let Some(delivery) = rx.recv().await {
            match delivery {
                Delivery::Data(pcm) => total += pcm.len(),
                Delivery::Error(err) => {
                    eprintln!("capture failed: {err} ({})", err.code());
                    break;
                }
            }
        }
        total
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    engine.stop();

    let total = consumer.await?;
    println!("Captured {total} bytes of PCM");
    Ok(())
}
