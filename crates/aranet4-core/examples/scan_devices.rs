//! Example: Scanning for Aranet4 Devices
//!
//! Scans for peripherals whose advertised name contains the configured
//! name filter ("Aranet4" by default).
//!
//! Run with: `cargo run --example scan_devices [NAME_FILTER]`

use std::env;
use std::time::Duration;

use aranet4_core::SessionConfig;
use aranet4_core::ble;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut config = SessionConfig::default().scan_timeout(Duration::from_secs(10));
    if let Some(filter) = env::args().nth(1) {
        config = config.name_filter(filter);
    }

    println!("Scanning for devices matching \"{}\"...", config.name_filter);
    println!();

    let devices = ble::scan(&config).await?;

    if devices.is_empty() {
        println!("No Aranet4 devices found.");
        println!();
        println!("Make sure:");
        println!("  - Your Aranet4 is powered on");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The device is within range");
    } else {
        println!("Found {} device(s):", devices.len());
        println!();

        for device in &devices {
            let name = device.name.as_deref().unwrap_or("Unknown");
            let rssi = device
                .rssi
                .map(|r| format!("{r} dBm"))
                .unwrap_or_else(|| "n/a".to_string());
            println!("  {name}");
            println!("    Identifier: {}", device.identifier);
            println!("    RSSI:       {rssi}");
        }
    }

    Ok(())
}
