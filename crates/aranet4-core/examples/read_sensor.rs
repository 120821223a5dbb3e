//! Example: Reading Current Sensor Values
//!
//! Connects to an Aranet4 and prints its identity, the current sensor
//! values and the device status.
//!
//! Run with: `cargo run --example read_sensor -- [DEVICE_ADDRESS_OR_NAME]`
//!
//! Without an argument the first device named "Aranet4..." is used.

use std::env;

use aranet4_core::{Session, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let identifier = env::args().nth(1);
    let session = Session::bluetooth(identifier.as_deref(), SessionConfig::default()).await?;

    println!("Connecting...");
    session.connect().await?;

    if let Some(identity) = session.identity() {
        println!("Connected to {} ({})", identity.name, identity.address);
        println!("  Serial:   {}", identity.serial);
        println!("  Firmware: {}", identity.software_revision);
    }
    println!();

    let readings = match session.profile() {
        Some(profile) if !profile.has_full_reading() => session.current_readings_simple().await?,
        _ => session.current_readings().await?,
    };
    let reading = &readings.reading;

    println!("Current Readings:");
    for sensor in aranet4_core::Sensor::ALL {
        match reading.value(sensor) {
            Some(value) => println!("  {:<12} {:.1} {}", sensor.to_string(), value, sensor.unit()),
            None => println!("  {:<12} n/a", sensor.to_string()),
        }
    }
    println!("  {:<12} {}%", "Battery", readings.battery);
    if let Some(status) = readings.status {
        println!("  {:<12} {}", "Status", status);
    }
    println!();

    let status = session.status().await?;
    println!("Device Status:");
    println!("  Interval:        {} s", status.interval);
    println!("  Since update:    {} s", status.elapsed);
    println!("  Stored readings: {}", status.stored_readings);

    session.disconnect().await?;
    Ok(())
}
