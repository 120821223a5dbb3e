//! Example: Downloading Measurement History
//!
//! Downloads the stored log of every sensor and prints it as CSV, reporting
//! progress on stderr. Ctrl-C cancels the transfer cleanly.
//!
//! Run with: `cargo run --example download_history -- [DEVICE_ADDRESS_OR_NAME] [START_INDEX]`

use std::env;

use aranet4_core::{HistoryOptions, HistoryRange, Sensor, Session, SessionConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let identifier = args.get(1).map(String::as_str);
    let start: u16 = match args.get(2) {
        Some(s) => s.parse()?,
        None => 1,
    };

    let session =
        Session::bluetooth(identifier, SessionConfig::challenging_environment()).await?;
    session.connect().await?;

    let info = session.history_info().await?;
    eprintln!(
        "{} readings stored, every {} s",
        info.stored_readings, info.interval
    );

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let options = HistoryOptions::new()
        .with_progress(|p| {
            eprint!(
                "\r{} ({}/{}): {:>5.1}%",
                p.sensor,
                p.pass,
                p.total_passes,
                p.overall() * 100.0
            );
        })
        .with_cancellation(token);

    let range = HistoryRange::all().from_index(start);
    let readings = session.history_with_options(&range, options).await?;
    eprintln!();

    println!("index,timestamp,co2_ppm,temperature_c,humidity_pct,pressure_hpa");
    for reading in &readings {
        let cell = |sensor| {
            reading
                .value(sensor)
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        println!(
            "{},{},{},{},{},{}",
            reading.index.unwrap_or_default(),
            reading.timestamp,
            cell(Sensor::Co2),
            cell(Sensor::Temperature),
            cell(Sensor::Humidity),
            cell(Sensor::Pressure),
        );
    }

    session.disconnect().await?;
    Ok(())
}
