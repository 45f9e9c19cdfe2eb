use std::{error::Error, time::Duration};

use arm_encoder_driver::{
    protocol::{publish::PublishedReport, units},
    EncoderClient, LinkConfig,
};
use log::info;

/// Prints the reports the encoder publishes until Ctrl+C is pressed.
///
/// Pass `--delta` after the port to print the change of the angle register instead.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let delta = args.next().as_deref() == Some("--delta");

    let mut client = EncoderClient::connect(&LinkConfig::new(port)).await?;

    let cancel = client.cancellation_token();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut monitor = client.monitor();
    // Only observe; some adapters have no listen-only mode
    monitor.listen_only().await?;

    while !stop.is_cancelled() {
        if delta {
            if let Some(delta) = monitor.next_angle_delta(Duration::from_secs(1)).await? {
                println!("{delta:+}");
            }
            continue;
        }

        match monitor.next_report(Duration::from_secs(1)).await? {
            Some(PublishedReport::Angle(report)) => {
                let velocity = report
                    .angular_velocity_dps(units::DEFAULT_SAMPLE_PERIOD)
                    .unwrap_or_default();
                println!(
                    "{:<5} = {:<10.3}°\t\t{:<6} = {:.2} °/s\t\t{} rotations",
                    report.angle,
                    report.angle_degrees(),
                    report.angular_velocity,
                    velocity,
                    report.revolutions
                );
            }
            Some(PublishedReport::Temperature(report)) => {
                println!("{:.2} °C", report.celsius());
            }
            None => {}
        }
    }

    monitor.resume().await?;
    info!("Stopped");

    client.into_inner().close().await?;
    Ok(())
}
