use std::{error::Error, time::Duration};

use arm_encoder_driver::{
    protocol::value::{ApplySettingsMode, SpinDirection},
    EncoderClient, LinkConfig, TransactionConfig,
};
use log::{info, warn};

/// Shows that writes need the unlock frame and that a restart drops unsaved writes.
///
/// Leaves the encoder's spin direction as it was found.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    simplelog::TermLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let config = LinkConfig::new(port).with_transaction(TransactionConfig {
        timeout: Duration::from_millis(500),
        retries: 2,
    });

    let mut client = EncoderClient::connect(&config).await?;

    let Some(original) = client.spin_direction().await? else {
        warn!("The encoder did not answer. Check the bit rate and device address.");
        return Ok(());
    };
    info!("Spin direction: {original}");

    let flipped = match original {
        SpinDirection::Clockwise => SpinDirection::Counterclockwise,
        SpinDirection::Counterclockwise => SpinDirection::Clockwise,
    };

    // Without unlocking first, the write is ignored
    client.set_spin_direction(flipped, false).await?;
    info!(
        "After a locked write: {:?}",
        client.spin_direction().await?
    );

    client.set_spin_direction(flipped, true).await?;
    info!(
        "After an unlocked write: {:?}",
        client.spin_direction().await?
    );

    // Restarting reloads the saved settings and locks the device again
    client
        .apply_settings(ApplySettingsMode::Restart, false)
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    info!(
        "After a restart: {:?} (unlocked: {})",
        client.spin_direction().await?,
        client.is_unlocked()
    );

    client.into_inner().close().await?;
    Ok(())
}
