use arm_encoder_driver::{
    serial::{self, SerialError},
    EncoderClient, LinkConfig,
};
use log::{error, info};

#[tokio::main]
async fn main() -> Result<(), SerialError> {
    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    // Use the port given on the command line, or the first USB serial port
    let port = match std::env::args().nth(1) {
        Some(port) => port,
        None => match serial::find_ports()?.into_iter().next() {
            Some(port) => port.port_name,
            None => {
                error!("No USB serial ports found");
                return Ok(());
            }
        },
    };

    let mut client = EncoderClient::connect(&LinkConfig::new(port)).await?;

    let cancel = client.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let snapshot = client.capture_all().await;
    print!("{snapshot}");

    if !snapshot.is_complete() {
        info!(
            "{} of 15 registers could not be read",
            snapshot.failures().len()
        );
    }

    client.into_inner().close().await
}
