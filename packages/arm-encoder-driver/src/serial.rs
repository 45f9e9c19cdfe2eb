//! Implements discovering, opening, and talking through SLCAN USB-to-CAN adapters.

use std::time::Duration;

use log::{debug, trace, warn};
use serialport::{SerialPortInfo, SerialPortType};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    select,
    time::{sleep, Instant},
};
use tokio_serial::SerialStream;

use arm_encoder_protocol::{frame::FrameError, value::BaudRate, CanFrame};

use crate::{
    config::LinkConfig,
    slcan::{self, SlcanError},
    BusMode, Connection, EncoderClient,
};

/// Line rate of the adapter's virtual serial port. Most adapters ignore it.
pub const SLCAN_SERIAL_BAUDRATE: u32 = 115200;

/// How long the adapter gets to acknowledge a command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Finds all USB serial ports that could be an SLCAN adapter.
pub fn find_ports() -> Result<Vec<SerialPortInfo>, SerialError> {
    let ports = tokio_serial::available_ports()?;

    let mut usb_ports = Vec::new();
    for port in ports {
        if !matches!(port.port_type, SerialPortType::UsbPort(_)) {
            continue;
        }

        if cfg!(target_os = "macos") && port.port_name.starts_with("/dev/tty.") {
            // https://pbxbook.com/other/mac-tty.html
            debug!(
                "Ignoring port named {:?} because it is a call-in device",
                port.port_name
            );
            continue;
        }

        usb_ports.push(port);
    }

    Ok(usb_ports)
}

/// An open SLCAN adapter with its CAN channel open.
#[derive(Debug)]
pub struct SerialConnection {
    port_name: String,
    stream: SerialStream,
    buffer: Vec<u8>,
    bus_mode: BusMode,
}

impl SerialConnection {
    /// Opens the adapter at `config.port` and opens its channel at `config.bitrate`.
    pub async fn open(config: &LinkConfig) -> Result<Self, SerialError> {
        let bitrate = slcan::bitrate_command(config.bitrate)
            .ok_or(SerialError::UnsupportedBitrate(config.bitrate))?;

        let stream = SerialStream::open(
            &tokio_serial::new(&config.port, SLCAN_SERIAL_BAUDRATE)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One),
        )?;

        let mut connection = Self {
            port_name: config.port.clone(),
            stream,
            buffer: Vec::new(),
            bus_mode: BusMode::Normal,
        };

        // The channel may still be open from an earlier session. Closing a closed
        // channel is refused by the adapter, which is fine here.
        if let Err(e) = connection.command(slcan::CLOSE).await {
            debug!("Closing the channel before setup failed: {e}");
        }
        connection.buffer.clear();

        connection.command(bitrate).await?;
        connection.command(slcan::OPEN).await?;
        debug!(
            "Opened SLCAN channel on {} at {} kbit/s.",
            connection.port_name, config.bitrate
        );

        Ok(connection)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn bus_mode(&self) -> BusMode {
        self.bus_mode
    }

    /// Closes the channel and releases the port.
    pub async fn close(mut self) -> Result<(), SerialError> {
        debug!("Closing SLCAN channel on {}.", self.port_name);
        self.command(slcan::CLOSE).await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SerialError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Sends a command and waits for the adapter to acknowledge it.
    async fn command(&mut self, command: &'static str) -> Result<(), SerialError> {
        trace!("sent adapter command: {:?}", command);
        self.write_line(command).await?;

        let deadline = Instant::now() + COMMAND_TIMEOUT;
        loop {
            while let Some(line) = slcan::next_line(&mut self.buffer) {
                match slcan::parse_line(&line)? {
                    // A bare carriage return acknowledges a command.
                    None if line.is_empty() => return Ok(()),
                    _ => trace!("Skipping adapter line while waiting for an ack: {:x?}", line),
                }
            }

            select! {
                result = self.fill_buffer() => result?,
                _ = sleep(deadline.saturating_duration_since(Instant::now())) => {
                    return Err(SerialError::Timeout(command));
                }
            }
        }
    }

    async fn fill_buffer(&mut self) -> Result<(), SerialError> {
        let mut chunk = [0u8; 64];
        let n = self.stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Reads until a whole data frame has arrived.
    async fn next_frame(&mut self) -> Result<CanFrame, SerialError> {
        loop {
            while let Some(line) = slcan::next_line(&mut self.buffer) {
                match slcan::parse_line(&line) {
                    Ok(Some(frame)) => {
                        trace!("received frame: {:?}", frame);
                        return Ok(frame);
                    }
                    Ok(None) => {}
                    Err(SlcanError::AdapterError) => {
                        warn!(
                            "The adapter reported an error. The last frame may not have been sent."
                        );
                    }
                    Err(e) => warn!("Skipping line from adapter: {e}"),
                }
            }

            self.fill_buffer().await?;
        }
    }
}

impl Connection for SerialConnection {
    type Error = SerialError;

    async fn send(&mut self, frame: CanFrame) -> Result<(), SerialError> {
        let line = slcan::encode_frame(&frame);
        trace!("sent frame: {:?}", frame);
        self.write_line(&line).await
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, SerialError> {
        // Partial lines stay in the buffer when the deadline wins.
        select! {
            result = self.next_frame() => result.map(Some),
            _ = sleep(timeout) => Ok(None),
        }
    }

    async fn set_bus_mode(&mut self, mode: BusMode) -> Result<(), SerialError> {
        if mode == self.bus_mode {
            return Ok(());
        }

        self.command(slcan::CLOSE).await?;
        self.command(match mode {
            BusMode::Normal => slcan::OPEN,
            BusMode::ListenOnly => slcan::LISTEN_ONLY,
        })
        .await?;
        self.bus_mode = mode;

        Ok(())
    }
}

impl EncoderClient<SerialConnection> {
    /// Opens the adapter described by `config` and starts a session with the encoder
    /// at `config.device_address`.
    pub async fn connect(config: &LinkConfig) -> Result<Self, SerialError> {
        let target = config.device_id()?;
        let connection = SerialConnection::open(config).await?;
        Ok(Self::with_config(connection, target, config.transaction))
    }
}

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport Error")]
    SerialportError(#[from] tokio_serial::Error),

    #[error("SLCAN Error: {0}")]
    Slcan(#[from] SlcanError),

    #[error("{0} kbit/s is not a standard SLCAN bit rate")]
    UnsupportedBitrate(BaudRate),

    #[error("Invalid device address: {0}")]
    InvalidAddress(#[from] FrameError),

    #[error("The adapter did not acknowledge {0:?}")]
    Timeout(&'static str),
}
