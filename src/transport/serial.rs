//! Serial port transport over tokio-serial

use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use super::Transport;
use crate::sentence::RawChunk;
use crate::types::{DataBits, LineSettings, Parity, StopBits};
use crate::{RelayError, Result};

const READ_BUFFER_SIZE: usize = 256;

/// Transport reading from a serial device such as `/dev/ttyACM0` or `COM3`.
pub struct SerialTransport {
    path: String,
    port: Option<SerialStream>,
    buf: Box<[u8; READ_BUFFER_SIZE]>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), port: None, buf: Box::new([0; READ_BUFFER_SIZE]) }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> tokio_serial::StopBits {
    match bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

#[async_trait::async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        let port = tokio_serial::new(&self.path, LineSettings::default().baud_rate)
            .open_native_async()
            .map_err(|e| {
                RelayError::transport_open_with_source(&self.path, "cannot open serial port", Box::new(e))
            })?;
        info!(path = %self.path, "Opened serial port");
        self.port = Some(port);
        Ok(())
    }

    async fn configure(&mut self, line: &LineSettings) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(RelayError::transport_open(&self.path, "configure before open"));
        };

        let apply = |port: &mut SerialStream| -> tokio_serial::Result<()> {
            port.set_baud_rate(line.baud_rate)?;
            port.set_data_bits(data_bits(line.data_bits))?;
            port.set_stop_bits(stop_bits(line.stop_bits))?;
            port.set_parity(parity(line.parity))
        };

        apply(port).map_err(|e| {
            RelayError::transport_open_with_source(&self.path, format!("cannot apply {line}"), Box::new(e))
        })?;
        debug!(path = %self.path, line = %line, "Configured serial port");
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<RawChunk>> {
        let Some(port) = self.port.as_mut() else {
            return Err(RelayError::transport_read(&self.path, "serial port is not open"));
        };

        match port.read(&mut self.buf[..]).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(RawChunk::from(&self.buf[..n]))),
            Err(e) => Err(RelayError::transport_read_with_source(&self.path, "read failed", Box::new(e))),
        }
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(path = %self.path, "Closed serial port");
        }
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
