use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    pub baud_rate: u32,
    /// Upper bound for a blocking write.
    pub write_timeout: Duration,
}

impl SerialConfig {
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;

    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: Self::DEFAULT_BAUD_RATE,
            write_timeout: Duration::from_millis(500),
        }
    }
}

/// Serial (UART) transport.
///
/// Connectionless: `wait_for_connection` returns immediately. `recv` polls the
/// driver's input queue and only reads what is already buffered.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn serial_error(&self, err: impl std::fmt::Display) -> TransportError {
        TransportError::Serial {
            path: self.config.path.clone(),
            message: err.to_string(),
        }
    }
}

impl Transport for SerialTransport {
    fn init(&mut self) -> Result<()> {
        let port = serialport::new(self.config.path.as_str(), self.config.baud_rate)
            .timeout(self.config.write_timeout)
            .open()
            .map_err(|err| self.serial_error(err))?;
        info!(
            path = %self.config.path,
            baud = self.config.baud_rate,
            "serial port opened"
        );
        self.port = Some(port);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pending = {
            let port = self.port.as_ref().ok_or(TransportError::NotConnected)?;
            port.bytes_to_read().map_err(|err| self.serial_error(err))?
        };
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(pending as usize);
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        match port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        port.write_all(buf)?;
        port.flush()?;
        Ok(buf.len())
    }

    fn cleanup(&mut self) {
        if self.port.take().is_some() {
            debug!(path = %self.config.path, "serial port closed");
        }
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}
