use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Pause between retries when the socket send buffer is full.
const SEND_RETRY_PAUSE: Duration = Duration::from_millis(1);

/// Listen address of the TCP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
}

impl TcpConfig {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 9001;

    /// Parse a listen address.
    ///
    /// Accepted forms: `tcp://host:port`, `host:port`, `port`, `host`.
    /// Missing parts fall back to `0.0.0.0` and `9001`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut config = Self::default();
        let input = input.trim();
        if input.is_empty() {
            return Ok(config);
        }

        let rest = match input.find("://") {
            Some(idx) => &input[idx + 3..],
            None => input,
        };

        if let Some((host, port)) = rest.rsplit_once(':') {
            if !host.is_empty() {
                config.host = host.to_string();
            }
            config.port = parse_port(port).ok_or_else(|| {
                TransportError::InvalidAddress(input.to_string())
            })?;
            return Ok(config);
        }

        if rest.bytes().all(|b| b.is_ascii_digit()) {
            config.port =
                parse_port(rest).ok_or_else(|| TransportError::InvalidAddress(input.to_string()))?;
            return Ok(config);
        }

        config.host = rest.to_string();
        Ok(config)
    }

    /// `host:port` form suitable for logging and binding.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

fn parse_port(text: &str) -> Option<u16> {
    match text.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

/// TCP server transport serving a single host connection.
///
/// `wait_for_connection` blocks in `accept`; the accepted stream is switched to
/// non-blocking mode so `recv` returns immediately when idle.
pub struct TcpTransport {
    config: TcpConfig,
    listener: Option<TcpListener>,
    client: Option<TcpStream>,
    peer_addr: Option<SocketAddr>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            listener: None,
            client: None,
            peer_addr: None,
        }
    }

    /// Address the listener is bound to (after `init`). Resolves port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of the connected host, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn client_mut(&mut self) -> Result<&mut TcpStream> {
        self.client.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Transport for TcpTransport {
    fn init(&mut self) -> Result<()> {
        let addr = self.config.addr();
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).map_err(
            |source| TransportError::Bind {
                addr: addr.clone(),
                source,
            },
        )?;
        info!(%addr, "listening for host connection");
        self.listener = Some(listener);
        Ok(())
    }

    fn wait_for_connection(&mut self) -> Result<()> {
        let listener = self.listener.as_ref().ok_or(TransportError::NotConnected)?;
        let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        info!(%peer, "host connected");
        self.client = Some(stream);
        self.peer_addr = Some(peer);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let client = self.client_mut()?;
        match client.read(buf) {
            Ok(0) => {
                info!("host closed connection");
                Err(TransportError::PeerClosed)
            }
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(0),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let client = self.client_mut()?;
        let mut offset = 0usize;
        while offset < buf.len() {
            match client.write(&buf[offset..]) {
                Ok(0) => return Err(TransportError::PeerClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    // Send buffer full; wait rather than split the frame.
                    std::thread::sleep(SEND_RETRY_PAUSE);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(offset)
    }

    fn cleanup(&mut self) {
        if self.client.take().is_some() {
            debug!("closed host connection");
        }
        if self.listener.take().is_some() {
            debug!(addr = %self.config.addr(), "closed listener");
        }
        self.peer_addr = None;
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.cleanup();
    }
}
