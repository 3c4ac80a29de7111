use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Default number of bytes the host side may have in flight.
pub const DEFAULT_LOOPBACK_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct Shared {
    inbound: VecDeque<u8>,
    capacity: usize,
    outbound: Vec<u8>,
    closed: bool,
    recv_calls: u64,
    send_calls: u64,
}

/// In-memory transport for tests and the interactive demo.
///
/// The device side implements [`Transport`]; the host side is driven through a
/// cloneable [`LoopbackHandle`] that injects bytes and collects what the device
/// sent.
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
    connected: bool,
}

/// Host-side handle onto a [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackTransport {
    /// Create a transport and its host handle.
    pub fn new() -> (Self, LoopbackHandle) {
        Self::with_capacity(DEFAULT_LOOPBACK_CAPACITY)
    }

    /// Create a transport whose inbound queue holds at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> (Self, LoopbackHandle) {
        let shared = Arc::new(Mutex::new(Shared {
            capacity,
            ..Shared::default()
        }));
        let handle = LoopbackHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                shared,
                connected: false,
            },
            handle,
        )
    }
}

impl LoopbackHandle {
    /// Queue bytes for the device to receive.
    ///
    /// Never blocks: returns how many bytes fit, which is less than
    /// `data.len()` when the inbound queue is full.
    pub fn inject(&self, data: &[u8]) -> usize {
        let mut shared = self.shared.lock();
        let room = shared.capacity.saturating_sub(shared.inbound.len());
        let accepted = room.min(data.len());
        shared.inbound.extend(&data[..accepted]);
        debug!(accepted, requested = data.len(), "loopback inject");
        accepted
    }

    /// Take every byte the device has sent so far.
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.lock().outbound)
    }

    /// Bytes injected but not yet received by the device.
    pub fn pending(&self) -> usize {
        self.shared.lock().inbound.len()
    }

    /// Simulate the host hanging up. The device sees `PeerClosed` once it has
    /// drained what was already injected.
    pub fn close(&self) {
        self.shared.lock().closed = true;
    }

    /// `(recv_calls, send_calls)` that moved data.
    pub fn call_counts(&self) -> (u64, u64) {
        let shared = self.shared.lock();
        (shared.recv_calls, shared.send_calls)
    }
}

impl Transport for LoopbackTransport {
    fn init(&mut self) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.closed = false;
        shared.recv_calls = 0;
        shared.send_calls = 0;
        info!(capacity = shared.capacity, "loopback transport ready");
        Ok(())
    }

    fn wait_for_connection(&mut self) -> Result<()> {
        if !self.connected {
            self.connected = true;
            info!("loopback host attached");
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut shared = self.shared.lock();
        let n = buf.len().min(shared.inbound.len());
        if n == 0 {
            if shared.closed {
                return Err(TransportError::PeerClosed);
            }
            return Ok(0);
        }
        for (slot, byte) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *slot = byte;
        }
        shared.recv_calls += 1;
        Ok(n)
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let mut shared = self.shared.lock();
        if shared.closed {
            return Err(TransportError::PeerClosed);
        }
        shared.outbound.extend_from_slice(buf);
        shared.send_calls += 1;
        Ok(buf.len())
    }

    fn cleanup(&mut self) {
        let shared = self.shared.lock();
        info!(
            recv_calls = shared.recv_calls,
            send_calls = shared.send_calls,
            "loopback transport closed"
        );
        self.connected = false;
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}
