use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use daqsim_frame::{RxBuffer, TxQueue, MAX_FRAME_SIZE};
use daqsim_transport::Transport;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, SessionConfig};
use crate::engine::Device;
use crate::error::Result;

/// Millisecond time source for the drive loop.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// What one call to [`Session::poll_once`] moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub bytes_received: usize,
    /// Received bytes that did not fit the RX buffer.
    pub bytes_dropped: usize,
    /// Frames that passed validation; rejected candidates are counted by
    /// [`crate::DeviceStats::frames_rejected`].
    pub frames_received: usize,
    pub frames_sent: usize,
    pub bytes_sent: usize,
}

impl PollStats {
    pub fn is_idle(&self) -> bool {
        self.bytes_received == 0 && self.bytes_sent == 0
    }
}

/// Running totals of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub polls: u64,
    pub bytes_received: u64,
    pub bytes_dropped: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

impl SessionStats {
    fn absorb(&mut self, poll: &PollStats) {
        self.polls += 1;
        self.bytes_received += poll.bytes_received as u64;
        self.bytes_dropped += poll.bytes_dropped as u64;
        self.frames_received += poll.frames_received as u64;
        self.frames_sent += poll.frames_sent as u64;
        self.bytes_sent += poll.bytes_sent as u64;
    }
}

/// One device bound to one transport.
///
/// Owns the transport, both ring buffers and the device engine. Several
/// sessions can run side by side; nothing is global.
pub struct Session<T> {
    transport: T,
    config: SessionConfig,
    device: Device,
    rx: RxBuffer,
    tx: TxQueue,
    recv_buf: Vec<u8>,
    frame_buf: Vec<u8>,
    /// Unsent tail of a frame cut short by the transport.
    pending: Vec<u8>,
    stats: SessionStats,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig, device_config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let device = Device::new(device_config)?;
        Ok(Self {
            rx: RxBuffer::with_capacity(config.rx_capacity, config.max_frame_size),
            tx: TxQueue::with_capacity(config.tx_capacity),
            recv_buf: vec![0u8; config.recv_chunk],
            frame_buf: vec![0u8; MAX_FRAME_SIZE],
            pending: Vec::new(),
            transport,
            config,
            device,
            stats: SessionStats::default(),
        })
    }

    /// Initialize the transport and wait for the host to attach.
    pub fn start(&mut self) -> Result<()> {
        self.transport.init()?;
        info!(transport = self.transport.name(), "waiting for host");
        self.transport.wait_for_connection()?;
        info!(transport = self.transport.name(), "host attached");
        Ok(())
    }

    /// Run one receive, dispatch, tick and transmit cycle.
    ///
    /// Never blocks on an idle transport. A transport error is returned and
    /// should end the session; every other failure is handled internally.
    ///
    /// When the transport accepts only part of a frame, the rest is held and
    /// sent first on the next poll; no further frames leave until it has gone.
    pub fn poll_once(&mut self, now_ms: u64) -> Result<PollStats> {
        let mut poll = PollStats::default();

        let n = self.transport.recv(&mut self.recv_buf)?;
        if n > 0 {
            let accepted = self.rx.feed(&self.recv_buf[..n]);
            poll.bytes_received = n;
            if accepted < n {
                poll.bytes_dropped = n - accepted;
                warn!(received = n, accepted, "rx buffer full, bytes dropped");
            }
        }

        let handled_before = self.device.stats().frames_handled;
        let device = &mut self.device;
        let tx = &mut self.tx;
        self.rx
            .drain_frames(&mut self.frame_buf, |frame| device.handle_frame(frame, now_ms, tx));
        poll.frames_received = (self.device.stats().frames_handled - handled_before) as usize;

        self.device.tick(now_ms, &mut self.tx);

        if !self.flush_pending(&mut poll)? {
            self.stats.absorb(&poll);
            return Ok(poll);
        }

        loop {
            let len = match self.tx.dequeue(&mut self.frame_buf) {
                Ok(Some(len)) => len,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "discarding unsendable record");
                    continue;
                }
            };
            let sent = self.transport.send(&self.frame_buf[..len])?;
            poll.bytes_sent += sent;
            if sent < len {
                warn!(sent, len, "short send, holding frame tail");
                self.pending.extend_from_slice(&self.frame_buf[sent..len]);
                break;
            }
            poll.frames_sent += 1;
        }

        self.stats.absorb(&poll);
        Ok(poll)
    }

    /// Send the held tail of a partly sent frame. Returns true once nothing
    /// is held.
    fn flush_pending(&mut self, poll: &mut PollStats) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(true);
        }
        let sent = self.transport.send(&self.pending)?;
        poll.bytes_sent += sent;
        self.pending.drain(..sent.min(self.pending.len()));
        if self.pending.is_empty() {
            poll.frames_sent += 1;
            debug!(sent, "frame tail sent");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drive the session until `running` clears or the transport fails.
    pub fn run<C: Clock>(&mut self, clock: &C, running: &AtomicBool) -> Result<SessionStats> {
        let status_every = self.config.status_interval.as_millis() as u64;
        let mut last_status = clock.now_ms();

        while running.load(Ordering::SeqCst) {
            let now = clock.now_ms();
            let poll = self.poll_once(now)?;

            if now.saturating_sub(last_status) >= status_every {
                let state = self.device.state();
                info!(
                    mode = ?state.mode,
                    stream = ?state.stream,
                    rx_buffered = self.rx.available(),
                    tx_queued = self.tx.len(),
                    frames_received = self.stats.frames_received,
                    frames_sent = self.stats.frames_sent,
                    "status"
                );
                last_status = now;
            }

            if poll.is_idle() {
                std::thread::sleep(self.config.idle_sleep);
            }
        }

        debug!("run loop stopped");
        Ok(self.stats)
    }

    /// Stop streaming, release the transport and clear both buffers.
    pub fn shutdown(&mut self) {
        self.device.stop();
        self.transport.cleanup();
        self.rx.reset();
        self.tx.reset();
        self.pending.clear();
        info!(
            frames_received = self.stats.frames_received,
            frames_sent = self.stats.frames_sent,
            "session closed"
        );
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn rx(&self) -> &RxBuffer {
        &self.rx
    }

    pub fn tx(&self) -> &TxQueue {
        &self.tx
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}
