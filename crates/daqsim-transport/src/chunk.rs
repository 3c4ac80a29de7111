//! Chunked producer/consumer transport.
//!
//! Models a link whose receive side is fed from outside the drive loop (an
//! interrupt handler or a driver thread) and whose transmit side is drained by
//! a background worker. All memory is reserved up front:
//!
//! - RX: a fixed pool of fixed-size blocks, a free-list of block indices and a
//!   bounded ready queue. [`ChunkProducer::push`] never blocks; when the pool
//!   or the queue is exhausted it stops and reports a short count.
//! - TX: the same pool/queue shape; `send` splits the buffer into blocks and a
//!   worker thread hands each block to a [`ChunkSink`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Largest RX block.
pub const RX_CHUNK_MAX_BYTES: usize = 256;
/// Number of RX blocks that can be pending at once.
pub const RX_POOL_COUNT: usize = 32;
/// Length of the RX ready queue.
pub const RX_READY_QUEUE_LEN: usize = 32;
/// Largest TX block; `send` splits at this size.
pub const TX_CHUNK_MAX_BYTES: usize = 256;
/// Number of TX blocks.
pub const TX_POOL_COUNT: usize = 32;
/// Length of the TX send queue.
pub const TX_SEND_QUEUE_LEN: usize = 32;

/// Destination of transmitted blocks, driven from the worker thread.
pub trait ChunkSink: Send + 'static {
    /// Write one block, blocking until it is fully out or failed.
    fn send_block(&mut self, data: &[u8]) -> std::io::Result<()>;
}

impl<F> ChunkSink for F
where
    F: FnMut(&[u8]) -> std::io::Result<()> + Send + 'static,
{
    fn send_block(&mut self, data: &[u8]) -> std::io::Result<()> {
        self(data)
    }
}

/// Runtime knobs of the chunk-stream transport.
#[derive(Debug, Clone)]
pub struct ChunkStreamConfig {
    /// Target RX block size, capped at [`RX_CHUNK_MAX_BYTES`].
    pub rx_chunk_bytes: usize,
    /// Target TX block size, capped at [`TX_CHUNK_MAX_BYTES`].
    pub tx_chunk_bytes: usize,
    /// How long `send` waits for free TX blocks before returning a short count.
    pub send_timeout: Duration,
}

impl Default for ChunkStreamConfig {
    fn default() -> Self {
        Self {
            rx_chunk_bytes: RX_CHUNK_MAX_BYTES,
            tx_chunk_bytes: TX_CHUNK_MAX_BYTES,
            send_timeout: Duration::from_millis(100),
        }
    }
}

fn clamp_chunk(requested: usize, max: usize) -> usize {
    if requested == 0 || requested > max {
        max
    } else {
        requested
    }
}

/// Fixed-size block arena with a free-list and a bounded FIFO of filled blocks.
#[derive(Debug)]
struct BlockQueue {
    blocks: Vec<Box<[u8]>>,
    lens: Vec<usize>,
    free: Vec<usize>,
    ready: VecDeque<usize>,
    ready_cap: usize,
}

impl BlockQueue {
    fn new(count: usize, block_size: usize, ready_cap: usize) -> Self {
        Self {
            blocks: (0..count)
                .map(|_| vec![0u8; block_size].into_boxed_slice())
                .collect(),
            lens: vec![0; count],
            // Reverse order so the first allocation hands out block 0.
            free: (0..count).rev().collect(),
            ready: VecDeque::with_capacity(ready_cap),
            ready_cap,
        }
    }

    /// Copy `data` into a free block and queue it. `false` when out of blocks
    /// or queue slots; nothing is consumed in that case.
    fn try_push(&mut self, data: &[u8]) -> bool {
        if self.ready.len() >= self.ready_cap {
            return false;
        }
        let Some(idx) = self.free.pop() else {
            return false;
        };
        self.blocks[idx][..data.len()].copy_from_slice(data);
        self.lens[idx] = data.len();
        self.ready.push_back(idx);
        true
    }

    fn release(&mut self, idx: usize) {
        self.lens[idx] = 0;
        self.free.push(idx);
    }

    fn reset(&mut self) {
        let count = self.blocks.len();
        self.ready.clear();
        self.lens.iter_mut().for_each(|len| *len = 0);
        self.free = (0..count).rev().collect();
    }
}

#[derive(Debug)]
struct RxState {
    queue: BlockQueue,
    /// Block currently being consumed and the read offset inside it.
    current: Option<(usize, usize)>,
    chunk_bytes: usize,
}

#[derive(Debug)]
struct TxState {
    queue: BlockQueue,
    chunk_bytes: usize,
    shutdown: bool,
}

#[derive(Debug)]
struct TxShared {
    state: Mutex<TxState>,
    /// Signalled when a block is queued or shutdown is requested.
    work: Condvar,
    /// Signalled when the worker returns a block to the pool.
    space: Condvar,
}

/// Producer handle for the RX side. Cloneable and `Send`.
#[derive(Debug, Clone)]
pub struct ChunkProducer {
    rx: Arc<Mutex<RxState>>,
}

impl ChunkProducer {
    /// Hand received bytes to the transport.
    ///
    /// Never blocks. Returns the number of bytes accepted, which is short when
    /// the block pool or ready queue is exhausted; the caller decides whether to
    /// retry, drop or throttle.
    pub fn push(&self, data: &[u8]) -> usize {
        let mut pushed = 0usize;
        while pushed < data.len() {
            let mut rx = self.rx.lock();
            let chunk = (data.len() - pushed).min(rx.chunk_bytes);
            if !rx.queue.try_push(&data[pushed..pushed + chunk]) {
                break;
            }
            pushed += chunk;
        }
        if pushed < data.len() {
            debug!(pushed, requested = data.len(), "rx block pool exhausted");
        }
        pushed
    }
}

/// Transport backed by static block pools and a TX worker thread.
pub struct ChunkStreamTransport {
    rx: Arc<Mutex<RxState>>,
    tx: Arc<TxShared>,
    sink: Option<Box<dyn ChunkSink>>,
    worker: Option<JoinHandle<Box<dyn ChunkSink>>>,
    send_timeout: Duration,
}

impl ChunkStreamTransport {
    /// Create a transport writing through `sink`, plus the RX producer handle.
    pub fn new(sink: impl ChunkSink, config: ChunkStreamConfig) -> (Self, ChunkProducer) {
        let rx = Arc::new(Mutex::new(RxState {
            queue: BlockQueue::new(RX_POOL_COUNT, RX_CHUNK_MAX_BYTES, RX_READY_QUEUE_LEN),
            current: None,
            chunk_bytes: clamp_chunk(config.rx_chunk_bytes, RX_CHUNK_MAX_BYTES),
        }));
        let tx = Arc::new(TxShared {
            state: Mutex::new(TxState {
                queue: BlockQueue::new(TX_POOL_COUNT, TX_CHUNK_MAX_BYTES, TX_SEND_QUEUE_LEN),
                chunk_bytes: clamp_chunk(config.tx_chunk_bytes, TX_CHUNK_MAX_BYTES),
                shutdown: false,
            }),
            work: Condvar::new(),
            space: Condvar::new(),
        });
        let producer = ChunkProducer { rx: Arc::clone(&rx) };
        (
            Self {
                rx,
                tx,
                sink: Some(Box::new(sink)),
                worker: None,
                send_timeout: config.send_timeout,
            },
            producer,
        )
    }

    /// Adjust block sizes at runtime. Zero or oversized values select the
    /// compile-time maximum.
    pub fn set_chunk_sizes(&self, rx_chunk: usize, tx_chunk: usize) {
        self.rx.lock().chunk_bytes = clamp_chunk(rx_chunk, RX_CHUNK_MAX_BYTES);
        self.tx.state.lock().chunk_bytes = clamp_chunk(tx_chunk, TX_CHUNK_MAX_BYTES);
    }

    fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.tx.state.lock().shutdown = true;
        self.tx.work.notify_all();
        match worker.join() {
            Ok(sink) => self.sink = Some(sink),
            Err(_) => warn!("chunk tx worker panicked"),
        }
    }
}

fn run_tx_worker(shared: Arc<TxShared>, mut sink: Box<dyn ChunkSink>) -> Box<dyn ChunkSink> {
    let mut scratch = vec![0u8; TX_CHUNK_MAX_BYTES];
    loop {
        let (idx, len) = {
            let mut state = shared.state.lock();
            loop {
                if let Some(idx) = state.queue.ready.pop_front() {
                    let len = state.queue.lens[idx];
                    scratch[..len].copy_from_slice(&state.queue.blocks[idx][..len]);
                    break (idx, len);
                }
                if state.shutdown {
                    return sink;
                }
                shared.work.wait(&mut state);
            }
        };

        if let Err(err) = sink.send_block(&scratch[..len]) {
            warn!(error = %err, len, "chunk sink write failed");
        }

        shared.state.lock().queue.release(idx);
        shared.space.notify_all();
    }
}

impl Transport for ChunkStreamTransport {
    fn init(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let sink = self.sink.take().ok_or(TransportError::Shutdown)?;
        {
            let mut rx = self.rx.lock();
            rx.queue.reset();
            rx.current = None;
            let mut tx = self.tx.state.lock();
            tx.queue.reset();
            tx.shutdown = false;
        }
        let shared = Arc::clone(&self.tx);
        let worker = std::thread::Builder::new()
            .name("chunk-tx".to_string())
            .spawn(move || run_tx_worker(shared, sink))?;
        self.worker = Some(worker);
        debug!("chunk stream transport ready");
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut rx = self.rx.lock();
        let mut copied = 0usize;
        while copied < buf.len() {
            let (idx, rpos) = match rx.current {
                Some(cur) => cur,
                None => match rx.queue.ready.pop_front() {
                    Some(idx) => (idx, 0),
                    None => break,
                },
            };
            let len = rx.queue.lens[idx];
            let take = (len - rpos).min(buf.len() - copied);
            buf[copied..copied + take].copy_from_slice(&rx.queue.blocks[idx][rpos..rpos + take]);
            copied += take;

            if rpos + take >= len {
                rx.queue.release(idx);
                rx.current = None;
            } else {
                rx.current = Some((idx, rpos + take));
            }
        }
        Ok(copied)
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        if self.worker.is_none() {
            return Err(TransportError::NotConnected);
        }
        let deadline = Instant::now() + self.send_timeout;
        let mut sent = 0usize;
        let mut state = self.tx.state.lock();
        while sent < buf.len() {
            if state.shutdown {
                return Err(TransportError::Shutdown);
            }
            let chunk = (buf.len() - sent).min(state.chunk_bytes);
            if state.queue.try_push(&buf[sent..sent + chunk]) {
                sent += chunk;
                self.tx.work.notify_one();
                continue;
            }
            if self.tx.space.wait_until(&mut state, deadline).timed_out() {
                warn!(sent, len = buf.len(), "tx block pool exhausted");
                break;
            }
        }
        if sent == 0 && !buf.is_empty() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "no tx blocks available",
            )));
        }
        Ok(sent)
    }

    fn cleanup(&mut self) {
        self.stop_worker();
        let mut rx = self.rx.lock();
        rx.queue.reset();
        rx.current = None;
    }

    fn name(&self) -> &'static str {
        "chunk-stream"
    }
}

impl Drop for ChunkStreamTransport {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_sink() -> (impl ChunkSink, Arc<Mutex<Vec<Vec<u8>>>>) {
        let blocks = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&blocks);
        let sink = move |data: &[u8]| -> std::io::Result<()> {
            captured.lock().push(data.to_vec());
            Ok(())
        };
        (sink, blocks)
    }

    fn drain(transport: &mut ChunkStreamTransport) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 100];
        loop {
            let n = transport.recv(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn producer_bytes_arrive_in_order() {
        let (sink, _) = collecting_sink();
        let (mut transport, producer) = ChunkStreamTransport::new(sink, ChunkStreamConfig::default());
        transport.init().unwrap();

        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        assert_eq!(producer.push(&data), data.len());
        assert_eq!(drain(&mut transport), data);
        transport.cleanup();
    }

    #[test]
    fn producer_partially_accepts_when_pool_exhausted() {
        let (sink, _) = collecting_sink();
        let (mut transport, producer) = ChunkStreamTransport::new(sink, ChunkStreamConfig::default());
        transport.init().unwrap();

        let capacity = RX_POOL_COUNT * RX_CHUNK_MAX_BYTES;
        let data = vec![0x5Au8; capacity + 100];
        assert_eq!(producer.push(&data), capacity);
        assert_eq!(producer.push(b"more"), 0);

        // Consuming frees blocks for the producer again.
        assert_eq!(drain(&mut transport).len(), capacity);
        assert_eq!(producer.push(b"more"), 4);
        transport.cleanup();
    }

    #[test]
    fn small_chunks_consume_more_blocks() {
        let (sink, _) = collecting_sink();
        let (mut transport, producer) = ChunkStreamTransport::new(sink, ChunkStreamConfig::default());
        transport.init().unwrap();
        transport.set_chunk_sizes(10, 0);

        let data = vec![1u8; 1000];
        assert_eq!(producer.push(&data), RX_POOL_COUNT * 10);
        transport.cleanup();
    }

    #[test]
    fn send_splits_into_blocks_and_flushes_on_cleanup() {
        let (sink, blocks) = collecting_sink();
        let (mut transport, _producer) = ChunkStreamTransport::new(
            sink,
            ChunkStreamConfig {
                tx_chunk_bytes: 64,
                ..ChunkStreamConfig::default()
            },
        );
        transport.init().unwrap();

        let data: Vec<u8> = (0..200u8).collect();
        assert_eq!(transport.send(&data).unwrap(), 200);
        transport.cleanup();

        let blocks = blocks.lock();
        assert_eq!(
            blocks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![64, 64, 64, 8]
        );
        assert_eq!(blocks.concat(), data);
    }

    #[test]
    fn send_before_init_is_rejected() {
        let (sink, _) = collecting_sink();
        let (mut transport, _producer) = ChunkStreamTransport::new(sink, ChunkStreamConfig::default());
        assert!(matches!(
            transport.send(b"x"),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn transport_can_be_restarted() {
        let (sink, blocks) = collecting_sink();
        let (mut transport, _producer) = ChunkStreamTransport::new(sink, ChunkStreamConfig::default());
        transport.init().unwrap();
        transport.send(b"first").unwrap();
        transport.cleanup();

        transport.init().unwrap();
        transport.send(b"second").unwrap();
        transport.cleanup();

        assert_eq!(blocks.lock().concat(), b"firstsecond");
    }
}
