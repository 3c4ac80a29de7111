//! Byte-stream transports for the daqsim device simulator.
//!
//! Every transport implements [`Transport`]: non-blocking `recv`, whole-buffer
//! `send`, and explicit `init`/`cleanup`. The device engine above is written
//! against the trait only.
//!
//! - [`TcpTransport`]: single-client TCP server
//! - [`LoopbackTransport`]: in-memory pair for tests and demos
//! - [`SerialTransport`]: UART via the `serialport` crate
//! - [`ChunkStreamTransport`]: fixed block pools fed by a producer handle

pub mod chunk;
pub mod error;
pub mod loopback;
pub mod serial;
pub mod tcp;
pub mod traits;

pub use chunk::{ChunkProducer, ChunkSink, ChunkStreamConfig, ChunkStreamTransport};
pub use error::{Result, TransportError};
pub use loopback::{LoopbackHandle, LoopbackTransport};
pub use serial::{SerialConfig, SerialTransport};
pub use tcp::{TcpConfig, TcpTransport};
pub use traits::Transport;
