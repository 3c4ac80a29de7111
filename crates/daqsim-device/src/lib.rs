//! Simulated data-acquisition device.
//!
//! [`Device`] is the protocol state engine: it validates incoming frames,
//! dispatches typed [`Request`]s, and streams data packets in continuous or
//! trigger mode. [`Session`] binds a device to a transport and its RX/TX
//! buffers and drives the receive, dispatch, tick and transmit cycle.

pub mod config;
pub mod engine;
pub mod error;
pub mod request;
pub mod response;
pub mod session;
pub mod state;

pub use config::{ChannelSpec, DelayRange, DeviceConfig, SessionConfig, SignalConfig, MAX_CHANNELS};
pub use engine::{Device, DeviceStats};
pub use error::{DeviceError, ProtocolError, Result};
pub use request::{ChannelConfig, Request};
pub use response::{ChannelInfo, DataPacket, Response};
pub use session::{Clock, ManualClock, MonotonicClock, PollStats, Session, SessionStats};
pub use state::{ChannelState, DeviceState, Mode, StreamStatus, TriggerState};
