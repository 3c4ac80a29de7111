//! Simulated data-acquisition device.
//!
//! daqsim models a measurement instrument that exchanges commands and
//! streaming samples with a host over a CRC16-checked, length-delimited binary
//! protocol, carried on a swappable byte transport.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte transports (TCP, loopback, serial, chunk stream)
//! - [`frame`]: frame codec, CRC16, RX extractor and TX record queue
//! - [`device`]: device state engine and session drive loop (behind `device` feature)

/// Re-export transport types.
pub mod transport {
    pub use daqsim_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use daqsim_frame::*;
}

/// Re-export device types (requires `device` feature).
#[cfg(feature = "device")]
pub mod device {
    pub use daqsim_device::*;
}
