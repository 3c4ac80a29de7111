/// Errors that can occur while configuring or driving a device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error. Ends the drive loop.
    #[error("transport error: {0}")]
    Transport(#[from] daqsim_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] daqsim_frame::FrameError),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a configuration file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Request-level failures reported to the host as a Nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed or incomplete command parameters.
    #[error("parameter error (code {0:#04x})")]
    Parameter(u8),

    /// Command not valid in the current device state.
    #[error("status error (code {0:#04x})")]
    Status(u8),

    #[error("command {0:#04x} not supported")]
    CommandNotSupported(u8),
}

impl ProtocolError {
    pub const CATEGORY_PARAMETER: u8 = 0x01;
    pub const CATEGORY_STATUS: u8 = 0x02;
    pub const CATEGORY_UNSUPPORTED: u8 = 0x05;

    /// Two-byte Nack payload: `[category, code]`.
    pub fn nack_payload(&self) -> [u8; 2] {
        match *self {
            Self::Parameter(code) => [Self::CATEGORY_PARAMETER, code],
            Self::Status(code) => [Self::CATEGORY_STATUS, code],
            Self::CommandNotSupported(_) => [Self::CATEGORY_UNSUPPORTED, 0x00],
        }
    }

    /// Inverse of [`nack_payload`](Self::nack_payload), for host-side decoding.
    pub fn from_nack_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [Self::CATEGORY_PARAMETER, code, ..] => Some(Self::Parameter(*code)),
            [Self::CATEGORY_STATUS, code, ..] => Some(Self::Status(*code)),
            [Self::CATEGORY_UNSUPPORTED, ..] => Some(Self::CommandNotSupported(0)),
            _ => None,
        }
    }
}
