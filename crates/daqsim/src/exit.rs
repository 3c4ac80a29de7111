use std::fmt;
use std::io;

use daqsim_device::DeviceError;
use daqsim_frame::FrameError;
use daqsim_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidAddress(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::PayloadTooLarge { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::HeaderMismatch
        | FrameError::TailMismatch
        | FrameError::LengthMismatch
        | FrameError::ChecksumMismatch { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn device_error(context: &str, err: DeviceError) -> CliError {
    match err {
        DeviceError::Transport(err) => transport_error(context, err),
        DeviceError::Frame(err) => frame_error(context, err),
        DeviceError::Config(_) | DeviceError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        DeviceError::Io(err) => io_error(context, err),
    }
}
