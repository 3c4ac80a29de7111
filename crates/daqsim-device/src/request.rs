use bytes::BufMut;
use daqsim_frame::command;

use crate::error::ProtocolError;

/// Bytes per entry of a ConfigureStream payload: id (1) + rate (4) + format (1).
pub const CHANNEL_CONFIG_LEN: usize = 6;

/// One entry of a ConfigureStream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel_id: u8,
    /// Zero disables the channel.
    pub sample_rate: u32,
    pub format: u8,
}

/// A host command, decoded from a frame's command id and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    GetStatus,
    GetDeviceInfo,
    SetModeContinuous,
    SetModeTrigger,
    StartStream,
    StopStream,
    ConfigureStream(Vec<ChannelConfig>),
    RequestBufferedData,
}

impl Request {
    /// Decode a request.
    ///
    /// ConfigureStream is validated in full: an empty payload or one shorter
    /// than its declared entry count is rejected as a parameter error.
    pub fn parse(command_id: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let request = match command_id {
            command::PING => Self::Ping,
            command::GET_STATUS => Self::GetStatus,
            command::GET_DEVICE_INFO => Self::GetDeviceInfo,
            command::SET_MODE_CONTINUOUS => Self::SetModeContinuous,
            command::SET_MODE_TRIGGER => Self::SetModeTrigger,
            command::START_STREAM => Self::StartStream,
            command::STOP_STREAM => Self::StopStream,
            command::CONFIGURE_STREAM => Self::ConfigureStream(parse_channel_configs(payload)?),
            command::REQUEST_BUFFERED_DATA => Self::RequestBufferedData,
            other => return Err(ProtocolError::CommandNotSupported(other)),
        };
        Ok(request)
    }

    pub fn command(&self) -> u8 {
        match self {
            Self::Ping => command::PING,
            Self::GetStatus => command::GET_STATUS,
            Self::GetDeviceInfo => command::GET_DEVICE_INFO,
            Self::SetModeContinuous => command::SET_MODE_CONTINUOUS,
            Self::SetModeTrigger => command::SET_MODE_TRIGGER,
            Self::StartStream => command::START_STREAM,
            Self::StopStream => command::STOP_STREAM,
            Self::ConfigureStream(_) => command::CONFIGURE_STREAM,
            Self::RequestBufferedData => command::REQUEST_BUFFERED_DATA,
        }
    }

    /// Wire payload of this request.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::ConfigureStream(configs) => {
                let mut out = Vec::with_capacity(1 + configs.len() * CHANNEL_CONFIG_LEN);
                out.put_u8(configs.len() as u8);
                for cfg in configs {
                    out.put_u8(cfg.channel_id);
                    out.put_u32_le(cfg.sample_rate);
                    out.put_u8(cfg.format);
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

fn parse_channel_configs(payload: &[u8]) -> Result<Vec<ChannelConfig>, ProtocolError> {
    let Some((&count, entries)) = payload.split_first() else {
        return Err(ProtocolError::Parameter(0x01));
    };
    let count = usize::from(count);
    if entries.len() < count * CHANNEL_CONFIG_LEN {
        return Err(ProtocolError::Parameter(0x01));
    }
    Ok(entries
        .chunks_exact(CHANNEL_CONFIG_LEN)
        .take(count)
        .map(|entry| ChannelConfig {
            channel_id: entry[0],
            sample_rate: u32::from_le_bytes([entry[1], entry[2], entry[3], entry[4]]),
            format: entry[5],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(Request::parse(command::PING, &[]).unwrap(), Request::Ping);
        assert_eq!(
            Request::parse(command::STOP_STREAM, &[1, 2, 3]).unwrap(),
            Request::StopStream
        );
    }

    #[test]
    fn parses_configure_stream() {
        let payload = [
            0x02, 0x00, 0x10, 0x27, 0x00, 0x00, 0x01, 0x01, 0x10, 0x27, 0x00, 0x00, 0x01,
        ];
        let request = Request::parse(command::CONFIGURE_STREAM, &payload).unwrap();
        let Request::ConfigureStream(configs) = &request else {
            panic!("expected ConfigureStream, got {request:?}");
        };
        assert_eq!(configs.len(), 2);
        assert_eq!(
            configs[1],
            ChannelConfig {
                channel_id: 1,
                sample_rate: 10_000,
                format: 1
            }
        );
        assert_eq!(request.payload(), payload);
    }

    #[test]
    fn configure_stream_requires_complete_entries() {
        assert_eq!(
            Request::parse(command::CONFIGURE_STREAM, &[]),
            Err(ProtocolError::Parameter(0x01))
        );
        assert_eq!(
            Request::parse(command::CONFIGURE_STREAM, &[0x02, 0x00, 0x10, 0x27, 0x00, 0x00, 0x01]),
            Err(ProtocolError::Parameter(0x01))
        );
        assert_eq!(
            Request::parse(command::CONFIGURE_STREAM, &[0x00]).unwrap(),
            Request::ConfigureStream(Vec::new())
        );
    }

    #[test]
    fn unknown_and_response_ids_are_unsupported() {
        assert_eq!(
            Request::parse(0x7F, &[]),
            Err(ProtocolError::CommandNotSupported(0x7F))
        );
        assert_eq!(
            Request::parse(command::PONG, &[]),
            Err(ProtocolError::CommandNotSupported(command::PONG))
        );
    }
}
