use bytes::{Buf, BufMut};
use daqsim_frame::command;
use serde::Serialize;

use crate::error::ProtocolError;

/// One channel entry of a device info response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub channel_id: u8,
    pub max_sample_rate: u32,
    pub formats: u16,
    pub name: String,
}

/// Decoded payload of a DataPacket frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataPacket {
    pub timestamp: u32,
    pub channel_mask: u16,
    pub samples_per_channel: u16,
    /// One sample vector per set bit of `channel_mask`, lowest bit first.
    pub samples: Vec<Vec<i16>>,
}

/// A frame sent by the device: a reply to a request or an unsolicited event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong {
        device_id: u64,
    },
    Status {
        mode: u8,
        stream: u8,
        error_flag: u8,
        error_code: u8,
    },
    DeviceInfo {
        protocol_version: u8,
        firmware_version: u16,
        channels: Vec<ChannelInfo>,
    },
    Ack,
    Nack {
        category: u8,
        code: u8,
    },
    DataPacket(DataPacket),
    EventTriggered {
        timestamp: u32,
        channel: u16,
        pre_samples: u32,
        post_samples: u32,
    },
    BufferTransferComplete,
    LogMessage {
        text: String,
    },
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        let [category, code] = err.nack_payload();
        Self::Nack { category, code }
    }
}

impl Response {
    pub fn command(&self) -> u8 {
        match self {
            Self::Pong { .. } => command::PONG,
            Self::Status { .. } => command::STATUS_RESPONSE,
            Self::DeviceInfo { .. } => command::DEVICE_INFO_RESPONSE,
            Self::Ack => command::ACK,
            Self::Nack { .. } => command::NACK,
            Self::DataPacket(_) => command::DATA_PACKET,
            Self::EventTriggered { .. } => command::EVENT_TRIGGERED,
            Self::BufferTransferComplete => command::BUFFER_TRANSFER_COMPLETE,
            Self::LogMessage { .. } => command::LOG_MESSAGE,
        }
    }

    /// Append the wire payload to `out`.
    pub fn write_payload(&self, out: &mut Vec<u8>) {
        match self {
            Self::Pong { device_id } => out.put_u64_le(*device_id),
            Self::Status {
                mode,
                stream,
                error_flag,
                error_code,
            } => out.put_slice(&[*mode, *stream, *error_flag, *error_code]),
            Self::DeviceInfo {
                protocol_version,
                firmware_version,
                channels,
            } => {
                out.put_u8(*protocol_version);
                out.put_u16_le(*firmware_version);
                out.put_u8(channels.len() as u8);
                for ch in channels {
                    out.put_u8(ch.channel_id);
                    out.put_u32_le(ch.max_sample_rate);
                    out.put_u16_le(ch.formats);
                    out.put_u8(ch.name.len() as u8);
                    out.put_slice(ch.name.as_bytes());
                }
            }
            Self::Ack | Self::BufferTransferComplete => {}
            Self::Nack { category, code } => out.put_slice(&[*category, *code]),
            Self::DataPacket(packet) => {
                out.put_u32_le(packet.timestamp);
                out.put_u16_le(packet.channel_mask);
                out.put_u16_le(packet.samples_per_channel);
                for sample in packet.samples.iter().flatten() {
                    out.put_i16_le(*sample);
                }
            }
            Self::EventTriggered {
                timestamp,
                channel,
                pre_samples,
                post_samples,
            } => {
                out.put_u32_le(*timestamp);
                out.put_u16_le(*channel);
                out.put_u32_le(*pre_samples);
                out.put_u32_le(*post_samples);
            }
            Self::LogMessage { text } => out.put_slice(text.as_bytes()),
        }
    }

    /// Decode a device frame on the host side. `None` for request ids and
    /// malformed payloads.
    pub fn decode(command_id: u8, mut payload: &[u8]) -> Option<Self> {
        let response = match command_id {
            command::PONG => Self::Pong {
                device_id: payload.try_get_u64_le().ok()?,
            },
            command::STATUS_RESPONSE => match payload {
                [mode, stream, error_flag, error_code, ..] => Self::Status {
                    mode: *mode,
                    stream: *stream,
                    error_flag: *error_flag,
                    error_code: *error_code,
                },
                _ => return None,
            },
            command::DEVICE_INFO_RESPONSE => decode_device_info(payload)?,
            command::ACK => Self::Ack,
            command::NACK => match payload {
                [category, code, ..] => Self::Nack {
                    category: *category,
                    code: *code,
                },
                _ => return None,
            },
            command::DATA_PACKET => Self::DataPacket(decode_data_packet(payload)?),
            command::EVENT_TRIGGERED => Self::EventTriggered {
                timestamp: payload.try_get_u32_le().ok()?,
                channel: payload.try_get_u16_le().ok()?,
                pre_samples: payload.try_get_u32_le().ok()?,
                post_samples: payload.try_get_u32_le().ok()?,
            },
            command::BUFFER_TRANSFER_COMPLETE => Self::BufferTransferComplete,
            command::LOG_MESSAGE => Self::LogMessage {
                text: String::from_utf8_lossy(payload).into_owned(),
            },
            _ => return None,
        };
        Some(response)
    }
}

fn decode_device_info(mut payload: &[u8]) -> Option<Response> {
    let protocol_version = payload.try_get_u8().ok()?;
    let firmware_version = payload.try_get_u16_le().ok()?;
    let count = payload.try_get_u8().ok()?;
    let mut channels = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let channel_id = payload.try_get_u8().ok()?;
        let max_sample_rate = payload.try_get_u32_le().ok()?;
        let formats = payload.try_get_u16_le().ok()?;
        let name_len = usize::from(payload.try_get_u8().ok()?);
        if payload.remaining() < name_len {
            return None;
        }
        let name = String::from_utf8_lossy(&payload[..name_len]).into_owned();
        payload.advance(name_len);
        channels.push(ChannelInfo {
            channel_id,
            max_sample_rate,
            formats,
            name,
        });
    }
    Some(Response::DeviceInfo {
        protocol_version,
        firmware_version,
        channels,
    })
}

fn decode_data_packet(mut payload: &[u8]) -> Option<DataPacket> {
    let timestamp = payload.try_get_u32_le().ok()?;
    let channel_mask = payload.try_get_u16_le().ok()?;
    let samples_per_channel = payload.try_get_u16_le().ok()?;
    let channels = channel_mask.count_ones() as usize;
    if payload.remaining() != channels * usize::from(samples_per_channel) * 2 {
        return None;
    }
    let samples = (0..channels)
        .map(|_| {
            (0..samples_per_channel)
                .map(|_| payload.get_i16_le())
                .collect()
        })
        .collect();
    Some(DataPacket {
        timestamp,
        channel_mask,
        samples_per_channel,
        samples,
    })
}
