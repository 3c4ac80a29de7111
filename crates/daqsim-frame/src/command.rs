//! Command ids carried in the frame's command byte.
//!
//! Host requests live below 0x80; their responses set the high bit. Streaming
//! frames sent by the device unprompted live in 0x40..=0x4F.

pub const PING: u8 = 0x01;
pub const PONG: u8 = 0x81;
pub const GET_STATUS: u8 = 0x02;
pub const STATUS_RESPONSE: u8 = 0x82;
pub const GET_DEVICE_INFO: u8 = 0x03;
pub const DEVICE_INFO_RESPONSE: u8 = 0x83;

pub const SET_MODE_CONTINUOUS: u8 = 0x10;
pub const SET_MODE_TRIGGER: u8 = 0x11;
pub const START_STREAM: u8 = 0x12;
pub const STOP_STREAM: u8 = 0x13;
pub const CONFIGURE_STREAM: u8 = 0x14;

pub const ACK: u8 = 0x90;
pub const NACK: u8 = 0x91;

pub const DATA_PACKET: u8 = 0x40;
pub const EVENT_TRIGGERED: u8 = 0x41;
pub const REQUEST_BUFFERED_DATA: u8 = 0x42;
pub const BUFFER_TRANSFER_COMPLETE: u8 = 0x4F;

/// Free-form diagnostic text from the device.
pub const LOG_MESSAGE: u8 = 0xE0;

/// Returns a human-readable name for a command id.
pub fn command_name(id: u8) -> &'static str {
    match id {
        PING => "PING",
        PONG => "PONG",
        GET_STATUS => "GET_STATUS",
        STATUS_RESPONSE => "STATUS_RESPONSE",
        GET_DEVICE_INFO => "GET_DEVICE_INFO",
        DEVICE_INFO_RESPONSE => "DEVICE_INFO_RESPONSE",
        SET_MODE_CONTINUOUS => "SET_MODE_CONTINUOUS",
        SET_MODE_TRIGGER => "SET_MODE_TRIGGER",
        START_STREAM => "START_STREAM",
        STOP_STREAM => "STOP_STREAM",
        CONFIGURE_STREAM => "CONFIGURE_STREAM",
        ACK => "ACK",
        NACK => "NACK",
        DATA_PACKET => "DATA_PACKET",
        EVENT_TRIGGERED => "EVENT_TRIGGERED",
        REQUEST_BUFFERED_DATA => "REQUEST_BUFFERED_DATA",
        BUFFER_TRANSFER_COMPLETE => "BUFFER_TRANSFER_COMPLETE",
        LOG_MESSAGE => "LOG_MESSAGE",
        _ => "UNKNOWN",
    }
}

/// Returns true for frames the device sends without a matching request.
pub fn is_unsolicited(id: u8) -> bool {
    matches!(
        id,
        DATA_PACKET | EVENT_TRIGGERED | BUFFER_TRANSFER_COMPLETE | LOG_MESSAGE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(command_name(PING), "PING");
        assert_eq!(command_name(BUFFER_TRANSFER_COMPLETE), "BUFFER_TRANSFER_COMPLETE");
        assert_eq!(command_name(0x7F), "UNKNOWN");
    }

    #[test]
    fn unsolicited() {
        assert!(is_unsolicited(DATA_PACKET));
        assert!(!is_unsolicited(PONG));
    }
}
