//! CRC16/MODBUS (reflected polynomial 0xA001, init 0xFFFF).

use crc::{Crc, CRC_16_MODBUS};

/// Initial value used for frame checksums.
pub const CRC_INIT: u16 = 0xFFFF;

const POLY_REFLECTED: u16 = 0xA001;

static MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Bit-serial CRC16, LSB first, starting from `init`.
///
/// Allows continuing a checksum across several slices by passing the previous
/// result as `init`.
pub fn crc16(data: &[u8], init: u16) -> u16 {
    let mut crc = init;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Checksum carried on the wire: CRC16/MODBUS over `data`.
pub fn frame_checksum(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modbus_check_value() {
        assert_eq!(crc16(b"123456789", CRC_INIT), 0x4B37);
        assert_eq!(frame_checksum(b"123456789"), 0x4B37);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(crc16(&[], CRC_INIT), CRC_INIT);
        assert_eq!(crc16(&[], 0x1234), 0x1234);
    }

    #[test]
    fn chained_matches_single_pass() {
        let data = b"\x14\x07\x02\x00\x10\x27\x00\x00\x01";
        let split = crc16(&data[4..], crc16(&data[..4], CRC_INIT));
        assert_eq!(split, crc16(data, CRC_INIT));
    }

    proptest::proptest! {
        #[test]
        fn table_and_bitwise_agree(data in proptest::collection::vec(proptest::num::u8::ANY, 0..512)) {
            proptest::prop_assert_eq!(crc16(&data, CRC_INIT), frame_checksum(&data));
        }
    }
}
