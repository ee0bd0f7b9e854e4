//! CRC-16/MODBUS (reflected polynomial 0xA001, initial value 0xFFFF)
//!
//! The checksum is transmitted little-endian: low byte first.

use crc::{Crc, CRC_16_MODBUS};

use crate::frame::Frame;

/// CRC calculator for RTU
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the Modbus CRC over a byte sequence
#[inline]
pub fn compute(bytes: &[u8]) -> u16 {
    CRC_MODBUS.checksum(bytes)
}

/// Compute the CRC over `address ‖ function_code ‖ payload` without
/// assembling a contiguous buffer
pub fn compute_parts(address: u8, function_code: u8, payload: &[u8]) -> u16 {
    let mut digest = CRC_MODBUS.digest();
    digest.update(&[address, function_code]);
    digest.update(payload);
    digest.finalize()
}

/// Recompute the checksum of a frame and compare it with the stored one
#[inline]
pub fn verify(frame: &Frame) -> bool {
    compute_parts(frame.address, frame.function_code, &frame.payload) == frame.crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Bitwise reference: XOR into the low byte, 8 shift/XOR-0xA001 rounds
    fn reference_crc(bytes: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for &byte in bytes {
            crc ^= byte as u16;
            for _ in 0..8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xA001;
                } else {
                    crc >>= 1;
                }
            }
        }
        crc
    }

    #[test]
    fn test_known_vector() {
        // 01 03 00 00 00 0A -> C5 CD on the wire
        let crc = compute(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(crc, 0xCDC5);
        assert_eq!(crc.to_le_bytes(), [0xC5, 0xCD]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(compute(&[]), 0xFFFF);
    }

    #[test]
    fn test_compute_parts_matches_contiguous() {
        let bytes = [0x11, 0x06, 0x00, 0x01, 0x00, 0x03];
        assert_eq!(compute_parts(0x11, 0x06, &bytes[2..]), compute(&bytes));
    }

    #[test]
    fn test_single_bit_flip_detected_exhaustive() {
        let frame = Frame::new(0x02, 0x03, &[0x00, 0x00, 0x00, 0x01]).unwrap();
        assert!(verify(&frame));

        let wire = frame.to_bytes();
        for bit in 0..wire.len() * 8 {
            let mut corrupted = wire.clone();
            corrupted[bit / 8] ^= 1 << (bit % 8);
            let parsed = Frame::from_wire(&corrupted).unwrap();
            assert!(!verify(&parsed), "bit flip {} went undetected", bit);
        }
    }

    proptest! {
        #[test]
        fn prop_matches_reference(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(compute(&bytes), reference_crc(&bytes));
        }

        #[test]
        fn prop_built_frames_verify(
            address in any::<u8>(),
            function_code in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=252),
        ) {
            let frame = Frame::new(address, function_code, &payload).unwrap();
            prop_assert!(verify(&frame));
        }

        #[test]
        fn prop_single_bit_flip_fails(
            payload in proptest::collection::vec(any::<u8>(), 0..16),
            bit in 0usize..1024,
        ) {
            let frame = Frame::new(0x05, 0x10, &payload).unwrap();
            let mut wire = frame.to_bytes();
            let bit = bit % (wire.len() * 8);
            wire[bit / 8] ^= 1 << (bit % 8);
            let parsed = Frame::from_wire(&wire).unwrap();
            prop_assert!(!verify(&parsed));
        }
    }
}
