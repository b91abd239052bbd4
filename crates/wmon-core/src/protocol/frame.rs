//! Outbound frame builders.

use byteorder::{BigEndian, ByteOrder};

use super::constants::CMD_OTA;
use super::opcode::Opcode;

/// Frame for a payload-less command.
pub fn single_byte(op: Opcode) -> [u8; 1] {
    [op.as_u8()]
}

/// OTA frame: opcode + u32 length + raw image.
pub fn ota_frame(image: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 5];
    frame[0] = CMD_OTA;
    BigEndian::write_u32(&mut frame[1..5], image.len() as u32);
    frame.extend_from_slice(image);
    frame
}
