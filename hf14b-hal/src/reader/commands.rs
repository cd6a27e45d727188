//! SRI512 command set: opcode constants and framed command builders.

use heapless::Vec;

use crate::crc;

pub const INITIATE: u8 = 0x06;
pub const SELECT: u8 = 0x0E;
pub const GET_UID: u8 = 0x0B;
pub const READ_BLOCK: u8 = 0x08;

/// User memory spans sixteen blocks; the system area sits at 0xFF.
pub const USER_BLOCKS: u8 = 16;
pub const SYSTEM_BLOCK_ADDRESS: u8 = 0xFF;

/// Expected response lengths, CRC included.
pub const INITIATE_RESPONSE_LEN: usize = 3;
pub const SELECT_RESPONSE_LEN: usize = 3;
pub const UID_RESPONSE_LEN: usize = 10;
pub const BLOCK_RESPONSE_LEN: usize = 6;

/// A framed command: opcode, arguments, CRC-B.
pub type CommandFrame = Vec<u8, 8>;

fn framed(body: &[u8]) -> CommandFrame {
    let mut frame = CommandFrame::new();
    // Bodies are at most two bytes; the frame always fits.
    let _ = frame.extend_from_slice(body);
    let _ = frame.extend_from_slice(&crc::compute(body));
    frame
}

/// INITIATE: wake the one tag in the field and ask for its chip id.
pub fn initiate() -> CommandFrame {
    framed(&[INITIATE, 0x00])
}

/// SELECT the tag by the chip id INITIATE returned.
pub fn select(chip_id: u8) -> CommandFrame {
    framed(&[SELECT, chip_id])
}

/// GET_UID: read the 64-bit unique identifier.
pub fn get_uid() -> CommandFrame {
    framed(&[GET_UID])
}

/// READ_BLOCK: read one 32-bit block.
pub fn read_block(address: u8) -> CommandFrame {
    framed(&[READ_BLOCK, address])
}
