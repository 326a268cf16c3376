//! Command headers for the USBLCD SCSI protocol.
//!
//! Every command is a 20-byte header: `cmd:u32le ‖ 8 zero bytes ‖ size:u32le ‖ crc32:u32le`.
//! The first 16 bytes form the CDB. The low command byte is the `0xF5` marker, followed by
//! sub-command, mode and chunk index.

use crate::consts::{CHUNK_SIZE, IO_SIZE};

/// Poll for status and resolution code
pub const CMD_POLL: u32 = 0x0000_00F5;
/// One-time initialisation write
pub const CMD_INIT: u32 = 0x0000_01F5;
/// Raw frame chunk; chunk index goes in the top byte
pub const CMD_FRAME: u32 = 0x0001_01F5;
/// Blank the panel
pub const CMD_CLEAR: u32 = 0x0004_01F5;

/// Build the full 20-byte header
pub fn header(cmd: u32, size: u32) -> [u8; 20] {
    let mut buf = [0u8; 20];
    buf[0..4].copy_from_slice(&cmd.to_le_bytes());
    buf[12..16].copy_from_slice(&size.to_le_bytes());
    let crc = crc32fast::hash(&buf[..16]);
    buf[16..20].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// The 16-byte CDB actually handed to the kernel
pub fn cdb(cmd: u32, size: u32) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&header(cmd, size)[..16]);
    out
}

pub fn poll() -> [u8; 16] {
    cdb(CMD_POLL, IO_SIZE as u32)
}

pub fn init() -> [u8; 16] {
    cdb(CMD_INIT, IO_SIZE as u32)
}

pub fn clear() -> [u8; 16] {
    cdb(CMD_CLEAR, IO_SIZE as u32)
}

/// Frame chunk command for the given chunk index
pub const fn frame_cmd(index: u8) -> u32 {
    CMD_FRAME | ((index as u32) << 24)
}

/// One slice of a frame and the command that carries it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u8,
    pub cmd: u32,
    pub offset: usize,
    pub len: usize,
}

/// Split `total` bytes into 64 KiB chunks plus a final remainder
pub fn chunks(total: usize) -> Vec<Chunk> {
    (0..total)
        .step_by(CHUNK_SIZE)
        .enumerate()
        .map(|(i, offset)| Chunk {
            index: i as u8,
            cmd: frame_cmd(i as u8),
            offset,
            len: CHUNK_SIZE.min(total - offset),
        })
        .collect()
}
