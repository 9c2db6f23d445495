//! HID command frames.
//!
//! Every request to the bootloader is a fixed 18-byte frame:
//!
//! ```text
//! opcode(1) | length=14(1) | arg1(4,LE) | arg2(4,LE) | "HIDC"(4) | checksum(4,LE)
//! ```

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use super::checksum::checksum;
use super::constants::*;

/// Known command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Read a data flash window.
    ReadDataFlash,
    /// Write the data flash.
    WriteDataFlash,
    /// Restart the device.
    ResetSystem,
    /// Write a flash region (APROM or logo).
    WriteFlash,
    /// Restore factory data flash.
    ResetDataFlash,
}

impl Opcode {
    pub const fn code(self) -> u8 {
        match self {
            Opcode::ReadDataFlash => OP_READ_DATAFLASH,
            Opcode::WriteDataFlash => OP_WRITE_DATAFLASH,
            Opcode::ResetSystem => OP_RESET_SYSTEM,
            Opcode::WriteFlash => OP_WRITE_FLASH,
            Opcode::ResetDataFlash => OP_RESET_DATAFLASH,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            OP_READ_DATAFLASH => Some(Opcode::ReadDataFlash),
            OP_WRITE_DATAFLASH => Some(Opcode::WriteDataFlash),
            OP_RESET_SYSTEM => Some(Opcode::ResetSystem),
            OP_WRITE_FLASH => Some(Opcode::WriteFlash),
            OP_RESET_DATAFLASH => Some(Opcode::ResetDataFlash),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::ReadDataFlash => write!(f, "READ_DATAFLASH"),
            Opcode::WriteDataFlash => write!(f, "WRITE_DATAFLASH"),
            Opcode::ResetSystem => write!(f, "RESET_SYSTEM"),
            Opcode::WriteFlash => write!(f, "WRITE_FLASH"),
            Opcode::ResetDataFlash => write!(f, "RESET_DATAFLASH"),
        }
    }
}

/// An immutable, fully framed HID command.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HidCommand {
    frame: [u8; CMD_FRAME_SIZE],
}

impl HidCommand {
    /// Build a frame from a raw opcode and its two arguments.
    pub fn build(opcode: u8, arg1: u32, arg2: u32) -> Self {
        let mut frame = [0u8; CMD_FRAME_SIZE];
        frame[0] = opcode;
        frame[1] = CMD_LENGTH;
        LittleEndian::write_u32(&mut frame[2..6], arg1);
        LittleEndian::write_u32(&mut frame[6..10], arg2);
        frame[10..14].copy_from_slice(&CMD_SIGNATURE);
        let sum = checksum(&frame[..14]);
        LittleEndian::write_u32(&mut frame[14..18], sum);
        Self { frame }
    }

    /// Read `len` bytes of data flash starting at `start`.
    pub fn read_dataflash(start: u32, len: u32) -> Self {
        Self::build(OP_READ_DATAFLASH, start, len)
    }

    /// Write `len` bytes of data flash starting at `start`.
    pub fn write_dataflash(start: u32, len: u32) -> Self {
        Self::build(OP_WRITE_DATAFLASH, start, len)
    }

    pub fn reset_system() -> Self {
        Self::build(OP_RESET_SYSTEM, 0, 0)
    }

    /// Write `len` bytes of flash starting at `start`.
    pub fn write_flash(start: u32, len: u32) -> Self {
        Self::build(OP_WRITE_FLASH, start, len)
    }

    pub fn reset_dataflash() -> Self {
        Self::build(OP_RESET_DATAFLASH, 0, 0)
    }

    /// Parse a frame received by a device-side peer.
    ///
    /// Returns `None` if the signature, length field or checksum is wrong.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CMD_FRAME_SIZE {
            return None;
        }
        let mut frame = [0u8; CMD_FRAME_SIZE];
        frame.copy_from_slice(&bytes[..CMD_FRAME_SIZE]);
        let cmd = Self { frame };
        (frame[1] == CMD_LENGTH
            && frame[10..14] == CMD_SIGNATURE
            && cmd.checksum() == checksum(&frame[..14]))
        .then_some(cmd)
    }

    pub fn opcode(&self) -> u8 {
        self.frame[0]
    }

    pub fn arg1(&self) -> u32 {
        LittleEndian::read_u32(&self.frame[2..6])
    }

    pub fn arg2(&self) -> u32 {
        LittleEndian::read_u32(&self.frame[6..10])
    }

    pub fn checksum(&self) -> u32 {
        LittleEndian::read_u32(&self.frame[14..18])
    }

    pub fn as_bytes(&self) -> &[u8; CMD_FRAME_SIZE] {
        &self.frame
    }
}

impl fmt::Debug for HidCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = Opcode::from_code(self.opcode())
            .map(|o| o.to_string())
            .unwrap_or_else(|| format!("0x{:02X}", self.opcode()));
        write!(
            f,
            "HidCommand({} arg1=0x{:X} arg2=0x{:X})",
            op,
            self.arg1(),
            self.arg2()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_DF: &[u8; 18] = b"5\x0e\x00\x00\x00\x00\x00\x08\x00\x00HIDCc\x01\x00\x00";
    const WRITE_DF: &[u8; 18] = b"S\x0e\x00\x00\x00\x00\x00\x08\x00\x00HIDC\x81\x01\x00\x00";
    const RESET: &[u8; 18] = b"\xb4\x0e\x00\x00\x00\x00\x00\x00\x00\x00HIDC\xda\x01\x00\x00";
    const WRITE_APROM: &[u8; 18] = b"\xc3\x0e\x00\x00\x00\x00\x00\x00\x00\x00HIDC\xe9\x01\x00\x00";

    #[test]
    fn test_reference_frames() {
        assert_eq!(HidCommand::build(0xC3, 0, 0).as_bytes(), WRITE_APROM);
        assert_eq!(HidCommand::build(0xB4, 0, 0).as_bytes(), RESET);
        assert_eq!(HidCommand::build(0x35, 0, 2048).as_bytes(), READ_DF);
        assert_eq!(HidCommand::build(0x53, 0, 2048).as_bytes(), WRITE_DF);
    }

    #[test]
    fn test_named_constructors() {
        assert_eq!(HidCommand::read_dataflash(0, 2048).as_bytes(), READ_DF);
        assert_eq!(HidCommand::write_dataflash(0, 2048).as_bytes(), WRITE_DF);
        assert_eq!(HidCommand::reset_system().as_bytes(), RESET);
        assert_eq!(HidCommand::write_flash(0, 0).as_bytes(), WRITE_APROM);
        assert_eq!(HidCommand::reset_dataflash().opcode(), OP_RESET_DATAFLASH);
    }

    #[test]
    fn test_parse_fields() {
        let cmd = HidCommand::write_flash(LOGO_FLASH_OFFSET, 1024);
        let parsed = HidCommand::parse(cmd.as_bytes()).unwrap();
        assert_eq!(parsed.opcode(), OP_WRITE_FLASH);
        assert_eq!(parsed.arg1(), LOGO_FLASH_OFFSET);
        assert_eq!(parsed.arg2(), 1024);
    }

    #[test]
    fn test_parse_rejects_corruption() {
        let mut bytes = *HidCommand::reset_system().as_bytes();
        bytes[3] = 0x01;
        assert!(HidCommand::parse(&bytes).is_none());
        assert!(HidCommand::parse(&bytes[..10]).is_none());
    }

    #[test]
    fn test_opcode_roundtrip() {
        for op in [
            Opcode::ReadDataFlash,
            Opcode::WriteDataFlash,
            Opcode::ResetSystem,
            Opcode::WriteFlash,
            Opcode::ResetDataFlash,
        ] {
            assert_eq!(Opcode::from_code(op.code()), Some(op));
        }
        assert_eq!(Opcode::from_code(0x00), None);
    }
}
