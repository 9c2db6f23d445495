//! Device data flash record.
//!
//! The data flash is a 2048-byte configuration block holding the hardware
//! and firmware versions, product ID and boot selection flag. The first four
//! bytes are the additive checksum of the remaining 2044.
//!
//! Field offsets differ between observed layouts and are taken from a
//! [`DataFlashLayout`] table chosen when the record is constructed.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Error, FormatError};
use crate::protocol::checksum::checksum;
use crate::protocol::constants::{DATAFLASH_LEGACY_SIZE, DATAFLASH_SIZE};

/// Field offsets for one data flash layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFlashLayout {
    pub hw_version: usize,
    pub bootflag: usize,
    pub product_id: usize,
    pub fw_version: usize,
    pub ldrom_version: usize,
    pub sentinel: usize,
}

/// Offsets measured from the start of the full buffer (checksum included).
pub const LAYOUT_A: DataFlashLayout = DataFlashLayout {
    hw_version: 8,
    bootflag: 13,
    product_id: 316,
    fw_version: 260,
    ldrom_version: 264,
    sentinel: 268,
};

/// Offsets as listed by later tooling.
pub const LAYOUT_B: DataFlashLayout = DataFlashLayout {
    hw_version: 4,
    bootflag: 9,
    product_id: 312,
    fw_version: 256,
    ldrom_version: 260,
    sentinel: 268,
};

/// Selects a [`DataFlashLayout`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutVersion {
    #[default]
    A,
    B,
}

impl LayoutVersion {
    pub fn table(self) -> &'static DataFlashLayout {
        match self {
            LayoutVersion::A => &LAYOUT_A,
            LayoutVersion::B => &LAYOUT_B,
        }
    }
}

impl fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutVersion::A => write!(f, "a"),
            LayoutVersion::B => write!(f, "b"),
        }
    }
}

/// Image booted on the next restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootTarget {
    Aprom = 0,
    Ldrom = 1,
}

/// A 2048-byte data flash record with a self-maintained checksum.
#[derive(Clone, PartialEq, Eq)]
pub struct DataFlash {
    data: Vec<u8>,
    layout: LayoutVersion,
}

impl DataFlash {
    /// All-zero record (checksum 0).
    pub fn blank(layout: LayoutVersion) -> Self {
        Self {
            data: vec![0u8; DATAFLASH_SIZE],
            layout,
        }
    }

    /// Wrap a 2048-byte buffer read from the device or a canonical dump.
    pub fn from_bytes(bytes: &[u8], layout: LayoutVersion) -> Result<Self, FormatError> {
        if bytes.len() != DATAFLASH_SIZE {
            return Err(FormatError::InvalidDataFlashSize(bytes.len()));
        }
        Ok(Self {
            data: bytes.to_vec(),
            layout,
        })
    }

    /// Parse a data flash file and return the record with the checksum it
    /// must be verified against.
    ///
    /// 2048-byte files carry the checksum at offset 0. Legacy 2052-byte files
    /// prefix the record with a separate checksum word.
    pub fn parse_file(bytes: &[u8], layout: LayoutVersion) -> Result<(Self, u32), FormatError> {
        match bytes.len() {
            DATAFLASH_SIZE => {
                let df = Self::from_bytes(bytes, layout)?;
                let expected = df.checksum();
                Ok((df, expected))
            }
            DATAFLASH_LEGACY_SIZE => {
                let expected = LittleEndian::read_u32(&bytes[..4]);
                let df = Self::from_bytes(&bytes[4..], layout)?;
                Ok((df, expected))
            }
            n => Err(FormatError::InvalidDataFlashSize(n)),
        }
    }

    fn offsets(&self) -> &'static DataFlashLayout {
        self.layout.table()
    }

    fn read_u32(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(&self.data[offset..offset + 4])
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.data[offset..offset + 4], value);
    }

    pub fn layout(&self) -> LayoutVersion {
        self.layout
    }

    /// Stored checksum word.
    pub fn checksum(&self) -> u32 {
        self.read_u32(0)
    }

    /// Overwrite the stored checksum without touching any other field.
    pub fn set_checksum(&mut self, value: u32) {
        self.write_u32(0, value);
    }

    /// Checksum of the record body (`bytes[4..]`).
    pub fn computed_checksum(&self) -> u32 {
        checksum(&self.data[4..])
    }

    /// Store the checksum of the record body at offset 0.
    pub fn update_checksum(&mut self) {
        let sum = self.computed_checksum();
        self.set_checksum(sum);
    }

    /// Check the record against `expected`.
    ///
    /// The body must sum to `expected`, and `expected` ORed with the sentinel
    /// word must be nonzero so that blank flash is rejected.
    pub fn verify(&self, expected: u32) -> Result<(), Error> {
        let actual = self.computed_checksum();
        let sentinel = self.read_u32(self.offsets().sentinel);
        if actual != expected || (expected | sentinel) == 0 {
            return Err(Error::Verification { expected, actual });
        }
        Ok(())
    }

    pub fn hw_version(&self) -> u32 {
        self.read_u32(self.offsets().hw_version)
    }

    /// Set the hardware version. Recomputes the checksum.
    pub fn set_hw_version(&mut self, value: u32) {
        self.write_u32(self.offsets().hw_version, value);
        self.update_checksum();
    }

    pub fn bootflag(&self) -> u8 {
        self.data[self.offsets().bootflag]
    }

    pub fn boot_target(&self) -> BootTarget {
        if self.bootflag() == 0 {
            BootTarget::Aprom
        } else {
            BootTarget::Ldrom
        }
    }

    /// Select the image booted on next restart. Recomputes the checksum.
    pub fn set_bootflag(&mut self, target: BootTarget) {
        let offset = self.offsets().bootflag;
        self.data[offset] = target as u8;
        self.update_checksum();
    }

    pub fn product_id(&self) -> [u8; 4] {
        let off = self.offsets().product_id;
        let mut id = [0u8; 4];
        id.copy_from_slice(&self.data[off..off + 4]);
        id
    }

    /// Product ID as text, lossy for non-ASCII bytes.
    pub fn product_id_str(&self) -> String {
        String::from_utf8_lossy(&self.product_id()).into_owned()
    }

    /// Set the product ID. Recomputes the checksum.
    pub fn set_product_id(&mut self, id: [u8; 4]) {
        let off = self.offsets().product_id;
        self.data[off..off + 4].copy_from_slice(&id);
        self.update_checksum();
    }

    pub fn fw_version(&self) -> u32 {
        self.read_u32(self.offsets().fw_version)
    }

    /// Set the firmware version. Recomputes the checksum.
    pub fn set_fw_version(&mut self, value: u32) {
        self.write_u32(self.offsets().fw_version, value);
        self.update_checksum();
    }

    pub fn ldrom_version(&self) -> u32 {
        self.read_u32(self.offsets().ldrom_version)
    }

    /// Set the LDROM version word. Recomputes the checksum.
    pub fn set_ldrom_version(&mut self, value: u32) {
        self.write_u32(self.offsets().ldrom_version, value);
        self.update_checksum();
    }

    /// Whether the record was produced by the LDROM bootloader.
    ///
    /// The bootloader reports a zero firmware version, and later bootloaders
    /// also fill in the LDROM version word.
    pub fn is_bootloader(&self) -> bool {
        self.ldrom_version() != 0 || self.fw_version() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for DataFlash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFlash")
            .field("layout", &self.layout)
            .field("checksum", &format_args!("0x{:08X}", self.checksum()))
            .field("product_id", &self.product_id_str())
            .field("hw_version", &self.hw_version())
            .field("fw_version", &self.fw_version())
            .field("ldrom_version", &self.ldrom_version())
            .field("bootflag", &self.bootflag())
            .finish()
    }
}

/// Format a version word the way the vendor displays it (`300` -> `3.00`).
pub fn format_version(value: u32) -> String {
    format!("{}.{:02}", value / 100, value % 100)
}
