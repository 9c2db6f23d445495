//! Protocol constants for the Nuvoton HID bootloader used by eVic devices.

// ============================================================================
// Device Identification
// ============================================================================

/// Nuvoton Technology vendor ID
pub const NUVOTON_VENDOR_ID: u16 = 0x0416;

/// eVic HID programming interface product ID
pub const EVIC_PRODUCT_ID: u16 = 0x5020;

/// HID interface number claimed for programming
pub const HID_INTERFACE: u8 = 0;

/// Interrupt OUT endpoint (host -> device)
pub const EP_OUT: u8 = 0x02;

/// Interrupt IN endpoint (device -> host)
pub const EP_IN: u8 = 0x81;

// ============================================================================
// HID Framing
// ============================================================================

/// Size of a single HID report page.
pub const REPORT_SIZE: usize = 64;

/// Report ID prefixed to every outbound report.
pub const REPORT_ID: u8 = 0;

/// Command signature, ASCII "HIDC".
pub const CMD_SIGNATURE: [u8; 4] = *b"HIDC";

/// Value of the command length field. The trailing checksum is not counted.
pub const CMD_LENGTH: u8 = 14;

/// Full command frame size on the wire.
pub const CMD_FRAME_SIZE: usize = 18;

// ============================================================================
// Opcodes
// ============================================================================

/// Read a flash region (data flash window).
pub const OP_READ_DATAFLASH: u8 = 0x35;

/// Write the data flash.
pub const OP_WRITE_DATAFLASH: u8 = 0x53;

/// Restart the MCU.
pub const OP_RESET_SYSTEM: u8 = 0xB4;

/// Write a flash region (APROM or logo).
pub const OP_WRITE_FLASH: u8 = 0xC3;

/// Restore the data flash to factory defaults.
pub const OP_RESET_DATAFLASH: u8 = 0x7C;

// ============================================================================
// Sizes and Offsets
// ============================================================================

/// Data flash record size.
pub const DATAFLASH_SIZE: usize = 2048;

/// Legacy data flash dump size (4-byte checksum + record).
pub const DATAFLASH_LEGACY_SIZE: usize = DATAFLASH_SIZE + 4;

/// Logo resource size.
pub const LOGO_SIZE: usize = 1024;

/// Start of the logo region in APROM flash.
pub const LOGO_FLASH_OFFSET: u32 = 102_400;

/// Firmware cipher modulus.
pub const CIPHER_KEY: usize = 408_376;

// ============================================================================
// Firmware Markers
// ============================================================================

/// Manufacturer marker present in every genuine APROM image.
pub const APROM_MARKER: &[u8] = b"Joyetech APROM";

// ============================================================================
// Timing
// ============================================================================

/// Default wait for the device to re-enumerate after a reset.
pub const RESET_SETTLE_MS: u64 = 2000;
