//! HID transport abstraction.
//!
//! Defines the raw `HidTransport` capability (one report in, one page out)
//! and the `HidConnector` used to (re)open the device, allowing the nusb
//! backend and the simulated device to be swapped freely.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("{op} transferred {actual} bytes, expected {expected}")]
    LengthMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl TransportError {
    /// Errors raised while locating or opening the device.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            TransportError::DeviceNotFound { .. }
                | TransportError::OpenFailed(_)
                | TransportError::ClaimInterfaceFailed { .. }
                | TransportError::EndpointNotFound { .. }
        )
    }
}

/// USB string descriptors captured when the device is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStrings {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// Raw HID report capability.
pub trait HidTransport: Send + Sync {
    /// Write one output report (report ID first). Returns the number of
    /// bytes the host accepted, report ID included.
    fn write(&self, report: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `len` bytes of one input report.
    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError>;

    /// String descriptors of the opened device.
    fn strings(&self) -> DeviceStrings;

    fn vendor_id(&self) -> u16;

    fn product_id(&self) -> u16;
}

/// Opens a fresh handle to the device; used again after every reset.
pub trait HidConnector {
    type Device: HidTransport;

    fn open(&self) -> Result<Self::Device, TransportError>;
}
