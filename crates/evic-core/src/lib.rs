//! evic-core: firmware codec and USB HID upload protocol for Joyetech eVic
//! devices.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, checksum, 18-byte command frames
//! - **Payload**: Firmware cipher and verification, data flash record, logo bitmaps
//! - **Transport**: HID abstraction, chunked report transfers (nusb, mock)
//! - **Catalog**: Known products and cross-flash rules
//! - **State**: Upload state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use evic_core::session::{SessionConfig, UploadSession};
//!
//! let config = SessionConfig {
//!     firmware_path: Some("Evic_VTC_Mini_V3.03.bin".to_string()),
//!     ..Default::default()
//! };
//!
//! let mut session = UploadSession::new(config);
//! session.run().expect("upload failed");
//! ```

pub mod catalog;
pub mod error;
pub mod events;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use catalog::{DEVICE_CATALOG, DeviceCatalogEntry};
pub use error::{Error, FormatError, Result};
pub use events::{EvicEvent, EvicObserver, LogLevel, NullObserver, TracingObserver};
pub use payload::{
    BootTarget, DataFlash, Encoding, FirmwareImage, LayoutVersion, Logo, LogoFormat, convert,
    format_version,
};
pub use protocol::{HidCommand, Opcode};
pub use session::{
    DeviceInfo, SessionConfig, UploadSession, load_dataflash, load_firmware, load_logo,
};
pub use state::{UploadState, UploadStateMachine};
pub use transport::{
    ChunkedTransport, DeviceStrings, HidConnector, HidTransport, MockConnector, NusbConnector,
    TransportError,
};
