//! Payload handling module.
//!
//! Firmware images, the data flash record and logo resources.

pub mod dataflash;
pub mod firmware;
pub mod logo;

pub use dataflash::{BootTarget, DataFlash, DataFlashLayout, LayoutVersion, format_version};
pub use firmware::{Encoding, FirmwareImage, FirmwareMatch, convert};
pub use logo::{Logo, LogoFormat};
