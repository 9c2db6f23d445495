//! Protocol module - wire-level definitions for the eVic HID bootloader.

pub mod checksum;
pub mod command;
pub mod constants;

pub use checksum::checksum;
pub use command::{HidCommand, Opcode};
pub use constants::*;
