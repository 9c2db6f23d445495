//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other frontend) to follow an upload without being
//! coupled to the session internals.

use crate::state::UploadState;
use crate::transport::DeviceStrings;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
}

/// Events emitted by an upload session.
#[derive(Debug, Clone)]
pub enum EvicEvent {
    /// Device opened.
    DeviceConnected {
        vid: u16,
        pid: u16,
        strings: DeviceStrings,
    },
    /// Handle dropped for a reset.
    DeviceDisconnected,
    /// State machine transition.
    StateChanged { from: UploadState, to: UploadState },
    /// Transfer progress.
    Progress {
        operation: String,
        current: u64,
        total: u64,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Command frame sent.
    CommandSent { opcode: u8, arg1: u32, arg2: u32 },
    /// All operations completed successfully.
    Complete,
}

/// Observer trait for receiving session events.
pub trait EvicObserver: Send + Sync {
    fn on_event(&self, event: &EvicEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl EvicObserver for NullObserver {
    fn on_event(&self, _event: &EvicEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl EvicObserver for TracingObserver {
    fn on_event(&self, event: &EvicEvent) {
        match event {
            EvicEvent::DeviceConnected { vid, pid, strings } => {
                tracing::info!(
                    vid = %format!("{:04X}", vid),
                    pid = %format!("{:04X}", pid),
                    manufacturer = strings.manufacturer.as_deref().unwrap_or("-"),
                    product = strings.product.as_deref().unwrap_or("-"),
                    serial = strings.serial_number.as_deref().unwrap_or("-"),
                    "Device connected"
                );
            }
            EvicEvent::DeviceDisconnected => {
                tracing::info!("Device disconnected");
            }
            EvicEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "State changed");
            }
            EvicEvent::Progress {
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    100
                };
                tracing::debug!(operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            EvicEvent::Log { level, message } => match level {
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
            EvicEvent::CommandSent { opcode, arg1, arg2 } => {
                tracing::trace!(
                    opcode = %format!("0x{:02X}", opcode),
                    arg1,
                    arg2,
                    "Command sent"
                );
            }
            EvicEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}
