//! Upload state machine.

use std::fmt;

use crate::error::Error;

/// Stages of an upload, in protocol order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadState {
    #[default]
    Disconnected,
    Connected,
    DataFlashRead,
    DataFlashTrusted,
    FirmwareVerified,
    DataFlashPatched,
    DataFlashWritten,
    Reset,
    Reconnected,
    FirmwareWritten,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Disconnected => write!(f, "Disconnected"),
            UploadState::Connected => write!(f, "Connected"),
            UploadState::DataFlashRead => write!(f, "Data Flash Read"),
            UploadState::DataFlashTrusted => write!(f, "Data Flash Trusted"),
            UploadState::FirmwareVerified => write!(f, "Firmware Verified"),
            UploadState::DataFlashPatched => write!(f, "Data Flash Patched"),
            UploadState::DataFlashWritten => write!(f, "Data Flash Written"),
            UploadState::Reset => write!(f, "Reset"),
            UploadState::Reconnected => write!(f, "Reconnected"),
            UploadState::FirmwareWritten => write!(f, "Firmware Written"),
        }
    }
}

/// Tracks the current stage and every transition taken.
///
/// Stages only move forward; optional stages (verification, reset) may be
/// skipped.
#[derive(Debug, Default)]
pub struct UploadStateMachine {
    state: UploadState,
    history: Vec<UploadState>,
}

impl UploadStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// States entered so far, in order.
    pub fn history(&self) -> &[UploadState] {
        &self.history
    }

    /// Transition to a later state.
    pub fn goto_state(&mut self, new_state: UploadState) -> Result<UploadState, Error> {
        if new_state <= self.state {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }
        tracing::debug!(from = %self.state, to = %new_state, "State transition");
        let from = self.state;
        self.state = new_state;
        self.history.push(new_state);
        Ok(from)
    }

    /// Start over for a new session.
    pub fn reset(&mut self) {
        self.state = UploadState::Disconnected;
        self.history.clear();
    }
}
