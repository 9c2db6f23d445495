//! Error taxonomy for the upload engine.

use thiserror::Error;

use crate::state::UploadState;
use crate::transport::TransportError;

/// Firmware, data flash and logo format failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Firmware manufacturer verification failed")]
    ManufacturerMismatch,

    #[error("Firmware device name verification failed (tried {candidates:?})")]
    UnsupportedDevice { candidates: Vec<String> },

    #[error("Firmware supports hardware up to {max}, device reports {actual}")]
    HardwareVersionTooOld { max: u32, actual: u32 },

    #[error("Unsupported logo dimensions {width}x{height}")]
    UnsupportedLogoDimensions { width: u32, height: u32 },

    #[error("Data flash must be 2048 or 2052 bytes, got {0}")]
    InvalidDataFlashSize(usize),

    #[error("Logo must be 1024 bytes, got {0}")]
    InvalidLogoSize(usize),

    #[error("Image decode failed: {0}")]
    ImageDecode(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection failed: {0}")]
    Connection(#[source] TransportError),

    #[error("I/O error: {0}")]
    Io(#[source] TransportError),

    #[error(
        "Data flash verification failed: expected checksum 0x{expected:08X}, computed 0x{actual:08X}"
    )]
    Verification { expected: u32, actual: u32 },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition { from: UploadState, to: UploadState },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: UploadState,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tag the error with the stage it occurred in. Already tagged errors keep
    /// their original stage.
    pub fn at(self, stage: UploadState) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was raised in, if known.
    pub fn stage(&self) -> Option<UploadState> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage tag removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        if e.is_connection() {
            Error::Connection(e)
        } else {
            Error::Io(e)
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
