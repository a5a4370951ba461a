//! Frame codec errors

use thiserror::Error;

/// Errors raised while building, encoding or decoding wire frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than one wire frame
    #[error("Frame size error: expected {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },

    /// Stored checksum does not match the computed one
    #[error("Checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    Checksum { stored: u16, computed: u16 },

    /// DLC outside the range allowed for the frame format
    #[error("DLC error: {0}")]
    Dlc(String),

    /// Identifier outside the 11/29-bit range
    #[error("Identifier error: {0}")]
    Identifier(String),

    /// Field value that does not map to a known variant
    #[error("Variant error: {0}")]
    Variant(String),

    /// I/O failure surfaced through the codec
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type alias for frame operations
pub type Result<T> = std::result::Result<T, FrameError>;

impl FrameError {
    pub fn size(actual: usize) -> Self {
        FrameError::Size {
            expected: crate::frame::FRAME_SIZE,
            actual,
        }
    }

    pub fn dlc(msg: impl Into<String>) -> Self {
        FrameError::Dlc(msg.into())
    }

    pub fn identifier(msg: impl Into<String>) -> Self {
        FrameError::Identifier(msg.into())
    }

    pub fn variant(msg: impl Into<String>) -> Self {
        FrameError::Variant(msg.into())
    }
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Io(err.to_string())
    }
}
