//! Wire frame codec
//!
//! Every message exchanged with a broker is a fixed 96-byte record:
//!
//! | bytes  | content                                          |
//! |--------|--------------------------------------------------|
//! | 0..4   | identifier, MSB first, bits 31/30 tag error/API  |
//! | 4      | DLC                                              |
//! | 5      | control flags                                    |
//! | 6..70  | payload                                          |
//! | 70..78 | timestamp, seconds then nanoseconds              |
//! | 78..82 | user value                                       |
//! | 82..86 | marker                                           |
//! | 86..94 | reserved, zero                                   |
//! | 94..96 | CRC-16 over bytes 0..94, MSB first               |

use crc::{Crc, CRC_16_IBM_SDLC};
use std::fmt;

use crate::api_frame::ApiFrame;
use crate::data_frame::DataFrame;
use crate::error::{FrameError, Result};
use crate::error_frame::ErrorFrame;
use crate::timestamp::Timestamp;

/// Size of one wire frame in bytes
pub const FRAME_SIZE: usize = 96;

pub(crate) const OFFSET_ID: usize = 0;
pub(crate) const OFFSET_DLC: usize = 4;
pub(crate) const OFFSET_CTRL: usize = 5;
pub(crate) const OFFSET_PAYLOAD: usize = 6;
pub(crate) const OFFSET_TIMESTAMP: usize = 70;
pub(crate) const OFFSET_USER: usize = 78;
pub(crate) const OFFSET_MARKER: usize = 82;
pub(crate) const OFFSET_CHECKSUM: usize = 94;

/// Identifier tag of error frames
pub const ID_TAG_ERROR: u32 = 0x8000_0000;
/// Identifier tag of API frames
pub const ID_TAG_API: u32 = 0x4000_0000;

pub(crate) const CTRL_EXT: u8 = 0x01;
pub(crate) const CTRL_FDF: u8 = 0x02;
pub(crate) const CTRL_RTR: u8 = 0x04;
pub(crate) const CTRL_BRS: u8 = 0x40;
pub(crate) const CTRL_ESI: u8 = 0x80;

/// CRC-16/X-25
const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Checksum of a byte slice as stored in bytes 94..96
pub fn checksum(bytes: &[u8]) -> u16 {
    CHECKSUM.checksum(bytes)
}

/// Variant tag derived from the identifier field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    Error,
    Api,
}

impl FrameKind {
    fn from_id_byte(byte0: u8) -> Self {
        if byte0 & 0x80 != 0 {
            FrameKind::Error
        } else if byte0 & 0x40 != 0 {
            FrameKind::Api
        } else {
            FrameKind::Data
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// Decoded wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Error(ErrorFrame),
    Api(ApiFrame),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data(_) => FrameKind::Data,
            Frame::Error(_) => FrameKind::Error,
            Frame::Api(_) => FrameKind::Api,
        }
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Frame::Data(frame) => Some(frame.timestamp),
            Frame::Error(frame) => Some(frame.timestamp),
            Frame::Api(_) => None,
        }
    }

    /// Serialize into the 96-byte wire layout with a fresh checksum
    pub fn encode(&self) -> Result<[u8; FRAME_SIZE]> {
        let mut buf = [0u8; FRAME_SIZE];
        match self {
            Frame::Data(frame) => frame.encode_into(&mut buf)?,
            Frame::Error(frame) => frame.encode_into(&mut buf),
            Frame::Api(frame) => frame.encode_into(&mut buf),
        }
        seal(&mut buf);
        Ok(buf)
    }

    /// Parse a wire frame; size and checksum are verified before any field is read
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        RawFrame::from_slice(bytes)?.decode()
    }

    pub fn to_raw(&self) -> Result<RawFrame> {
        self.encode().map(RawFrame)
    }
}

impl From<DataFrame> for Frame {
    fn from(frame: DataFrame) -> Self {
        Frame::Data(frame)
    }
}

impl From<ErrorFrame> for Frame {
    fn from(frame: ErrorFrame) -> Self {
        Frame::Error(frame)
    }
}

impl From<ApiFrame> for Frame {
    fn from(frame: ApiFrame) -> Self {
        Frame::Api(frame)
    }
}

fn seal(buf: &mut [u8; FRAME_SIZE]) {
    let crc = checksum(&buf[..OFFSET_CHECKSUM]);
    buf[OFFSET_CHECKSUM..].copy_from_slice(&crc.to_be_bytes());
}

// ============================================================================
// Raw frame
// ============================================================================

/// Undecoded wire frame as routed between connections
///
/// Brokers forward raw frames without decoding them; only the variant tag,
/// DLC and identifier format are inspected for statistics.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawFrame([u8; FRAME_SIZE]);

impl RawFrame {
    pub fn new(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy the first 96 bytes of `bytes`; shorter input is rejected
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_SIZE {
            return Err(FrameError::size(bytes.len()));
        }
        let mut buf = [0u8; FRAME_SIZE];
        buf.copy_from_slice(&bytes[..FRAME_SIZE]);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; FRAME_SIZE] {
        self.0
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from_id_byte(self.0[OFFSET_ID])
    }

    pub fn is_error(&self) -> bool {
        self.kind() == FrameKind::Error
    }

    pub fn is_api(&self) -> bool {
        self.kind() == FrameKind::Api
    }

    pub fn dlc(&self) -> u8 {
        self.0[OFFSET_DLC]
    }

    pub fn is_extended(&self) -> bool {
        self.0[OFFSET_CTRL] & CTRL_EXT != 0
    }

    pub fn stored_checksum(&self) -> u16 {
        u16::from_be_bytes([self.0[OFFSET_CHECKSUM], self.0[OFFSET_CHECKSUM + 1]])
    }

    pub fn verify(&self) -> Result<()> {
        let stored = self.stored_checksum();
        let computed = checksum(&self.0[..OFFSET_CHECKSUM]);
        if stored != computed {
            return Err(FrameError::Checksum { stored, computed });
        }
        Ok(())
    }

    pub fn decode(&self) -> Result<Frame> {
        self.verify()?;
        match self.kind() {
            FrameKind::Data => DataFrame::decode_from(&self.0).map(Frame::Data),
            FrameKind::Error => ErrorFrame::decode_from(&self.0).map(Frame::Error),
            FrameKind::Api => ApiFrame::decode_from(&self.0).map(Frame::Api),
        }
    }

    /// Overwrite the timestamp bytes and recompute the checksum
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.0[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8].copy_from_slice(&timestamp.to_bytes());
        seal(&mut self.0);
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("kind", &self.kind())
            .field("id", &&self.0[..4])
            .field("dlc", &self.dlc())
            .field("checksum", &format_args!("{:#06x}", self.stored_checksum()))
            .finish()
    }
}

impl TryFrom<&Frame> for RawFrame {
    type Error = FrameError;

    fn try_from(frame: &Frame) -> Result<Self> {
        frame.to_raw()
    }
}
