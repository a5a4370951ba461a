//! CAN data frames
//!
//! Classic and FD data frames together with the identifier and DLC helpers
//! used by the wire codec.

use std::fmt;

use crate::error::{FrameError, Result};
use crate::frame::{
    CTRL_BRS, CTRL_ESI, CTRL_EXT, CTRL_FDF, CTRL_RTR, FRAME_SIZE, OFFSET_CTRL, OFFSET_DLC,
    OFFSET_ID, OFFSET_MARKER, OFFSET_PAYLOAD, OFFSET_TIMESTAMP, OFFSET_USER,
};
use crate::timestamp::Timestamp;
use crate::types::{CAN_EXT_ID_MASK, CAN_STD_ID_MASK};

/// Largest payload of a CAN FD frame
pub const MAX_PAYLOAD: usize = 64;

/// Largest DLC of a classic frame
pub const CLASSIC_DLC_MAX: u8 = 8;

/// Largest DLC of an FD frame
pub const FD_DLC_MAX: u8 = 15;

/// Payload size in bytes for every DLC code
pub const DLC_TO_SIZE: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Payload size for a DLC code, `None` above 15
pub fn dlc_to_size(dlc: u8) -> Option<usize> {
    DLC_TO_SIZE.get(dlc as usize).map(|size| *size as usize)
}

/// Smallest DLC able to carry `size` bytes, `None` above 64
pub fn size_to_dlc(size: usize) -> Option<u8> {
    DLC_TO_SIZE
        .iter()
        .position(|&capacity| capacity as usize >= size)
        .map(|dlc| dlc as u8)
}

// ============================================================================
// Identifier
// ============================================================================

/// CAN frame identifier type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanId {
    /// Standard 11-bit identifier
    Standard(u16),
    /// Extended 29-bit identifier
    Extended(u32),
}

impl CanId {
    pub fn standard(id: u32) -> Result<Self> {
        if id > CAN_STD_ID_MASK {
            return Err(FrameError::identifier(format!(
                "standard identifier {id:#x} exceeds 0x7FF"
            )));
        }
        Ok(CanId::Standard(id as u16))
    }

    pub fn extended(id: u32) -> Result<Self> {
        if id > CAN_EXT_ID_MASK {
            return Err(FrameError::identifier(format!(
                "extended identifier {id:#x} exceeds 0x1FFFFFFF"
            )));
        }
        Ok(CanId::Extended(id))
    }

    /// Build an identifier, truncating to the width of the chosen format
    pub fn truncated(raw: u32, extended: bool) -> Self {
        if extended {
            CanId::Extended(raw & CAN_EXT_ID_MASK)
        } else {
            CanId::Standard((raw & CAN_STD_ID_MASK) as u16)
        }
    }

    /// Get the raw identifier value
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Standard(id) => u32::from(*id),
            CanId::Extended(id) => *id,
        }
    }

    /// Check if this is an extended identifier
    pub fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanId::Standard(id) => write!(f, "{id:03X}"),
            CanId::Extended(id) => write!(f, "{id:08X}"),
        }
    }
}

// ============================================================================
// Frame format
// ============================================================================

/// Classic or FD framing with the flags valid for each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFormat {
    Classic { remote: bool },
    Fd { bit_rate_switch: bool, error_state: bool },
}

impl FrameFormat {
    pub const CLASSIC: FrameFormat = FrameFormat::Classic { remote: false };
    pub const FD: FrameFormat = FrameFormat::Fd {
        bit_rate_switch: false,
        error_state: false,
    };

    pub fn is_fd(&self) -> bool {
        matches!(self, FrameFormat::Fd { .. })
    }

    pub fn max_dlc(&self) -> u8 {
        if self.is_fd() {
            FD_DLC_MAX
        } else {
            CLASSIC_DLC_MAX
        }
    }

    fn control_bits(&self) -> u8 {
        match *self {
            FrameFormat::Classic { remote } => {
                if remote {
                    CTRL_RTR
                } else {
                    0
                }
            },
            FrameFormat::Fd {
                bit_rate_switch,
                error_state,
            } => {
                let mut bits = CTRL_FDF;
                if bit_rate_switch {
                    bits |= CTRL_BRS;
                }
                if error_state {
                    bits |= CTRL_ESI;
                }
                bits
            },
        }
    }

    fn from_control_bits(ctrl: u8) -> Self {
        if ctrl & CTRL_FDF != 0 {
            FrameFormat::Fd {
                bit_rate_switch: ctrl & CTRL_BRS != 0,
                error_state: ctrl & CTRL_ESI != 0,
            }
        } else {
            FrameFormat::Classic {
                remote: ctrl & CTRL_RTR != 0,
            }
        }
    }
}

// ============================================================================
// Data frame
// ============================================================================

/// CAN data frame (classic or FD)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    id: CanId,
    format: FrameFormat,
    dlc: u8,
    data: [u8; MAX_PAYLOAD],
    /// Reception or transmission time
    pub timestamp: Timestamp,
    /// Application-defined value carried alongside the frame
    pub user: u32,
    /// Application-defined marker carried alongside the frame
    pub marker: u32,
}

impl DataFrame {
    /// Create a classic frame carrying up to 8 bytes
    pub fn new(id: CanId, data: &[u8]) -> Result<Self> {
        if data.len() > CLASSIC_DLC_MAX as usize {
            return Err(FrameError::dlc(format!(
                "classic frame cannot carry {} bytes",
                data.len()
            )));
        }
        let mut frame = Self::empty(id, FrameFormat::CLASSIC);
        frame.data[..data.len()].copy_from_slice(data);
        frame.dlc = data.len() as u8;
        Ok(frame)
    }

    /// Create an FD frame; the payload is zero-padded up to the next valid size
    pub fn new_fd(id: CanId, data: &[u8]) -> Result<Self> {
        let dlc = size_to_dlc(data.len()).ok_or_else(|| {
            FrameError::dlc(format!("FD frame cannot carry {} bytes", data.len()))
        })?;
        let mut frame = Self::empty(id, FrameFormat::FD);
        frame.data[..data.len()].copy_from_slice(data);
        frame.dlc = dlc;
        Ok(frame)
    }

    /// Create a remote transmission request frame
    pub fn new_remote(id: CanId, dlc: u8) -> Result<Self> {
        if dlc > CLASSIC_DLC_MAX {
            return Err(FrameError::dlc(format!("remote frame DLC {dlc} exceeds 8")));
        }
        let mut frame = Self::empty(id, FrameFormat::Classic { remote: true });
        frame.dlc = dlc;
        Ok(frame)
    }

    fn empty(id: CanId, format: FrameFormat) -> Self {
        Self {
            id,
            format,
            dlc: 0,
            data: [0; MAX_PAYLOAD],
            timestamp: Timestamp::default(),
            user: 0,
            marker: 0,
        }
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn set_id(&mut self, id: CanId) {
        self.id = id;
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Change the framing; switching to classic clamps the DLC to 8
    pub fn set_format(&mut self, format: FrameFormat) {
        self.format = format;
        if self.dlc > format.max_dlc() {
            self.truncate_to(format.max_dlc());
        }
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    pub fn set_dlc(&mut self, dlc: u8) -> Result<()> {
        if dlc > self.format.max_dlc() {
            return Err(FrameError::dlc(format!(
                "DLC {dlc} exceeds {} for this frame format",
                self.format.max_dlc()
            )));
        }
        if dlc < self.dlc {
            self.truncate_to(dlc);
        } else {
            self.dlc = dlc;
        }
        Ok(())
    }

    fn truncate_to(&mut self, dlc: u8) {
        let keep = dlc_to_size(dlc).unwrap_or(0);
        self.data[keep..].fill(0);
        self.dlc = dlc;
    }

    pub fn data_size(&self) -> usize {
        dlc_to_size(self.dlc).unwrap_or(0)
    }

    /// Payload bytes covered by the DLC
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_size()]
    }

    /// Replace the payload and adjust the DLC to fit it
    pub fn set_data(&mut self, data: &[u8]) -> Result<()> {
        let dlc = size_to_dlc(data.len())
            .filter(|dlc| *dlc <= self.format.max_dlc())
            .ok_or_else(|| {
                FrameError::dlc(format!(
                    "{} bytes do not fit this frame format",
                    data.len()
                ))
            })?;
        self.data = [0; MAX_PAYLOAD];
        self.data[..data.len()].copy_from_slice(data);
        self.dlc = dlc;
        Ok(())
    }

    pub fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    pub fn is_fd(&self) -> bool {
        self.format.is_fd()
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.format, FrameFormat::Classic { remote: true })
    }

    pub(crate) fn encode_into(&self, buf: &mut [u8; FRAME_SIZE]) -> Result<()> {
        if self.dlc > self.format.max_dlc() {
            return Err(FrameError::dlc(format!(
                "DLC {} out of range for {} frame",
                self.dlc,
                if self.is_fd() { "FD" } else { "classic" }
            )));
        }

        let raw_id = match self.id {
            CanId::Standard(id) => u32::from(id) & CAN_STD_ID_MASK,
            CanId::Extended(id) => id & CAN_EXT_ID_MASK,
        };
        buf[OFFSET_ID..OFFSET_ID + 4].copy_from_slice(&raw_id.to_be_bytes());
        buf[OFFSET_DLC] = self.dlc;

        let mut ctrl = self.format.control_bits();
        if self.id.is_extended() {
            ctrl |= CTRL_EXT;
        }
        buf[OFFSET_CTRL] = ctrl;

        let size = self.data_size();
        buf[OFFSET_PAYLOAD..OFFSET_PAYLOAD + size].copy_from_slice(&self.data[..size]);
        buf[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8].copy_from_slice(&self.timestamp.to_bytes());
        buf[OFFSET_USER..OFFSET_USER + 4].copy_from_slice(&self.user.to_be_bytes());
        buf[OFFSET_MARKER..OFFSET_MARKER + 4].copy_from_slice(&self.marker.to_be_bytes());
        Ok(())
    }

    pub(crate) fn decode_from(buf: &[u8; FRAME_SIZE]) -> Result<Self> {
        let ctrl = buf[OFFSET_CTRL];
        let format = FrameFormat::from_control_bits(ctrl);
        let dlc = buf[OFFSET_DLC];
        if dlc > format.max_dlc() {
            return Err(FrameError::dlc(format!(
                "received DLC {dlc} exceeds {}",
                format.max_dlc()
            )));
        }

        let raw_id = read_u32(buf, OFFSET_ID);
        let mut frame = Self::empty(CanId::truncated(raw_id, ctrl & CTRL_EXT != 0), format);
        frame.dlc = dlc;
        let size = frame.data_size();
        frame.data[..size].copy_from_slice(&buf[OFFSET_PAYLOAD..OFFSET_PAYLOAD + size]);

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8]);
        frame.timestamp = Timestamp::from_bytes(&ts);
        frame.user = read_u32(buf, OFFSET_USER);
        frame.marker = read_u32(buf, OFFSET_MARKER);
        Ok(frame)
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.dlc)?;
        if self.is_remote() {
            return write!(f, " remote request");
        }
        for byte in self.data() {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}

pub(crate) fn read_u32(buf: &[u8; FRAME_SIZE], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
