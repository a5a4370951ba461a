//! CAN error frames
//!
//! Error frames report the controller state. They reuse payload bytes 0..4:
//! bus state, last error type, receive counter, transmit counter.

use crate::error::{FrameError, Result};
use crate::frame::{FRAME_SIZE, ID_TAG_ERROR, OFFSET_DLC, OFFSET_ID, OFFSET_PAYLOAD, OFFSET_TIMESTAMP};
use crate::timestamp::Timestamp;
use crate::types::{BusState, ErrorType};

/// DLC stored in error frames
pub const ERROR_FRAME_DLC: u8 = 15;

/// Controller state report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorFrame {
    pub bus_state: BusState,
    pub error_type: ErrorType,
    pub rx_errors: u8,
    pub tx_errors: u8,
    pub timestamp: Timestamp,
}

impl ErrorFrame {
    pub fn new(bus_state: BusState, error_type: ErrorType) -> Self {
        Self {
            bus_state,
            error_type,
            ..Default::default()
        }
    }

    pub fn with_counters(mut self, rx_errors: u8, tx_errors: u8) -> Self {
        self.rx_errors = rx_errors;
        self.tx_errors = tx_errors;
        self
    }

    pub(crate) fn encode_into(&self, buf: &mut [u8; FRAME_SIZE]) {
        buf[OFFSET_ID..OFFSET_ID + 4].copy_from_slice(&ID_TAG_ERROR.to_be_bytes());
        buf[OFFSET_DLC] = ERROR_FRAME_DLC;
        buf[OFFSET_PAYLOAD] = self.bus_state.as_u8();
        buf[OFFSET_PAYLOAD + 1] = self.error_type.as_u8();
        buf[OFFSET_PAYLOAD + 2] = self.rx_errors;
        buf[OFFSET_PAYLOAD + 3] = self.tx_errors;
        buf[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8].copy_from_slice(&self.timestamp.to_bytes());
    }

    pub(crate) fn decode_from(buf: &[u8; FRAME_SIZE]) -> Result<Self> {
        let state = buf[OFFSET_PAYLOAD];
        let bus_state = BusState::from_u8(state)
            .ok_or_else(|| FrameError::variant(format!("unknown bus state {state}")))?;
        let kind = buf[OFFSET_PAYLOAD + 1];
        let error_type = ErrorType::from_u8(kind)
            .ok_or_else(|| FrameError::variant(format!("unknown error type {kind}")))?;

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8]);
        Ok(Self {
            bus_state,
            error_type,
            rx_errors: buf[OFFSET_PAYLOAD + 2],
            tx_errors: buf[OFFSET_PAYLOAD + 3],
            timestamp: Timestamp::from_bytes(&ts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn test_error_frame_layout() {
        let frame = ErrorFrame::new(BusState::BusPassive, ErrorType::Stuff).with_counters(136, 8);
        let raw = Frame::Error(frame).encode().unwrap();
        assert_eq!(&raw[0..4], &[0x80, 0, 0, 0]);
        assert_eq!(raw[4], ERROR_FRAME_DLC);
        assert_eq!(&raw[6..10], &[4, 3, 136, 8]);
    }

    #[test]
    fn test_unknown_bus_state_rejected() {
        let mut buf = [0u8; FRAME_SIZE];
        ErrorFrame::default().encode_into(&mut buf);
        buf[OFFSET_PAYLOAD] = 9;
        assert!(matches!(
            ErrorFrame::decode_from(&buf),
            Err(FrameError::Variant(_))
        ));
    }
}
