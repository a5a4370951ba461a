//! API frames
//!
//! Control messages that travel over the same sockets as CAN traffic. The
//! function code is stored in the marker field, the arguments in the payload.

use crate::data_frame::read_u32;
use crate::error::{FrameError, Result};
use crate::frame::{
    FRAME_SIZE, ID_TAG_API, OFFSET_DLC, OFFSET_ID, OFFSET_MARKER, OFFSET_PAYLOAD,
};
use crate::types::{Bitrate, Mode};

/// DLC stored in API frames
pub const API_FRAME_DLC: u8 = 15;

/// Longest name carried by [`ApiFrame::Name`]
pub const API_NAME_MAX: usize = 63;

const FUNC_NONE: u32 = 0;
const FUNC_BITRATE: u32 = 1;
const FUNC_CAN_MODE: u32 = 2;
const FUNC_DRIVER_INIT: u32 = 3;
const FUNC_DRIVER_RELEASE: u32 = 4;
const FUNC_PROCESS_ID: u32 = 5;
const FUNC_NAME: u32 = 6;

/// Control request exchanged between clients and a broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFrame {
    None,
    Bitrate { nominal: Bitrate, data: Bitrate },
    Mode(Mode),
    DriverInit,
    DriverRelease,
    ProcessId(u32),
    /// Peer name, Latin-1, at most 63 characters
    Name(String),
}

impl ApiFrame {
    pub fn function_code(&self) -> u32 {
        match self {
            ApiFrame::None => FUNC_NONE,
            ApiFrame::Bitrate { .. } => FUNC_BITRATE,
            ApiFrame::Mode(_) => FUNC_CAN_MODE,
            ApiFrame::DriverInit => FUNC_DRIVER_INIT,
            ApiFrame::DriverRelease => FUNC_DRIVER_RELEASE,
            ApiFrame::ProcessId(_) => FUNC_PROCESS_ID,
            ApiFrame::Name(_) => FUNC_NAME,
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut [u8; FRAME_SIZE]) {
        buf[OFFSET_ID..OFFSET_ID + 4].copy_from_slice(&ID_TAG_API.to_be_bytes());
        buf[OFFSET_DLC] = API_FRAME_DLC;
        buf[OFFSET_MARKER..OFFSET_MARKER + 4].copy_from_slice(&self.function_code().to_be_bytes());

        let payload = &mut buf[OFFSET_PAYLOAD..];
        match self {
            ApiFrame::Bitrate { nominal, data } => {
                payload[..4].copy_from_slice(&nominal.to_raw().to_be_bytes());
                payload[4..8].copy_from_slice(&data.to_raw().to_be_bytes());
            },
            ApiFrame::Mode(mode) => payload[0] = mode.as_u8(),
            ApiFrame::ProcessId(pid) => payload[..4].copy_from_slice(&pid.to_be_bytes()),
            ApiFrame::Name(name) => {
                let latin1: Vec<u8> = name
                    .chars()
                    .take(API_NAME_MAX)
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect();
                payload[0] = latin1.len() as u8;
                payload[1..=latin1.len()].copy_from_slice(&latin1);
            },
            ApiFrame::None | ApiFrame::DriverInit | ApiFrame::DriverRelease => {},
        }
    }

    pub(crate) fn decode_from(buf: &[u8; FRAME_SIZE]) -> Result<Self> {
        let payload = &buf[OFFSET_PAYLOAD..];
        let frame = match read_u32(buf, OFFSET_MARKER) {
            FUNC_NONE => ApiFrame::None,
            FUNC_BITRATE => ApiFrame::Bitrate {
                nominal: Bitrate::from_raw(i32::from_be_bytes([
                    payload[0], payload[1], payload[2], payload[3],
                ])),
                data: Bitrate::from_raw(i32::from_be_bytes([
                    payload[4], payload[5], payload[6], payload[7],
                ])),
            },
            FUNC_CAN_MODE => ApiFrame::Mode(
                Mode::from_u8(payload[0])
                    .ok_or_else(|| FrameError::variant(format!("unknown mode {}", payload[0])))?,
            ),
            FUNC_DRIVER_INIT => ApiFrame::DriverInit,
            FUNC_DRIVER_RELEASE => ApiFrame::DriverRelease,
            FUNC_PROCESS_ID => {
                ApiFrame::ProcessId(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]))
            },
            FUNC_NAME => {
                let len = (payload[0] as usize).min(API_NAME_MAX);
                ApiFrame::Name(payload[1..=len].iter().map(|&b| char::from(b)).collect())
            },
            other => {
                return Err(FrameError::variant(format!("unknown API function {other}")));
            },
        };
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn test_bitrate_payload_layout() {
        let api = ApiFrame::Bitrate {
            nominal: Bitrate::KBIT_500,
            data: Bitrate::Unset,
        };
        let raw = Frame::Api(api).encode().unwrap();
        assert_eq!(&raw[0..4], &[0x40, 0, 0, 0]);
        assert_eq!(&raw[6..10], &500_000i32.to_be_bytes());
        assert_eq!(&raw[10..14], &[0xFF; 4]);
        assert_eq!(&raw[82..86], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_name_is_truncated_and_latin1() {
        let long: String = "x".repeat(80);
        let raw = Frame::Api(ApiFrame::Name(long)).encode().unwrap();
        match Frame::decode(&raw).unwrap() {
            Frame::Api(ApiFrame::Name(name)) => assert_eq!(name.len(), API_NAME_MAX),
            other => panic!("unexpected frame {other:?}"),
        }

        let raw = Frame::Api(ApiFrame::Name("Grüße €".to_string())).encode().unwrap();
        match Frame::decode(&raw).unwrap() {
            Frame::Api(ApiFrame::Name(name)) => assert_eq!(name, "Grüße ?"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function_rejected() {
        let mut raw = Frame::Api(ApiFrame::DriverInit).encode().unwrap();
        raw[85] = 0x7F;
        let crc = crate::frame::checksum(&raw[..94]);
        raw[94..].copy_from_slice(&crc.to_be_bytes());
        assert!(matches!(Frame::decode(&raw), Err(FrameError::Variant(_))));
    }
}
