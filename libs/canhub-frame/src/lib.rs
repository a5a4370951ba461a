//! canhub wire protocol
//!
//! Shared building blocks for every canhub process:
//! - the 96-byte wire frame (data, error and API variants) with CRC-16 protection
//! - a saturating (seconds, nanoseconds) timestamp
//! - CAN enumerations: bitrate, bus state, mode, error type, log level
//! - acceptance filters for client-side frame selection
//! - a `tokio_util` codec for streaming raw frames over sockets

pub mod api_frame;
pub mod codec;
pub mod data_frame;
pub mod error;
pub mod error_frame;
pub mod filter;
pub mod frame;
pub mod timestamp;
pub mod types;

pub use api_frame::ApiFrame;
pub use codec::FrameCodec;
pub use data_frame::{CanId, DataFrame, FrameFormat};
pub use error::{FrameError, Result};
pub use error_frame::ErrorFrame;
pub use filter::{FilterAction, FilterList, FrameFilter};
pub use frame::{Frame, FrameKind, RawFrame, FRAME_SIZE};
pub use timestamp::Timestamp;
pub use types::{Bitrate, BusState, ErrorType, LogLevel, Mode};
