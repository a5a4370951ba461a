//! CAN enumerations shared by frames, brokers and adapters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mask for an 11-bit standard identifier
pub const CAN_STD_ID_MASK: u32 = 0x0000_07FF;

/// Mask for a 29-bit extended identifier
pub const CAN_EXT_ID_MASK: u32 = 0x1FFF_FFFF;

/// Largest raw value still interpreted as a preset index
pub const BITRATE_PRESET_MAX: i32 = 9999;

/// Preset index to bit/s, `None` marks the auto-detection slot
const BITRATE_PRESETS: [Option<u32>; 13] = [
    Some(10_000),
    Some(20_000),
    Some(50_000),
    Some(100_000),
    Some(125_000),
    Some(250_000),
    Some(500_000),
    Some(800_000),
    Some(1_000_000),
    None,
    Some(2_000_000),
    Some(4_000_000),
    Some(5_000_000),
];

// ============================================================================
// Bitrate
// ============================================================================

/// Nominal or data bitrate of a CAN channel
///
/// On the wire and in settings documents a bitrate is a signed integer:
/// `-1` is unset, `0..=12` selects a preset and anything above
/// [`BITRATE_PRESET_MAX`] is already expressed in bit/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Bitrate {
    #[default]
    Unset,
    BitsPerSecond(u32),
}

impl Bitrate {
    pub const KBIT_125: Bitrate = Bitrate::BitsPerSecond(125_000);
    pub const KBIT_250: Bitrate = Bitrate::BitsPerSecond(250_000);
    pub const KBIT_500: Bitrate = Bitrate::BitsPerSecond(500_000);
    pub const MBIT_1: Bitrate = Bitrate::BitsPerSecond(1_000_000);
    pub const MBIT_2: Bitrate = Bitrate::BitsPerSecond(2_000_000);

    /// Resolve a raw value (preset index or bit/s) into a bitrate
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            r if r < 0 => Bitrate::Unset,
            r if r > BITRATE_PRESET_MAX => Bitrate::BitsPerSecond(r as u32),
            r => BITRATE_PRESETS
                .get(r as usize)
                .copied()
                .flatten()
                .map_or(Bitrate::Unset, Bitrate::BitsPerSecond),
        }
    }

    /// Raw representation used on the wire, `-1` when unset
    pub fn to_raw(self) -> i32 {
        match self {
            Bitrate::Unset => -1,
            Bitrate::BitsPerSecond(bps) => bps as i32,
        }
    }

    pub fn bits_per_second(self) -> Option<u32> {
        match self {
            Bitrate::Unset => None,
            Bitrate::BitsPerSecond(bps) => Some(bps),
        }
    }

    pub fn is_set(self) -> bool {
        matches!(self, Bitrate::BitsPerSecond(_))
    }
}

impl From<i32> for Bitrate {
    fn from(raw: i32) -> Self {
        Bitrate::from_raw(raw)
    }
}

impl From<Bitrate> for i32 {
    fn from(bitrate: Bitrate) -> Self {
        bitrate.to_raw()
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Bitrate::Unset => write!(f, "None"),
            Bitrate::BitsPerSecond(bps) if bps < 1_000_000 => write!(f, "{} kBit/s", bps / 1000),
            Bitrate::BitsPerSecond(bps) if bps % 1_000_000 == 0 => {
                write!(f, "{} MBit/s", bps / 1_000_000)
            },
            Bitrate::BitsPerSecond(bps) => write!(f, "{:.1} MBit/s", f64::from(bps) / 1e6),
        }
    }
}

// ============================================================================
// Bus state
// ============================================================================

/// Error state of the CAN controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BusState {
    #[default]
    Stopped = 0,
    Sleeping = 1,
    BusActive = 2,
    BusWarn = 3,
    BusPassive = 4,
    BusOff = 5,
}

impl BusState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BusState::Stopped),
            1 => Some(BusState::Sleeping),
            2 => Some(BusState::BusActive),
            3 => Some(BusState::BusWarn),
            4 => Some(BusState::BusPassive),
            5 => Some(BusState::BusOff),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable description used by front ends
    pub fn description(self) -> &'static str {
        match self {
            BusState::Stopped => "Stopped",
            BusState::Sleeping => "Sleeping",
            BusState::BusActive => "Error active",
            BusState::BusWarn => "Warning",
            BusState::BusPassive => "Error passive",
            BusState::BusOff => "Bus-off",
        }
    }

    /// Derive the state from the controller error counters (ISO 11898-1 thresholds)
    pub fn from_error_counters(rx_errors: u8, tx_errors: u8) -> Self {
        let worst = rx_errors.max(tx_errors);
        if tx_errors == u8::MAX {
            BusState::BusOff
        } else if worst >= 128 {
            BusState::BusPassive
        } else if worst >= 96 {
            BusState::BusWarn
        } else {
            BusState::BusActive
        }
    }
}

impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

// ============================================================================
// Mode
// ============================================================================

/// Operating mode of a CAN controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    Init = 0,
    Operation = 1,
    ListenOnly = 2,
    Sleep = 3,
    SelfTest = 4,
}

impl Mode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mode::Init),
            1 => Some(Mode::Operation),
            2 => Some(Mode::ListenOnly),
            3 => Some(Mode::Sleep),
            4 => Some(Mode::SelfTest),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Init => "Init",
            Mode::Operation => "Operation",
            Mode::ListenOnly => "Listen-only",
            Mode::Sleep => "Sleep",
            Mode::SelfTest => "Self-test",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Error type
// ============================================================================

/// Last error detected on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorType {
    #[default]
    None = 0,
    Bit0 = 1,
    Bit1 = 2,
    Stuff = 3,
    Form = 4,
    Crc = 5,
    Ack = 6,
}

impl ErrorType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ErrorType::None),
            1 => Some(ErrorType::Bit0),
            2 => Some(ErrorType::Bit1),
            3 => Some(ErrorType::Stuff),
            4 => Some(ErrorType::Form),
            5 => Some(ErrorType::Crc),
            6 => Some(ErrorType::Ack),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Log level
// ============================================================================

/// Severity attached to adapter log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogLevel {
    #[default]
    Info,
    Notice,
    Warn,
    Error,
    Debug,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_presets_resolve() {
        assert_eq!(Bitrate::from_raw(-1), Bitrate::Unset);
        assert_eq!(Bitrate::from_raw(0), Bitrate::BitsPerSecond(10_000));
        assert_eq!(Bitrate::from_raw(6), Bitrate::KBIT_500);
        assert_eq!(Bitrate::from_raw(8), Bitrate::MBIT_1);
        assert_eq!(Bitrate::from_raw(12), Bitrate::BitsPerSecond(5_000_000));
        // auto-detection cannot be resolved to a rate
        assert_eq!(Bitrate::from_raw(9), Bitrate::Unset);
        assert_eq!(Bitrate::from_raw(500), Bitrate::Unset);
    }

    #[test]
    fn test_bitrate_absolute_passes_through() {
        assert_eq!(Bitrate::from_raw(500_000), Bitrate::KBIT_500);
        assert_eq!(Bitrate::from_raw(10_000), Bitrate::BitsPerSecond(10_000));
        assert_eq!(Bitrate::KBIT_500.to_raw(), 500_000);
        assert_eq!(Bitrate::Unset.to_raw(), -1);
    }

    #[test]
    fn test_bitrate_display() {
        assert_eq!(Bitrate::Unset.to_string(), "None");
        assert_eq!(Bitrate::KBIT_125.to_string(), "125 kBit/s");
        assert_eq!(Bitrate::MBIT_2.to_string(), "2 MBit/s");
        assert_eq!(Bitrate::BitsPerSecond(2_500_000).to_string(), "2.5 MBit/s");
    }

    #[test]
    fn test_bitrate_serde_as_integer() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            rate: Bitrate,
        }
        let holder: Holder = serde_json::from_str(r#"{"rate": 6}"#).unwrap();
        assert_eq!(holder.rate, Bitrate::KBIT_500);
        let text = serde_json::to_string(&Holder {
            rate: Bitrate::Unset,
        })
        .unwrap();
        assert_eq!(text, r#"{"rate":-1}"#);
    }

    #[test]
    fn test_bus_state_from_counters() {
        assert_eq!(BusState::from_error_counters(0, 0), BusState::BusActive);
        assert_eq!(BusState::from_error_counters(96, 0), BusState::BusWarn);
        assert_eq!(BusState::from_error_counters(0, 128), BusState::BusPassive);
        assert_eq!(BusState::from_error_counters(0, 255), BusState::BusOff);
    }

    #[test]
    fn test_enum_round_trip_through_u8() {
        for raw in 0..=5u8 {
            assert_eq!(BusState::from_u8(raw).map(BusState::as_u8), Some(raw));
        }
        assert!(BusState::from_u8(6).is_none());
        assert_eq!(Mode::from_u8(2), Some(Mode::ListenOnly));
        assert_eq!(ErrorType::from_u8(6), Some(ErrorType::Ack));
        assert_eq!(BusState::BusPassive.to_string(), "Error passive");
    }
}
