//! Per-channel traffic statistics
//!
//! Counters are updated from the raw 96-byte records so routing never has to
//! decode a frame just for accounting. Bus load and frame rate are derived once
//! per statistics interval from the bits accumulated since the previous tick.

use tokio::time::Instant;

use canhub_frame::{data_frame::DLC_TO_SIZE, Bitrate, RawFrame};

/// Frame overhead in bits with an 11-bit identifier
pub const STANDARD_FRAME_OVERHEAD: u64 = 66;

/// Frame overhead in bits with a 29-bit identifier
pub const EXTENDED_FRAME_OVERHEAD: u64 = 90;

/// Bits a data frame occupies on the bus
pub fn frame_bits(frame: &RawFrame) -> u64 {
    let payload = u64::from(DLC_TO_SIZE[usize::from(frame.dlc() & 0x0F)]) * 8;
    let overhead = if frame.is_extended() {
        EXTENDED_FRAME_OVERHEAD
    } else {
        STANDARD_FRAME_OVERHEAD
    };
    payload + overhead
}

#[derive(Debug, Clone)]
pub struct Statistics {
    frame_count: u64,
    error_count: u64,
    bits: u64,
    frames_at_last_tick: u64,
    last_tick: Instant,
    bus_load: u8,
    frames_per_second: u32,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            error_count: 0,
            bits: 0,
            frames_at_last_tick: 0,
            last_tick: Instant::now(),
            bus_load: 0,
            frames_per_second: 0,
        }
    }

    /// Account for one routed frame
    pub fn record(&mut self, frame: &RawFrame) {
        if frame.is_error() {
            self.error_count += 1;
        } else if !frame.is_api() {
            self.frame_count += 1;
            self.bits += frame_bits(frame);
        }
    }

    /// Recompute bus load and frame rate, then restart the bit accumulator
    ///
    /// Returns `true` when any published value changed.
    pub fn tick(&mut self, now: Instant, nominal: Bitrate) -> bool {
        let elapsed_ms = now.saturating_duration_since(self.last_tick).as_millis() as u64;
        if elapsed_ms == 0 {
            return false;
        }

        let delta = self.frame_count - self.frames_at_last_tick;
        let frames_per_second = (delta * 1000 / elapsed_ms).min(u64::from(u32::MAX)) as u32;

        let bus_load = match nominal.bits_per_second() {
            Some(bps) if bps > 0 => {
                let load = self.bits * 100 * 1000 / (u64::from(bps) * elapsed_ms);
                load.min(100) as u8
            },
            _ => 0,
        };

        let changed = frames_per_second != self.frames_per_second || bus_load != self.bus_load;
        self.frames_per_second = frames_per_second;
        self.bus_load = bus_load;
        self.frames_at_last_tick = self.frame_count;
        self.bits = 0;
        self.last_tick = now;
        changed
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Bits accumulated since the last tick
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Bus load in percent, 0 to 100
    pub fn bus_load(&self) -> u8 {
        self.bus_load
    }

    pub fn frames_per_second(&self) -> u32 {
        self.frames_per_second
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
