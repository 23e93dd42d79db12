//! Common Types for the NR MAC Scheduler
//!
//! Defines fundamental identifiers and slot timing used throughout the workspace

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId(pub u16);

/// Spatial beam identifier.
///
/// UEs sharing a beam cannot be multiplexed on the same time-frequency
/// resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BeamId {
    /// Sector index
    pub sector: u16,
    /// Elevation angle in degrees
    pub elevation: i16,
}

impl BeamId {
    pub fn new(sector: u16, elevation: i16) -> Self {
        Self { sector, elevation }
    }
}

impl fmt::Display for BeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sector, self.elevation)
    }
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    #[default]
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// NR numerology (mu)
    pub fn numerology(&self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }

    /// Number of slots in one 1 ms subframe
    pub fn slots_per_subframe(&self) -> u16 {
        1 << self.numerology()
    }

    /// Slot duration in microseconds
    pub fn slot_duration_us(&self) -> u64 {
        1000 / self.slots_per_subframe() as u64
    }
}

/// Link direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Downlink
    Dl,
    /// Uplink
    Ul,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Dl => write!(f, "DL"),
            Direction::Ul => write!(f, "UL"),
        }
    }
}

/// Direction a logical channel is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LcDirection {
    Dl,
    Ul,
    Both,
}

impl LcDirection {
    /// Whether the channel carries downlink traffic
    pub fn has_dl(&self) -> bool {
        matches!(self, LcDirection::Dl | LcDirection::Both)
    }

    /// Whether the channel carries uplink traffic
    pub fn has_ul(&self) -> bool {
        matches!(self, LcDirection::Ul | LcDirection::Both)
    }
}

/// Number of subframes in one radio frame
pub const SUBFRAMES_PER_FRAME: u8 = 10;

/// Absolute slot timestamp: frame, subframe, slot and symbol (var-TTI) index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SfnSf {
    /// System frame number
    pub frame: u16,
    /// Subframe within the frame (0-9)
    pub subframe: u8,
    /// Slot within the subframe
    pub slot: u16,
    /// Symbol index inside the slot
    pub var_tti: u8,
}

impl SfnSf {
    pub fn new(frame: u16, subframe: u8, slot: u16, var_tti: u8) -> Self {
        Self { frame, subframe, slot, var_tti }
    }

    /// Pack into a single key: `frame << 32 | subframe << 24 | slot << 8 | var_tti`
    pub fn encode(&self) -> u64 {
        (self.frame as u64) << 32
            | (self.subframe as u64) << 24
            | (self.slot as u64) << 8
            | self.var_tti as u64
    }

    /// Inverse of [`SfnSf::encode`]
    pub fn decode(key: u64) -> Self {
        Self {
            frame: ((key >> 32) & 0xFFFF) as u16,
            subframe: ((key >> 24) & 0xFF) as u8,
            slot: ((key >> 8) & 0xFFFF) as u16,
            var_tti: (key & 0xFF) as u8,
        }
    }

    /// Same slot, symbol index set to `var_tti`
    pub fn with_var_tti(&self, var_tti: u8) -> Self {
        Self { var_tti, ..*self }
    }

    /// Advance by `num_slots` slots, wrapping subframes into frames.
    /// The symbol index is left untouched.
    pub fn increase_no_of_slots(&self, num_slots: u32, slots_per_subframe: u16) -> Self {
        let mut ret = *self;
        let slots_per_frame = slots_per_subframe as u64 * SUBFRAMES_PER_FRAME as u64;
        let total = ret.normalized(slots_per_subframe) + num_slots as u64;

        ret.frame = ((total / slots_per_frame) & 0xFFFF) as u16;
        let in_frame = total % slots_per_frame;
        ret.subframe = (in_frame / slots_per_subframe as u64) as u8;
        ret.slot = (in_frame % slots_per_subframe as u64) as u16;
        ret
    }

    /// Slot count since frame 0, subframe 0, slot 0
    pub fn normalized(&self, slots_per_subframe: u16) -> u64 {
        (self.frame as u64 * SUBFRAMES_PER_FRAME as u64 + self.subframe as u64)
            * slots_per_subframe as u64
            + self.slot as u64
    }
}

impl fmt::Display for SfnSf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.frame, self.subframe, self.slot, self.var_tti)
    }
}
