//! NR MAC Slot Scheduler Library
//!
//! This crate implements the MAC-layer slot scheduler: it turns CQI, buffer
//! status and HARQ feedback into per-slot DCI allocations.

pub mod mac;

use common::types::{Direction, Rnti, SfnSf};
use common::utils::TableError;
use thiserror::Error;

pub use mac::{
    Amc, AmcConfig, MacScheduler, SchedulerConfig, SchedulerPolicyConfig, AccessMode, TableAmc,
};

/// Scheduler errors.
///
/// Every variant is a caller contract violation or a rejected configuration;
/// transient resource pressure never surfaces as an error.
#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
    #[error("Unknown UE: RNTI {0}")]
    UnknownUe(Rnti),

    #[error("Unknown logical channel {lc_id} for RNTI {rnti}")]
    UnknownLogicalChannel { rnti: Rnti, lc_id: u8 },

    #[error("BSR reports {bytes} bytes for unconfigured LCG {lcg_id} of RNTI {rnti}")]
    UnknownLcg { rnti: Rnti, lcg_id: u8, bytes: u32 },

    #[error("{direction} HARQ vector full for RNTI {rnti}")]
    HarqVectorFull { rnti: Rnti, direction: Direction },

    #[error("HARQ process {harq_id} does not exist for RNTI {rnti}")]
    UnknownHarqProcess { rnti: Rnti, harq_id: u8 },

    #[error("HARQ process {harq_id} of RNTI {rnti} is not in the expected state")]
    InactiveHarqProcess { rnti: Rnti, harq_id: u8 },

    #[error("No UL allocation recorded for slot {0}")]
    MissingUlAllocation(SfnSf),

    #[error("UL CQI for slot {sfn_sf} does not match any allocation starting at symbol {sym_start}")]
    UlCqiWithoutAllocation { sfn_sf: SfnSf, sym_start: u8 },

    #[error("Malformed BSR: {0}")]
    InvalidBsr(#[from] TableError),

    #[error("Unsupported CQI type: {0}")]
    UnsupportedCqiType(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
