//! MAC / Scheduler Service Access Point Library
//!
//! This crate provides the in-process messages exchanged between the MAC and
//! the slot scheduler, the callback trait the scheduler reports through, and a
//! JSON-lines trace of emitted slot allocations.

pub mod message_types;
pub mod trace;

use thiserror::Error;

pub use message_types::*;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Callbacks from the scheduler towards the MAC
pub trait MacSchedSapUser: Send {
    /// Deliver the allocation computed for one slot and direction
    fn sched_config_ind(&mut self, ind: &SchedConfigInd);

    /// Confirm a cell configuration
    fn csched_cell_config_cnf(&mut self, _cnf: &CellConfigCnf) {}
}
