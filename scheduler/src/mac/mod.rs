//! Medium Access Control (MAC) Slot Scheduler
//!
//! Building blocks of the scheduler, leaves first: logical channel groups,
//! HARQ processes, UE state, CQI management, AMC, policies, resource
//! assignment, HARQ retransmission and new-data scheduling, and the slot
//! orchestrator that ties them together.

pub mod amc;
pub mod config;
pub mod cqi;
pub mod data;
pub mod harq;
pub mod harq_rr;
pub mod lcg;
pub mod policy;
pub mod resources;
pub mod scheduler;
pub mod ue;

#[cfg(test)]
mod test_util;

pub use amc::{Amc, AmcConfig, TableAmc};
pub use config::{AccessMode, SchedulerConfig, SchedulerPolicyConfig};
pub use scheduler::MacScheduler;
