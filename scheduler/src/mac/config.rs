//! Scheduler Configuration
//!
//! Fixed at setup and validated before the scheduler is built

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::SchedulerError;
use common::types::SubcarrierSpacing;

/// Highest MCS index of the supported tables
pub const MAX_MCS: u8 = 28;

/// Policy used to rank UEs when handing out resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerPolicyConfig {
    /// Equalize the RBGs given to each UE
    #[default]
    RoundRobin,
    /// Potential throughput weighted against the average throughput
    ProportionalFair {
        /// Exponent applied to the potential throughput (alpha)
        #[serde(default)]
        fairness_index: f64,
        /// Averaging window in slots
        #[serde(default = "default_last_avg_tput_weight")]
        last_avg_tput_weight: f64,
    },
    /// Highest MCS first
    MaxRate,
}

fn default_last_avg_tput_weight() -> f64 {
    99.0
}

/// How the data region of a slot is shared between beams and UEs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Whole symbols per UE
    #[default]
    Tdma,
    /// RBG ranges per UE within the symbols of its beam (downlink only)
    Ofdma,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Subcarrier spacing of the bandwidth part
    #[serde(default)]
    pub scs: SubcarrierSpacing,
    /// Symbols per slot
    #[serde(default = "default_symbols_per_slot")]
    pub symbols_per_slot: u8,
    /// Symbols reserved for DL control at the start of the slot
    #[serde(default = "default_ctrl_symbols")]
    pub dl_ctrl_symbols: u8,
    /// Symbols reserved for UL control at the end of the slot
    #[serde(default = "default_ctrl_symbols")]
    pub ul_ctrl_symbols: u8,
    /// Resource blocks per RBG
    #[serde(default = "default_num_rb_per_rbg")]
    pub num_rb_per_rbg: u32,
    /// RBGs in the bandwidth part
    #[serde(default = "default_bandwidth_in_rbg")]
    pub bandwidth_in_rbg: u32,
    /// HARQ processes per UE per direction
    #[serde(default = "default_num_harq_process")]
    pub num_harq_process: u8,
    /// Slots a HARQ process may wait for feedback before it is dropped
    #[serde(default = "default_harq_timeout_slots")]
    pub harq_timeout_slots: u32,
    /// Redundancy version after which a NACKed block is given up
    #[serde(default = "default_max_rv")]
    pub max_rv: u8,
    /// Slots between a DL decision and its transmission
    #[serde(default = "default_l1l2_ctrl_latency")]
    pub l1l2_ctrl_latency: u32,
    /// Extra slots UL decisions are taken ahead of DL ones
    #[serde(default = "default_ul_sched_delay")]
    pub ul_sched_delay: u32,
    /// Validity of a CQI report in microseconds
    #[serde(default = "default_cqi_timer_threshold_us")]
    pub cqi_timer_threshold_us: u64,
    /// Forced DL MCS, CQI reports are ignored when set
    #[serde(default)]
    pub fixed_mcs_dl: Option<u8>,
    /// Forced UL MCS, CQI reports are ignored when set
    #[serde(default)]
    pub fixed_mcs_ul: Option<u8>,
    /// DL MCS used without a valid CQI
    #[serde(default)]
    pub start_mcs_dl: u8,
    /// UL MCS used without a valid CQI
    #[serde(default)]
    pub start_mcs_ul: u8,
    #[serde(default)]
    pub policy: SchedulerPolicyConfig,
    #[serde(default)]
    pub access: AccessMode,
}

fn default_symbols_per_slot() -> u8 {
    14
}

fn default_ctrl_symbols() -> u8 {
    1
}

fn default_num_rb_per_rbg() -> u32 {
    1
}

fn default_bandwidth_in_rbg() -> u32 {
    66
}

fn default_num_harq_process() -> u8 {
    20
}

fn default_harq_timeout_slots() -> u32 {
    20
}

fn default_max_rv() -> u8 {
    3
}

fn default_l1l2_ctrl_latency() -> u32 {
    2
}

fn default_ul_sched_delay() -> u32 {
    2
}

fn default_cqi_timer_threshold_us() -> u64 {
    1_000_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scs: SubcarrierSpacing::default(),
            symbols_per_slot: default_symbols_per_slot(),
            dl_ctrl_symbols: default_ctrl_symbols(),
            ul_ctrl_symbols: default_ctrl_symbols(),
            num_rb_per_rbg: default_num_rb_per_rbg(),
            bandwidth_in_rbg: default_bandwidth_in_rbg(),
            num_harq_process: default_num_harq_process(),
            harq_timeout_slots: default_harq_timeout_slots(),
            max_rv: default_max_rv(),
            l1l2_ctrl_latency: default_l1l2_ctrl_latency(),
            ul_sched_delay: default_ul_sched_delay(),
            cqi_timer_threshold_us: default_cqi_timer_threshold_us(),
            fixed_mcs_dl: None,
            fixed_mcs_ul: None,
            start_mcs_dl: 0,
            start_mcs_ul: 0,
            policy: SchedulerPolicyConfig::default(),
            access: AccessMode::default(),
        }
    }
}

impl SchedulerConfig {
    /// Reject combinations the scheduler cannot run with
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let ctrl = self.dl_ctrl_symbols as u32 + self.ul_ctrl_symbols as u32;
        if ctrl >= self.symbols_per_slot as u32 {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "{} control symbols leave no data symbol in a {}-symbol slot",
                ctrl, self.symbols_per_slot
            )));
        }
        if self.bandwidth_in_rbg == 0 || self.num_rb_per_rbg == 0 {
            return Err(SchedulerError::InvalidConfiguration(
                "bandwidth part needs at least one RBG of at least one RB".to_string(),
            ));
        }
        if self.num_harq_process == 0 {
            return Err(SchedulerError::InvalidConfiguration(
                "at least one HARQ process is required".to_string(),
            ));
        }
        for (name, mcs) in [
            ("start_mcs_dl", Some(self.start_mcs_dl)),
            ("start_mcs_ul", Some(self.start_mcs_ul)),
            ("fixed_mcs_dl", self.fixed_mcs_dl),
            ("fixed_mcs_ul", self.fixed_mcs_ul),
        ] {
            if let Some(mcs) = mcs {
                if mcs > MAX_MCS {
                    return Err(SchedulerError::InvalidConfiguration(format!(
                        "{} = {} exceeds maximum MCS {}",
                        name, mcs, MAX_MCS
                    )));
                }
            }
        }
        if self.cqi_timer_threshold_us < self.scs.slot_duration_us() {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "CQI timer threshold {} us is shorter than one slot ({} us)",
                self.cqi_timer_threshold_us,
                self.scs.slot_duration_us()
            )));
        }
        if let SchedulerPolicyConfig::ProportionalFair { last_avg_tput_weight, fairness_index } =
            self.policy
        {
            if last_avg_tput_weight < 1.0 || fairness_index < 0.0 {
                return Err(SchedulerError::InvalidConfiguration(format!(
                    "proportional fair needs window >= 1 and alpha >= 0 (window {}, alpha {})",
                    last_avg_tput_weight, fairness_index
                )));
            }
        }

        debug!(
            "Scheduler config valid: {} data symbols, {} RBGs, policy {:?}, access {:?}",
            self.data_symbols(),
            self.bandwidth_in_rbg,
            self.policy,
            self.access
        );
        Ok(())
    }

    /// Symbols left for DL and UL data once control is reserved
    pub fn data_symbols(&self) -> u8 {
        self.symbols_per_slot - self.dl_ctrl_symbols - self.ul_ctrl_symbols
    }

    /// CQI validity in slots
    pub fn cqi_expiration_slots(&self) -> u32 {
        (self.cqi_timer_threshold_us / self.scs.slot_duration_us()) as u32
    }

    pub fn slots_per_subframe(&self) -> u16 {
        self.scs.slots_per_subframe()
    }
}
