//! Message Types for the MAC-Scheduler SAP
//!
//! Defines the configuration, report, trigger and indication messages passed
//! between the MAC and the slot scheduler

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use common::types::{BeamId, CellId, Direction, LcDirection, Rnti, SfnSf};

/// Outcome of a configuration request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SapResult {
    Success,
    Failure,
}

/// Cell configuration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellConfigReq {
    /// Cell ID
    pub cell_id: CellId,
}

/// Cell configuration confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellConfigCnf {
    pub cell_id: CellId,
    pub result: SapResult,
}

/// UE configuration request: creates the UE or updates its beam
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeConfigReq {
    pub rnti: Rnti,
    pub beam_id: BeamId,
    /// Transmission mode (single layer only)
    #[serde(default)]
    pub tx_mode: u8,
}

/// UE release request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeReleaseReq {
    pub rnti: Rnti,
}

/// One logical channel to configure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalChannelConfig {
    /// Logical channel ID
    pub lc_id: u8,
    /// Logical channel group the channel reports into
    pub lcg_id: u8,
    /// Direction(s) the channel is used in
    pub direction: LcDirection,
    /// Priority (lower is more important)
    #[serde(default)]
    pub priority: u8,
}

/// Logical channel configuration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LcConfigReq {
    pub rnti: Rnti,
    pub logical_channels: Vec<LogicalChannelConfig>,
}

/// Logical channel release request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LcReleaseReq {
    pub rnti: Rnti,
    pub lc_ids: Vec<u8>,
}

/// RLC buffer status for one downlink logical channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlRlcBufferReq {
    pub rnti: Rnti,
    pub lc_id: u8,
    /// Bytes waiting in the transmission queue
    pub tx_queue_size: u32,
    /// Bytes waiting in the retransmission queue
    #[serde(default)]
    pub retx_queue_size: u32,
    /// Size of the pending status PDU
    #[serde(default)]
    pub status_pdu_size: u32,
}

/// MAC control element received in the uplink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MacCeValue {
    /// Buffer status report: one 6-bit BSR index per LCG
    Bsr { buffer_status: [u8; 4] },
    /// Power headroom report
    Phr { power_headroom: u8 },
    /// C-RNTI control element
    Crnti,
}

/// MAC control element with its originating UE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacCeElement {
    pub rnti: Rnti,
    pub value: MacCeValue,
}

/// Uplink MAC control information request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UlMacCtrlInfoReq {
    pub sfn_sf: SfnSf,
    pub mac_ce_list: Vec<MacCeElement>,
}

/// Downlink CQI report type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DlCqiType {
    /// Wideband
    Wb,
    /// Sub-band
    Sb,
}

/// Downlink CQI report of one UE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlCqiInfo {
    pub rnti: Rnti,
    pub cqi_type: DlCqiType,
    /// Wideband CQI (0-15)
    pub wb_cqi: u8,
    /// Sub-band CQIs
    #[serde(default)]
    pub sb_cqi: Vec<u8>,
}

/// Downlink CQI information request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlCqiInfoReq {
    pub sfn_sf: SfnSf,
    pub cqi_list: Vec<DlCqiInfo>,
}

/// Uplink CQI measurement type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UlCqiType {
    Pusch,
    Srs,
}

/// Uplink CQI measurement: linear SINR per resource block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UlCqiInfo {
    pub cqi_type: UlCqiType,
    pub sinr: Vec<f64>,
}

/// Uplink CQI information request.
///
/// `sfn_sf.var_tti` carries the first symbol of the measured allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UlCqiInfoReq {
    pub sfn_sf: SfnSf,
    pub ul_cqi: UlCqiInfo,
}

/// Scheduling requests received in one slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrInfoReq {
    pub sfn_sf: SfnSf,
    pub rntis: Vec<Rnti>,
}

/// HARQ feedback status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HarqStatus {
    Ack,
    Nack,
}

/// HARQ feedback for one process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarqInfo {
    pub rnti: Rnti,
    pub harq_process_id: u8,
    pub status: HarqStatus,
}

impl HarqInfo {
    pub fn is_received_ok(&self) -> bool {
        self.status == HarqStatus::Ack
    }
}

/// Downlink slot trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlTriggerReq {
    pub sfn_sf: SfnSf,
    pub dl_harq_info: Vec<HarqInfo>,
}

/// Uplink slot trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UlTriggerReq {
    pub sfn_sf: SfnSf,
    pub ul_harq_info: Vec<HarqInfo>,
}

/// DCI format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DciFormat {
    Dl,
    Ul,
}

/// Kind of a variable-TTI block
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VarTtiType {
    Ctrl,
    Data,
}

/// Downlink control information describing one granted block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DciInfo {
    /// Addressed UE, `None` for control blocks
    pub rnti: Option<Rnti>,
    pub format: DciFormat,
    /// First symbol
    pub sym_start: u8,
    /// Number of symbols
    pub num_sym: u8,
    /// One entry per RBG of the bandwidth part
    pub rbg_bitmask: Vec<bool>,
    pub mcs: u8,
    /// Transport block size in bytes
    pub tbs: u32,
    pub harq_process: u8,
    /// New data indicator
    pub ndi: u8,
    /// Redundancy version
    pub rv: u8,
    pub tti_type: VarTtiType,
}

impl DciInfo {
    /// Control block spanning one symbol over the whole bandwidth
    pub fn ctrl(format: DciFormat, sym_start: u8, bandwidth_in_rbg: usize) -> Self {
        Self {
            rnti: None,
            format,
            sym_start,
            num_sym: 1,
            rbg_bitmask: vec![true; bandwidth_in_rbg],
            mcs: 0,
            tbs: 0,
            harq_process: 0,
            ndi: 0,
            rv: 0,
            tti_type: VarTtiType::Ctrl,
        }
    }

    /// Number of RBGs set in the bitmask
    pub fn rbg_count(&self) -> u32 {
        self.rbg_bitmask.iter().filter(|&&b| b).count() as u32
    }
}

/// RLC PDU carried in a data block
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RlcPduInfo {
    pub lc_id: u8,
    /// Size in bytes
    pub size: u32,
}

/// One time-frequency block of a slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VarTtiAllocInfo {
    pub direction: Direction,
    pub dci: DciInfo,
    #[serde(default)]
    pub rlc_pdu_info: Vec<RlcPduInfo>,
}

impl VarTtiAllocInfo {
    pub fn new(direction: Direction, dci: DciInfo) -> Self {
        Self {
            direction,
            dci,
            rlc_pdu_info: Vec::new(),
        }
    }

    pub fn is_data(&self) -> bool {
        self.dci.tti_type == VarTtiType::Data
    }
}

/// Allocation of one slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotAllocInfo {
    pub sfn_sf: SfnSf,
    /// Symbols taken by the blocks, control included
    pub num_sym_alloc: u32,
    /// Blocks in symbol order
    pub var_tti_alloc_info: VecDeque<VarTtiAllocInfo>,
}

impl SlotAllocInfo {
    pub fn new(sfn_sf: SfnSf) -> Self {
        Self {
            sfn_sf,
            num_sym_alloc: 0,
            var_tti_alloc_info: VecDeque::new(),
        }
    }

    /// Whether a data block for `rnti` is already present
    pub fn contains_rnti(&self, rnti: Rnti) -> bool {
        self.var_tti_alloc_info
            .iter()
            .any(|alloc| alloc.is_data() && alloc.dci.rnti == Some(rnti))
    }
}

/// Scheduling decision delivered to the MAC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedConfigInd {
    pub sfn_sf: SfnSf,
    pub slot_alloc_info: SlotAllocInfo,
}
