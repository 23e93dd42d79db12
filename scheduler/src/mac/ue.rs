//! UE Representation
//!
//! Per-UE scheduler state, split into one [`LinkState`] per direction

use std::collections::BTreeMap;

use super::harq::HarqVector;
use super::lcg::LogicalChannelGroup;
use common::types::{BeamId, Direction, Rnti};
use interfaces::DlCqiType;

/// Throughput history kept by the proportional fair policy
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PfMetrics {
    /// Throughput of the tentative assignment in this pass
    pub curr_tput: f64,
    /// Running average including this pass
    pub avg_tput: f64,
    /// Average at the end of the previous pass
    pub last_avg_tput: f64,
    /// Throughput one more resource would give
    pub potential_tput: f64,
}

/// Downlink CQI record
#[derive(Debug, Clone, PartialEq)]
pub struct DlCqi {
    pub cqi_type: DlCqiType,
    pub wb_cqi: u8,
    /// Slots until the report goes stale
    pub timer: u32,
}

impl Default for DlCqi {
    fn default() -> Self {
        Self {
            cqi_type: DlCqiType::Wb,
            wb_cqi: 1,
            timer: 0,
        }
    }
}

/// Uplink CQI record. Without a valid measurement it holds wideband CQI 1
/// and no SINR.
#[derive(Debug, Clone, PartialEq)]
pub struct UlCqi {
    pub cqi: u8,
    /// Linear SINR per RB of the last measured allocation
    pub sinr: Vec<f64>,
    /// Slots until the measurement goes stale
    pub timer: u32,
}

impl Default for UlCqi {
    fn default() -> Self {
        Self {
            cqi: 1,
            sinr: Vec::new(),
            timer: 0,
        }
    }
}

/// Scheduler view of one direction of a UE
#[derive(Debug, Clone)]
pub struct LinkState {
    pub mcs: u8,
    /// RBGs tentatively assigned in this pass, summed over symbols
    pub rbg: u32,
    /// Symbols tentatively assigned in this pass
    pub sym: u8,
    /// TBS implied by the tentative assignment, in bytes
    pub tb_size: u32,
    pub lcg: BTreeMap<u8, LogicalChannelGroup>,
    pub harq: HarqVector,
    pub pf: PfMetrics,
}

impl LinkState {
    fn new(mcs: u8, num_harq_process: u8) -> Self {
        Self {
            mcs,
            rbg: 0,
            sym: 0,
            tb_size: 0,
            lcg: BTreeMap::new(),
            harq: HarqVector::new(num_harq_process),
            pf: PfMetrics::default(),
        }
    }

    /// Bytes buffered across all LCGs
    pub fn total_bytes(&self) -> u32 {
        self.lcg.values().map(LogicalChannelGroup::total_size).sum()
    }

    /// LCG holding `lc_id`
    pub fn lcg_of_lc_mut(&mut self, lc_id: u8) -> Option<&mut LogicalChannelGroup> {
        self.lcg.values_mut().find(|lcg| lcg.contains(lc_id))
    }

    /// Clear the per-pass assignment and roll the throughput average
    pub fn reset_sched_info(&mut self) {
        self.rbg = 0;
        self.sym = 0;
        self.tb_size = 0;
        self.pf.last_avg_tput = self.pf.avg_tput;
        self.pf.avg_tput = 0.0;
        self.pf.curr_tput = 0.0;
        self.pf.potential_tput = 0.0;
    }

    /// Undo the metric update of a UE that could not be granted
    pub fn reset_metric(&mut self) {
        self.tb_size = 0;
        self.pf.avg_tput = self.pf.last_avg_tput;
    }
}

/// One UE as seen by the scheduler
#[derive(Debug, Clone)]
pub struct UeInfo {
    pub rnti: Rnti,
    pub beam_id: BeamId,
    pub dl: LinkState,
    pub ul: LinkState,
    pub dl_cqi: DlCqi,
    pub ul_cqi: UlCqi,
}

impl UeInfo {
    pub fn new(rnti: Rnti, beam_id: BeamId, num_harq_process: u8, dl_mcs: u8, ul_mcs: u8) -> Self {
        Self {
            rnti,
            beam_id,
            dl: LinkState::new(dl_mcs, num_harq_process),
            ul: LinkState::new(ul_mcs, num_harq_process),
            dl_cqi: DlCqi::default(),
            ul_cqi: UlCqi::default(),
        }
    }

    pub fn link(&self, direction: Direction) -> &LinkState {
        match direction {
            Direction::Dl => &self.dl,
            Direction::Ul => &self.ul,
        }
    }

    pub fn link_mut(&mut self, direction: Direction) -> &mut LinkState {
        match direction {
            Direction::Dl => &mut self.dl,
            Direction::Ul => &mut self.ul,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::lcg::LogicalChannel;
    use common::types::LcDirection;
    use interfaces::LogicalChannelConfig;

    #[test]
    fn test_new_ue() {
        let ue = UeInfo::new(Rnti(3), BeamId::new(1, 0), 8, 5, 2);
        assert_eq!(ue.link(Direction::Dl).mcs, 5);
        assert_eq!(ue.link(Direction::Ul).mcs, 2);
        assert_eq!(ue.dl.harq.max_size(), 8);
        assert_eq!(ue.ul.harq.max_size(), 8);
        assert_eq!(ue.dl.total_bytes(), 0);
        assert_eq!(ue.dl_cqi.wb_cqi, 1);
    }

    #[test]
    fn test_total_bytes_and_lookup() {
        let mut ue = UeInfo::new(Rnti(3), BeamId::default(), 4, 0, 0);
        let mut lcg = LogicalChannelGroup::new(2);
        let mut lc = LogicalChannel::new(&LogicalChannelConfig {
            lc_id: 4,
            lcg_id: 2,
            direction: LcDirection::Dl,
            priority: 0,
        });
        lc.update(40, 0, 0);
        lcg.insert(lc);
        ue.dl.lcg.insert(2, lcg);

        assert_eq!(ue.dl.total_bytes(), 40);
        assert!(ue.dl.lcg_of_lc_mut(4).is_some());
        assert!(ue.dl.lcg_of_lc_mut(5).is_none());
    }

    #[test]
    fn test_reset_sched_info_rolls_average() {
        let mut ue = UeInfo::new(Rnti(1), BeamId::default(), 4, 0, 0);
        let link = ue.link_mut(Direction::Dl);
        link.rbg = 10;
        link.sym = 2;
        link.tb_size = 100;
        link.pf.avg_tput = 5.0;

        link.reset_sched_info();
        assert_eq!((link.rbg, link.sym, link.tb_size), (0, 0, 0));
        assert_eq!(link.pf.last_avg_tput, 5.0);
        assert_eq!(link.pf.avg_tput, 0.0);

        link.pf.avg_tput = 9.0;
        link.reset_metric();
        assert_eq!(link.pf.avg_tput, 5.0);
    }
}
