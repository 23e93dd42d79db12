//! End-to-end slot scenarios driven through the scheduler SAP

use common::types::{BeamId, Direction, LcDirection, Rnti, SfnSf};
use interfaces::{
    DciInfo, DlCqiInfo, DlCqiInfoReq, DlCqiType, DlRlcBufferReq, DlTriggerReq, HarqInfo,
    HarqStatus, LcConfigReq, LogicalChannelConfig, MacCeElement, MacCeValue, SchedConfigInd,
    UeConfigReq, UlCqiInfo, UlCqiInfoReq, UlCqiType, UlMacCtrlInfoReq, UlTriggerReq,
    VarTtiAllocInfo, VarTtiType,
};
use scheduler::mac::amc::CqiFeedback;
use scheduler::{AccessMode, Amc, MacScheduler, SchedulerConfig, SchedulerPolicyConfig};

/// 120 bytes per RB whatever the MCS: one symbol of 10 RBG carries 1200 bytes
struct FlatAmc;

impl Amc for FlatAmc {
    fn calculate_tb_size(&self, _mcs: u8, num_rb: u32) -> u32 {
        num_rb * 120
    }

    fn mcs_from_cqi(&self, cqi: u8) -> u8 {
        cqi.min(28)
    }

    fn ul_cqi_from_sinr(&self, _sinr: &[f64], _num_sym: u8, _tbs: u32) -> CqiFeedback {
        CqiFeedback { cqi: 7, mcs: 10 }
    }
}

struct Harness {
    sched: MacScheduler,
    sfn: SfnSf,
}

impl Harness {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            sched: MacScheduler::new(config, Box::new(FlatAmc)).unwrap(),
            sfn: SfnSf::new(0, 0, 4, 0),
        }
    }

    fn default_config() -> SchedulerConfig {
        SchedulerConfig {
            bandwidth_in_rbg: 10,
            num_harq_process: 4,
            ..Default::default()
        }
    }

    fn add_ue(&mut self, rnti: u16, beam: BeamId) {
        self.sched
            .csched_ue_config_req(&UeConfigReq { rnti: Rnti(rnti), beam_id: beam, tx_mode: 0 })
            .unwrap();
        self.sched
            .csched_lc_config_req(&LcConfigReq {
                rnti: Rnti(rnti),
                logical_channels: vec![LogicalChannelConfig {
                    lc_id: 1,
                    lcg_id: 0,
                    direction: LcDirection::Both,
                    priority: 1,
                }],
            })
            .unwrap();
    }

    fn dl_buffer(&mut self, rnti: u16, bytes: u32) {
        self.sched
            .sched_dl_rlc_buffer_req(&DlRlcBufferReq {
                rnti: Rnti(rnti),
                lc_id: 1,
                tx_queue_size: bytes,
                retx_queue_size: 0,
                status_pdu_size: 0,
            })
            .unwrap();
    }

    fn ul_bsr(&mut self, rnti: u16, bsr_id: u8) {
        self.sched
            .sched_ul_mac_ctrl_info_req(&UlMacCtrlInfoReq {
                sfn_sf: self.sfn,
                mac_ce_list: vec![MacCeElement {
                    rnti: Rnti(rnti),
                    value: MacCeValue::Bsr { buffer_status: [bsr_id, 0, 0, 0] },
                }],
            })
            .unwrap();
    }

    /// UL then DL pass for the current slot, then move to the next slot
    fn slot(&mut self, dl_harq_info: Vec<HarqInfo>, ul_harq_info: Vec<HarqInfo>) -> (SchedConfigInd, SchedConfigInd) {
        let sfn_sf = self.sfn;
        let ul = self.sched.ul_trigger_req(&UlTriggerReq { sfn_sf, ul_harq_info }).unwrap();
        let dl = self.sched.dl_trigger_req(&DlTriggerReq { sfn_sf, dl_harq_info }).unwrap();
        self.sfn = sfn_sf.increase_no_of_slots(1, self.sched.config().slots_per_subframe());
        (ul, dl)
    }

    fn dl_cqi(&mut self, reports: &[(u16, u8)]) {
        let cqi_list = reports
            .iter()
            .map(|&(rnti, wb_cqi)| DlCqiInfo {
                rnti: Rnti(rnti),
                cqi_type: DlCqiType::Wb,
                wb_cqi,
                sb_cqi: vec![],
            })
            .collect();
        self.sched
            .sched_dl_cqi_info_req(&DlCqiInfoReq { sfn_sf: self.sfn, cqi_list })
            .unwrap();
    }

    fn dl_bytes(&self, rnti: u16) -> u32 {
        self.sched.ue(Rnti(rnti)).unwrap().dl.total_bytes()
    }

    fn dl_harq_active(&self, rnti: u16) -> usize {
        self.sched.ue(Rnti(rnti)).unwrap().dl.harq.active_count()
    }
}

fn data(ind: &SchedConfigInd) -> Vec<&VarTtiAllocInfo> {
    ind.slot_alloc_info.var_tti_alloc_info.iter().filter(|a| a.is_data()).collect()
}

fn dci_of(blocks: &[&VarTtiAllocInfo], rnti: u16) -> DciInfo {
    blocks.iter().find(|a| a.dci.rnti == Some(Rnti(rnti))).unwrap().dci.clone()
}

/// Both the symbol ranges and the RBG masks of the two blocks intersect
fn overlaps(a: &DciInfo, b: &DciInfo) -> bool {
    let sym = a.sym_start < b.sym_start + b.num_sym && b.sym_start < a.sym_start + a.num_sym;
    sym && a.rbg_bitmask.iter().zip(&b.rbg_bitmask).any(|(x, y)| *x && *y)
}

fn nack(rnti: u16, id: u8) -> HarqInfo {
    HarqInfo { rnti: Rnti(rnti), harq_process_id: id, status: HarqStatus::Nack }
}

fn ack(rnti: u16, id: u8) -> HarqInfo {
    HarqInfo { rnti: Rnti(rnti), harq_process_id: id, status: HarqStatus::Ack }
}

#[test]
fn test_idle_ue_never_scheduled() {
    let mut h = Harness::new(Harness::default_config());
    h.add_ue(1, BeamId::default());

    for _ in 0..20 {
        let (ul, dl) = h.slot(vec![], vec![]);
        assert!(data(&ul).is_empty());
        assert!(data(&dl).is_empty());
    }
    assert_eq!(h.dl_harq_active(1), 0);
}

#[test]
fn test_single_dci_drains_buffer() {
    let mut h = Harness::new(Harness::default_config());
    h.add_ue(1, BeamId::default());
    h.dl_buffer(1, 1000);

    let (_, dl) = h.slot(vec![], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 1);
    let dci = &blocks[0].dci;
    assert_eq!((dci.num_sym, dci.tbs, dci.rv, dci.ndi), (1, 1200, 0, 1));
    assert_eq!(blocks[0].rlc_pdu_info.iter().map(|p| p.size).sum::<u32>(), 1000);
    assert_eq!(h.dl_bytes(1), 0);
    assert_eq!(h.dl_harq_active(1), 1);

    let (_, dl) = h.slot(vec![], vec![]);
    assert!(data(&dl).is_empty());
}

/// Four transmissions so that HARQ process 3 is in flight
fn harness_with_process_3() -> (Harness, interfaces::DciInfo) {
    let mut h = Harness::new(Harness::default_config());
    h.add_ue(1, BeamId::default());
    let mut last = None;
    for _ in 0..4 {
        h.dl_buffer(1, 500);
        let (_, dl) = h.slot(vec![], vec![]);
        last = Some(data(&dl)[0].dci.clone());
    }
    let original = last.unwrap();
    assert_eq!(original.harq_process, 3);
    assert_eq!(h.dl_harq_active(1), 4);
    (h, original)
}

#[test]
fn test_nack_triggers_retransmission() {
    let (mut h, original) = harness_with_process_3();

    let (_, dl) = h.slot(vec![nack(1, 3)], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 1);
    let retx = &blocks[0].dci;
    assert_eq!(retx.harq_process, 3);
    assert_eq!(retx.rv, original.rv + 1);
    assert_eq!(retx.ndi, 0);
    assert_eq!((retx.tbs, retx.mcs, retx.num_sym), (original.tbs, original.mcs, original.num_sym));
    assert_eq!(retx.rbg_bitmask, original.rbg_bitmask);
    assert_eq!(blocks[0].rlc_pdu_info.iter().map(|p| p.size).sum::<u32>(), 500);
    assert_eq!(h.dl_harq_active(1), 4);
}

#[test]
fn test_ack_erases_process() {
    let (mut h, _) = harness_with_process_3();

    let (_, dl) = h.slot(vec![ack(1, 3)], vec![]);
    assert!(data(&dl).is_empty());
    assert_eq!(h.dl_harq_active(1), 3);
    assert!(h.sched.ue(Rnti(1)).unwrap().dl.harq.find(3).is_none());
}

#[test]
fn test_nack_until_max_rv_gives_up() {
    let (mut h, _) = harness_with_process_3();
    for rv in 1..=3 {
        let (_, dl) = h.slot(vec![nack(1, 3)], vec![]);
        assert_eq!(data(&dl)[0].dci.rv, rv);
    }
    // Fourth NACK arrives at rv 3
    let (_, dl) = h.slot(vec![nack(1, 3)], vec![]);
    assert!(data(&dl).is_empty());
    assert_eq!(h.dl_harq_active(1), 3);
}

#[test]
fn test_repeated_ack_erases_once() {
    let mut h = Harness::new(Harness::default_config());
    h.add_ue(1, BeamId::default());
    h.dl_buffer(1, 100);
    h.slot(vec![], vec![]);
    h.dl_buffer(1, 100);
    h.slot(vec![], vec![]);
    assert_eq!(h.dl_harq_active(1), 2);

    h.slot(vec![ack(1, 0), ack(1, 0)], vec![]);
    assert_eq!(h.dl_harq_active(1), 1);
    h.slot(vec![ack(1, 0)], vec![]);
    assert_eq!(h.dl_harq_active(1), 1);
}

#[test]
fn test_two_beams_one_symbol() {
    let config = SchedulerConfig {
        symbols_per_slot: 3,
        ..Harness::default_config()
    };
    let mut h = Harness::new(config);
    h.add_ue(1, BeamId::new(0, 0));
    h.add_ue(2, BeamId::new(1, 0));
    h.dl_buffer(1, 1000);
    h.dl_buffer(2, 1000);

    let (_, dl) = h.slot(vec![], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 1);
    let served = blocks[0].dci.rnti.unwrap();
    let waiting = if served == Rnti(1) { 2 } else { 1 };
    assert_eq!(h.dl_bytes(served.0), 0);
    assert_eq!(h.dl_bytes(waiting), 1000);

    let (_, dl) = h.slot(vec![], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].dci.rnti, Some(Rnti(waiting)));
}

#[test]
fn test_harq_timeout_frees_process() {
    let config = SchedulerConfig {
        num_harq_process: 1,
        harq_timeout_slots: 3,
        ..Harness::default_config()
    };
    let mut h = Harness::new(config);
    h.add_ue(1, BeamId::default());
    h.dl_buffer(1, 100);
    let (_, dl) = h.slot(vec![], vec![]);
    assert_eq!(data(&dl)[0].dci.harq_process, 0);

    // Buffer waits behind the only process
    h.dl_buffer(1, 100);
    for _ in 0..3 {
        let (_, dl) = h.slot(vec![], vec![]);
        assert!(data(&dl).is_empty());
        assert_eq!(h.dl_harq_active(1), 1);
    }

    let (_, dl) = h.slot(vec![], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].dci.harq_process, 0);
    assert_eq!(h.dl_bytes(1), 0);
}

#[test]
fn test_slot_layout_order() {
    let mut h = Harness::new(Harness::default_config());
    h.add_ue(1, BeamId::new(0, 0));
    h.add_ue(2, BeamId::new(1, 0));
    h.add_ue(3, BeamId::new(0, 0));

    for step in 0..6u32 {
        h.dl_buffer(1, 1500);
        h.dl_buffer(2, 800 + step * 100);
        h.ul_bsr(2, 40);
        h.ul_bsr(3, 30);

        let dl_fb = if step == 2 { vec![nack(1, 0), nack(2, 0)] } else { vec![] };
        let ul_fb = if step == 3 { vec![nack(3, 0)] } else { vec![] };
        let (ul, dl) = h.slot(dl_fb, ul_fb);

        let rank = |a: &VarTtiAllocInfo| match (a.direction, a.dci.tti_type) {
            (Direction::Dl, VarTtiType::Ctrl) => 0,
            (Direction::Dl, VarTtiType::Data) => 1,
            (Direction::Ul, VarTtiType::Data) => 2,
            (Direction::Ul, VarTtiType::Ctrl) => 3,
        };
        let slot: Vec<&VarTtiAllocInfo> = dl
            .slot_alloc_info
            .var_tti_alloc_info
            .iter()
            .chain(ul.slot_alloc_info.var_tti_alloc_info.iter())
            .collect();

        for pair in slot.windows(2) {
            assert!(rank(pair[0]) <= rank(pair[1]));
            assert!(pair[0].dci.sym_start <= pair[1].dci.sym_start);
        }
        // TDMA: blocks never share a symbol
        for pair in slot.windows(2) {
            assert!(pair[0].dci.sym_start + pair[0].dci.num_sym <= pair[1].dci.sym_start);
        }
        let last = slot.last().unwrap();
        assert_eq!(last.dci.sym_start + last.dci.num_sym, 14);
    }
}

#[test]
fn test_ofdma_beams_share_slot_without_overlap() {
    let config = SchedulerConfig {
        access: AccessMode::Ofdma,
        ..Harness::default_config()
    };
    let mut h = Harness::new(config);
    h.add_ue(1, BeamId::new(0, 0));
    h.add_ue(2, BeamId::new(0, 0));
    h.add_ue(3, BeamId::new(1, 0));
    h.dl_buffer(1, 2000);
    h.dl_buffer(2, 1000);
    h.dl_buffer(3, 1500);
    h.ul_bsr(3, 30);

    let (ul, dl) = h.slot(vec![], vec![]);
    let ul_blocks = data(&ul);
    assert_eq!(ul_blocks.len(), 1);
    let ul_start = ul_blocks[0].dci.sym_start;
    assert_eq!(ul_start, 12);

    let blocks = data(&dl);
    assert_eq!(blocks.len(), 3);
    for (i, a) in blocks.iter().enumerate() {
        assert!(a.dci.sym_start >= 1);
        assert!(a.dci.sym_start + a.dci.num_sym <= ul_start);
        for b in &blocks[i + 1..] {
            assert!(!overlaps(&a.dci, &b.dci));
        }
    }

    // 11 symbols split 3000:1500 between the beams, leftover to the smaller one
    let (ue1, ue2, ue3) = (dci_of(&blocks, 1), dci_of(&blocks, 2), dci_of(&blocks, 3));
    assert_eq!((ue1.sym_start, ue1.num_sym), (1, 7));
    assert_eq!((ue2.sym_start, ue2.num_sym), (1, 7));
    assert_eq!((ue3.sym_start, ue3.num_sym), (8, 4));
    let rbgs = |dci: &DciInfo| dci.rbg_bitmask.iter().filter(|b| **b).count();
    assert_eq!((rbgs(&ue1), rbgs(&ue2), rbgs(&ue3)), (3, 2, 4));
    assert_eq!((ue1.tbs, ue2.tbs, ue3.tbs), (2520, 1680, 1920));
    for rnti in 1..=3 {
        assert_eq!(h.dl_bytes(rnti), 0);
    }

    let (_, dl) = h.slot(vec![nack(1, 0)], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 1);
    let retx = &blocks[0].dci;
    assert_eq!(retx.rnti, Some(Rnti(1)));
    assert_eq!((retx.ndi, retx.rv), (0, 1));
    assert_eq!(retx.rbg_bitmask, ue1.rbg_bitmask);
    assert_eq!((retx.sym_start, retx.num_sym, retx.tbs), (1, 7, 2520));
}

#[test]
fn test_proportional_fair_serves_starved_ue() {
    let config = SchedulerConfig {
        policy: SchedulerPolicyConfig::ProportionalFair {
            fairness_index: 1.0,
            last_avg_tput_weight: 10.0,
        },
        ..Harness::default_config()
    };
    let mut h = Harness::new(config);
    h.add_ue(1, BeamId::default());
    h.add_ue(2, BeamId::default());

    // UE 1 builds up an average throughput on its own
    for _ in 0..3 {
        h.dl_buffer(1, 1000);
        let (_, dl) = h.slot(vec![], vec![]);
        assert_eq!(dci_of(&data(&dl), 1).num_sym, 1);
    }

    h.dl_buffer(1, 20000);
    h.dl_buffer(2, 20000);
    let (_, dl) = h.slot(vec![], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 2);
    assert_eq!(dci_of(&blocks, 1).num_sym, 1);
    assert_eq!(dci_of(&blocks, 2).num_sym, 11);
}

#[test]
fn test_max_rate_gives_slot_to_best_channel() {
    let config = SchedulerConfig {
        policy: SchedulerPolicyConfig::MaxRate,
        ..Harness::default_config()
    };
    let mut h = Harness::new(config);
    h.add_ue(1, BeamId::default());
    h.add_ue(2, BeamId::default());
    h.dl_cqi(&[(1, 5), (2, 12)]);
    h.dl_buffer(1, 20000);
    h.dl_buffer(2, 20000);

    let (_, dl) = h.slot(vec![], vec![]);
    let blocks = data(&dl);
    assert_eq!(blocks.len(), 1);
    let dci = &blocks[0].dci;
    assert_eq!(dci.rnti, Some(Rnti(2)));
    assert_eq!((dci.mcs, dci.num_sym), (12, 12));
    assert_eq!(h.dl_bytes(1), 20000);
}

#[test]
fn test_ul_cqi_expiry_restores_defaults() {
    let config = SchedulerConfig {
        cqi_timer_threshold_us: 250,
        start_mcs_ul: 3,
        ..Harness::default_config()
    };
    let mut h = Harness::new(config);
    h.add_ue(1, BeamId::default());
    h.ul_bsr(1, 30);

    let sfn_sf = h.sfn;
    let (ul, _) = h.slot(vec![], vec![]);
    let grant = dci_of(&data(&ul), 1);
    assert_eq!(grant.mcs, 3);
    h.sched
        .sched_ul_cqi_info_req(&UlCqiInfoReq {
            sfn_sf: sfn_sf.with_var_tti(grant.sym_start),
            ul_cqi: UlCqiInfo { cqi_type: UlCqiType::Pusch, sinr: vec![20.0; 10] },
        })
        .unwrap();
    let ue = h.sched.ue(Rnti(1)).unwrap();
    assert_eq!((ue.ul_cqi.cqi, ue.ul.mcs), (7, 10));

    // Two slots of validity at 125 us per slot
    h.slot(vec![], vec![]);
    assert_eq!(h.sched.ue(Rnti(1)).unwrap().ul_cqi.cqi, 7);
    h.slot(vec![], vec![]);
    let ue = h.sched.ue(Rnti(1)).unwrap();
    assert_eq!(ue.ul_cqi.cqi, 1);
    assert!(ue.ul_cqi.sinr.is_empty());
    assert_eq!(ue.ul.mcs, 3);
}
