//! New Data Scheduling
//!
//! Finds the UEs with buffered bytes, lets the resource allocator size their
//! grants, opens HARQ processes and distributes each transport block over the
//! logical channels. Also serves uplink scheduling requests.

use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, trace};

use super::amc::Amc;
use super::harq::HarqProcess;
use super::lcg::LogicalChannelGroup;
use super::resources::{ActiveUeMap, PointInFtPlane, ResourceAllocator, MIN_TBS};
use super::ue::UeInfo;
use crate::SchedulerError;
use common::types::{Direction, Rnti};
use interfaces::{DciInfo, RlcPduInfo, SlotAllocInfo, VarTtiAllocInfo};

/// Bytes of a transport block given to one logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignation {
    pub lcg_id: u8,
    pub lc_id: u8,
    pub bytes: u32,
}

/// UEs with bytes to send, no grant in `slot_alloc` yet and a free HARQ
/// process, grouped by beam
pub fn compute_active_ue(
    direction: Direction,
    ues: &BTreeMap<Rnti, UeInfo>,
    slot_alloc: &SlotAllocInfo,
) -> ActiveUeMap {
    let mut active = ActiveUeMap::new();
    for ue in ues.values() {
        let link = ue.link(direction);
        let bytes = link.total_bytes();
        if bytes == 0 || slot_alloc.contains_rnti(ue.rnti) {
            continue;
        }
        if !link.harq.can_insert() {
            debug!("RNTI {} has {} bytes but no free {} HARQ process", ue.rnti, bytes, direction);
            continue;
        }
        trace!("RNTI {} active in {} with {} bytes", ue.rnti, direction, bytes);
        active.entry(ue.beam_id).or_default().push((ue.rnti, bytes));
    }
    active
}

/// Split `tbs` bytes over the channels, LCG by LCG and LC by LC, each
/// channel taking as much as it holds
pub fn assign_bytes_to_lc(lcgs: &BTreeMap<u8, LogicalChannelGroup>, tbs: u32) -> Vec<Assignation> {
    let mut ret = Vec::new();
    let mut tbs_left = tbs;

    for (&lcg_id, lcg) in lcgs {
        if tbs_left == 0 {
            break;
        }
        let mut lcg_left = lcg.total_size();
        if lcg_left == 0 {
            continue;
        }
        for lc_id in lcg.lc_ids() {
            let lc_bytes = lcg.lc_total_size(lc_id);
            if lc_bytes == 0 {
                continue;
            }
            let amount = tbs_left.min(lcg_left).min(lc_bytes);
            tbs_left -= amount;
            lcg_left -= amount;
            ret.push(Assignation { lcg_id, lc_id, bytes: amount });

            if tbs_left == 0 || lcg_left == 0 {
                break;
            }
        }
    }
    ret
}

/// Open a HARQ process for `dci`, drain the UE buffers into it and place the
/// block in the slot
fn commit_grant(
    direction: Direction,
    ue: &mut UeInfo,
    mut dci: DciInfo,
    fill_lcs: bool,
    slot_alloc: &mut SlotAllocInfo,
) -> Result<(), SchedulerError> {
    let rnti = ue.rnti;
    let link = ue.link_mut(direction);
    let harq_id = link
        .harq
        .insert(HarqProcess::new(dci.clone()))
        .ok_or(SchedulerError::HarqVectorFull { rnti, direction })?;
    dci.harq_process = harq_id;

    let mut alloc = VarTtiAllocInfo::new(direction, dci.clone());
    if fill_lcs {
        for assignation in assign_bytes_to_lc(&link.lcg, dci.tbs) {
            alloc.rlc_pdu_info.push(RlcPduInfo {
                lc_id: assignation.lc_id,
                size: assignation.bytes,
            });
            if let Some(lcg) = link.lcg.get_mut(&assignation.lcg_id) {
                lcg.assigned_data(assignation.lc_id, assignation.bytes);
            }
        }
    }

    if let Some(process) = link.harq.get_mut(harq_id) {
        process.dci = Some(dci);
        process.rlc_pdu_info = alloc.rlc_pdu_info.clone();
    }

    debug!(
        "RNTI {}: new {} block, HARQ {}, {} PDU(s)",
        rnti,
        direction,
        harq_id,
        alloc.rlc_pdu_info.len()
    );
    match direction {
        Direction::Dl => slot_alloc.var_tti_alloc_info.push_back(alloc),
        Direction::Ul => slot_alloc.var_tti_alloc_info.push_front(alloc),
    }
    Ok(())
}

/// Grant new data to the active UEs within `sym_avail` symbols starting at
/// `spoint` (forward in DL, backward in UL). Returns the symbols used.
#[allow(clippy::too_many_arguments)]
pub fn schedule_new_data(
    direction: Direction,
    allocator: &ResourceAllocator,
    spoint: &mut PointInFtPlane,
    sym_avail: u8,
    active: &ActiveUeMap,
    ues: &mut BTreeMap<Rnti, UeInfo>,
    amc: &dyn Amc,
    slot_alloc: &mut SlotAllocInfo,
) -> Result<u8, SchedulerError> {
    let start = spoint.sym;
    let sym_per_beam = allocator.assign_rbg(direction, sym_avail, active, ues, amc);

    for (beam, beam_ues) in active {
        let beam_sym = sym_per_beam.get(beam).copied().unwrap_or(0);
        if beam_sym == 0 {
            debug!("Beam {} got no symbols in {}", beam, direction);
            continue;
        }

        let mut assigned = false;
        for (rnti, _) in beam_ues {
            let ue = ues.get_mut(rnti).ok_or(SchedulerError::UnknownUe(*rnti))?;
            if ue.link(direction).rbg == 0 {
                continue;
            }
            let Some(dci) = allocator.create_dci(direction, spoint, ue, beam_sym, amc) else {
                ue.link_mut(direction).reset_metric();
                continue;
            };
            commit_grant(direction, ue, dci, true, slot_alloc)?;
            assigned = true;
        }

        if assigned {
            allocator.change_beam(direction, spoint, beam_sym);
        }
    }

    for (rnti, _) in active.values().flatten() {
        if let Some(ue) = ues.get_mut(rnti) {
            ue.link_mut(direction).reset_sched_info();
        }
    }

    let used = spoint.sym.abs_diff(start);
    slot_alloc.num_sym_alloc += used as u32;
    Ok(used)
}

/// Give each UE with a pending scheduling request the fewest whole symbols
/// that carry a transport block of at least [`MIN_TBS`] bytes. UEs that
/// cannot be served go back to the queue. Returns the symbols used.
#[allow(clippy::too_many_arguments)]
pub fn schedule_ul_sr(
    allocator: &ResourceAllocator,
    spoint: &mut PointInFtPlane,
    sym_avail: u8,
    sr_list: &mut VecDeque<Rnti>,
    ues: &mut BTreeMap<Rnti, UeInfo>,
    amc: &dyn Amc,
    slot_alloc: &mut SlotAllocInfo,
) -> Result<u8, SchedulerError> {
    let mut sym_left = sym_avail;
    let mut not_scheduled = Vec::new();

    while sym_left > 0 {
        let Some(rnti) = sr_list.pop_front() else { break };
        let ue = ues.get_mut(&rnti).ok_or(SchedulerError::UnknownUe(rnti))?;
        if !ue.ul.harq.can_insert() {
            not_scheduled.push(rnti);
            continue;
        }

        let mut tbs = 0;
        while sym_left > 0 && tbs < MIN_TBS {
            ue.ul.rbg += allocator.bandwidth_in_rbg;
            ue.ul.sym += 1;
            sym_left -= 1;
            tbs = amc.calculate_tb_size(ue.ul.mcs, ue.ul.rbg * allocator.num_rb_per_rbg);
        }

        let dci = if tbs >= MIN_TBS {
            allocator.create_dci(Direction::Ul, spoint, ue, ue.ul.sym, amc)
        } else {
            None
        };
        match dci {
            Some(dci) => {
                info!("SR of RNTI {} served with {} symbol(s), TBS {}", rnti, dci.num_sym, dci.tbs);
                slot_alloc.num_sym_alloc += dci.num_sym as u32;
                commit_grant(Direction::Ul, ue, dci, false, slot_alloc)?;
            }
            None => {
                debug!("SR of RNTI {} cannot reach {} bytes, retrying next slot", rnti, MIN_TBS);
                sym_left += ue.ul.sym;
                not_scheduled.push(rnti);
            }
        }
        ue.ul.reset_sched_info();
    }

    sr_list.extend(not_scheduled);
    Ok(sym_avail - sym_left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::config::AccessMode;
    use crate::mac::lcg::LogicalChannel;
    use crate::mac::policy::SchedulerPolicy;
    use crate::mac::test_util::LinearAmc;
    use common::types::{BeamId, LcDirection, SfnSf};
    use interfaces::LogicalChannelConfig;

    fn lcg_with(lcg_id: u8, lcs: &[(u8, u32)]) -> LogicalChannelGroup {
        let mut lcg = LogicalChannelGroup::new(lcg_id);
        for &(lc_id, bytes) in lcs {
            let mut lc = LogicalChannel::new(&LogicalChannelConfig {
                lc_id,
                lcg_id,
                direction: LcDirection::Both,
                priority: 0,
            });
            lc.update(bytes, 0, 0);
            lcg.insert(lc);
        }
        lcg
    }

    fn allocator() -> ResourceAllocator {
        ResourceAllocator {
            access: AccessMode::Tdma,
            policy: SchedulerPolicy::RoundRobin,
            bandwidth_in_rbg: 10,
            num_rb_per_rbg: 1,
        }
    }

    fn ue_with_bytes(rnti: u16, beam: BeamId, dl: u32, ul: u32) -> UeInfo {
        let mut ue = UeInfo::new(Rnti(rnti), beam, 4, 5, 5);
        ue.dl.lcg.insert(1, lcg_with(1, &[(3, dl)]));
        ue.ul.lcg.insert(1, lcg_with(1, &[(3, ul)]));
        ue
    }

    #[test]
    fn test_assign_bytes_conserves() {
        let lcgs: BTreeMap<u8, LogicalChannelGroup> = [
            (0, lcg_with(0, &[(1, 30), (2, 0), (3, 50)])),
            (1, lcg_with(1, &[(4, 100)])),
        ]
        .into();

        let small = assign_bytes_to_lc(&lcgs, 60);
        assert_eq!(
            small,
            vec![
                Assignation { lcg_id: 0, lc_id: 1, bytes: 30 },
                Assignation { lcg_id: 0, lc_id: 3, bytes: 30 },
            ]
        );

        for tbs in [0, 1, 79, 80, 81, 179, 180, 1000] {
            let out = assign_bytes_to_lc(&lcgs, tbs);
            let total: u32 = out.iter().map(|a| a.bytes).sum();
            assert!(total <= tbs);
            assert_eq!(total, tbs.min(180));
            for a in &out {
                assert!(a.bytes > 0);
                assert!(a.bytes <= lcgs[&a.lcg_id].lc_total_size(a.lc_id));
            }
        }
    }

    #[test]
    fn test_active_ue_excludes_scheduled_and_empty() {
        let beam = BeamId::default();
        let ues: BTreeMap<Rnti, UeInfo> = [
            (Rnti(1), ue_with_bytes(1, beam, 100, 0)),
            (Rnti(2), ue_with_bytes(2, beam, 0, 0)),
            (Rnti(3), ue_with_bytes(3, beam, 100, 0)),
        ]
        .into();

        let mut slot = SlotAllocInfo::new(SfnSf::default());
        let mut dci = DciInfo::ctrl(interfaces::DciFormat::Dl, 1, 10);
        dci.rnti = Some(Rnti(3));
        dci.tti_type = interfaces::VarTtiType::Data;
        slot.var_tti_alloc_info.push_back(VarTtiAllocInfo::new(Direction::Dl, dci));

        let active = compute_active_ue(Direction::Dl, &ues, &slot);
        assert_eq!(active[&beam], vec![(Rnti(1), 100)]);
        assert!(compute_active_ue(Direction::Ul, &ues, &slot).is_empty());
    }

    #[test]
    fn test_new_data_drains_buffer() {
        let amc = LinearAmc::new(10);
        let beam = BeamId::default();
        let mut ues: BTreeMap<Rnti, UeInfo> = [(Rnti(1), ue_with_bytes(1, beam, 250, 0))].into();
        let mut slot = SlotAllocInfo::new(SfnSf::default());
        let active = compute_active_ue(Direction::Dl, &ues, &slot);

        let mut spoint = PointInFtPlane::new(0, 1);
        let used = schedule_new_data(
            Direction::Dl, &allocator(), &mut spoint, 12, &active, &mut ues, &amc, &mut slot,
        )
        .unwrap();

        // 3 symbols of 100 bytes cover 250 bytes
        assert_eq!(used, 3);
        assert_eq!(slot.num_sym_alloc, 3);
        let alloc = &slot.var_tti_alloc_info[0];
        assert_eq!(alloc.dci.tbs, 300);
        assert_eq!(alloc.rlc_pdu_info, vec![RlcPduInfo { lc_id: 3, size: 250 }]);

        let ue = &ues[&Rnti(1)];
        assert_eq!(ue.dl.total_bytes(), 0);
        assert_eq!(ue.dl.harq.active_count(), 1);
        assert_eq!(ue.dl.rbg, 0);
        let process = ue.dl.harq.find(alloc.dci.harq_process).unwrap();
        assert_eq!(process.rlc_pdu_info, alloc.rlc_pdu_info);
    }

    #[test]
    fn test_ul_data_and_sr_stack_backward() {
        let amc = LinearAmc::new(10);
        let beam = BeamId::default();
        let mut ues: BTreeMap<Rnti, UeInfo> = [
            (Rnti(1), ue_with_bytes(1, beam, 0, 150)),
            (Rnti(2), ue_with_bytes(2, beam, 0, 0)),
        ]
        .into();
        let mut slot = SlotAllocInfo::new(SfnSf::default());
        let mut spoint = PointInFtPlane::new(0, 13);
        let mut sr_list: VecDeque<Rnti> = [Rnti(2)].into();

        let sr_used = schedule_ul_sr(
            &allocator(), &mut spoint, 12, &mut sr_list, &mut ues, &amc, &mut slot,
        )
        .unwrap();
        assert_eq!(sr_used, 1);
        assert!(sr_list.is_empty());
        assert!(slot.var_tti_alloc_info[0].rlc_pdu_info.is_empty());

        let active = compute_active_ue(Direction::Ul, &ues, &slot);
        let used = schedule_new_data(
            Direction::Ul, &allocator(), &mut spoint, 11, &active, &mut ues, &amc, &mut slot,
        )
        .unwrap();
        assert_eq!(used, 2);
        assert_eq!(spoint.sym, 10);

        let starts: Vec<(Option<Rnti>, u8)> = slot
            .var_tti_alloc_info
            .iter()
            .map(|a| (a.dci.rnti, a.dci.sym_start))
            .collect();
        assert_eq!(starts, vec![(Some(Rnti(1)), 10), (Some(Rnti(2)), 12)]);
        assert_eq!(ues[&Rnti(1)].ul.total_bytes(), 0);
    }

    #[test]
    fn test_sr_without_usable_tbs_is_requeued() {
        let amc = LinearAmc::new(0);
        let mut ues: BTreeMap<Rnti, UeInfo> =
            [(Rnti(4), ue_with_bytes(4, BeamId::default(), 0, 0))].into();
        let mut slot = SlotAllocInfo::new(SfnSf::default());
        let mut spoint = PointInFtPlane::new(0, 13);
        let mut sr_list: VecDeque<Rnti> = [Rnti(4)].into();

        let used = schedule_ul_sr(
            &allocator(), &mut spoint, 3, &mut sr_list, &mut ues, &amc, &mut slot,
        )
        .unwrap();
        assert_eq!(used, 0);
        assert_eq!(sr_list, VecDeque::from([Rnti(4)]));
        assert!(slot.var_tti_alloc_info.is_empty());
        assert_eq!(ues[&Rnti(4)].ul.harq.active_count(), 0);
    }
}
