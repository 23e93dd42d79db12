//! HARQ Retransmission Scheduling (Round Robin)
//!
//! Places NACKed transport blocks back into the slot before any new data.
//! Beams are visited in rotating order; within a beam the UE waiting longest
//! goes first, lower process id first within a UE. Blocks that do not fit
//! are carried over to the next slot.

use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, trace};

use super::harq::HarqProcessStatus;
use super::resources::PointInFtPlane;
use super::ue::UeInfo;
use crate::SchedulerError;
use common::types::{BeamId, Direction, Rnti};
use interfaces::{HarqInfo, SlotAllocInfo, VarTtiAllocInfo};

/// Feedbacks waiting for a retransmission, per beam, in service order
pub type ActiveHarqMap = BTreeMap<BeamId, Vec<HarqInfo>>;

/// Round robin HARQ retransmission scheduler
#[derive(Debug, Default)]
pub struct HarqRr {
    beam_queue: VecDeque<BeamId>,
}

impl HarqRr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group the retransmission candidates of `feedback` by beam. Every entry
    /// must point at an active process waiting for a retransmission.
    pub fn compute_active_harq(
        direction: Direction,
        feedback: &[HarqInfo],
        ues: &BTreeMap<Rnti, UeInfo>,
    ) -> Result<ActiveHarqMap, SchedulerError> {
        let mut first_seen: BTreeMap<Rnti, usize> = BTreeMap::new();
        let mut active = ActiveHarqMap::new();

        for (idx, fb) in feedback.iter().enumerate() {
            let ue = ues.get(&fb.rnti).ok_or(SchedulerError::UnknownUe(fb.rnti))?;
            let process = ue.link(direction).harq.find(fb.harq_process_id).ok_or(
                SchedulerError::InactiveHarqProcess { rnti: fb.rnti, harq_id: fb.harq_process_id },
            )?;
            if process.status != HarqProcessStatus::ReceivedFeedback {
                return Err(SchedulerError::InactiveHarqProcess {
                    rnti: fb.rnti,
                    harq_id: fb.harq_process_id,
                });
            }
            first_seen.entry(fb.rnti).or_insert(idx);
            active.entry(ue.beam_id).or_default().push(*fb);
        }

        for list in active.values_mut() {
            list.sort_by_key(|fb| (first_seen.get(&fb.rnti).copied(), fb.harq_process_id));
        }
        Ok(active)
    }

    /// Beams of `active` in service order for this slot
    fn beam_order(&mut self, active: &ActiveHarqMap) -> Vec<BeamId> {
        for beam in active.keys() {
            if !self.beam_queue.contains(beam) {
                self.beam_queue.push_back(*beam);
            }
        }
        let order = self
            .beam_queue
            .iter()
            .filter(|beam| active.contains_key(beam))
            .copied()
            .collect();
        self.beam_queue.rotate_left(1);
        order
    }

    /// Schedule DL retransmissions forward from `spoint`. Returns the symbols
    /// used; what does not fit lands in `to_retransmit`.
    pub fn schedule_dl_harq(
        &mut self,
        spoint: &mut PointInFtPlane,
        sym_avail: u8,
        active: &ActiveHarqMap,
        ues: &mut BTreeMap<Rnti, UeInfo>,
        to_retransmit: &mut Vec<HarqInfo>,
        slot_alloc: &mut SlotAllocInfo,
    ) -> Result<u8, SchedulerError> {
        self.schedule_harq(Direction::Dl, spoint, sym_avail, active, ues, to_retransmit, slot_alloc)
    }

    /// Schedule UL retransmissions backward from `spoint`
    pub fn schedule_ul_harq(
        &mut self,
        spoint: &mut PointInFtPlane,
        sym_avail: u8,
        active: &ActiveHarqMap,
        ues: &mut BTreeMap<Rnti, UeInfo>,
        to_retransmit: &mut Vec<HarqInfo>,
        slot_alloc: &mut SlotAllocInfo,
    ) -> Result<u8, SchedulerError> {
        self.schedule_harq(Direction::Ul, spoint, sym_avail, active, ues, to_retransmit, slot_alloc)
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule_harq(
        &mut self,
        direction: Direction,
        spoint: &mut PointInFtPlane,
        sym_avail: u8,
        active: &ActiveHarqMap,
        ues: &mut BTreeMap<Rnti, UeInfo>,
        to_retransmit: &mut Vec<HarqInfo>,
        slot_alloc: &mut SlotAllocInfo,
    ) -> Result<u8, SchedulerError> {
        let mut sym_left = sym_avail;
        let mut served: HashSet<Rnti> = HashSet::new();

        for beam in self.beam_order(active) {
            let Some(list) = active.get(&beam) else { continue };
            for fb in list {
                let ue = ues.get_mut(&fb.rnti).ok_or(SchedulerError::UnknownUe(fb.rnti))?;
                let process = ue.link_mut(direction).harq.get_mut(fb.harq_process_id).ok_or(
                    SchedulerError::UnknownHarqProcess { rnti: fb.rnti, harq_id: fb.harq_process_id },
                )?;
                let Some(prev) = process.dci.as_ref() else {
                    return Err(SchedulerError::InvalidState(format!(
                        "HARQ process {} of RNTI {} has no DCI",
                        fb.harq_process_id, fb.rnti
                    )));
                };

                // One DL retransmission per UE per slot
                if direction == Direction::Dl && served.contains(&fb.rnti) {
                    trace!("RNTI {} already has a DL retransmission, deferring", fb.rnti);
                    to_retransmit.push(*fb);
                    continue;
                }
                if sym_left < prev.num_sym {
                    trace!(
                        "RNTI {} HARQ {} needs {} symbols, {} left",
                        fb.rnti,
                        fb.harq_process_id,
                        prev.num_sym,
                        sym_left
                    );
                    to_retransmit.push(*fb);
                    continue;
                }

                let mut dci = prev.clone();
                dci.rv += 1;
                dci.ndi = 0;
                dci.harq_process = fb.harq_process_id;
                match direction {
                    Direction::Dl => {
                        dci.sym_start = spoint.sym;
                        spoint.sym += dci.num_sym;
                    }
                    Direction::Ul => {
                        spoint.sym -= dci.num_sym;
                        dci.sym_start = spoint.sym;
                    }
                }
                sym_left -= dci.num_sym;

                process.status = HarqProcessStatus::WaitingFeedback;
                process.timer = 0;
                process.dci = Some(dci.clone());

                debug!(
                    "{} retransmission for RNTI {} HARQ {}: symbols {}..{}, rv {}",
                    direction,
                    fb.rnti,
                    fb.harq_process_id,
                    dci.sym_start,
                    dci.sym_start + dci.num_sym,
                    dci.rv
                );

                let num_sym = dci.num_sym;
                let mut alloc = VarTtiAllocInfo::new(direction, dci);
                alloc.rlc_pdu_info = process.rlc_pdu_info.clone();
                match direction {
                    Direction::Dl => slot_alloc.var_tti_alloc_info.push_back(alloc),
                    Direction::Ul => slot_alloc.var_tti_alloc_info.push_front(alloc),
                }
                slot_alloc.num_sym_alloc += num_sym as u32;
                served.insert(fb.rnti);
            }
        }

        Ok(sym_avail - sym_left)
    }
}
