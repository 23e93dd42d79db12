//! MAC Slot Scheduler
//!
//! Entry point of the scheduler. Ingests configuration, buffer status, CQI,
//! scheduling requests and HARQ feedback, and for every slot trigger builds
//! the slot allocation of one direction.
//!
//! UL decisions for a slot are taken `ul_sched_delay` slots before the DL
//! decisions for the same slot. The symbols the UL pass reserved are kept in a
//! side table keyed by slot, which the DL pass reads to stay clear of them and
//! which the UL CQI handler reads to find the allocation a measurement refers
//! to.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, warn};

use super::amc::Amc;
use super::config::{SchedulerConfig, MAX_MCS};
use super::cqi::CqiManagement;
use super::data::{compute_active_ue, schedule_new_data, schedule_ul_sr};
use super::harq::FeedbackOutcome;
use super::harq_rr::HarqRr;
use super::lcg::{LogicalChannel, LogicalChannelGroup};
use super::policy::SchedulerPolicy;
use super::resources::{PointInFtPlane, ResourceAllocator};
use super::ue::UeInfo;
use crate::SchedulerError;
use common::types::{Direction, Rnti, SfnSf};
use common::utils::{bsr_id_to_buffer_size, MAX_NUM_LCG};
use interfaces::{
    CellConfigCnf, CellConfigReq, DciFormat, DciInfo, DlCqiInfoReq, DlCqiType, DlRlcBufferReq,
    DlTriggerReq, HarqInfo, LcConfigReq, LcReleaseReq, MacCeValue, MacSchedSapUser, SapResult,
    SchedConfigInd, SlotAllocInfo, SrInfoReq, UeConfigReq, UeReleaseReq, UlCqiInfoReq, UlCqiType,
    UlMacCtrlInfoReq, UlTriggerReq, VarTtiAllocInfo,
};

/// One UL data allocation waiting for its CQI measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocElem {
    pub rnti: Rnti,
    pub num_rb: u32,
    pub tbs: u32,
    pub sym_start: u8,
    pub num_sym: u8,
    pub mcs: u8,
}

/// UL allocations of one slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotElem {
    /// UL data symbols reserved in the slot
    pub tot_ul_sym: u8,
    pub ul_allocations: Vec<AllocElem>,
}

/// The slot scheduler
pub struct MacScheduler {
    config: SchedulerConfig,
    amc: Box<dyn Amc>,
    allocator: ResourceAllocator,
    cqi: CqiManagement,
    harq_rr: HarqRr,
    ues: BTreeMap<Rnti, UeInfo>,
    /// NACKed processes that did not fit in their slot
    dl_harq_to_retransmit: Vec<HarqInfo>,
    ul_harq_to_retransmit: Vec<HarqInfo>,
    sr_list: VecDeque<Rnti>,
    /// Encoded slot -> UL allocations of that slot
    ul_allocation_map: BTreeMap<u64, SlotElem>,
    sap_user: Option<Box<dyn MacSchedSapUser>>,
    /// CQI validity in slots
    cqi_expiration: u32,
}

impl MacScheduler {
    /// Create a scheduler. The UL side table gets an empty entry for each
    /// slot whose DL pass runs before any UL pass could have covered it.
    pub fn new(config: SchedulerConfig, amc: Box<dyn Amc>) -> Result<Self, SchedulerError> {
        config.validate()?;

        let allocator = ResourceAllocator {
            access: config.access,
            policy: SchedulerPolicy::from_config(&config.policy),
            bandwidth_in_rbg: config.bandwidth_in_rbg,
            num_rb_per_rbg: config.num_rb_per_rbg,
        };

        let spsf = config.slots_per_subframe();
        let first = SfnSf::default().increase_no_of_slots(config.l1l2_ctrl_latency, spsf);
        let ul_allocation_map = (0..config.ul_sched_delay)
            .map(|i| (first.increase_no_of_slots(i, spsf).encode(), SlotElem::default()))
            .collect();

        info!(
            "MAC scheduler up: {} RBGs x {} data symbols, policy {:?}, access {:?}",
            config.bandwidth_in_rbg,
            config.data_symbols(),
            config.policy,
            config.access
        );

        Ok(Self {
            cqi: CqiManagement::new(&config),
            cqi_expiration: config.cqi_expiration_slots(),
            allocator,
            amc,
            harq_rr: HarqRr::new(),
            ues: BTreeMap::new(),
            dl_harq_to_retransmit: Vec::new(),
            ul_harq_to_retransmit: Vec::new(),
            sr_list: VecDeque::new(),
            ul_allocation_map,
            sap_user: None,
            config,
        })
    }

    /// Register the receiver of slot allocations and confirmations
    pub fn set_sap_user(&mut self, user: Box<dyn MacSchedSapUser>) {
        self.sap_user = Some(user);
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn ue(&self, rnti: Rnti) -> Option<&UeInfo> {
        self.ues.get(&rnti)
    }

    pub fn ues(&self) -> impl Iterator<Item = &UeInfo> {
        self.ues.values()
    }

    /// UL allocations still waiting for CQI in `sfn_sf`
    pub fn ul_allocation(&self, sfn_sf: SfnSf) -> Option<&SlotElem> {
        self.ul_allocation_map.get(&sfn_sf.with_var_tti(0).encode())
    }

    /// Slots with UL allocations still waiting for CQI
    pub fn pending_ul_slots(&self) -> usize {
        self.ul_allocation_map.len()
    }

    pub fn pending_sr(&self) -> usize {
        self.sr_list.len()
    }

    /// Cell configuration: parameters are not used and the request always
    /// succeeds
    pub fn csched_cell_config_req(&mut self, req: &CellConfigReq) -> Result<CellConfigCnf, SchedulerError> {
        info!("Cell {} configured", req.cell_id.0);
        let cnf = CellConfigCnf {
            cell_id: req.cell_id,
            result: SapResult::Success,
        };
        if let Some(user) = self.sap_user.as_mut() {
            user.csched_cell_config_cnf(&cnf);
        }
        Ok(cnf)
    }

    /// Create the UE, or move an existing UE to a new beam
    pub fn csched_ue_config_req(&mut self, req: &UeConfigReq) -> Result<(), SchedulerError> {
        match self.ues.get_mut(&req.rnti) {
            Some(ue) => {
                debug!("RNTI {} moves from beam {} to beam {}", req.rnti, ue.beam_id, req.beam_id);
                ue.beam_id = req.beam_id;
            }
            None => {
                let ue = UeInfo::new(
                    req.rnti,
                    req.beam_id,
                    self.config.num_harq_process,
                    self.cqi.initial_mcs_dl(),
                    self.cqi.initial_mcs_ul(),
                );
                info!(
                    "Creating UE {} on beam {}, MCS DL {} UL {}",
                    req.rnti, req.beam_id, ue.dl.mcs, ue.ul.mcs
                );
                self.ues.insert(req.rnti, ue);
            }
        }
        Ok(())
    }

    /// Remove the UE together with its pending requests and retransmissions
    pub fn csched_ue_release_req(&mut self, req: &UeReleaseReq) -> Result<(), SchedulerError> {
        let rnti = req.rnti;
        self.ues.remove(&rnti).ok_or(SchedulerError::UnknownUe(rnti))?;
        self.sr_list.retain(|r| *r != rnti);
        self.dl_harq_to_retransmit.retain(|fb| fb.rnti != rnti);
        self.ul_harq_to_retransmit.retain(|fb| fb.rnti != rnti);
        info!("Released UE {}", rnti);
        Ok(())
    }

    /// Add logical channels. A UL LCG keeps only its first channel since
    /// buffer status is reported per group.
    pub fn csched_lc_config_req(&mut self, req: &LcConfigReq) -> Result<(), SchedulerError> {
        let ue = self.ues.get_mut(&req.rnti).ok_or(SchedulerError::UnknownUe(req.rnti))?;

        for lc_config in &req.logical_channels {
            if lc_config.direction.has_dl() {
                ue.dl
                    .lcg
                    .entry(lc_config.lcg_id)
                    .or_insert_with(|| LogicalChannelGroup::new(lc_config.lcg_id))
                    .insert(LogicalChannel::new(lc_config));
            }
            if lc_config.direction.has_ul() {
                let lcg = ue
                    .ul
                    .lcg
                    .entry(lc_config.lcg_id)
                    .or_insert_with(|| LogicalChannelGroup::new(lc_config.lcg_id));
                if lcg.num_lc() == 0 {
                    lcg.insert(LogicalChannel::new(lc_config));
                } else {
                    debug!(
                        "RNTI {}: UL LCG {} already has a channel, LC {} not added",
                        req.rnti, lc_config.lcg_id, lc_config.lc_id
                    );
                }
            }
            info!(
                "RNTI {}: LC {} in LCG {} ({:?})",
                req.rnti, lc_config.lc_id, lc_config.lcg_id, lc_config.direction
            );
        }
        Ok(())
    }

    /// Logical channel release is accepted but has no effect
    pub fn csched_lc_release_req(&mut self, req: &LcReleaseReq) -> Result<(), SchedulerError> {
        if !self.ues.contains_key(&req.rnti) {
            return Err(SchedulerError::UnknownUe(req.rnti));
        }
        info!("RNTI {}: release of LCs {:?} ignored", req.rnti, req.lc_ids);
        Ok(())
    }

    /// Update a DL logical channel with the RLC queue sizes
    pub fn sched_dl_rlc_buffer_req(&mut self, req: &DlRlcBufferReq) -> Result<(), SchedulerError> {
        let ue = self.ues.get_mut(&req.rnti).ok_or(SchedulerError::UnknownUe(req.rnti))?;
        let lcg = ue.dl.lcg_of_lc_mut(req.lc_id).ok_or(SchedulerError::UnknownLogicalChannel {
            rnti: req.rnti,
            lc_id: req.lc_id,
        })?;
        lcg.update_from_rlc(req);
        Ok(())
    }

    /// Apply the BSRs of the list to the UL LCGs. The list is checked as a
    /// whole first, so a rejected list leaves every LCG untouched.
    pub fn sched_ul_mac_ctrl_info_req(&mut self, req: &UlMacCtrlInfoReq) -> Result<(), SchedulerError> {
        let mut reports = Vec::with_capacity(req.mac_ce_list.len());
        for element in &req.mac_ce_list {
            let MacCeValue::Bsr { buffer_status } = &element.value else {
                info!("RNTI {}: ignoring MAC CE {:?}", element.rnti, element.value);
                continue;
            };
            let rnti = element.rnti;
            let ue = self.ues.get(&rnti).ok_or(SchedulerError::UnknownUe(rnti))?;

            let mut sizes = [0u32; MAX_NUM_LCG];
            for (lcg_id, &bsr_id) in buffer_status.iter().enumerate().take(MAX_NUM_LCG) {
                let bytes = bsr_id_to_buffer_size(bsr_id)?;
                let lcg_id = lcg_id as u8;
                if bytes > 0 && !ue.ul.lcg.contains_key(&lcg_id) {
                    return Err(SchedulerError::UnknownLcg { rnti, lcg_id, bytes });
                }
                sizes[lcg_id as usize] = bytes;
            }
            reports.push((rnti, sizes));
        }

        for (rnti, sizes) in reports {
            let Some(ue) = self.ues.get_mut(&rnti) else { continue };
            for (lcg_id, bytes) in sizes.into_iter().enumerate() {
                if let Some(lcg) = ue.ul.lcg.get_mut(&(lcg_id as u8)) {
                    lcg.update_from_bsr(bytes);
                    debug!("RNTI {}: UL LCG {} reports {} bytes", rnti, lcg_id, bytes);
                }
            }
        }
        Ok(())
    }

    /// Store DL CQI reports
    pub fn sched_dl_cqi_info_req(&mut self, req: &DlCqiInfoReq) -> Result<(), SchedulerError> {
        for info in &req.cqi_list {
            let ue = self.ues.get_mut(&info.rnti).ok_or(SchedulerError::UnknownUe(info.rnti))?;
            match info.cqi_type {
                DlCqiType::Wb if self.cqi.fixed_mcs_dl().is_some() => {}
                DlCqiType::Wb => {
                    self.cqi
                        .dl_wb_cqi_reported(info, ue, self.cqi_expiration, self.amc.as_ref())
                }
                DlCqiType::Sb => self.cqi.dl_sb_cqi_reported(info, ue),
            }
        }
        Ok(())
    }

    /// Store an UL measurement. `sfn_sf.var_tti` is the first symbol of the
    /// measured allocation; the allocation is consumed and its slot entry
    /// dropped once empty.
    pub fn sched_ul_cqi_info_req(&mut self, req: &UlCqiInfoReq) -> Result<(), SchedulerError> {
        if req.ul_cqi.cqi_type != UlCqiType::Pusch {
            return Err(SchedulerError::UnsupportedCqiType(format!("{:?}", req.ul_cqi.cqi_type)));
        }

        let sym_start = req.sfn_sf.var_tti;
        let sfn_sf = req.sfn_sf.with_var_tti(0);
        let key = sfn_sf.encode();
        let elem = self
            .ul_allocation_map
            .get_mut(&key)
            .ok_or(SchedulerError::MissingUlAllocation(sfn_sf))?;
        let pos = elem
            .ul_allocations
            .iter()
            .position(|alloc| alloc.sym_start == sym_start)
            .ok_or(SchedulerError::UlCqiWithoutAllocation { sfn_sf, sym_start })?;
        let alloc = elem.ul_allocations.remove(pos);
        let now_empty = elem.ul_allocations.is_empty();

        match self.ues.get_mut(&alloc.rnti) {
            Some(ue) if self.cqi.fixed_mcs_ul().is_none() => self.cqi.ul_sb_cqi_reported(
                self.cqi_expiration,
                alloc.num_sym,
                alloc.tbs,
                &req.ul_cqi.sinr,
                ue,
                self.amc.as_ref(),
            ),
            Some(_) => {}
            None => debug!("UL CQI for released UE {} dropped", alloc.rnti),
        }

        if now_empty {
            debug!("All UL CQI of slot {} received", sfn_sf);
            self.ul_allocation_map.remove(&key);
        }
        Ok(())
    }

    /// Queue scheduling requests, once per UE
    pub fn sched_ul_sr_info_req(&mut self, req: &SrInfoReq) -> Result<(), SchedulerError> {
        for &rnti in &req.rntis {
            if !self.ues.contains_key(&rnti) {
                return Err(SchedulerError::UnknownUe(rnti));
            }
            if self.sr_list.contains(&rnti) {
                continue;
            }
            info!("UE {} asked for a SR", rnti);
            self.sr_list.push_back(rnti);
        }
        Ok(())
    }

    /// Force DL and UL MCS for UEs created from now on
    pub fn sched_set_mcs(&mut self, mcs: u8) -> Result<(), SchedulerError> {
        if mcs > MAX_MCS {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "fixed MCS {} exceeds {}",
                mcs, MAX_MCS
            )));
        }
        self.cqi.set_fixed_mcs(mcs);
        info!("MCS fixed to {}", mcs);
        Ok(())
    }

    /// Build the DL allocation of `req.sfn_sf`
    pub fn dl_trigger_req(&mut self, req: &DlTriggerReq) -> Result<SchedConfigInd, SchedulerError> {
        self.cqi.refresh_dl_cqi_maps(&mut self.ues);
        self.reset_expired_harq(Direction::Dl);
        let feedback = self.process_feedback(Direction::Dl, &req.dl_harq_info)?;
        let ind = self.schedule_dl(req.sfn_sf, &feedback)?;
        self.deliver(&ind);
        Ok(ind)
    }

    /// Build the UL allocation of `req.sfn_sf`
    pub fn ul_trigger_req(&mut self, req: &UlTriggerReq) -> Result<SchedConfigInd, SchedulerError> {
        self.cqi.refresh_ul_cqi_maps(&mut self.ues);
        self.reset_expired_harq(Direction::Ul);
        let feedback = self.process_feedback(Direction::Ul, &req.ul_harq_info)?;
        let ind = self.schedule_ul(req.sfn_sf, &feedback)?;
        self.deliver(&ind);
        Ok(ind)
    }

    fn deliver(&mut self, ind: &SchedConfigInd) {
        if let Some(user) = self.sap_user.as_mut() {
            user.sched_config_ind(ind);
        }
    }

    fn reset_expired_harq(&mut self, direction: Direction) {
        let timeout = self.config.harq_timeout_slots;
        for ue in self.ues.values_mut() {
            let expired = ue.link_mut(direction).harq.reset_expired(timeout);
            if !expired.is_empty() {
                info!("RNTI {}: {} HARQ process(es) {:?} expired", ue.rnti, direction, expired);
            }
        }
    }

    /// Merge the carried-over retransmissions with the new feedback, drop
    /// late and duplicated entries, apply the rest. Returns the NACKs.
    fn process_feedback(
        &mut self,
        direction: Direction,
        incoming: &[HarqInfo],
    ) -> Result<Vec<HarqInfo>, SchedulerError> {
        let mut merged = std::mem::take(match direction {
            Direction::Dl => &mut self.dl_harq_to_retransmit,
            Direction::Ul => &mut self.ul_harq_to_retransmit,
        });
        if merged.is_empty() && incoming.is_empty() {
            return Ok(merged);
        }
        debug!(
            "{}: {} HARQ to retransmit, {} feedback received",
            direction,
            merged.len(),
            incoming.len()
        );
        merged.extend_from_slice(incoming);

        let mut seen = BTreeSet::new();
        let mut nacks = Vec::new();
        for fb in merged {
            let ue = self.ues.get_mut(&fb.rnti).ok_or(SchedulerError::UnknownUe(fb.rnti))?;
            let harq = &mut ue.link_mut(direction).harq;
            let active = harq
                .get(fb.harq_process_id)
                .ok_or(SchedulerError::UnknownHarqProcess {
                    rnti: fb.rnti,
                    harq_id: fb.harq_process_id,
                })?
                .active;
            if !active {
                warn!(
                    "{} feedback for RNTI {} process {} ignored: process inactive",
                    direction, fb.rnti, fb.harq_process_id
                );
                continue;
            }
            if !seen.insert((fb.rnti, fb.harq_process_id)) {
                warn!(
                    "{} feedback for RNTI {} process {} ignored: duplicate",
                    direction, fb.rnti, fb.harq_process_id
                );
                continue;
            }

            match harq.apply_feedback(fb.harq_process_id, fb.is_received_ok(), self.config.max_rv) {
                FeedbackOutcome::Erased => {}
                FeedbackOutcome::Retransmit => {
                    info!("{} NACK for RNTI {} process {}", direction, fb.rnti, fb.harq_process_id);
                    nacks.push(fb);
                }
            }
        }
        Ok(nacks)
    }

    fn schedule_dl(&mut self, sfn_sf: SfnSf, feedback: &[HarqInfo]) -> Result<SchedConfigInd, SchedulerError> {
        let key = sfn_sf.with_var_tti(0).encode();
        let tot_ul_sym = self
            .ul_allocation_map
            .get(&key)
            .map(|elem| elem.tot_ul_sym)
            .ok_or(SchedulerError::MissingUlAllocation(sfn_sf))?;

        let bandwidth = self.config.bandwidth_in_rbg as usize;
        let dl_ctrl = self.config.dl_ctrl_symbols;
        let mut slot = SlotAllocInfo::new(sfn_sf);
        for sym in 0..dl_ctrl {
            slot.var_tti_alloc_info
                .push_back(VarTtiAllocInfo::new(Direction::Dl, DciInfo::ctrl(DciFormat::Dl, sym, bandwidth)));
        }
        slot.num_sym_alloc += dl_ctrl as u32;

        let mut spoint = PointInFtPlane::new(0, dl_ctrl);
        let mut sym_avail = self.config.data_symbols().saturating_sub(tot_ul_sym);
        debug!(
            "DL slot {}: {} symbols from symbol {}, {} UL symbols reserved",
            sfn_sf, sym_avail, dl_ctrl, tot_ul_sym
        );

        let active_harq = HarqRr::compute_active_harq(Direction::Dl, feedback, &self.ues)?;
        if !active_harq.is_empty() {
            let used = self.harq_rr.schedule_dl_harq(
                &mut spoint,
                sym_avail,
                &active_harq,
                &mut self.ues,
                &mut self.dl_harq_to_retransmit,
                &mut slot,
            )?;
            sym_avail -= used;
        }

        let active = compute_active_ue(Direction::Dl, &self.ues, &slot);
        if sym_avail > 0 && !active.is_empty() {
            schedule_new_data(
                Direction::Dl,
                &self.allocator,
                &mut spoint,
                sym_avail,
                &active,
                &mut self.ues,
                self.amc.as_ref(),
                &mut slot,
            )?;
        }

        if tot_ul_sym == 0 {
            debug!("Slot {} has no UL data, dropping its UL entry", sfn_sf);
            self.ul_allocation_map.remove(&key);
        }

        info!(
            "DL slot {}: {} block(s), {} symbol(s)",
            sfn_sf,
            slot.var_tti_alloc_info.len(),
            slot.num_sym_alloc
        );
        Ok(SchedConfigInd { sfn_sf, slot_alloc_info: slot })
    }

    fn schedule_ul(&mut self, sfn_sf: SfnSf, feedback: &[HarqInfo]) -> Result<SchedConfigInd, SchedulerError> {
        let data_symbols = self.config.data_symbols();
        let last_sym = self.config.symbols_per_slot - self.config.ul_ctrl_symbols;
        let mut slot = SlotAllocInfo::new(sfn_sf);
        let mut spoint = PointInFtPlane::new(0, last_sym);
        let mut sym_avail = data_symbols;

        let active_harq = HarqRr::compute_active_harq(Direction::Ul, feedback, &self.ues)?;
        if !active_harq.is_empty() {
            let used = self.harq_rr.schedule_ul_harq(
                &mut spoint,
                sym_avail,
                &active_harq,
                &mut self.ues,
                &mut self.ul_harq_to_retransmit,
                &mut slot,
            )?;
            sym_avail -= used;
        }

        if sym_avail > 0 && !self.sr_list.is_empty() {
            let used = schedule_ul_sr(
                &self.allocator,
                &mut spoint,
                sym_avail,
                &mut self.sr_list,
                &mut self.ues,
                self.amc.as_ref(),
                &mut slot,
            )?;
            sym_avail -= used;
        }

        let active = compute_active_ue(Direction::Ul, &self.ues, &slot);
        if sym_avail > 0 && !active.is_empty() {
            let used = schedule_new_data(
                Direction::Ul,
                &self.allocator,
                &mut spoint,
                sym_avail,
                &active,
                &mut self.ues,
                self.amc.as_ref(),
                &mut slot,
            )?;
            sym_avail -= used;
        }

        let num_rb = self.config.bandwidth_in_rbg * self.config.num_rb_per_rbg;
        let elem = self.ul_allocation_map.entry(sfn_sf.with_var_tti(0).encode()).or_default();
        for alloc in slot.var_tti_alloc_info.iter().filter(|a| a.is_data()) {
            let Some(rnti) = alloc.dci.rnti else { continue };
            elem.ul_allocations.push(AllocElem {
                rnti,
                num_rb,
                tbs: alloc.dci.tbs,
                sym_start: alloc.dci.sym_start,
                num_sym: alloc.dci.num_sym,
                mcs: alloc.dci.mcs,
            });
            elem.tot_ul_sym += alloc.dci.num_sym;
        }
        if elem.tot_ul_sym != data_symbols - sym_avail {
            return Err(SchedulerError::InvalidState(format!(
                "slot {} records {} UL symbols but {} were used",
                sfn_sf,
                elem.tot_ul_sym,
                data_symbols - sym_avail
            )));
        }
        debug!(
            "UL slot {}: {} symbol(s) over {} allocation(s) recorded",
            sfn_sf,
            elem.tot_ul_sym,
            elem.ul_allocations.len()
        );

        let bandwidth = self.config.bandwidth_in_rbg as usize;
        for sym in last_sym..self.config.symbols_per_slot {
            slot.var_tti_alloc_info
                .push_back(VarTtiAllocInfo::new(Direction::Ul, DciInfo::ctrl(DciFormat::Ul, sym, bandwidth)));
        }
        slot.num_sym_alloc += self.config.ul_ctrl_symbols as u32;

        info!(
            "UL slot {}: {} block(s), {} symbol(s)",
            sfn_sf,
            slot.var_tti_alloc_info.len(),
            slot.num_sym_alloc
        );
        Ok(SchedConfigInd { sfn_sf, slot_alloc_info: slot })
    }
}
