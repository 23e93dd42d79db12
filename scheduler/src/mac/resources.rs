//! Time-Frequency Resource Assignment
//!
//! Hands out RBGs and symbols to active UEs (TDMA for both directions,
//! optionally OFDMA in DL) and turns the tentative assignment into DCIs.

use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::amc::Amc;
use super::config::AccessMode;
use super::policy::{FtResources, PolicyContext, SchedulerPolicy};
use super::ue::UeInfo;
use common::types::{BeamId, Direction, Rnti};
use interfaces::{DciFormat, DciInfo, VarTtiType};

/// Active UEs per beam with the bytes they have buffered
pub type ActiveUeMap = BTreeMap<BeamId, Vec<(Rnti, u32)>>;

/// Symbols dedicated to each beam
pub type BeamSymbolMap = BTreeMap<BeamId, u8>;

/// Next free position in the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointInFtPlane {
    pub rbg: u32,
    pub sym: u8,
}

impl PointInFtPlane {
    pub fn new(rbg: u32, sym: u8) -> Self {
        Self { rbg, sym }
    }
}

/// Smallest transport block worth granting, in bytes
pub const MIN_TBS: u32 = 4;

/// RBG/symbol assignment and DCI construction
#[derive(Debug, Clone)]
pub struct ResourceAllocator {
    pub access: AccessMode,
    pub policy: SchedulerPolicy,
    pub bandwidth_in_rbg: u32,
    pub num_rb_per_rbg: u32,
}

impl ResourceAllocator {
    fn uses_ofdma(&self, direction: Direction) -> bool {
        self.access == AccessMode::Ofdma && direction == Direction::Dl
    }

    /// Distribute `sym_avail` symbols among the active UEs. The tentative
    /// assignment is left in each UE's link state.
    pub fn assign_rbg(
        &self,
        direction: Direction,
        sym_avail: u8,
        active: &ActiveUeMap,
        ues: &mut BTreeMap<Rnti, UeInfo>,
        amc: &dyn Amc,
    ) -> BeamSymbolMap {
        debug!(
            "{} assignment of {} symbols over {} beam(s)",
            direction,
            sym_avail,
            active.len()
        );
        if self.uses_ofdma(direction) {
            self.assign_rbg_ofdma(direction, sym_avail, active, ues, amc)
        } else {
            self.assign_rbg_tdma(direction, sym_avail, active, ues, amc)
        }
    }

    /// Give the next resource to the best UE of `ue_vec` that still needs
    /// bytes. Returns false when every UE is satisfied.
    fn assign_one(
        &self,
        direction: Direction,
        ue_vec: &mut [(Rnti, u32)],
        assigned: FtResources,
        ues: &mut BTreeMap<Rnti, UeInfo>,
        ctx: &PolicyContext,
    ) -> bool {
        ue_vec.sort_by(|a, b| match (ues.get(&a.0), ues.get(&b.0)) {
            (Some(l), Some(r)) => self.policy.compare(l.link(direction), r.link(direction)),
            _ => std::cmp::Ordering::Equal,
        });

        // Pass over UEs which can already send their whole buffer
        let chosen = ue_vec.iter().find(|(rnti, buffer)| {
            ues.get(rnti)
                .map(|ue| ue.link(direction).tb_size < *buffer)
                .unwrap_or(false)
        });
        let Some(&(chosen, _)) = chosen else {
            return false;
        };

        for (rnti, _) in ue_vec.iter() {
            let Some(ue) = ues.get_mut(rnti) else { continue };
            let link = ue.link_mut(direction);
            if *rnti == chosen {
                link.rbg += assigned.rbg;
                link.sym = if self.uses_ofdma(direction) {
                    assigned.sym
                } else {
                    link.sym + assigned.sym
                };
                let total = FtResources::new(link.rbg, link.sym);
                trace!("{} RBG over {} symbol(s) to RNTI {}", assigned.rbg, assigned.sym, rnti);
                self.policy.assigned(link, total, ctx);
            } else {
                let total = FtResources::new(link.rbg, link.sym);
                self.policy.not_assigned(link, total, ctx);
            }
        }
        true
    }

    fn assign_rbg_tdma(
        &self,
        direction: Direction,
        sym_avail: u8,
        active: &ActiveUeMap,
        ues: &mut BTreeMap<Rnti, UeInfo>,
        amc: &dyn Amc,
    ) -> BeamSymbolMap {
        let ctx = PolicyContext { amc, num_rb_per_rbg: self.num_rb_per_rbg };
        let per_symbol = FtResources::new(self.bandwidth_in_rbg, 1);
        let mut ue_vec: Vec<(Rnti, u32)> = active.values().flatten().copied().collect();

        for (rnti, _) in &ue_vec {
            if let Some(ue) = ues.get_mut(rnti) {
                self.policy.before_sched(ue.link_mut(direction), per_symbol, &ctx);
            }
        }

        let mut resources = sym_avail;
        while resources > 0 {
            if !self.assign_one(direction, &mut ue_vec, per_symbol, ues, &ctx) {
                break;
            }
            resources -= 1;
        }

        active
            .iter()
            .map(|(beam, beam_ues)| {
                let rbg: u32 = beam_ues
                    .iter()
                    .filter_map(|(rnti, _)| ues.get(rnti))
                    .map(|ue| ue.link(direction).rbg)
                    .sum();
                (*beam, (rbg / self.bandwidth_in_rbg) as u8)
            })
            .collect()
    }

    /// Symbols per beam, proportional to the bytes buffered in the beam
    fn sym_per_beam(&self, sym_avail: u8, active: &ActiveUeMap) -> BeamSymbolMap {
        let buf_total: u64 = active.values().flatten().map(|(_, b)| *b as u64).sum();
        let mut ret = BeamSymbolMap::new();
        if buf_total == 0 {
            return ret;
        }

        let mut sym_used = 0u8;
        for (beam, beam_ues) in active {
            let buf_beam: u64 = beam_ues.iter().map(|(_, b)| *b as u64).sum();
            let sym = (sym_avail as u64 * buf_beam / buf_total) as u8;
            sym_used += sym;
            ret.insert(*beam, sym);
        }

        for _ in sym_used..sym_avail {
            if let Some(min) = ret.values_mut().min_by_key(|sym| **sym) {
                *min += 1;
            }
        }
        ret
    }

    fn assign_rbg_ofdma(
        &self,
        direction: Direction,
        sym_avail: u8,
        active: &ActiveUeMap,
        ues: &mut BTreeMap<Rnti, UeInfo>,
        amc: &dyn Amc,
    ) -> BeamSymbolMap {
        let ctx = PolicyContext { amc, num_rb_per_rbg: self.num_rb_per_rbg };
        let sym_per_beam = self.sym_per_beam(sym_avail, active);

        for (beam, beam_ues) in active {
            let beam_sym = sym_per_beam.get(beam).copied().unwrap_or(0);
            if beam_sym == 0 {
                continue;
            }
            debug!("Beam {} gets {} symbol(s)", beam, beam_sym);

            // One RBG on each symbol of the beam at a time
            let per_rbg = FtResources::new(beam_sym as u32, beam_sym);
            let mut ue_vec = beam_ues.clone();
            for (rnti, _) in &ue_vec {
                if let Some(ue) = ues.get_mut(rnti) {
                    self.policy.before_sched(
                        ue.link_mut(direction),
                        FtResources::new(beam_sym as u32 * beam_sym as u32, beam_sym),
                        &ctx,
                    );
                }
            }

            for _ in 0..self.bandwidth_in_rbg {
                if !self.assign_one(direction, &mut ue_vec, per_rbg, ues, &ctx) {
                    break;
                }
            }
        }

        sym_per_beam
    }

    /// Build the DCI for the tentative assignment of `ue`, moving `spoint`.
    /// `None` if the assignment cannot carry a useful transport block.
    pub fn create_dci(
        &self,
        direction: Direction,
        spoint: &mut PointInFtPlane,
        ue: &UeInfo,
        beam_sym: u8,
        amc: &dyn Amc,
    ) -> Option<DciInfo> {
        let link = ue.link(direction);
        let tbs = amc.calculate_tb_size(link.mcs, link.rbg * self.num_rb_per_rbg);

        if self.uses_ofdma(direction) {
            if tbs <= MIN_TBS || beam_sym == 0 {
                debug!("RNTI {} assigned {} RBG but TBS {} too small", ue.rnti, link.rbg, tbs);
                return None;
            }
            let rbg_num = link.rbg / beam_sym as u32;
            let bitmask = (0..self.bandwidth_in_rbg)
                .map(|i| i >= spoint.rbg && i < spoint.rbg + rbg_num)
                .collect();
            let dci = self.dci(direction, ue.rnti, spoint.sym, beam_sym, link.mcs, tbs, bitmask);
            debug!(
                "RNTI {}: RBG {}..{} for {} symbol(s) from symbol {}",
                ue.rnti,
                spoint.rbg,
                spoint.rbg + rbg_num,
                beam_sym,
                spoint.sym
            );
            spoint.rbg += rbg_num;
            return Some(dci);
        }

        if tbs < MIN_TBS {
            debug!("RNTI {} assigned {} RBG but TBS {} too small", ue.rnti, link.rbg, tbs);
            return None;
        }
        let num_sym = ((link.rbg / self.bandwidth_in_rbg) as u8).max(1);
        let bitmask = vec![true; self.bandwidth_in_rbg as usize];

        let dci = match direction {
            Direction::Dl => {
                let dci = self.dci(direction, ue.rnti, spoint.sym, num_sym, link.mcs, tbs, bitmask);
                spoint.sym += num_sym;
                dci
            }
            Direction::Ul => {
                // UL grows backwards from the end of the data region
                spoint.sym = spoint.sym.checked_sub(num_sym)?;
                self.dci(direction, ue.rnti, spoint.sym, num_sym, link.mcs, tbs, bitmask)
            }
        };
        spoint.rbg = 0;
        debug!(
            "RNTI {}: {} DCI, symbols {}..{}, MCS {}, TBS {}",
            ue.rnti,
            direction,
            dci.sym_start,
            dci.sym_start + dci.num_sym,
            dci.mcs,
            dci.tbs
        );
        Some(dci)
    }

    /// Move the starting point to where the next beam begins
    pub fn change_beam(&self, direction: Direction, spoint: &mut PointInFtPlane, beam_sym: u8) {
        spoint.rbg = 0;
        if self.uses_ofdma(direction) {
            spoint.sym += beam_sym;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dci(
        &self,
        direction: Direction,
        rnti: Rnti,
        sym_start: u8,
        num_sym: u8,
        mcs: u8,
        tbs: u32,
        rbg_bitmask: Vec<bool>,
    ) -> DciInfo {
        DciInfo {
            rnti: Some(rnti),
            format: match direction {
                Direction::Dl => DciFormat::Dl,
                Direction::Ul => DciFormat::Ul,
            },
            sym_start,
            num_sym,
            rbg_bitmask,
            mcs,
            tbs,
            harq_process: 0,
            ndi: 1,
            rv: 0,
            tti_type: VarTtiType::Data,
        }
    }
}
