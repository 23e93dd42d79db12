//! UE Ordering Policies
//!
//! Round robin, proportional fair and max rate, selected once at
//! construction. Each policy ranks UEs and updates their metrics as the
//! resource assignment hands out RBGs.

use std::cmp::Ordering;
use tracing::trace;

use super::amc::Amc;
use super::config::SchedulerPolicyConfig;
use super::ue::LinkState;

/// A block of resources: RBGs (summed over symbols) and symbols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FtResources {
    pub rbg: u32,
    pub sym: u8,
}

impl FtResources {
    pub fn new(rbg: u32, sym: u8) -> Self {
        Self { rbg, sym }
    }
}

/// What the policy hooks need besides the UE
pub struct PolicyContext<'a> {
    pub amc: &'a dyn Amc,
    pub num_rb_per_rbg: u32,
}

impl PolicyContext<'_> {
    /// TBS in bytes for `mcs` over `rbg` RBGs
    pub fn tb_size(&self, mcs: u8, rbg: u32) -> u32 {
        self.amc.calculate_tb_size(mcs, rbg * self.num_rb_per_rbg)
    }
}

/// UE ordering policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerPolicy {
    RoundRobin,
    ProportionalFair { alpha: f64, time_window: f64 },
    MaxRate,
}

impl SchedulerPolicy {
    pub fn from_config(config: &SchedulerPolicyConfig) -> Self {
        match *config {
            SchedulerPolicyConfig::RoundRobin => SchedulerPolicy::RoundRobin,
            SchedulerPolicyConfig::ProportionalFair { fairness_index, last_avg_tput_weight } => {
                SchedulerPolicy::ProportionalFair {
                    alpha: fairness_index,
                    time_window: last_avg_tput_weight,
                }
            }
            SchedulerPolicyConfig::MaxRate => SchedulerPolicy::MaxRate,
        }
    }

    /// Called once per UE before a resource assignment starts
    pub fn before_sched(&self, link: &mut LinkState, assignable: FtResources, ctx: &PolicyContext) {
        if let SchedulerPolicy::ProportionalFair { .. } = self {
            let sym = assignable.sym.max(1) as f64;
            link.pf.potential_tput = ctx.tb_size(link.mcs, assignable.rbg) as f64 / sym;
        }
    }

    /// Ordering of two UEs: `Less` means `lhs` is served first
    pub fn compare(&self, lhs: &LinkState, rhs: &LinkState) -> Ordering {
        match self {
            SchedulerPolicy::RoundRobin => lhs.rbg.cmp(&rhs.rbg),
            SchedulerPolicy::MaxRate => rhs.mcs.cmp(&lhs.mcs),
            SchedulerPolicy::ProportionalFair { alpha, .. } => {
                let metric = |link: &LinkState| {
                    link.pf.potential_tput.powf(*alpha) / link.pf.avg_tput.max(1e-9)
                };
                metric(rhs).partial_cmp(&metric(lhs)).unwrap_or(Ordering::Equal)
            }
        }
    }

    /// The UE just received resources; `total` is everything it holds now
    pub fn assigned(&self, link: &mut LinkState, total: FtResources, ctx: &PolicyContext) {
        match self {
            SchedulerPolicy::ProportionalFair { time_window, .. } => {
                Self::update_pf_metric(link, total, *time_window, ctx)
            }
            _ => Self::update_metric(link, ctx),
        }
    }

    /// Another UE received resources this iteration
    pub fn not_assigned(&self, link: &mut LinkState, total: FtResources, ctx: &PolicyContext) {
        if let SchedulerPolicy::ProportionalFair { time_window, .. } = self {
            Self::update_pf_metric(link, total, *time_window, ctx);
        }
    }

    fn update_metric(link: &mut LinkState, ctx: &PolicyContext) {
        link.tb_size = ctx.tb_size(link.mcs, link.rbg);
    }

    fn update_pf_metric(link: &mut LinkState, total: FtResources, window: f64, ctx: &PolicyContext) {
        Self::update_metric(link, ctx);
        link.pf.curr_tput = if total.sym > 0 {
            link.tb_size as f64 / total.sym as f64
        } else {
            0.0
        };
        link.pf.avg_tput =
            (1.0 - 1.0 / window) * link.pf.last_avg_tput + (1.0 / window) * link.pf.curr_tput;
        trace!(
            "PF metric: curr {:.1}, avg {:.1}, last avg {:.1}",
            link.pf.curr_tput,
            link.pf.avg_tput,
            link.pf.last_avg_tput
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::amc::TableAmc;
    use crate::mac::ue::UeInfo;
    use common::types::{BeamId, Rnti};

    fn link(mcs: u8, rbg: u32) -> LinkState {
        let mut ue = UeInfo::new(Rnti(1), BeamId::default(), 4, mcs, mcs);
        ue.dl.rbg = rbg;
        ue.dl
    }

    #[test]
    fn test_round_robin_prefers_fewer_rbg() {
        let policy = SchedulerPolicy::RoundRobin;
        assert_eq!(policy.compare(&link(5, 2), &link(28, 4)), Ordering::Less);
        assert_eq!(policy.compare(&link(5, 4), &link(28, 2)), Ordering::Greater);
    }

    #[test]
    fn test_max_rate_prefers_higher_mcs() {
        let policy = SchedulerPolicy::MaxRate;
        assert_eq!(policy.compare(&link(20, 10), &link(5, 0)), Ordering::Less);
    }

    #[test]
    fn test_assigned_updates_tbs() {
        let amc = TableAmc::default();
        let ctx = PolicyContext { amc: &amc, num_rb_per_rbg: 4 };
        let policy = SchedulerPolicy::RoundRobin;
        let mut l = link(20, 10);
        policy.assigned(&mut l, FtResources::new(10, 1), &ctx);
        assert_eq!(l.tb_size, amc.calculate_tb_size(20, 40));
    }

    #[test]
    fn test_proportional_fair_prefers_starved_ue() {
        let amc = TableAmc::default();
        let ctx = PolicyContext { amc: &amc, num_rb_per_rbg: 1 };
        let policy = SchedulerPolicy::ProportionalFair { alpha: 1.0, time_window: 10.0 };

        let mut served = link(20, 0);
        let mut starved = link(20, 0);
        served.pf.last_avg_tput = 500.0;
        for l in [&mut served, &mut starved] {
            policy.before_sched(l, FtResources::new(10, 1), &ctx);
        }
        policy.not_assigned(&mut served, FtResources::new(0, 0), &ctx);
        assert!(served.pf.avg_tput > 0.0);
        assert_eq!(policy.compare(&starved, &served), Ordering::Less);

        served.rbg = 10;
        policy.assigned(&mut served, FtResources::new(10, 1), &ctx);
        assert!(served.pf.curr_tput > 0.0);
    }
}
