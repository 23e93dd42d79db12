//! CQI / MCS Management
//!
//! Turns DL CQI reports and UL SINR measurements into per-UE MCS values and
//! falls back to the start MCS once a report is older than its validity.

use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::amc::Amc;
use super::config::SchedulerConfig;
use super::ue::{DlCqi, UeInfo, UlCqi};
use common::types::Rnti;
use interfaces::{DlCqiInfo, DlCqiType};

/// CQI bookkeeping shared by all UEs
#[derive(Debug, Clone)]
pub struct CqiManagement {
    fixed_mcs_dl: Option<u8>,
    fixed_mcs_ul: Option<u8>,
    start_mcs_dl: u8,
    start_mcs_ul: u8,
}

impl CqiManagement {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            fixed_mcs_dl: config.fixed_mcs_dl,
            fixed_mcs_ul: config.fixed_mcs_ul,
            start_mcs_dl: config.start_mcs_dl,
            start_mcs_ul: config.start_mcs_ul,
        }
    }

    /// Force both directions to `mcs` from now on
    pub fn set_fixed_mcs(&mut self, mcs: u8) {
        self.fixed_mcs_dl = Some(mcs);
        self.fixed_mcs_ul = Some(mcs);
    }

    pub fn fixed_mcs_dl(&self) -> Option<u8> {
        self.fixed_mcs_dl
    }

    pub fn fixed_mcs_ul(&self) -> Option<u8> {
        self.fixed_mcs_ul
    }

    /// MCS a new UE starts with in DL
    pub fn initial_mcs_dl(&self) -> u8 {
        self.fixed_mcs_dl.unwrap_or(self.start_mcs_dl)
    }

    /// MCS a new UE starts with in UL
    pub fn initial_mcs_ul(&self) -> u8 {
        self.fixed_mcs_ul.unwrap_or(self.start_mcs_ul)
    }

    /// Store a wideband report and derive the DL MCS from it
    pub fn dl_wb_cqi_reported(&self, info: &DlCqiInfo, ue: &mut UeInfo, expiration: u32, amc: &dyn Amc) {
        ue.dl_cqi = DlCqi {
            cqi_type: DlCqiType::Wb,
            wb_cqi: info.wb_cqi,
            timer: expiration,
        };
        ue.dl.mcs = amc.mcs_from_cqi(info.wb_cqi);
        debug!(
            "RNTI {}: DL wideband CQI {} -> MCS {}, valid for {} slots",
            ue.rnti, info.wb_cqi, ue.dl.mcs, expiration
        );
    }

    /// Sub-band DL CQI is accepted but not used
    pub fn dl_sb_cqi_reported(&self, info: &DlCqiInfo, ue: &UeInfo) {
        trace!(
            "RNTI {}: ignoring sub-band CQI report with {} entries",
            ue.rnti,
            info.sb_cqi.len()
        );
    }

    /// Store an UL measurement of an allocation of `num_sym` symbols carrying
    /// `tbs` bytes and derive the UL MCS from it
    pub fn ul_sb_cqi_reported(
        &self,
        expiration: u32,
        num_sym: u8,
        tbs: u32,
        sinr: &[f64],
        ue: &mut UeInfo,
        amc: &dyn Amc,
    ) {
        let feedback = amc.ul_cqi_from_sinr(sinr, num_sym, tbs);
        ue.ul_cqi.cqi = feedback.cqi;
        ue.ul_cqi.sinr = sinr.to_vec();
        ue.ul_cqi.timer = expiration;
        ue.ul.mcs = feedback.mcs;
        debug!(
            "RNTI {}: UL CQI {} -> MCS {}, valid for {} slots",
            ue.rnti, feedback.cqi, feedback.mcs, expiration
        );
    }

    /// Age DL reports by one slot, reverting stale ones to the start MCS
    pub fn refresh_dl_cqi_maps(&self, ues: &mut BTreeMap<Rnti, UeInfo>) {
        if self.fixed_mcs_dl.is_some() {
            return;
        }
        for ue in ues.values_mut() {
            ue.dl_cqi.timer = ue.dl_cqi.timer.saturating_sub(1);
            if ue.dl_cqi.timer == 0 && (ue.dl.mcs != self.start_mcs_dl || ue.dl_cqi.wb_cqi != 1) {
                debug!("RNTI {}: DL CQI expired, back to MCS {}", ue.rnti, self.start_mcs_dl);
                ue.dl_cqi = DlCqi::default();
                ue.dl.mcs = self.start_mcs_dl;
            }
        }
    }

    /// Age UL measurements by one slot, reverting stale ones to the start MCS
    pub fn refresh_ul_cqi_maps(&self, ues: &mut BTreeMap<Rnti, UeInfo>) {
        if self.fixed_mcs_ul.is_some() {
            return;
        }
        for ue in ues.values_mut() {
            ue.ul_cqi.timer = ue.ul_cqi.timer.saturating_sub(1);
            if ue.ul_cqi.timer == 0
                && (ue.ul.mcs != self.start_mcs_ul || ue.ul_cqi.cqi != 1 || !ue.ul_cqi.sinr.is_empty())
            {
                debug!("RNTI {}: UL CQI expired, back to MCS {}", ue.rnti, self.start_mcs_ul);
                ue.ul_cqi = UlCqi::default();
                ue.ul.mcs = self.start_mcs_ul;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::amc::TableAmc;
    use common::types::BeamId;

    fn setup() -> (CqiManagement, BTreeMap<Rnti, UeInfo>, TableAmc) {
        let config = SchedulerConfig::default();
        let cqi = CqiManagement::new(&config);
        let mut ues = BTreeMap::new();
        ues.insert(Rnti(1), UeInfo::new(Rnti(1), BeamId::default(), 4, 0, 0));
        (cqi, ues, TableAmc::default())
    }

    fn wb_report(cqi: u8) -> DlCqiInfo {
        DlCqiInfo {
            rnti: Rnti(1),
            cqi_type: DlCqiType::Wb,
            wb_cqi: cqi,
            sb_cqi: Vec::new(),
        }
    }

    #[test]
    fn test_dl_cqi_expires_exactly_at_zero() {
        let (cqi, mut ues, amc) = setup();
        let ue = ues.get_mut(&Rnti(1)).unwrap();
        cqi.dl_wb_cqi_reported(&wb_report(15), ue, 3, &amc);
        assert_eq!(ue.dl.mcs, 28);

        cqi.refresh_dl_cqi_maps(&mut ues);
        cqi.refresh_dl_cqi_maps(&mut ues);
        assert_eq!(ues[&Rnti(1)].dl.mcs, 28);
        assert_eq!(ues[&Rnti(1)].dl_cqi.timer, 1);

        cqi.refresh_dl_cqi_maps(&mut ues);
        assert_eq!(ues[&Rnti(1)].dl.mcs, 0);
        assert_eq!(ues[&Rnti(1)].dl_cqi.wb_cqi, 1);
    }

    #[test]
    fn test_fixed_mcs_ignores_refresh() {
        let (mut cqi, mut ues, _) = setup();
        cqi.set_fixed_mcs(10);
        assert_eq!(cqi.initial_mcs_dl(), 10);
        assert_eq!(cqi.initial_mcs_ul(), 10);

        ues.get_mut(&Rnti(1)).unwrap().dl.mcs = 10;
        cqi.refresh_dl_cqi_maps(&mut ues);
        cqi.refresh_ul_cqi_maps(&mut ues);
        assert_eq!(ues[&Rnti(1)].dl.mcs, 10);
    }

    #[test]
    fn test_ul_measurement() {
        let (cqi, mut ues, amc) = setup();
        let ue = ues.get_mut(&Rnti(1)).unwrap();
        cqi.ul_sb_cqi_reported(2, 1, 100, &[500.0; 4], ue, &amc);
        assert!(ue.ul.mcs > 20);
        assert_eq!(ue.ul_cqi.sinr.len(), 4);

        cqi.refresh_ul_cqi_maps(&mut ues);
        assert!(ues[&Rnti(1)].ul.mcs > 20);
        cqi.refresh_ul_cqi_maps(&mut ues);
        assert_eq!(ues[&Rnti(1)].ul.mcs, 0);
        assert_eq!(ues[&Rnti(1)].ul_cqi, UlCqi::default());
        assert_eq!(ues[&Rnti(1)].ul_cqi.cqi, 1);
    }

    #[test]
    fn test_ul_cqi_expiry_clears_record_at_start_mcs() {
        let config = SchedulerConfig {
            start_mcs_ul: 10,
            ..SchedulerConfig::default()
        };
        let cqi = CqiManagement::new(&config);
        let mut ues = BTreeMap::new();
        ues.insert(Rnti(1), UeInfo::new(Rnti(1), BeamId::default(), 4, 0, 10));

        // A measurement that maps back onto the start MCS
        let ue = ues.get_mut(&Rnti(1)).unwrap();
        ue.ul_cqi = UlCqi {
            cqi: 7,
            sinr: vec![10.0; 10],
            timer: 1,
        };
        cqi.refresh_ul_cqi_maps(&mut ues);

        let ue = &ues[&Rnti(1)];
        assert_eq!(ue.ul.mcs, 10);
        assert_eq!(ue.ul_cqi.cqi, 1);
        assert!(ue.ul_cqi.sinr.is_empty());
        assert_eq!(ue.ul_cqi.timer, 0);
    }
}
