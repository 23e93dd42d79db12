//! Deterministic AMC for unit tests

use super::amc::{Amc, CqiFeedback};

/// TBS grows linearly with the RB count, independent of the MCS
pub struct LinearAmc {
    bytes_per_rb: u32,
}

impl LinearAmc {
    pub fn new(bytes_per_rb: u32) -> Self {
        Self { bytes_per_rb }
    }
}

impl Amc for LinearAmc {
    fn calculate_tb_size(&self, _mcs: u8, num_rb: u32) -> u32 {
        num_rb * self.bytes_per_rb
    }

    fn mcs_from_cqi(&self, cqi: u8) -> u8 {
        cqi.min(28)
    }

    fn ul_cqi_from_sinr(&self, sinr: &[f64], _num_sym: u8, _tbs: u32) -> CqiFeedback {
        let avg = sinr.iter().sum::<f64>() / sinr.len().max(1) as f64;
        let mcs = (avg as u8).min(28);
        CqiFeedback { cqi: mcs / 2, mcs }
    }
}
