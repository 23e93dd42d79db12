//! Adaptive Modulation and Coding
//!
//! The scheduler consumes link adaptation through the [`Amc`] trait.
//! [`TableAmc`] maps CQI and SINR to MCS through spectral efficiency tables
//! and derives transport block sizes from the MCS code rate.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::config::MAX_MCS;

/// Spectral efficiency reached by each CQI index
const SPECTRAL_EFFICIENCY_FOR_CQI: [f64; 16] = [
    0.0, 0.15, 0.23, 0.38, 0.6, 0.88, 1.18, 1.48, 1.91, 2.41, 2.73, 3.32, 3.9, 4.52, 5.12, 5.55,
];

/// Spectral efficiency required by each MCS index
const SPECTRAL_EFFICIENCY_FOR_MCS: [f64; 29] = [
    0.15, 0.19, 0.23, 0.31, 0.38, 0.49, 0.6, 0.74, 0.88, 1.03, 1.18, 1.33, 1.48, 1.7, 1.91, 2.16,
    2.41, 2.57, 2.73, 3.03, 3.32, 3.61, 3.9, 4.21, 4.52, 4.82, 5.12, 5.33, 5.55,
];

/// Effective code rate of each MCS index
const MCS_ECR: [f64; 29] = [
    0.08, 0.1, 0.11, 0.15, 0.19, 0.24, 0.3, 0.37, 0.44, 0.51, 0.3, 0.33, 0.37, 0.42, 0.48, 0.54,
    0.6, 0.43, 0.45, 0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.89, 0.92,
];

/// Largest code block before segmentation, in bits
const MAX_CODE_BLOCK_SIZE: u32 = 6144;

/// Bits per modulation symbol of an MCS index
fn modulation_order(mcs: u8) -> u32 {
    match mcs {
        0..=9 => 2,
        10..=16 => 4,
        _ => 6,
    }
}

/// CQI and MCS derived from a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqiFeedback {
    pub cqi: u8,
    pub mcs: u8,
}

/// Link adaptation service used by the scheduler
pub trait Amc: Send + Sync {
    /// Transport block size in bytes for `mcs` over `num_rb` resource blocks
    /// (RBs summed over all assigned symbols)
    fn calculate_tb_size(&self, mcs: u8, num_rb: u32) -> u32;

    /// MCS usable for a reported wideband CQI
    fn mcs_from_cqi(&self, cqi: u8) -> u8;

    /// CQI and MCS for an uplink allocation measured with per-RB linear SINR
    fn ul_cqi_from_sinr(&self, sinr: &[f64], num_sym: u8, tbs: u32) -> CqiFeedback;
}

/// Parameters of the table based AMC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmcConfig {
    /// Subcarriers per resource block
    #[serde(default = "default_num_sc_per_rb")]
    pub num_sc_per_rb: u32,
    /// Reference signal subcarriers per resource block
    #[serde(default = "default_num_ref_sc_per_rb")]
    pub num_ref_sc_per_rb: u32,
    /// Target bit error rate
    #[serde(default = "default_ber")]
    pub ber: f64,
    /// CRC length in bits
    #[serde(default = "default_crc_len")]
    pub crc_len: u32,
}

fn default_num_sc_per_rb() -> u32 {
    12
}

fn default_num_ref_sc_per_rb() -> u32 {
    1
}

fn default_ber() -> f64 {
    0.00005
}

fn default_crc_len() -> u32 {
    24
}

impl Default for AmcConfig {
    fn default() -> Self {
        Self {
            num_sc_per_rb: default_num_sc_per_rb(),
            num_ref_sc_per_rb: default_num_ref_sc_per_rb(),
            ber: default_ber(),
            crc_len: default_crc_len(),
        }
    }
}

/// Table based AMC
#[derive(Debug, Clone)]
pub struct TableAmc {
    config: AmcConfig,
}

impl TableAmc {
    pub fn new(config: AmcConfig) -> Self {
        Self { config }
    }

    /// Highest MCS whose required efficiency does not exceed `se`
    fn mcs_from_spectral_efficiency(se: f64) -> u8 {
        let mut mcs = 0u8;
        while mcs < MAX_MCS && SPECTRAL_EFFICIENCY_FOR_MCS[mcs as usize + 1] <= se {
            mcs += 1;
        }
        mcs
    }

    /// Highest CQI whose efficiency does not exceed `se`
    fn cqi_from_spectral_efficiency(se: f64) -> u8 {
        let mut cqi = 0u8;
        while (cqi as usize) < SPECTRAL_EFFICIENCY_FOR_CQI.len() - 1
            && SPECTRAL_EFFICIENCY_FOR_CQI[cqi as usize + 1] <= se
        {
            cqi += 1;
        }
        cqi
    }
}

impl Default for TableAmc {
    fn default() -> Self {
        Self::new(AmcConfig::default())
    }
}

impl Amc for TableAmc {
    fn calculate_tb_size(&self, mcs: u8, num_rb: u32) -> u32 {
        let mcs = mcs.min(MAX_MCS);
        let useful_sc = self.config.num_sc_per_rb.saturating_sub(self.config.num_ref_sc_per_rb);
        let bits = (useful_sc * num_rb * modulation_order(mcs)) as f64 * MCS_ECR[mcs as usize];
        let bits = bits as u32;
        let crc = self.config.crc_len;

        let mut tb_bits = bits.saturating_sub(crc);
        if tb_bits > MAX_CODE_BLOCK_SIZE {
            let code_blocks = tb_bits.div_ceil(MAX_CODE_BLOCK_SIZE);
            tb_bits = bits.saturating_sub(code_blocks * crc);
        }

        trace!("TBS for MCS {} over {} RBs: {} bits", mcs, num_rb, tb_bits);
        tb_bits / 8
    }

    fn mcs_from_cqi(&self, cqi: u8) -> u8 {
        let cqi = (cqi as usize).min(SPECTRAL_EFFICIENCY_FOR_CQI.len() - 1);
        Self::mcs_from_spectral_efficiency(SPECTRAL_EFFICIENCY_FOR_CQI[cqi])
    }

    fn ul_cqi_from_sinr(&self, sinr: &[f64], _num_sym: u8, _tbs: u32) -> CqiFeedback {
        if sinr.is_empty() {
            return CqiFeedback { cqi: 0, mcs: 0 };
        }

        let gap = -(5.0 * self.config.ber).ln() / 1.5;
        let se = sinr.iter().map(|s| (1.0 + s / gap).log2()).sum::<f64>() / sinr.len() as f64;

        let feedback = CqiFeedback {
            cqi: Self::cqi_from_spectral_efficiency(se),
            mcs: Self::mcs_from_spectral_efficiency(se),
        };
        trace!("UL spectral efficiency {:.3} -> {:?}", se, feedback);
        feedback
    }
}
