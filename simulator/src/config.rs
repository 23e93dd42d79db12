//! Scenario Configuration
//!
//! One file describes the scheduler, the AMC, the simulation run and the UEs
//! with their traffic and radio conditions. YAML is the default format,
//! files ending in `.toml` are read as TOML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use common::types::{BeamId, LcDirection};
use interfaces::LogicalChannelConfig;
use scheduler::{AmcConfig, SchedulerConfig};

/// Highest wideband CQI a UE can report
const MAX_CQI: u8 = 15;

/// Complete scenario
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Scheduler parameters
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Table AMC parameters
    #[serde(default)]
    pub amc: AmcConfig,
    /// Run parameters
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Attached UEs
    #[serde(default)]
    pub ues: Vec<UeSimConfig>,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Slot trace configuration
    #[serde(default)]
    pub trace: TraceConfig,
}

/// Run parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Cell the scheduler is configured for
    #[serde(default = "default_cell_id")]
    pub cell_id: u16,
    /// Number of slots to run
    #[serde(default = "default_num_slots")]
    pub num_slots: u64,
    /// Pace slots at their air duration
    #[serde(default)]
    pub realtime: bool,
    /// Seed of the traffic and decoding draws
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Slots between a transmission and its HARQ feedback
    #[serde(default = "default_harq_feedback_delay")]
    pub harq_feedback_delay: u32,
    /// Period of the wideband DL CQI reports in slots
    #[serde(default = "default_cqi_period_slots")]
    pub cqi_period_slots: u64,
    /// Period of the statistics log in slots
    #[serde(default = "default_stats_period_slots")]
    pub stats_period_slots: u64,
    /// MCS forced for every UE in both directions
    #[serde(default)]
    pub fixed_mcs: Option<u8>,
}

fn default_cell_id() -> u16 {
    1
}

fn default_num_slots() -> u64 {
    8000
}

fn default_seed() -> u64 {
    1
}

fn default_harq_feedback_delay() -> u32 {
    4
}

fn default_cqi_period_slots() -> u64 {
    8
}

fn default_stats_period_slots() -> u64 {
    1000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cell_id: default_cell_id(),
            num_slots: default_num_slots(),
            realtime: false,
            seed: default_seed(),
            harq_feedback_delay: default_harq_feedback_delay(),
            cqi_period_slots: default_cqi_period_slots(),
            stats_period_slots: default_stats_period_slots(),
            fixed_mcs: None,
        }
    }
}

/// One UE of the scenario
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UeSimConfig {
    /// RNTI
    pub rnti: u16,
    /// Serving beam
    #[serde(default)]
    pub beam: BeamId,
    /// Logical channels
    #[serde(default = "default_logical_channels")]
    pub logical_channels: Vec<LogicalChannelConfig>,
    /// Downlink traffic arriving at the RLC
    #[serde(default)]
    pub dl_traffic: TrafficConfig,
    /// Uplink traffic arriving at the UE
    #[serde(default)]
    pub ul_traffic: TrafficConfig,
    /// Wideband CQI the UE reports
    #[serde(default = "default_dl_cqi")]
    pub dl_cqi: u8,
    /// PUSCH SINR measured by the gNB in dB
    #[serde(default = "default_ul_sinr_db")]
    pub ul_sinr_db: f64,
    /// Probability that a DL transport block fails to decode
    #[serde(default)]
    pub dl_bler: f64,
    /// Probability that an UL transport block fails to decode
    #[serde(default)]
    pub ul_bler: f64,
    /// Slot at which the UE leaves the cell
    #[serde(default)]
    pub release_at_slot: Option<u64>,
}

fn default_logical_channels() -> Vec<LogicalChannelConfig> {
    vec![LogicalChannelConfig {
        lc_id: 4,
        lcg_id: 1,
        direction: LcDirection::Both,
        priority: 1,
    }]
}

fn default_dl_cqi() -> u8 {
    MAX_CQI
}

fn default_ul_sinr_db() -> f64 {
    20.0
}

/// Periodic traffic source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficConfig {
    /// Bytes generated per period, zero disables the source
    #[serde(default)]
    pub bytes: u32,
    /// Period in slots
    #[serde(default = "default_period_slots")]
    pub period_slots: u64,
    /// Relative size variation of each burst (0-1)
    #[serde(default)]
    pub jitter: f64,
}

fn default_period_slots() -> u64 {
    1
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            bytes: 0,
            period_slots: default_period_slots(),
            jitter: 0.0,
        }
    }
}

impl TrafficConfig {
    pub fn is_active(&self) -> bool {
        self.bytes > 0
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level, overridden by `--log-level` and `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Slot trace configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TraceConfig {
    /// Write every scheduling decision to `filename`
    #[serde(default)]
    pub enable: bool,
    /// JSON-lines output file
    pub filename: Option<String>,
}

impl SimConfig {
    /// Load a scenario, TOML when the extension says so, YAML otherwise
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: SimConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a scenario from a YAML string
    pub fn from_yaml_str(contents: &str) -> anyhow::Result<Self> {
        let config: SimConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject scenarios the simulator cannot run
    pub fn validate(&self) -> anyhow::Result<()> {
        self.scheduler.validate()?;

        let sim = &self.simulation;
        if sim.harq_feedback_delay == 0 {
            return Err(anyhow::anyhow!("harq_feedback_delay must be at least one slot"));
        }
        let round_trip =
            self.scheduler.l1l2_ctrl_latency + self.scheduler.ul_sched_delay + sim.harq_feedback_delay;
        if round_trip >= self.scheduler.harq_timeout_slots {
            return Err(anyhow::anyhow!(
                "HARQ feedback arrives after {} slots but processes time out after {}",
                round_trip,
                self.scheduler.harq_timeout_slots
            ));
        }
        if sim.stats_period_slots == 0 {
            return Err(anyhow::anyhow!("stats_period_slots must be positive"));
        }
        if self.trace.enable && self.trace.filename.is_none() {
            return Err(anyhow::anyhow!("Slot trace enabled without a filename"));
        }

        let mut rntis = BTreeSet::new();
        for ue in &self.ues {
            if ue.rnti == 0 {
                return Err(anyhow::anyhow!("RNTI 0 is reserved"));
            }
            if !rntis.insert(ue.rnti) {
                return Err(anyhow::anyhow!("Duplicate RNTI {}", ue.rnti));
            }
            if ue.dl_cqi > MAX_CQI {
                return Err(anyhow::anyhow!("UE {}: CQI {} exceeds {}", ue.rnti, ue.dl_cqi, MAX_CQI));
            }
            for (name, p) in [("dl_bler", ue.dl_bler), ("ul_bler", ue.ul_bler)] {
                if !(0.0..=1.0).contains(&p) {
                    return Err(anyhow::anyhow!("UE {}: {} = {} is not a probability", ue.rnti, name, p));
                }
            }
            for (name, traffic) in [("dl_traffic", &ue.dl_traffic), ("ul_traffic", &ue.ul_traffic)] {
                if traffic.period_slots == 0 || !(0.0..=1.0).contains(&traffic.jitter) {
                    return Err(anyhow::anyhow!(
                        "UE {}: {} needs a positive period and a jitter within 0-1",
                        ue.rnti,
                        name
                    ));
                }
            }
            if ue.dl_traffic.is_active() && ue.dl_lc().is_none() {
                return Err(anyhow::anyhow!("UE {}: DL traffic without a DL logical channel", ue.rnti));
            }
            if ue.ul_traffic.is_active() && ue.ul_lc().is_none() {
                return Err(anyhow::anyhow!("UE {}: UL traffic without an UL logical channel", ue.rnti));
            }
            if let Some(lc) = ue.logical_channels.iter().find(|lc| lc.lcg_id as usize >= common::utils::MAX_NUM_LCG) {
                return Err(anyhow::anyhow!("UE {}: LCG {} out of range", ue.rnti, lc.lcg_id));
            }
        }
        Ok(())
    }
}

impl UeSimConfig {
    /// First logical channel carrying DL traffic
    pub fn dl_lc(&self) -> Option<&LogicalChannelConfig> {
        self.logical_channels.iter().find(|lc| lc.direction.has_dl())
    }

    /// First logical channel carrying UL traffic
    pub fn ul_lc(&self) -> Option<&LogicalChannelConfig> {
        self.logical_channels.iter().find(|lc| lc.direction.has_ul())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
scheduler:
  bandwidth_in_rbg: 20
  policy:
    type: proportional_fair
    fairness_index: 1.0
simulation:
  num_slots: 200
  seed: 7
ues:
  - rnti: 1
    dl_traffic:
      bytes: 500
  - rnti: 2
    beam:
      sector: 1
      elevation: 30
    ul_traffic:
      bytes: 200
      period_slots: 4
    ul_bler: 0.1
"#;

    #[test]
    fn test_parse_scenario() {
        let config = SimConfig::from_yaml_str(SCENARIO).unwrap();
        assert_eq!(config.scheduler.bandwidth_in_rbg, 20);
        assert_eq!(config.scheduler.symbols_per_slot, 14);
        assert_eq!(config.simulation.num_slots, 200);
        assert_eq!(config.simulation.harq_feedback_delay, 4);
        assert_eq!(config.ues.len(), 2);
        assert_eq!(config.ues[0].dl_cqi, 15);
        assert_eq!(config.ues[0].dl_lc().map(|lc| lc.lc_id), Some(4));
        assert_eq!(config.ues[1].beam, BeamId::new(1, 30));
        assert_eq!(config.ues[1].ul_traffic.period_slots, 4);
        assert_eq!(config.log.level, "info");
        assert!(!config.trace.enable);
    }

    #[test]
    fn test_bundled_scenario_is_valid() {
        let config = SimConfig::from_yaml_str(include_str!("../config/sim.yml")).unwrap();
        assert!(!config.ues.is_empty());
    }

    #[test]
    fn test_toml_scenario() {
        let contents = r#"
[simulation]
num_slots = 50

[[ues]]
rnti = 3
dl_bler = 0.2

[ues.dl_traffic]
bytes = 100
"#;
        let config: SimConfig = toml::from_str(contents).unwrap();
        config.validate().unwrap();
        assert_eq!(config.simulation.num_slots, 50);
        assert_eq!(config.ues[0].rnti, 3);
        assert_eq!(config.ues[0].dl_traffic.bytes, 100);
    }

    #[test]
    fn test_reject_duplicate_rnti() {
        let contents = "ues:\n  - rnti: 5\n  - rnti: 5\n";
        assert!(SimConfig::from_yaml_str(contents).is_err());
    }

    #[test]
    fn test_reject_feedback_after_harq_timeout() {
        let contents = "scheduler:\n  harq_timeout_slots: 6\nsimulation:\n  harq_feedback_delay: 2\n";
        assert!(SimConfig::from_yaml_str(contents).is_err());
    }

    #[test]
    fn test_reject_ul_traffic_without_ul_channel() {
        let contents = r#"
ues:
  - rnti: 1
    logical_channels:
      - lc_id: 3
        lcg_id: 0
        direction: Dl
    ul_traffic:
      bytes: 10
"#;
        assert!(SimConfig::from_yaml_str(contents).is_err());
    }
}
