//! Slot-driven Simulation
//!
//! Drives the scheduler the way a MAC would: every slot it reports buffers,
//! CQI, scheduling requests and HARQ feedback, then triggers the UL pass for
//! `t + L + D` followed by the DL pass for `t + L`. UE behaviour (traffic
//! arrival, transport block decoding, BSR/SR) is modelled on top of the
//! returned allocations.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::time::Duration;
use tracing::{debug, info, warn};

use common::types::{CellId, Direction, Rnti, SfnSf};
use common::utils::{buffer_size_to_bsr_id, db_to_linear, MAX_NUM_LCG};
use interfaces::trace::SlotTraceWriter;
use interfaces::{
    CellConfigCnf, CellConfigReq, DlCqiInfo, DlCqiInfoReq, DlCqiType, DlRlcBufferReq,
    DlTriggerReq, HarqInfo, HarqStatus, LcConfigReq, LcReleaseReq, MacCeElement, MacCeValue,
    MacSchedSapUser, SchedConfigInd, SrInfoReq, UeConfigReq, UeReleaseReq, UlCqiInfo,
    UlCqiInfoReq, UlCqiType, UlMacCtrlInfoReq, UlTriggerReq,
};
use scheduler::{MacScheduler, TableAmc};

use crate::config::{SimConfig, TraceConfig, TrafficConfig, UeSimConfig};

/// Slots between two cooperative yields when not pacing in real time
const YIELD_PERIOD_SLOTS: u64 = 64;

/// SAP user of the simulation: logs decisions and optionally traces them
struct TraceSink {
    writer: Option<SlotTraceWriter<BufWriter<File>>>,
}

impl TraceSink {
    fn new(config: &TraceConfig) -> Result<Self> {
        let writer = match (config.enable, config.filename.as_ref()) {
            (true, Some(filename)) => Some(SlotTraceWriter::create(filename)?),
            _ => None,
        };
        Ok(Self { writer })
    }
}

impl MacSchedSapUser for TraceSink {
    fn sched_config_ind(&mut self, ind: &SchedConfigInd) {
        debug!(
            "Slot {}: {} blocks over {} symbols",
            ind.sfn_sf,
            ind.slot_alloc_info.var_tti_alloc_info.len(),
            ind.slot_alloc_info.num_sym_alloc
        );
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write(ind) {
                warn!("Failed to trace slot {}: {}", ind.sfn_sf, e);
            }
        }
    }

    fn csched_cell_config_cnf(&mut self, cnf: &CellConfigCnf) {
        info!("Cell {:?} configured: {:?}", cnf.cell_id, cnf.result);
    }
}

impl Drop for TraceSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush slot trace: {}", e);
            }
        }
    }
}

/// Counters of one UE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UeStats {
    pub dl_new_tx: u64,
    pub dl_retx: u64,
    pub ul_new_tx: u64,
    pub ul_retx: u64,
    pub dl_acked_bytes: u64,
    pub ul_acked_bytes: u64,
    pub dl_lost_bytes: u64,
    pub ul_lost_bytes: u64,
    pub sr_sent: u64,
    pub bsr_sent: u64,
}

/// Counters of the whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub slots: u64,
    pub ues: BTreeMap<Rnti, UeStats>,
}

impl SimStats {
    pub fn total(&self) -> UeStats {
        self.ues.values().fold(UeStats::default(), |mut acc, s| {
            acc.dl_new_tx += s.dl_new_tx;
            acc.dl_retx += s.dl_retx;
            acc.ul_new_tx += s.ul_new_tx;
            acc.ul_retx += s.ul_retx;
            acc.dl_acked_bytes += s.dl_acked_bytes;
            acc.ul_acked_bytes += s.ul_acked_bytes;
            acc.dl_lost_bytes += s.dl_lost_bytes;
            acc.ul_lost_bytes += s.ul_lost_bytes;
            acc.sr_sent += s.sr_sent;
            acc.bsr_sent += s.bsr_sent;
            acc
        })
    }
}

/// Transport block waiting for its HARQ outcome
#[derive(Debug, Clone, Copy)]
struct InFlight {
    bytes: u32,
    rv: u8,
}

/// UE side state
struct SimUe {
    config: UeSimConfig,
    dl_queue: u32,
    ul_queue: u32,
    awaiting_grant: bool,
}

pub struct Simulation {
    config: SimConfig,
    sched: MacScheduler,
    rng: StdRng,
    ues: BTreeMap<Rnti, SimUe>,
    /// Air slot of the current tick
    now: SfnSf,
    /// Tick counter, the key of every pending report
    slot_index: u64,
    dl_in_flight: HashMap<(Rnti, u8), InFlight>,
    ul_in_flight: HashMap<(Rnti, u8), InFlight>,
    dl_feedback: BTreeMap<u64, Vec<HarqInfo>>,
    ul_feedback: BTreeMap<u64, Vec<HarqInfo>>,
    ul_cqi: BTreeMap<u64, Vec<UlCqiInfoReq>>,
    stats: SimStats,
}

impl Simulation {
    /// Build the scheduler, configure the cell and attach every UE
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;

        let amc = TableAmc::new(config.amc.clone());
        let mut sched = MacScheduler::new(config.scheduler.clone(), Box::new(amc))?;
        sched.set_sap_user(Box::new(TraceSink::new(&config.trace)?));
        sched.csched_cell_config_req(&CellConfigReq {
            cell_id: CellId(config.simulation.cell_id),
        })?;
        if let Some(mcs) = config.simulation.fixed_mcs {
            sched.sched_set_mcs(mcs)?;
        }

        let mut ues = BTreeMap::new();
        let mut stats = SimStats::default();
        for ue_config in &config.ues {
            let rnti = Rnti(ue_config.rnti);
            sched.csched_ue_config_req(&UeConfigReq {
                rnti,
                beam_id: ue_config.beam,
                tx_mode: 0,
            })?;
            sched.csched_lc_config_req(&LcConfigReq {
                rnti,
                logical_channels: ue_config.logical_channels.clone(),
            })?;
            info!(
                "UE {} attached on beam {} with {} logical channels",
                rnti,
                ue_config.beam,
                ue_config.logical_channels.len()
            );
            ues.insert(
                rnti,
                SimUe {
                    config: ue_config.clone(),
                    dl_queue: 0,
                    ul_queue: 0,
                    awaiting_grant: false,
                },
            );
            stats.ues.insert(rnti, UeStats::default());
        }

        let rng = StdRng::seed_from_u64(config.simulation.seed);
        Ok(Self {
            config,
            sched,
            rng,
            ues,
            now: SfnSf::default(),
            slot_index: 0,
            dl_in_flight: HashMap::new(),
            ul_in_flight: HashMap::new(),
            dl_feedback: BTreeMap::new(),
            ul_feedback: BTreeMap::new(),
            ul_cqi: BTreeMap::new(),
            stats,
        })
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &MacScheduler {
        &self.sched
    }

    /// Run the configured number of slots
    pub async fn run(&mut self) -> Result<()> {
        let num_slots = self.config.simulation.num_slots;
        let slot_us = self.config.scheduler.scs.slot_duration_us();
        let mut pacing = if self.config.simulation.realtime {
            info!("Pacing {} slots of {} us", num_slots, slot_us);
            Some(tokio::time::interval(Duration::from_micros(slot_us)))
        } else {
            None
        };

        while self.slot_index < num_slots {
            match pacing.as_mut() {
                Some(interval) => {
                    interval.tick().await;
                }
                None if self.slot_index % YIELD_PERIOD_SLOTS == 0 => tokio::task::yield_now().await,
                None => {}
            }
            self.tick()?;
        }
        Ok(())
    }

    /// Simulate one slot
    pub fn tick(&mut self) -> Result<()> {
        let now = self.slot_index;
        let spsf = self.config.scheduler.slots_per_subframe();
        let latency = self.config.scheduler.l1l2_ctrl_latency;
        let ul_delay = self.config.scheduler.ul_sched_delay;

        self.release_due_ues()?;
        self.generate_traffic()?;
        let cqi_period = self.config.simulation.cqi_period_slots;
        if cqi_period > 0 && now % cqi_period == 0 {
            self.report_dl_cqi()?;
        }
        for req in self.ul_cqi.remove(&now).unwrap_or_default() {
            self.sched
                .sched_ul_cqi_info_req(&req)
                .with_context(|| format!("UL CQI for slot {}", req.sfn_sf))?;
        }

        let ul_harq_info = self.ul_feedback.remove(&now).unwrap_or_default();
        self.account_feedback(Direction::Ul, &ul_harq_info);
        let ul_target = self.now.increase_no_of_slots(latency + ul_delay, spsf);
        let ind = self
            .sched
            .ul_trigger_req(&UlTriggerReq {
                sfn_sf: ul_target,
                ul_harq_info,
            })
            .with_context(|| format!("UL trigger for slot {}", ul_target))?;
        self.handle_ul_indication(&ind, now + (latency + ul_delay) as u64)?;

        let dl_harq_info = self.dl_feedback.remove(&now).unwrap_or_default();
        self.account_feedback(Direction::Dl, &dl_harq_info);
        let dl_target = self.now.increase_no_of_slots(latency, spsf);
        let ind = self
            .sched
            .dl_trigger_req(&DlTriggerReq {
                sfn_sf: dl_target,
                dl_harq_info,
            })
            .with_context(|| format!("DL trigger for slot {}", dl_target))?;
        self.handle_dl_indication(&ind, now + latency as u64);

        self.stats.slots += 1;
        self.slot_index += 1;
        self.now = self.now.increase_no_of_slots(1, spsf);
        if self.slot_index % self.config.simulation.stats_period_slots == 0 {
            self.log_stats();
        }
        Ok(())
    }

    fn release_due_ues(&mut self) -> Result<()> {
        let now = self.slot_index;
        let due: Vec<Rnti> = self
            .ues
            .iter()
            .filter(|(_, ue)| ue.config.release_at_slot == Some(now))
            .map(|(&rnti, _)| rnti)
            .collect();

        for rnti in due {
            let Some(ue) = self.ues.remove(&rnti) else { continue };
            self.sched.csched_lc_release_req(&LcReleaseReq {
                rnti,
                lc_ids: ue.config.logical_channels.iter().map(|lc| lc.lc_id).collect(),
            })?;
            self.sched.csched_ue_release_req(&UeReleaseReq { rnti })?;

            self.dl_in_flight.retain(|(r, _), _| *r != rnti);
            self.ul_in_flight.retain(|(r, _), _| *r != rnti);
            for pending in self.dl_feedback.values_mut().chain(self.ul_feedback.values_mut()) {
                pending.retain(|info| info.rnti != rnti);
            }
            info!(
                "UE {} released with {} DL / {} UL bytes still queued",
                rnti, ue.dl_queue, ue.ul_queue
            );
        }
        Ok(())
    }

    fn burst(rng: &mut StdRng, traffic: &TrafficConfig, slot_index: u64) -> u32 {
        if !traffic.is_active() || slot_index % traffic.period_slots != 0 {
            return 0;
        }
        if traffic.jitter == 0.0 {
            return traffic.bytes;
        }
        let scale = 1.0 + traffic.jitter * rng.gen_range(-1.0..=1.0);
        (traffic.bytes as f64 * scale).round() as u32
    }

    fn generate_traffic(&mut self) -> Result<()> {
        let now = self.slot_index;
        let mut sr = Vec::new();

        for (&rnti, ue) in self.ues.iter_mut() {
            let dl_bytes = Self::burst(&mut self.rng, &ue.config.dl_traffic, now);
            if dl_bytes > 0 {
                if let Some(lc) = ue.config.dl_lc() {
                    ue.dl_queue += dl_bytes;
                    self.sched.sched_dl_rlc_buffer_req(&DlRlcBufferReq {
                        rnti,
                        lc_id: lc.lc_id,
                        tx_queue_size: ue.dl_queue,
                        retx_queue_size: 0,
                        status_pdu_size: 0,
                    })?;
                }
            }

            let ul_bytes = Self::burst(&mut self.rng, &ue.config.ul_traffic, now);
            if ul_bytes == 0 {
                continue;
            }
            let was_empty = ue.ul_queue == 0;
            ue.ul_queue += ul_bytes;
            if ue.awaiting_grant {
                continue;
            }
            if was_empty {
                ue.awaiting_grant = true;
                sr.push(rnti);
                if let Some(stats) = self.stats.ues.get_mut(&rnti) {
                    stats.sr_sent += 1;
                }
            } else {
                Self::send_bsr(&mut self.sched, &mut self.stats, self.now, rnti, ue)?;
            }
        }

        if !sr.is_empty() {
            self.sched.sched_ul_sr_info_req(&SrInfoReq {
                sfn_sf: self.now,
                rntis: sr,
            })?;
        }
        Ok(())
    }

    fn send_bsr(
        sched: &mut MacScheduler,
        stats: &mut SimStats,
        now: SfnSf,
        rnti: Rnti,
        ue: &SimUe,
    ) -> Result<()> {
        let Some(lc) = ue.config.ul_lc() else {
            return Ok(());
        };
        let mut buffer_status = [0u8; MAX_NUM_LCG];
        buffer_status[lc.lcg_id as usize] = buffer_size_to_bsr_id(ue.ul_queue);
        sched.sched_ul_mac_ctrl_info_req(&UlMacCtrlInfoReq {
            sfn_sf: now,
            mac_ce_list: vec![MacCeElement {
                rnti,
                value: MacCeValue::Bsr { buffer_status },
            }],
        })?;
        if let Some(stats) = stats.ues.get_mut(&rnti) {
            stats.bsr_sent += 1;
        }
        Ok(())
    }

    fn report_dl_cqi(&mut self) -> Result<()> {
        let cqi_list: Vec<DlCqiInfo> = self
            .ues
            .iter()
            .map(|(&rnti, ue)| DlCqiInfo {
                rnti,
                cqi_type: DlCqiType::Wb,
                wb_cqi: ue.config.dl_cqi,
                sb_cqi: Vec::new(),
            })
            .collect();
        if cqi_list.is_empty() {
            return Ok(());
        }
        self.sched.sched_dl_cqi_info_req(&DlCqiInfoReq {
            sfn_sf: self.now,
            cqi_list,
        })?;
        Ok(())
    }

    /// Book ACKed and abandoned blocks before the feedback reaches the scheduler
    fn account_feedback(&mut self, direction: Direction, feedback: &[HarqInfo]) {
        let max_rv = self.config.scheduler.max_rv;
        let in_flight = match direction {
            Direction::Dl => &mut self.dl_in_flight,
            Direction::Ul => &mut self.ul_in_flight,
        };

        for info in feedback {
            let key = (info.rnti, info.harq_process_id);
            let Some(block) = in_flight.get(&key).copied() else {
                continue;
            };
            let Some(stats) = self.stats.ues.get_mut(&info.rnti) else {
                continue;
            };
            let (acked, lost) = match direction {
                Direction::Dl => (&mut stats.dl_acked_bytes, &mut stats.dl_lost_bytes),
                Direction::Ul => (&mut stats.ul_acked_bytes, &mut stats.ul_lost_bytes),
            };
            match info.status {
                HarqStatus::Ack => {
                    *acked += block.bytes as u64;
                    in_flight.remove(&key);
                }
                HarqStatus::Nack if block.rv >= max_rv => {
                    debug!(
                        "{} block of UE {} on process {} lost after rv {}",
                        direction, info.rnti, info.harq_process_id, block.rv
                    );
                    *lost += block.bytes as u64;
                    in_flight.remove(&key);
                }
                HarqStatus::Nack => {}
            }
        }
    }

    /// Decode outcome of one transmission, drawn against the UE's BLER
    fn draw_outcome(rng: &mut StdRng, bler: f64) -> HarqStatus {
        if rng.gen::<f64>() < bler {
            HarqStatus::Nack
        } else {
            HarqStatus::Ack
        }
    }

    fn handle_dl_indication(&mut self, ind: &SchedConfigInd, air_index: u64) {
        let due = air_index + self.config.simulation.harq_feedback_delay as u64;

        for alloc in ind.slot_alloc_info.var_tti_alloc_info.iter().filter(|a| a.is_data()) {
            let Some(rnti) = alloc.dci.rnti else { continue };
            let Some(ue) = self.ues.get_mut(&rnti) else { continue };
            let Some(stats) = self.stats.ues.get_mut(&rnti) else { continue };
            let key = (rnti, alloc.dci.harq_process);

            if alloc.dci.ndi == 1 {
                let bytes: u32 = alloc.rlc_pdu_info.iter().map(|pdu| pdu.size).sum();
                ue.dl_queue = ue.dl_queue.saturating_sub(bytes);
                self.dl_in_flight.insert(key, InFlight { bytes, rv: alloc.dci.rv });
                stats.dl_new_tx += 1;
            } else {
                match self.dl_in_flight.get_mut(&key) {
                    Some(block) => block.rv = alloc.dci.rv,
                    None => warn!("DL retransmission of unknown block {:?}", key),
                }
                stats.dl_retx += 1;
            }

            let status = Self::draw_outcome(&mut self.rng, ue.config.dl_bler);
            self.dl_feedback.entry(due).or_default().push(HarqInfo {
                rnti,
                harq_process_id: alloc.dci.harq_process,
                status,
            });
        }
    }

    fn handle_ul_indication(&mut self, ind: &SchedConfigInd, air_index: u64) -> Result<()> {
        let due = air_index + self.config.simulation.harq_feedback_delay as u64;
        let num_rb_per_rbg = self.config.scheduler.num_rb_per_rbg;

        for alloc in ind.slot_alloc_info.var_tti_alloc_info.iter().filter(|a| a.is_data()) {
            let Some(rnti) = alloc.dci.rnti else { continue };

            // The gNB measures every PUSCH block, including those of UEs gone since
            let num_rb = alloc.dci.rbg_count() * num_rb_per_rbg;
            let sinr_db = self
                .ues
                .get(&rnti)
                .map(|ue| ue.config.ul_sinr_db)
                .unwrap_or_default();
            self.ul_cqi.entry(air_index + 1).or_default().push(UlCqiInfoReq {
                sfn_sf: ind.sfn_sf.with_var_tti(alloc.dci.sym_start),
                ul_cqi: UlCqiInfo {
                    cqi_type: UlCqiType::Pusch,
                    sinr: vec![db_to_linear(sinr_db); num_rb as usize],
                },
            });

            let Some(ue) = self.ues.get_mut(&rnti) else { continue };
            let Some(stats) = self.stats.ues.get_mut(&rnti) else { continue };
            let key = (rnti, alloc.dci.harq_process);

            if alloc.dci.ndi == 1 {
                let bytes = alloc.dci.tbs.min(ue.ul_queue);
                ue.ul_queue -= bytes;
                ue.awaiting_grant = false;
                self.ul_in_flight.insert(key, InFlight { bytes, rv: alloc.dci.rv });
                stats.ul_new_tx += 1;
                Self::send_bsr(&mut self.sched, &mut self.stats, self.now, rnti, ue)?;
            } else {
                match self.ul_in_flight.get_mut(&key) {
                    Some(block) => block.rv = alloc.dci.rv,
                    None => warn!("UL retransmission of unknown block {:?}", key),
                }
                stats.ul_retx += 1;
            }

            let status = Self::draw_outcome(&mut self.rng, ue.config.ul_bler);
            self.ul_feedback.entry(due).or_default().push(HarqInfo {
                rnti,
                harq_process_id: alloc.dci.harq_process,
                status,
            });
        }
        Ok(())
    }

    /// Log throughput and queue state per UE
    pub fn log_stats(&self) {
        let elapsed_us = self.stats.slots * self.config.scheduler.scs.slot_duration_us();
        if elapsed_us == 0 {
            return;
        }
        let mbps = |bytes: u64| (bytes * 8) as f64 / elapsed_us as f64;

        info!(
            "=== {} slots, {} UL slots pending, {} SR queued ===",
            self.stats.slots,
            self.sched.pending_ul_slots(),
            self.sched.pending_sr()
        );
        for (rnti, stats) in &self.stats.ues {
            let (dl_queue, ul_queue) = self
                .ues
                .get(rnti)
                .map(|ue| (ue.dl_queue, ue.ul_queue))
                .unwrap_or_default();
            info!(
                "UE {}: DL {:.2} Mbps ({} tx, {} retx, {} B lost, {} B queued) | UL {:.2} Mbps ({} tx, {} retx, {} B lost, {} B queued)",
                rnti,
                mbps(stats.dl_acked_bytes),
                stats.dl_new_tx,
                stats.dl_retx,
                stats.dl_lost_bytes,
                dl_queue,
                mbps(stats.ul_acked_bytes),
                stats.ul_new_tx,
                stats.ul_retx,
                stats.ul_lost_bytes,
                ul_queue
            );
        }
        let total = self.stats.total();
        info!(
            "Cell: DL {:.2} Mbps, UL {:.2} Mbps, {} SR, {} BSR",
            mbps(total.dl_acked_bytes),
            mbps(total.ul_acked_bytes),
            total.sr_sent,
            total.bsr_sent
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(extra: &str) -> SimConfig {
        let yaml = format!(
            r#"
scheduler:
  bandwidth_in_rbg: 20
simulation:
  num_slots: 300
  seed: 11
  stats_period_slots: 100
ues:
  - rnti: 1
    dl_traffic:
      bytes: 400
    ul_traffic:
      bytes: 150
      period_slots: 2
{}
"#,
            extra
        );
        SimConfig::from_yaml_str(&yaml).unwrap()
    }

    #[tokio::test]
    async fn test_clean_channel_delivers_everything_offered() {
        let mut sim = Simulation::new(scenario("")).unwrap();
        sim.run().await.unwrap();

        let stats = sim.stats().total();
        assert_eq!(sim.stats().slots, 300);
        assert!(stats.dl_new_tx > 0);
        assert!(stats.ul_new_tx > 0);
        assert!(stats.sr_sent >= 1);
        assert_eq!(stats.dl_retx, 0);
        assert_eq!(stats.ul_retx, 0);
        assert_eq!(stats.dl_lost_bytes, 0);
        assert_eq!(stats.ul_lost_bytes, 0);
        // Everything but the last few slots of traffic is acknowledged
        assert!(stats.dl_acked_bytes >= 400 * 280);
        assert!(stats.ul_acked_bytes >= 150 * 140);
    }

    #[tokio::test]
    async fn test_lossy_channel_retransmits() {
        let extra = "    dl_bler: 0.3\n    ul_bler: 0.3\n";
        let mut sim = Simulation::new(scenario(extra)).unwrap();
        sim.run().await.unwrap();

        let stats = sim.stats().total();
        assert!(stats.dl_retx > 0);
        assert!(stats.ul_retx > 0);
        assert!(stats.dl_acked_bytes > 0);
    }

    #[tokio::test]
    async fn test_runs_are_reproducible() {
        let extra = "    dl_bler: 0.2\n  - rnti: 2\n    dl_traffic:\n      bytes: 900\n      jitter: 0.5\n";
        let mut first = Simulation::new(scenario(extra)).unwrap();
        first.run().await.unwrap();
        let mut second = Simulation::new(scenario(extra)).unwrap();
        second.run().await.unwrap();
        assert_eq!(first.stats(), second.stats());
    }

    #[tokio::test]
    async fn test_release_mid_run() {
        let extra = "  - rnti: 2\n    dl_traffic:\n      bytes: 300\n    release_at_slot: 50\n";
        let mut sim = Simulation::new(scenario(extra)).unwrap();
        sim.run().await.unwrap();

        assert!(sim.scheduler().ue(Rnti(2)).is_none());
        assert!(sim.scheduler().ue(Rnti(1)).is_some());
        let stats = &sim.stats().ues[&Rnti(2)];
        assert!(stats.dl_new_tx > 0);
        assert!(stats.dl_new_tx < sim.stats().ues[&Rnti(1)].dl_new_tx);
    }

    #[test]
    fn test_tick_advances_air_slot() {
        let mut config = scenario("");
        config.scheduler.scs = common::types::SubcarrierSpacing::Scs15;
        let mut sim = Simulation::new(config).unwrap();
        for _ in 0..12 {
            sim.tick().unwrap();
        }
        assert_eq!(sim.now, SfnSf::new(1, 2, 0, 0));
        assert_eq!(sim.stats().slots, 12);
    }
}
