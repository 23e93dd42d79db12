//! HARQ Processes
//!
//! Fixed pool of HARQ processes per UE per direction. Each process keeps an
//! owned copy of the DCI that produced it and the RLC PDUs it carried, so a
//! retransmission can be rebuilt without touching the original allocation.

use tracing::{debug, info};

use interfaces::{DciInfo, RlcPduInfo};

/// State of a HARQ process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarqProcessStatus {
    #[default]
    Inactive,
    /// Transmitted, waiting for ACK/NACK
    WaitingFeedback,
    /// NACK received, waiting for a retransmission opportunity
    ReceivedFeedback,
}

/// One in-flight transport block
#[derive(Debug, Clone, Default)]
pub struct HarqProcess {
    pub active: bool,
    pub status: HarqProcessStatus,
    /// Slots since the last transmission
    pub timer: u32,
    /// Snapshot of the last DCI sent for this block
    pub dci: Option<DciInfo>,
    /// RLC PDUs carried by the block
    pub rlc_pdu_info: Vec<RlcPduInfo>,
}

impl HarqProcess {
    /// New process for a first transmission
    pub fn new(dci: DciInfo) -> Self {
        Self {
            active: true,
            status: HarqProcessStatus::WaitingFeedback,
            timer: 0,
            dci: Some(dci),
            rlc_pdu_info: Vec::new(),
        }
    }

    /// Symbols the last transmission occupied
    pub fn num_sym(&self) -> u8 {
        self.dci.as_ref().map(|dci| dci.num_sym).unwrap_or(0)
    }

    /// Redundancy version of the last transmission
    pub fn rv(&self) -> u8 {
        self.dci.as_ref().map(|dci| dci.rv).unwrap_or(0)
    }
}

/// What processing one feedback did to its process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// ACK, or NACK with no redundancy version left
    Erased,
    /// NACK, process waits for a retransmission
    Retransmit,
}

/// HARQ processes of one UE in one direction
#[derive(Debug, Clone)]
pub struct HarqVector {
    processes: Vec<HarqProcess>,
    used: usize,
}

impl HarqVector {
    pub fn new(max_processes: u8) -> Self {
        Self {
            processes: vec![HarqProcess::default(); max_processes as usize],
            used: 0,
        }
    }

    pub fn max_size(&self) -> usize {
        self.processes.len()
    }

    /// Active processes
    pub fn active_count(&self) -> usize {
        self.used
    }

    /// Whether a free process id exists
    pub fn can_insert(&self) -> bool {
        self.used < self.processes.len()
    }

    /// Claim the lowest free id for `process`; `None` when the vector is full
    pub fn insert(&mut self, process: HarqProcess) -> Option<u8> {
        let id = self.processes.iter().position(|p| !p.active)?;
        self.processes[id] = process;
        self.processes[id].active = true;
        self.used += 1;
        Some(id as u8)
    }

    /// Process with `id`, `None` if the id is outside the pool
    pub fn get(&self, id: u8) -> Option<&HarqProcess> {
        self.processes.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut HarqProcess> {
        self.processes.get_mut(id as usize)
    }

    /// Active process with `id`
    pub fn find(&self, id: u8) -> Option<&HarqProcess> {
        self.get(id).filter(|p| p.active)
    }

    pub fn erase(&mut self, id: u8) {
        if let Some(process) = self.processes.get_mut(id as usize) {
            if process.active {
                self.used -= 1;
            }
            *process = HarqProcess::default();
        }
    }

    /// Age active processes by one slot and drop those that reached `timeout`.
    /// Returns the dropped ids.
    pub fn reset_expired(&mut self, timeout: u32) -> Vec<u8> {
        let mut expired = Vec::new();
        for (id, process) in self.processes.iter_mut().enumerate() {
            if !process.active {
                continue;
            }
            if process.timer < timeout {
                process.timer += 1;
            } else {
                expired.push(id as u8);
            }
        }
        for &id in &expired {
            info!("HARQ process {} timed out after {} slots, dropping it", id, timeout);
            self.erase(id);
        }
        expired
    }

    /// Apply ACK/NACK to an active process
    pub fn apply_feedback(&mut self, id: u8, ack: bool, max_rv: u8) -> FeedbackOutcome {
        let rv = self.get(id).map(HarqProcess::rv).unwrap_or(0);
        if ack || rv >= max_rv {
            debug!("HARQ process {} done (ack={}, rv={})", id, ack, rv);
            self.erase(id);
            FeedbackOutcome::Erased
        } else {
            if let Some(process) = self.get_mut(id) {
                process.status = HarqProcessStatus::ReceivedFeedback;
            }
            FeedbackOutcome::Retransmit
        }
    }

    /// Iterate over `(id, process)` for active processes
    pub fn iter_active(&self) -> impl Iterator<Item = (u8, &HarqProcess)> {
        self.processes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.active)
            .map(|(id, p)| (id as u8, p))
    }
}
