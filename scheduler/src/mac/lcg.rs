//! Logical Channels and Logical Channel Groups
//!
//! Tracks buffered bytes per logical channel and aggregates them per group

use std::collections::BTreeMap;
use tracing::{debug, trace};

use interfaces::{DlRlcBufferReq, LogicalChannelConfig};

/// Buffered bytes of one logical channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalChannel {
    pub lc_id: u8,
    pub priority: u8,
    /// RLC transmission queue
    pub tx_queue: u32,
    /// RLC retransmission queue
    pub retx_queue: u32,
    /// Pending status PDU
    pub status_pdu: u32,
}

impl LogicalChannel {
    pub fn new(config: &LogicalChannelConfig) -> Self {
        Self {
            lc_id: config.lc_id,
            priority: config.priority,
            ..Default::default()
        }
    }

    pub fn total_size(&self) -> u32 {
        self.tx_queue + self.retx_queue + self.status_pdu
    }

    pub fn update(&mut self, tx_queue: u32, retx_queue: u32, status_pdu: u32) {
        self.tx_queue = tx_queue;
        self.retx_queue = retx_queue;
        self.status_pdu = status_pdu;
    }

    /// Drain `bytes`: status PDU first, then retransmissions, then new data
    pub fn assigned_data(&mut self, bytes: u32) {
        let mut left = bytes;
        for queue in [&mut self.status_pdu, &mut self.retx_queue, &mut self.tx_queue] {
            let taken = left.min(*queue);
            *queue -= taken;
            left -= taken;
        }
        if left > 0 {
            trace!("LC {} assigned {} bytes beyond its buffer", self.lc_id, left);
        }
    }
}

/// Logical channel group
#[derive(Debug, Clone, Default)]
pub struct LogicalChannelGroup {
    pub lcg_id: u8,
    lcs: BTreeMap<u8, LogicalChannel>,
}

impl LogicalChannelGroup {
    pub fn new(lcg_id: u8) -> Self {
        Self {
            lcg_id,
            lcs: BTreeMap::new(),
        }
    }

    /// Insert or replace a logical channel
    pub fn insert(&mut self, lc: LogicalChannel) {
        debug!("LCG {}: adding LC {}", self.lcg_id, lc.lc_id);
        self.lcs.insert(lc.lc_id, lc);
    }

    pub fn contains(&self, lc_id: u8) -> bool {
        self.lcs.contains_key(&lc_id)
    }

    pub fn num_lc(&self) -> usize {
        self.lcs.len()
    }

    pub fn lc_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.lcs.keys().copied()
    }

    pub fn lc(&self, lc_id: u8) -> Option<&LogicalChannel> {
        self.lcs.get(&lc_id)
    }

    /// Bytes buffered across all channels of the group
    pub fn total_size(&self) -> u32 {
        self.lcs.values().map(LogicalChannel::total_size).sum()
    }

    /// Bytes buffered in one channel
    pub fn lc_total_size(&self, lc_id: u8) -> u32 {
        self.lcs.get(&lc_id).map(LogicalChannel::total_size).unwrap_or(0)
    }

    /// Apply an RLC buffer status report to a channel of this group
    pub fn update_from_rlc(&mut self, req: &DlRlcBufferReq) {
        match self.lcs.get_mut(&req.lc_id) {
            Some(lc) => {
                lc.update(req.tx_queue_size, req.retx_queue_size, req.status_pdu_size);
                trace!("LCG {} LC {} now holds {} bytes", self.lcg_id, lc.lc_id, lc.total_size());
            }
            None => trace!("LCG {} has no LC {}", self.lcg_id, req.lc_id),
        }
    }

    /// Apply a buffer size decoded from a BSR, split evenly over the channels
    pub fn update_from_bsr(&mut self, buffer_size: u32) {
        let count = self.lcs.len() as u32;
        if count == 0 {
            return;
        }
        let share = buffer_size / count;
        let mut remainder = buffer_size % count;
        for lc in self.lcs.values_mut() {
            let extra = if remainder > 0 {
                remainder -= 1;
                1
            } else {
                0
            };
            lc.update(share + extra, 0, 0);
        }
    }

    pub fn assigned_data(&mut self, lc_id: u8, bytes: u32) {
        if let Some(lc) = self.lcs.get_mut(&lc_id) {
            lc.assigned_data(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{LcDirection, Rnti};

    fn lc_config(lc_id: u8) -> LogicalChannelConfig {
        LogicalChannelConfig {
            lc_id,
            lcg_id: 0,
            direction: LcDirection::Dl,
            priority: 1,
        }
    }

    #[test]
    fn test_lc_drain_order() {
        let mut lc = LogicalChannel::new(&lc_config(1));
        lc.update(100, 20, 5);
        assert_eq!(lc.total_size(), 125);

        lc.assigned_data(10);
        assert_eq!((lc.status_pdu, lc.retx_queue, lc.tx_queue), (0, 15, 100));

        lc.assigned_data(50);
        assert_eq!((lc.status_pdu, lc.retx_queue, lc.tx_queue), (0, 0, 65));

        lc.assigned_data(1000);
        assert_eq!(lc.total_size(), 0);
    }

    #[test]
    fn test_lcg_total_is_sum_of_lcs() {
        let mut lcg = LogicalChannelGroup::new(0);
        lcg.insert(LogicalChannel::new(&lc_config(1)));
        lcg.insert(LogicalChannel::new(&lc_config(2)));

        let req = DlRlcBufferReq {
            rnti: Rnti(1),
            lc_id: 2,
            tx_queue_size: 300,
            retx_queue_size: 0,
            status_pdu_size: 2,
        };
        lcg.update_from_rlc(&req);
        // Reports for channels outside the group leave it untouched
        lcg.update_from_rlc(&DlRlcBufferReq { lc_id: 9, ..req.clone() });

        assert_eq!(lcg.total_size(), 302);
        assert_eq!(lcg.lc_total_size(1), 0);
        assert_eq!(lcg.lc_total_size(2), 302);

        lcg.assigned_data(2, 100);
        assert_eq!(lcg.total_size(), 202);
    }

    #[test]
    fn test_bsr_update_splits_evenly() {
        let mut lcg = LogicalChannelGroup::new(1);
        lcg.insert(LogicalChannel::new(&lc_config(3)));
        lcg.update_from_bsr(1132);
        assert_eq!(lcg.total_size(), 1132);

        lcg.insert(LogicalChannel::new(&lc_config(4)));
        lcg.update_from_bsr(11);
        assert_eq!(lcg.lc_total_size(3), 6);
        assert_eq!(lcg.lc_total_size(4), 5);
    }
}
