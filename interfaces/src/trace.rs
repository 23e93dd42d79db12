//! Slot Allocation Trace
//!
//! Writes every emitted slot allocation as one JSON object per line

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::{InterfaceError, SchedConfigInd};
use common::types::{Direction, Rnti, SfnSf};

/// Flattened view of one data block, as written to the trace
#[derive(Debug, Serialize)]
struct TraceEntry {
    direction: Direction,
    rnti: Option<Rnti>,
    sym_start: u8,
    num_sym: u8,
    num_rbg: u32,
    mcs: u8,
    tbs: u32,
    harq_process: u8,
    rv: u8,
}

#[derive(Debug, Serialize)]
struct TraceRecord {
    sfn_sf: SfnSf,
    num_sym_alloc: u32,
    allocations: Vec<TraceEntry>,
}

/// JSON-lines writer for scheduling decisions
pub struct SlotTraceWriter<W: Write> {
    writer: W,
    records: u64,
}

impl SlotTraceWriter<BufWriter<File>> {
    /// Create (truncate) a trace file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, InterfaceError> {
        let file = File::create(path.as_ref())?;
        info!("Writing slot trace to {}", path.as_ref().display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> SlotTraceWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Append one indication; control blocks are skipped
    pub fn write(&mut self, ind: &SchedConfigInd) -> Result<(), InterfaceError> {
        let allocations = ind
            .slot_alloc_info
            .var_tti_alloc_info
            .iter()
            .filter(|alloc| alloc.is_data())
            .map(|alloc| TraceEntry {
                direction: alloc.direction,
                rnti: alloc.dci.rnti,
                sym_start: alloc.dci.sym_start,
                num_sym: alloc.dci.num_sym,
                num_rbg: alloc.dci.rbg_count(),
                mcs: alloc.dci.mcs,
                tbs: alloc.dci.tbs,
                harq_process: alloc.dci.harq_process,
                rv: alloc.dci.rv,
            })
            .collect();

        let record = TraceRecord {
            sfn_sf: ind.sfn_sf,
            num_sym_alloc: ind.slot_alloc_info.num_sym_alloc,
            allocations,
        };

        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> Result<(), InterfaceError> {
        self.writer.flush()?;
        debug!("Flushed {} trace records", self.records);
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
