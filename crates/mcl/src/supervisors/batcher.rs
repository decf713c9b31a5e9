//! 📦 The Batcher — sorts parsed records into per-device-type piles and ships full piles.
//!
//! Runs on a blocking thread, right next to the gzip decoder. Pushes with `send_blocking`:
//! when a converter's queue is full, this thread simply stops until there's room. That stop
//! IS the backpressure. Memory stays bounded at `queue capacity × frame size` per category,
//! no matter how far behind memcached falls.
//!
//! 🧠 Knowledge graph:
//! - Blank lines: skipped, not counted.
//! - Malformed lines and unknown device types: counted as file errors, dropped.
//! - `finish()` flushes the short tail batches, then drops every sender. A closed, drained
//!   queue is each converter's termination marker.

use std::collections::HashMap;
use std::mem;

use anyhow::{Result, anyhow};
use async_channel::Sender;
use tracing::{debug, error};

use crate::backends::Source;
use crate::common::{ParsedRecord, RecordBatch};
use crate::errors::RecordError;
use crate::parser::parse_line;

#[derive(Debug)]
struct Lane {
    tx: Sender<RecordBatch>,
    pending: RecordBatch,
}

/// 🗂️ One lane per routed device type. Unrouted device types have no lane, by construction.
#[derive(Debug)]
pub(crate) struct Batcher {
    frame_size: usize,
    lanes: HashMap<String, Lane>,
    errors: u64,
}

impl Batcher {
    pub(crate) fn new(
        frame_size: usize,
        senders: impl IntoIterator<Item = (String, Sender<RecordBatch>)>,
    ) -> Self {
        let lanes = senders
            .into_iter()
            .map(|(category, tx)| {
                (
                    category,
                    Lane {
                        tx,
                        pending: RecordBatch::with_capacity(frame_size),
                    },
                )
            })
            .collect();
        Self {
            frame_size,
            lanes,
            errors: 0,
        }
    }

    /// 🚰 Pull every line out of `source`, then `finish()`. Returns the file-level error count.
    ///
    /// If the source breaks mid-stream, the batcher is dropped on the way out, which closes
    /// every queue. The converters wind down on their own; the error goes up.
    pub(crate) fn drain<S: Source>(mut self, mut source: S) -> Result<u64> {
        while let Some(line) = source.next_line()? {
            self.push_line(&line)?;
        }
        self.finish()
    }

    /// 🔍 Parse and route one raw line.
    pub(crate) fn push_line(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        match parse_line(line) {
            Ok(record) => self.push_record(record),
            Err(err) => {
                debug!("🐛 Skipping line: {} (`{}`)", err, line.trim_end());
                self.errors += 1;
                Ok(())
            }
        }
    }

    /// 🗺️ Route one record. Only `Err` if the converter on the other end has vanished.
    pub(crate) fn push_record(&mut self, record: ParsedRecord) -> Result<()> {
        let Some(lane) = self.lanes.get_mut(&record.category) else {
            error!(
                "🗺️ {}",
                RecordError::UnknownCategory {
                    category: record.category
                }
            );
            self.errors += 1;
            return Ok(());
        };

        lane.pending.push(record);
        if lane.pending.len() >= self.frame_size {
            let batch = mem::replace(
                &mut lane.pending,
                RecordBatch::with_capacity(self.frame_size),
            );
            Self::ship(&lane.tx, batch)?;
        }
        Ok(())
    }

    /// 🏁 Flush every short batch and close every queue. Returns the file-level error count.
    pub(crate) fn finish(mut self) -> Result<u64> {
        for lane in self.lanes.values_mut() {
            if !lane.pending.is_empty() {
                let batch = mem::take(&mut lane.pending);
                Self::ship(&lane.tx, batch)?;
            }
        }
        // -- 🔒 senders drop with `self` here; that's the termination marker for every converter
        Ok(self.errors)
    }

    fn ship(tx: &Sender<RecordBatch>, batch: RecordBatch) -> Result<()> {
        tx.send_blocking(batch).map_err(|_| {
            anyhow!(
                "💀 A converter's queue closed while we were still feeding it. \
                 The converter must have died."
            )
        })
    }
}
