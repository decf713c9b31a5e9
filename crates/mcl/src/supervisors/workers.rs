//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the credit
//! in the sprint retro.
//!
//! Two kinds of minion live here:
//! - 🔄 `ConverterWorker` — one per device type. Encodes records, packs upload batches,
//!   and runs its own little crew of uploaders.
//! - 📡 `UploaderWorker` — one or more per converter. Owns a cache connection, writes
//!   batches, retries, counts.
//!
//! Both finish by returning their `Counts` through the `JoinHandle`. The join *is* the
//! stats channel. One less queue to close in the right order.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::stats::Counts;

mod converter_worker;
mod uploader_worker;

pub(crate) use converter_worker::ConverterWorker;
pub(crate) use uploader_worker::RetryPolicy;

/// 🏗️ A background worker, that does work. duh.
///
/// Start it, get a handle, await the handle to get its counts (or its excuse).
pub(crate) trait Worker {
    fn start(self) -> JoinHandle<Result<Counts>>;
}
