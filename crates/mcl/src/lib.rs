//! 🚀 mcl — memcache loader. Gzipped TSV of app installs in, protobuf blobs in memcached out.
//!
//! 🎬 *[a cron job fires at 03:00. nobody is awake. this is its moment.]*
//!
//! 🧠 Knowledge graph:
//! - `run()` is the whole program. Config in, one `FileReport` per file out.
//! - `parse_line` / `UserApps` are public so the bench and the curious can poke at them.
//! - Everything with moving parts (queues, workers, sockets) stays private. 🦆

pub mod app_config;
mod backends;
mod codec;
mod common;
mod errors;
mod parser;
mod progress;
mod stats;
mod supervisors;

use anyhow::{Context, Result};
use tracing::info;

pub use app_config::{AppConfig, RuntimeConfig};
pub use backends::MemcacheConfig;
pub use codec::{UserApps, self_check};
pub use common::{Coordinate, ParsedRecord, RouteTable};
pub use errors::RecordError;
pub use parser::parse_line;
pub use stats::{Counts, FileReport, NORMAL_ERR_RATE, Verdict};

use crate::supervisors::Supervisor;

/// 🚀 Load every file the configured glob matches. One at a time, oldest name first.
///
/// 💀 Returns `Err` for a config that fails `AppConfig::validate`, and on the first fatal
/// problem after that (unreadable file, converter crash).
/// A high error rate is NOT fatal: it's logged, reported, and the run moves on.
pub async fn run(app_config: AppConfig) -> Result<Vec<FileReport>> {
    app_config
        .validate()
        .context("💀 Refusing to start: this config describes a pipeline that cannot exist")?;
    if app_config.dry_run {
        info!("🧪 Dry run: nothing will be written to memcached");
    }
    let supervisor = Supervisor::new(&app_config);
    supervisor.run().await
}
