//! 🎬 *[camera pans across a directory full of .tsv.gz files]*
//! 🎬 "In a world where app installs pile up by the gigabyte..."
//! 🎬 "One supervisor dared to load them all. One file at a time." 🦆
//!
//! 📦 The Supervisor — part middle manager, part helicopter parent. Per file:
//!
//! ```text
//!  Idle ──▶ Spawning ──▶ Streaming ──▶ Draining ──▶ Finalized
//!   │          │             │             │             │
//!  open     1 converter   gunzip+parse   await every   sum, judge,
//!  gzip     per route     +batch on a    converter     dot-rename
//!                         blocking thread
//! ```
//!
//! ⚠️ The workers are private. DO NOT MAKE THEM PUB.
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod batcher;
mod workers;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::MatchOptions;
use tracing::{debug, error, info, warn};

use crate::app_config::{AppConfig, RuntimeConfig};
use crate::backends::{Connector, SourceBackend, gzip_source::GzipFileSource};
use crate::common::RouteTable;
use crate::stats::{Counts, FileReport, NORMAL_ERR_RATE, Verdict, aggregate, summary_table};
use batcher::Batcher;
use workers::{ConverterWorker, RetryPolicy, Worker};

/// 🚦 Where a file is in its short, eventful life. Only used to narrate in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Spawning,
    Streaming,
    Draining,
    Finalized,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Spawning => "spawning",
            Phase::Streaming => "streaming",
            Phase::Draining => "draining",
            Phase::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
#[derive(Debug)]
pub(crate) struct Supervisor {
    pattern: String,
    routes: RouteTable,
    runtime: RuntimeConfig,
    retry: RetryPolicy,
    connector: Connector,
}

impl Supervisor {
    pub(crate) fn new(app_config: &AppConfig) -> Self {
        Self {
            pattern: app_config.pattern.clone(),
            routes: app_config.route_table(),
            runtime: app_config.runtime.clone(),
            retry: RetryPolicy::from(&app_config.memcache),
            connector: Connector::from_config(app_config),
        }
    }

    #[cfg(test)]
    fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    /// 🚀 Every file the glob matches, in order, one at a time. The first fatal error ends the run.
    pub(crate) async fn run(&self) -> Result<Vec<FileReport>> {
        let files = discover(&self.pattern)?;
        if files.is_empty() {
            warn!("🤷 Nothing matches '{}'. Nothing to load.", self.pattern);
        }

        let mut reports = Vec::with_capacity(files.len());
        for path in files {
            info!("📂 Processing {}", path.display());
            let report = self
                .process_file(&path)
                .await
                .with_context(|| format!("💀 Loading '{}' failed", path.display()))?;
            reports.push(report);
        }

        if !reports.is_empty() {
            info!("📊 Run summary:\n{}", summary_table(&reports));
        }
        Ok(reports)
    }

    /// 🎬 One file, start to finish. Renamed to `.<name>` on the way out, whatever the verdict.
    pub(crate) async fn process_file(&self, path: &Path) -> Result<FileReport> {
        narrate(path, Phase::Idle);
        let owned_path = path.to_path_buf();
        let source = tokio::task::spawn_blocking(move || GzipFileSource::open(&owned_path))
            .await
            .context("💀 The thread opening the input panicked")??;

        let counts = self.load(path, SourceBackend::Gzip(source)).await?;

        narrate(path, Phase::Finalized);
        let report = FileReport {
            path: path.to_path_buf(),
            counts,
        };
        announce(&report);
        dot_rename(path).await?;
        Ok(report)
    }

    /// 🧵 Spawning → Streaming → Draining for any line source. Returns file-level + pipeline counts.
    async fn load(&self, path: &Path, source: SourceBackend) -> Result<Counts> {
        narrate(path, Phase::Spawning);
        let mut senders = Vec::with_capacity(self.routes.len());
        let mut converters = Vec::with_capacity(self.routes.len());
        for (category, address) in self.routes.iter() {
            let (tx, rx) = async_channel::bounded(self.runtime.convert_queue_capacity);
            senders.push((category.to_string(), tx));
            let handle = ConverterWorker::new(
                category.to_string(),
                address.to_string(),
                rx,
                self.connector.clone(),
                self.retry,
                self.runtime.clone(),
            )
            .start();
            converters.push((category.to_string(), handle));
        }

        narrate(path, Phase::Streaming);
        let batcher = Batcher::new(self.runtime.convert_frame_size, senders);
        let streamed = tokio::task::spawn_blocking(move || batcher.drain(source)).await;

        narrate(path, Phase::Draining);
        let mut pipeline_counts = Vec::with_capacity(converters.len());
        let mut converter_failure = None;
        for (category, handle) in converters {
            match handle.await {
                Ok(Ok(counts)) => {
                    debug!(
                        "✅ {}: errors = {} processed = {}",
                        category, counts.errors, counts.processed
                    );
                    pipeline_counts.push(counts);
                }
                Ok(Err(err)) => {
                    error!("💀 Converter for {} failed: {:#}", category, err);
                    let err = err.context(format!("💀 Converter for {} failed", category));
                    converter_failure.get_or_insert(err);
                }
                Err(join_err) => {
                    error!("💀 Converter for {} panicked: {}", category, join_err);
                    let err = anyhow::Error::new(join_err)
                        .context(format!("💀 Converter for {} panicked", category));
                    converter_failure.get_or_insert(err);
                }
            }
        }

        // -- 💀 a dead converter explains a closed queue better than the closed queue does
        if let Some(err) = converter_failure {
            return Err(err);
        }
        let parse_errors = streamed.context("💀 The reader thread panicked")??;

        Ok(Counts::new(parse_errors, 0) + aggregate(pipeline_counts))
    }
}

fn narrate(path: &Path, phase: Phase) {
    debug!("🚦 {} → {}", path.display(), phase);
}

/// ⚖️ Log the numbers and the verdict. Advisory: nobody gets an exception over it.
fn announce(report: &FileReport) {
    info!(
        "📊 {}: errors = {} processed = {}",
        report.path.display(),
        report.counts.errors,
        report.counts.processed
    );
    match report.verdict() {
        Verdict::Acceptable(rate) => {
            info!("✅ Acceptable error rate ({}). Successful load", rate)
        }
        Verdict::HighErrorRate(rate) => {
            error!("💀 High error rate ({} > {}). Failed load", rate, NORMAL_ERR_RATE)
        }
        Verdict::NothingProcessed => {
            warn!("🤷 Nothing was processed, so there is no error rate to judge")
        }
    }
}

/// 🌍 Expand the glob. Leading-dot names never match, so files we already renamed stay hidden.
fn discover(pattern: &str) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::default()
    };
    let mut files = Vec::new();
    for entry in glob::glob_with(pattern, options)
        .with_context(|| format!("💀 '{}' is not a glob pattern we can work with", pattern))?
    {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(path) => debug!("⏭️ {} is not a regular file, skipping", path.display()),
            Err(err) => warn!("⚠️ Could not read a glob match: {}", err),
        }
    }
    files.sort();
    Ok(files)
}

/// 🏷️ `/dir/file.tsv.gz` → `/dir/.file.tsv.gz`. Same directory, so the rename is atomic.
async fn dot_rename(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().with_context(|| {
        format!(
            "💀 '{}' has no file name to put a dot in front of",
            path.display()
        )
    })?;
    let mut marked = std::ffi::OsString::from(".");
    marked.push(file_name);
    let target = path.with_file_name(marked);
    tokio::fs::rename(path, &target).await.with_context(|| {
        format!(
            "💀 Could not mark '{}' as processed (rename to '{}')",
            path.display(),
            target.display()
        )
    })?;
    debug!("🏷️ {} → {}", path.display(), target.display());
    Ok(target)
}
