//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `AppConfig` = what to load (`pattern`), where it goes (`routes`), how hard we try (`memcache`),
//!   and how big the pipes are (`runtime`).
//! - Every field has a serde default. An empty TOML file is a valid config. So is no file at all.
//! - The CLI layers its flags on top after loading (see `mcl-cli`).
//! - Nothing in here is mutated once the supervisor is built. Immutable knobs, threaded through
//!   constructors, no globals. Globals are how you get a test that passes alone and fails in CI.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::MemcacheConfig;
use crate::common::RouteTable;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🌍 Glob of gzip files to load. Dot-files never match, which is how processed files hide.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// 🧪 Log the writes instead of doing them.
    #[serde(default, alias = "dry")]
    pub dry_run: bool,
    #[serde(default)]
    pub memcache: MemcacheConfig,
    /// 🗺️ device type → `host:port`. Providing this table replaces the defaults wholesale.
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, String>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            dry_run: false,
            memcache: MemcacheConfig::default(),
            routes: default_routes(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(self.routes.clone())
    }

    /// 🔒 Reject configs that would deadlock or divide by nothing before anything spawns.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.routes.is_empty(),
            "💀 No routes configured. Every record would be an unknown device type. That's not a load, that's a shredder."
        );
        for (category, address) in &self.routes {
            ensure!(
                !category.is_empty() && !address.is_empty(),
                "💀 Route '{}' → '{}' has an empty side. Both the device type and the address need a name.",
                category,
                address
            );
        }
        ensure!(
            self.memcache.socket_timeout_secs > 0,
            "💀 memcache.socket_timeout_secs = 0 means every write times out before it starts"
        );
        self.runtime.validate()
    }
}

/// 🧵 Pipeline sizing knobs. How many records per batch, how many batches per queue,
/// how many uploaders per category.
///
/// Memory is bounded by `queue capacity × frame size` per stage per category.
/// Raise these and the RSS graph will tell on you.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 📦 Records per batch handed from the reader to a converter.
    #[serde(default = "default_frame_size", alias = "CONVERT_FRAME_SIZE")]
    pub convert_frame_size: usize,
    /// 📦 Keys per `set_multi` call.
    #[serde(default = "default_frame_size", alias = "UPLOAD_FRAME_SIZE")]
    pub upload_frame_size: usize,
    /// 🚰 Batches buffered between the reader and each converter before the reader blocks.
    #[serde(default = "default_queue_capacity", alias = "CONVERT_QUEUE_MAXSIZE")]
    pub convert_queue_capacity: usize,
    /// 🚰 Upload batches buffered between a converter and its uploaders.
    #[serde(default = "default_queue_capacity", alias = "UPLOAD_QUEUE_MAXSIZE")]
    pub upload_queue_capacity: usize,
    /// 🧵 Uploaders per category, each with its own memcached connection.
    #[serde(default = "default_uploaders", alias = "UPLOADERS")]
    pub uploaders: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            convert_frame_size: default_frame_size(),
            upload_frame_size: default_frame_size(),
            convert_queue_capacity: default_queue_capacity(),
            upload_queue_capacity: default_queue_capacity(),
            uploaders: default_uploaders(),
        }
    }
}

impl RuntimeConfig {
    /// 🔒 Zero-sized frames never flush and zero-capacity bounded channels panic on creation.
    /// Neither is a vibe.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("convert_frame_size", self.convert_frame_size),
            ("upload_frame_size", self.upload_frame_size),
            ("convert_queue_capacity", self.convert_queue_capacity),
            ("upload_queue_capacity", self.upload_queue_capacity),
            ("uploaders", self.uploaders),
        ] {
            ensure!(value > 0, "💀 runtime.{} must be at least 1, got {}", name, value);
        }
        Ok(())
    }
}

fn default_pattern() -> String {
    "/data/appsinstalled/*.tsv.gz".to_string()
}

// 📦 256 — a power of two, which is how you know an engineer picked it.
fn default_frame_size() -> usize {
    256
}

fn default_queue_capacity() -> usize {
    64
}

fn default_uploaders() -> usize {
    1
}

/// 🗺️ The four device types and the four memcacheds on localhost that love them.
fn default_routes() -> BTreeMap<String, String> {
    [
        ("idfa", "127.0.0.1:33013"),
        ("gaid", "127.0.0.1:33014"),
        ("adid", "127.0.0.1:33015"),
        ("dvid", "127.0.0.1:33016"),
    ]
    .into_iter()
    .map(|(category, address)| (category.to_string(), address.to_string()))
    .collect()
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`MCL_*`, nested with `__`, e.g. `MCL_MEMCACHE__RETRY=5`)
/// with an optional TOML file. TOML wins on conflicts.
///
/// - `None` → env vars + serde defaults. No file. No assumptions.
/// - `Some(path)` → env vars + that file, merged.
///
/// 💀 Returns an error if the config is unparseable or fails validation.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("MCL_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (MCL_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (MCL_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 The config parsed, but it describes a pipeline that cannot exist")?;
    Ok(app_config)
}
