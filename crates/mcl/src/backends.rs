//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 Sources pour lines out of gzip files, caches slurp payloads into memcached.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → backend enum that dispatches. Same shape on both ends.
//! - `Source` is synchronous on purpose: it runs on a blocking thread next to flate2, which
//!   is a blocking decoder and has never once pretended otherwise.
//! - `CacheClient` is async: it talks to memcached over tokio sockets.
//! - `Connector` is how an uploader gets its own `CacheBackend`. One connection per uploader,
//!   owned for its whole life, never shared across categories.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::AppConfig;
use crate::common::UploadBatch;

pub(crate) mod dry_run;
pub(crate) mod gzip_source;
#[cfg(test)]
pub(crate) mod in_mem;
pub(crate) mod memcache;

pub use memcache::MemcacheConfig;

// ===== Source Trait and Backend Enum =====

/// 🚰 A source of raw text lines.
///
/// # Contract 📜
/// - `next_line` returns `Ok(Some(line))` while data flows, `Ok(None)` at EOF.
/// - Lines may still carry their trailing newline. The parser trims; the source doesn't care.
/// - `Err(...)` means the input itself is broken (unreadable, corrupt gzip, not UTF-8).
///   That is fatal for the file. There is no "skip the corrupt bit" here.
pub(crate) trait Source: Debug + Send {
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// 🎭 The many faces of a Source. Production reads gzip; tests read a `Vec`.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    Gzip(gzip_source::GzipFileSource),
    #[cfg(test)]
    InMemory(in_mem::InMemorySource),
}

impl Source for SourceBackend {
    fn next_line(&mut self) -> Result<Option<String>> {
        match self {
            SourceBackend::Gzip(source) => source.next_line(),
            #[cfg(test)]
            SourceBackend::InMemory(source) => source.next_line(),
        }
    }
}

// ===== Cache Client Trait and Backend Enum =====

/// 🕳️ Something that can take a bag of key → payload pairs and try to store them.
///
/// # Contract 📜
/// - `set_multi` writes every entry and returns the keys that were NOT stored.
///   An empty vec is the happy path.
/// - `Err(...)` means the endpoint could not be talked to at all (connect refused, timeout,
///   broken pipe). Callers treat that as "every key unwritten" for the attempt.
/// - No retries in here. Retrying is the uploader's job. Single responsibility, etc.
#[async_trait]
pub(crate) trait CacheClient: Debug + Send {
    async fn set_multi(&mut self, entries: &UploadBatch) -> Result<Vec<String>>;
}

/// 🎭 Where the payloads actually go.
#[derive(Debug)]
pub(crate) enum CacheBackend {
    Memcache(memcache::MemcacheClient),
    DryRun(dry_run::DryRunClient),
    #[cfg(test)]
    InMemory(in_mem::InMemoryClient),
}

#[async_trait]
impl CacheClient for CacheBackend {
    async fn set_multi(&mut self, entries: &UploadBatch) -> Result<Vec<String>> {
        match self {
            CacheBackend::Memcache(client) => client.set_multi(entries).await,
            CacheBackend::DryRun(client) => client.set_multi(entries).await,
            #[cfg(test)]
            CacheBackend::InMemory(client) => client.set_multi(entries).await,
        }
    }
}

/// 🏭 Mints a fresh `CacheBackend` for an address. Cheap: connections open lazily on first write.
#[derive(Debug, Clone)]
pub(crate) enum Connector {
    Memcache(MemcacheConfig),
    DryRun,
    #[cfg(test)]
    InMemory(in_mem::InMemoryCache),
}

impl Connector {
    pub(crate) fn from_config(app_config: &AppConfig) -> Self {
        if app_config.dry_run {
            Connector::DryRun
        } else {
            Connector::Memcache(app_config.memcache.clone())
        }
    }

    pub(crate) fn connect(&self, address: &str) -> CacheBackend {
        match self {
            Connector::Memcache(config) => CacheBackend::Memcache(memcache::MemcacheClient::new(
                address.to_string(),
                config.socket_timeout(),
            )),
            Connector::DryRun => {
                CacheBackend::DryRun(dry_run::DryRunClient::new(address.to_string()))
            }
            #[cfg(test)]
            Connector::InMemory(cache) => CacheBackend::InMemory(cache.client(address)),
        }
    }
}
