//! # Previously, on mcl...
//!
//! 🎬 The memcacheds were not running. They were never running. CI does not have memcached,
//! CI has opinions. So this module pretends.
//!
//! `InMemorySource` hands out a fixed list of lines and then goes quiet.
//! `InMemoryCache` is a whole fake cluster: one `HashMap` per address, plus a few knobs for
//! making it misbehave on command (fail the next N attempts, refuse certain keys, be "down").
//!
//! ⚠️ Test-only. Compiled under `cfg(test)`. If you're deploying this to prod, please also
//! deploy a therapist. 🦆

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::backends::{CacheClient, Source};
use crate::common::UploadBatch;

/// 📦 A source that knows exactly the lines you gave it.
#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    lines: VecDeque<String>,
}

impl InMemorySource {
    pub(crate) fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl Source for InMemorySource {
    fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

#[derive(Debug, Default)]
pub(crate) struct ClusterState {
    stores: HashMap<String, HashMap<String, Vec<u8>>>,
    attempts: HashMap<String, usize>,
    failing_attempts: usize,
    refused_keys: HashSet<String>,
    down: HashSet<String>,
}

/// 🔒 A pretend memcached cluster, shared by every client it hands out.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryCache {
    state: Arc<Mutex<ClusterState>>,
}

impl InMemoryCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn client(&self, address: &str) -> InMemoryClient {
        InMemoryClient {
            cache: self.clone(),
            address: address.to_string(),
        }
    }

    /// 💀 The next `attempts` calls to `set_multi` (any address) store nothing.
    pub(crate) async fn fail_next_attempts(&self, attempts: usize) {
        self.state.lock().await.failing_attempts = attempts;
    }

    /// 🚫 This key is never stored, no matter how many times you ask.
    pub(crate) async fn refuse_key(&self, key: &str) {
        self.state.lock().await.refused_keys.insert(key.to_string());
    }

    /// 🔌 Connections to this address fail outright.
    pub(crate) async fn take_down(&self, address: &str) {
        self.state.lock().await.down.insert(address.to_string());
    }

    /// 🧊 Every `set_multi` on every address waits until the returned guard is dropped.
    pub(crate) async fn freeze(&self) -> OwnedMutexGuard<ClusterState> {
        Arc::clone(&self.state).lock_owned().await
    }

    pub(crate) async fn get(&self, address: &str, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.stores.get(address).and_then(|store| store.get(key).cloned())
    }

    pub(crate) async fn entries(&self, address: &str) -> HashMap<String, Vec<u8>> {
        let state = self.state.lock().await;
        state.stores.get(address).cloned().unwrap_or_default()
    }

    /// 📊 Every `set_multi` call ever made, across every address.
    pub(crate) async fn total_attempts(&self) -> usize {
        self.state.lock().await.attempts.values().sum()
    }
}

/// 📡 One uploader's handle on the pretend cluster.
#[derive(Debug)]
pub(crate) struct InMemoryClient {
    cache: InMemoryCache,
    address: String,
}

#[async_trait]
impl CacheClient for InMemoryClient {
    async fn set_multi(&mut self, entries: &UploadBatch) -> Result<Vec<String>> {
        let mut state = self.cache.state.lock().await;
        *state.attempts.entry(self.address.clone()).or_default() += 1;

        if state.down.contains(&self.address) {
            bail!("💀 connection refused by pretend memcached at {}", self.address);
        }
        if state.failing_attempts > 0 {
            state.failing_attempts -= 1;
            return Ok(entries.keys().cloned().collect());
        }

        let mut unwritten = Vec::new();
        for (key, payload) in entries {
            if state.refused_keys.contains(key) {
                unwritten.push(key.clone());
            } else {
                state
                    .stores
                    .entry(self.address.clone())
                    .or_default()
                    .insert(key.clone(), payload.clone());
            }
        }
        Ok(unwritten)
    }
}
