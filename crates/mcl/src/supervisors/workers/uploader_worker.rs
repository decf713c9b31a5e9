//! 🎬 *[an upload queue fills with batches. somewhere, a memcached waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 📡 The UploaderWorker — patient, tireless, and deeply unbothered by the chaos upstream.
//! It receives upload batches. It writes upload batches. When memcached says "not all of them",
//! it naps and tries the whole batch again. When it runs out of tries, it writes down who
//! didn't make it and moves on with its life.
//!
//! 🧠 Knowledge graph:
//! - Retries resend the FULL batch, not just the failed keys. `set` is idempotent; a partial
//!   resend would be an optimization nobody asked for.
//! - A transport error counts as "every key unwritten" for that attempt. Same retry path.
//! - Failure is batch-local. A bad batch never stops the uploader.
//! - Channel closed and drained = the termination marker. Return counts, exit.

use std::time::Duration;

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Worker;
use crate::backends::{CacheBackend, CacheClient, MemcacheConfig};
use crate::common::UploadBatch;
use crate::stats::Counts;

/// 🔄 How many extra attempts, and how long to nap between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) retries: u32,
    pub(crate) delay: Duration,
}

impl From<&MemcacheConfig> for RetryPolicy {
    fn from(config: &MemcacheConfig) -> Self {
        Self {
            retries: config.retry,
            delay: config.retry_timeout(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct UploaderWorker {
    id: usize,
    address: String,
    rx: Receiver<UploadBatch>,
    backend: CacheBackend,
    retry: RetryPolicy,
}

impl UploaderWorker {
    pub(crate) fn new(
        id: usize,
        address: String,
        rx: Receiver<UploadBatch>,
        backend: CacheBackend,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id,
            address,
            rx,
            backend,
            retry,
        }
    }

    async fn run(mut self) -> Result<Counts> {
        debug!("📥 Uploader {} started, memc_addr = {}", self.id, self.address);
        let mut counts = Counts::default();
        while let Ok(batch) = self.rx.recv().await {
            counts += self.upload(&batch).await;
        }
        debug!(
            "🏁 Uploader {} for {} done: errors = {} processed = {}",
            self.id, self.address, counts.errors, counts.processed
        );
        Ok(counts)
    }

    /// 🚀 Write one batch with bounded retries and say how it went.
    async fn upload(&mut self, batch: &UploadBatch) -> Counts {
        let total = batch.len() as u64;
        let mut attempt = 0u32;
        loop {
            let unwritten = match self.backend.set_multi(batch).await {
                Ok(keys) => (keys.len() as u64).min(total),
                Err(err) => {
                    warn!("🔌 Cannot reach memc {}: {:#}", self.address, err);
                    total
                }
            };

            if unwritten == 0 {
                return Counts::new(0, total);
            }
            if attempt >= self.retry.retries {
                warn!(
                    "💀 Cannot write to memc {}: {} of {} keys still unwritten after {} attempt(s)",
                    self.address,
                    unwritten,
                    total,
                    attempt + 1
                );
                return Counts::new(unwritten, total - unwritten);
            }

            attempt += 1;
            debug!(
                "🔄 memc {} left {} keys unwritten; retry {}/{} in {:?}",
                self.address, unwritten, attempt, self.retry.retries, self.retry.delay
            );
            tokio::time::sleep(self.retry.delay).await;
        }
    }
}

impl Worker for UploaderWorker {
    fn start(self) -> JoinHandle<Result<Counts>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::InMemoryCache;

    const ADDRESS: &str = "127.0.0.1:33013";

    fn batch_of(keys: &[&str]) -> UploadBatch {
        keys.iter()
            .map(|key| (key.to_string(), key.as_bytes().to_vec()))
            .collect()
    }

    fn no_nap(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::ZERO,
        }
    }

    async fn run_uploader(
        cache: &InMemoryCache,
        retry: RetryPolicy,
        batches: Vec<UploadBatch>,
    ) -> Counts {
        let (tx, rx) = async_channel::bounded(batches.len().max(1));
        let handle = UploaderWorker::new(
            0,
            ADDRESS.to_string(),
            rx,
            CacheBackend::InMemory(cache.client(ADDRESS)),
            retry,
        )
        .start();
        for batch in batches {
            tx.send(batch).await.expect("💀 uploader hung up early");
        }
        drop(tx);
        handle
            .await
            .expect("💀 uploader panicked")
            .expect("💀 uploader failed")
    }

    #[tokio::test]
    async fn the_one_where_the_third_time_is_the_charm() {
        let cache = InMemoryCache::new();
        // -- fail attempts 1 and 2, succeed on 3 (= 2 retries, exactly the budget)
        cache.fail_next_attempts(2).await;

        let batch = batch_of(&["idfa:a", "idfa:b", "idfa:c"]);
        let counts = run_uploader(&cache, no_nap(2), vec![batch]).await;

        assert_eq!(counts, Counts::new(0, 3));
        assert_eq!(cache.total_attempts().await, 3);
        assert_eq!(cache.entries(ADDRESS).await.len(), 3);
    }

    #[tokio::test]
    async fn the_one_where_retries_run_out() {
        let cache = InMemoryCache::new();
        cache.refuse_key("idfa:b").await;

        let batch = batch_of(&["idfa:a", "idfa:b", "idfa:c"]);
        let counts = run_uploader(&cache, no_nap(2), vec![batch]).await;

        // -- one stubborn key: counted once as an error, the rest processed
        assert_eq!(counts, Counts::new(1, 2));
        assert_eq!(cache.total_attempts().await, 3);
    }

    #[tokio::test]
    async fn the_one_where_only_the_last_attempt_gets_a_vote() {
        let cache = InMemoryCache::new();
        // -- attempt 1: all three unwritten. attempt 2: only the stubborn one.
        cache.fail_next_attempts(1).await;
        cache.refuse_key("idfa:b").await;

        let batch = batch_of(&["idfa:a", "idfa:b", "idfa:c"]);
        let counts = run_uploader(&cache, no_nap(1), vec![batch]).await;

        assert_eq!(counts, Counts::new(1, 2));
        assert_eq!(cache.total_attempts().await, 2);
    }

    #[tokio::test]
    async fn the_one_where_zero_retries_means_one_shot() {
        let cache = InMemoryCache::new();
        cache.fail_next_attempts(1).await;

        let counts = run_uploader(&cache, no_nap(0), vec![batch_of(&["idfa:a", "idfa:b"])]).await;

        assert_eq!(counts, Counts::new(2, 0));
        assert_eq!(cache.total_attempts().await, 1);
    }

    #[tokio::test]
    async fn the_one_where_the_endpoint_is_down_but_the_uploader_is_not() {
        let cache = InMemoryCache::new();
        cache.take_down(ADDRESS).await;

        let counts = run_uploader(
            &cache,
            no_nap(1),
            vec![batch_of(&["idfa:a", "idfa:b"]), batch_of(&["idfa:c"])],
        )
        .await;

        // -- both batches fail, both are counted, the uploader survives to report it
        assert_eq!(counts, Counts::new(3, 0));
        assert_eq!(cache.total_attempts().await, 4);
    }

    #[tokio::test]
    async fn the_one_where_a_bad_batch_does_not_spoil_the_next_one() {
        let cache = InMemoryCache::new();
        cache.fail_next_attempts(1).await;

        let counts = run_uploader(
            &cache,
            no_nap(0),
            vec![batch_of(&["idfa:a"]), batch_of(&["idfa:b", "idfa:c"])],
        )
        .await;

        assert_eq!(counts, Counts::new(1, 2));
    }
}
