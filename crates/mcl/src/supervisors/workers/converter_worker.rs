//! 🔄 The ConverterWorker — one per device type, its own little failure domain.
//!
//! Takes `RecordBatch`es off its convert queue, turns every record into a
//! `"<category>:<device_id>" → UserApps bytes` pair, packs those into upload batches,
//! and feeds them to a crew of uploaders it spawned itself.
//!
//! 🧠 Knowledge graph:
//! - Records stay FIFO from the reader to the pending upload batch. Duplicate keys inside one
//!   upload batch: last one wins (it's a `HashMap`).
//! - Upload queue full → `send().await` parks this task. Backpressure all the way up.
//! - Convert queue closed → flush the partial batch, close the upload queue (every uploader
//!   sees the close: one termination marker per uploader, for free), join the crew, sum.
//! - Nothing in here is shared with other categories. A converter that dies takes only its
//!   own category down with it.

use std::mem;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Worker;
use super::uploader_worker::{RetryPolicy, UploaderWorker};
use crate::app_config::RuntimeConfig;
use crate::backends::Connector;
use crate::codec::UserApps;
use crate::common::{RecordBatch, UploadBatch};
use crate::stats::{Counts, aggregate};

#[derive(Debug)]
pub(crate) struct ConverterWorker {
    category: String,
    address: String,
    rx: Receiver<RecordBatch>,
    connector: Connector,
    retry: RetryPolicy,
    runtime: RuntimeConfig,
}

impl ConverterWorker {
    pub(crate) fn new(
        category: String,
        address: String,
        rx: Receiver<RecordBatch>,
        connector: Connector,
        retry: RetryPolicy,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            category,
            address,
            rx,
            connector,
            retry,
            runtime,
        }
    }

    async fn run(self) -> Result<Counts> {
        debug!(
            "🔄 Converter for {} started, memc_addr = {}, uploaders = {}",
            self.category, self.address, self.runtime.uploaders
        );

        let (upload_tx, upload_rx) = async_channel::bounded(self.runtime.upload_queue_capacity);
        let crew: Vec<JoinHandle<Result<Counts>>> = (0..self.runtime.uploaders)
            .map(|id| {
                UploaderWorker::new(
                    id,
                    self.address.clone(),
                    upload_rx.clone(),
                    self.connector.connect(&self.address),
                    self.retry,
                )
                .start()
            })
            .collect();
        drop(upload_rx);

        let frame_size = self.runtime.upload_frame_size;
        let mut pending = UploadBatch::with_capacity(frame_size);
        while let Ok(batch) = self.rx.recv().await {
            for record in batch {
                let payload = UserApps::from_record(&record).encode_payload();
                pending.insert(record.key(), payload);
                if pending.len() >= frame_size {
                    let full = mem::replace(&mut pending, UploadBatch::with_capacity(frame_size));
                    self.hand_off(&upload_tx, full).await?;
                }
            }
        }

        if !pending.is_empty() {
            self.hand_off(&upload_tx, pending).await?;
        }
        // -- 🏁 closing the queue is the quit message. every uploader drains, then sees it.
        drop(upload_tx);

        let mut per_uploader = Vec::with_capacity(crew.len());
        for outcome in join_all(crew).await {
            let counts = outcome
                .with_context(|| format!("💀 An uploader for {} panicked", self.category))??;
            per_uploader.push(counts);
        }
        let counts = aggregate(per_uploader);
        debug!(
            "🏁 Converter for {} done: errors = {} processed = {}",
            self.category, counts.errors, counts.processed
        );
        Ok(counts)
    }

    async fn hand_off(&self, upload_tx: &Sender<UploadBatch>, batch: UploadBatch) -> Result<()> {
        upload_tx.send(batch).await.map_err(|_| {
            anyhow::anyhow!(
                "💀 Every uploader for {} ({}) is gone and the batches have nowhere to go",
                self.category,
                self.address
            )
        })
    }
}

impl Worker for ConverterWorker {
    fn start(self) -> JoinHandle<Result<Counts>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::InMemoryCache;
    use crate::common::{Coordinate, ParsedRecord};
    use std::time::Duration;

    const ADDRESS: &str = "127.0.0.1:33014";

    fn record(device_id: &str, raw_apps: &str) -> ParsedRecord {
        ParsedRecord {
            category: "gaid".into(),
            device_id: device_id.into(),
            lat: Coordinate::Parsed(1.0),
            lon: Coordinate::Parsed(2.0),
            raw_apps: raw_apps.into(),
        }
    }

    fn converter(
        cache: &InMemoryCache,
        rx: Receiver<RecordBatch>,
        upload_frame_size: usize,
        uploaders: usize,
    ) -> ConverterWorker {
        ConverterWorker::new(
            "gaid".to_string(),
            ADDRESS.to_string(),
            rx,
            Connector::InMemory(cache.clone()),
            RetryPolicy {
                retries: 0,
                delay: Duration::ZERO,
            },
            RuntimeConfig {
                upload_frame_size,
                upload_queue_capacity: 4,
                uploaders,
                ..RuntimeConfig::default()
            },
        )
    }

    async fn decoded(cache: &InMemoryCache, key: &str) -> UserApps {
        let payload = cache
            .get(ADDRESS, key)
            .await
            .unwrap_or_else(|| panic!("💀 {} was never stored", key));
        UserApps::decode_payload(&payload).expect("💀 stored payload should decode")
    }

    #[tokio::test]
    async fn the_one_where_every_record_lands_and_the_partial_batch_is_flushed() {
        let cache = InMemoryCache::new();
        let (tx, rx) = async_channel::bounded(4);
        let handle = converter(&cache, rx, 2, 3).start();

        tx.send(vec![record("a", "1,2"), record("b", "3"), record("c", "")])
            .await
            .expect("💀 converter hung up");
        tx.send(vec![record("d", "4,x,5")]).await.expect("💀 converter hung up");
        drop(tx);

        let counts = handle.await.expect("💀 panicked").expect("💀 failed");
        assert_eq!(counts, Counts::new(0, 4));
        assert_eq!(cache.entries(ADDRESS).await.len(), 4);
        assert_eq!(decoded(&cache, "gaid:a").await.apps, vec![1, 2]);
        assert_eq!(decoded(&cache, "gaid:c").await.apps, Vec::<u32>::new());
        assert_eq!(decoded(&cache, "gaid:d").await.apps, vec![4, 5]);
    }

    #[tokio::test]
    async fn the_one_where_the_last_duplicate_wins() {
        let cache = InMemoryCache::new();
        let (tx, rx) = async_channel::bounded(4);
        let handle = converter(&cache, rx, 16, 1).start();

        tx.send(vec![record("a", "1"), record("a", "2")])
            .await
            .expect("💀 converter hung up");
        drop(tx);

        let counts = handle.await.expect("💀 panicked").expect("💀 failed");
        // -- two records, one key: the upload batch only ever held one entry
        assert_eq!(counts, Counts::new(0, 1));
        assert_eq!(decoded(&cache, "gaid:a").await.apps, vec![2]);
    }

    #[tokio::test]
    async fn the_one_where_nothing_arrives_and_nothing_is_written() {
        let cache = InMemoryCache::new();
        let (tx, rx) = async_channel::bounded::<RecordBatch>(1);
        let handle = converter(&cache, rx, 2, 2).start();
        drop(tx);

        let counts = handle.await.expect("💀 panicked").expect("💀 failed");
        assert_eq!(counts, Counts::default());
        assert_eq!(cache.total_attempts().await, 0);
    }

    #[tokio::test]
    async fn the_one_where_a_stuck_uploader_makes_the_converter_wait() {
        let cache = InMemoryCache::new();
        let (tx, rx) = async_channel::bounded(8);
        let mut worker = converter(&cache, rx, 1, 1);
        worker.runtime.upload_queue_capacity = 1;

        let frozen = cache.freeze().await;
        let handle = worker.start();
        for device_id in ["a", "b", "c", "d", "e"] {
            tx.send(vec![record(device_id, "1")]).await.expect("💀 converter hung up");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        // -- "a" is stuck in the uploader, "b" fills the upload queue, "c" is parked in hand_off.
        // -- so "d" and "e" never leave the convert queue.
        assert_eq!(tx.len(), 2);
        assert!(
            !handle.is_finished(),
            "💀 the converter should be parked on a full upload queue"
        );

        drop(frozen);
        drop(tx);
        let counts = handle.await.expect("💀 panicked").expect("💀 failed");
        assert_eq!(counts, Counts::new(0, 5));
        assert_eq!(cache.entries(ADDRESS).await.len(), 5);
    }

    #[tokio::test]
    async fn the_one_where_write_failures_bubble_up_as_counts() {
        let cache = InMemoryCache::new();
        cache.refuse_key("gaid:b").await;
        let (tx, rx) = async_channel::bounded(4);
        let handle = converter(&cache, rx, 8, 1).start();

        tx.send(vec![record("a", "1"), record("b", "2"), record("c", "3")])
            .await
            .expect("💀 converter hung up");
        drop(tx);

        let counts = handle.await.expect("💀 panicked").expect("💀 failed");
        assert_eq!(counts, Counts::new(1, 2));
    }
}
