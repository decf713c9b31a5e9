//! 🧪 DryRunClient — says what it would write, writes nothing, reports total success.
//!
//! `--dry` is for "does this file parse and route the way I think it does" without waking up
//! four memcacheds. Every key counts as processed, so the summary reads like a real run would
//! if memcached were perfect. memcached is not perfect. Dry runs are optimistic by nature.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::backends::CacheClient;
use crate::common::UploadBatch;

#[derive(Debug)]
pub(crate) struct DryRunClient {
    address: String,
}

impl DryRunClient {
    pub(crate) fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl CacheClient for DryRunClient {
    async fn set_multi(&mut self, entries: &UploadBatch) -> Result<Vec<String>> {
        for (key, payload) in entries {
            debug!("🧪 {} - {} -> {:?}", self.address, key, payload);
        }
        Ok(Vec::new())
    }
}
