//! 📡 MemcacheClient — a very small memcached text-protocol client.
//!
//! We need exactly one thing from memcached: `set` a few hundred keys and hear back which
//! ones didn't stick. So that's all this does. No `get`, no CAS, no consistent hashing,
//! no server pool. One address, one socket, pipelined sets.
//!
//! ```text
//! → set idfa:ABC 0 0 12\r\n<12 bytes>\r\n     (× N, written back to back)
//! ← STORED\r\n                                 (× N, read in the same order)
//! ```
//!
//! 🧠 Knowledge graph:
//! - The connection is lazy: opened on the first `set_multi`, kept until an I/O error or timeout
//!   poisons it, then re-opened by the next call (which is the uploader's next retry).
//! - The whole call runs under `socket_timeout`. memcached either answers or it doesn't.
//! - Keys memcached would reject at the protocol level are never sent; they come back as unwritten.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::backends::CacheClient;
use crate::common::UploadBatch;

const MAX_KEY_LENGTH: usize = 250;

/// 🔧 How patient we are with memcached.
///
/// Lives next to the client that uses it. No scavenger hunts at 2am.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MemcacheConfig {
    /// ⏱️ Upper bound for one `set_multi` round trip, connect included.
    #[serde(default = "default_socket_timeout_secs", alias = "MEMCACHE_SOCKET_TIMEOUT")]
    pub socket_timeout_secs: u64,
    /// 🔄 Extra attempts after the first one fails. 0 = one shot, no second chances.
    #[serde(default = "default_retry", alias = "MEMCACHE_RETRY")]
    pub retry: u32,
    /// 💤 Nap between attempts.
    #[serde(default = "default_retry_timeout_secs", alias = "MEMCACHE_RETRY_TIMEOUT")]
    pub retry_timeout_secs: u64,
}

impl Default for MemcacheConfig {
    fn default() -> Self {
        Self {
            socket_timeout_secs: default_socket_timeout_secs(),
            retry: default_retry(),
            retry_timeout_secs: default_retry_timeout_secs(),
        }
    }
}

impl MemcacheConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }
}

fn default_socket_timeout_secs() -> u64 {
    1
}

fn default_retry() -> u32 {
    2
}

fn default_retry_timeout_secs() -> u64 {
    1
}

/// 📡 One uploader's private line to one memcached.
#[derive(Debug)]
pub(crate) struct MemcacheClient {
    address: String,
    socket_timeout: Duration,
    stream: Option<BufStream<TcpStream>>,
}

impl MemcacheClient {
    pub(crate) fn new(address: String, socket_timeout: Duration) -> Self {
        Self {
            address,
            socket_timeout,
            stream: None,
        }
    }

    /// 🔌 The live connection, dialing first if we don't have one.
    async fn connection(&mut self) -> Result<&mut BufStream<TcpStream>> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                debug!("🔌 Connecting to memcached at {}", self.address);
                let tcp = TcpStream::connect(&self.address).await.with_context(|| {
                    format!(
                        "💀 Could not connect to memcached at '{}'. Is it running? Is it on that port? Is it even a memcached?",
                        self.address
                    )
                })?;
                tcp.set_nodelay(true)?;
                BufStream::new(tcp)
            }
        };
        Ok(self.stream.insert(stream))
    }

    /// 🚀 Pipeline every `set`, then read every reply. Returns the keys memcached refused.
    async fn store_all(&mut self, keys: &[&str], entries: &UploadBatch) -> Result<Vec<String>> {
        let stream = self.connection().await?;

        for key in keys {
            let payload = &entries[*key];
            stream
                .write_all(format!("set {} 0 0 {}\r\n", key, payload.len()).as_bytes())
                .await?;
            stream.write_all(payload).await?;
            stream.write_all(b"\r\n").await?;
        }
        stream.flush().await?;

        let mut refused = Vec::new();
        let mut reply = String::new();
        for key in keys {
            reply.clear();
            if stream.read_line(&mut reply).await? == 0 {
                bail!("💀 memcached hung up mid-conversation. Rude.");
            }
            match reply.trim_end() {
                "STORED" => {}
                other => {
                    debug!("🐛 memcached said `{}` to key `{}`", other, key);
                    refused.push(key.to_string());
                }
            }
        }
        trace!(
            "📬 {} keys offered, {} refused",
            keys.len(),
            refused.len()
        );
        Ok(refused)
    }
}

#[async_trait]
impl CacheClient for MemcacheClient {
    async fn set_multi(&mut self, entries: &UploadBatch) -> Result<Vec<String>> {
        let mut sendable = Vec::with_capacity(entries.len());
        let mut unwritten = Vec::new();
        for key in entries.keys() {
            if is_valid_key(key) {
                sendable.push(key.as_str());
            } else {
                debug!("🚫 Key `{}` is not a legal memcached key; not sending it", key);
                unwritten.push(key.clone());
            }
        }
        if sendable.is_empty() {
            return Ok(unwritten);
        }

        let socket_timeout = self.socket_timeout;
        let outcome = timeout(socket_timeout, self.store_all(&sendable, entries)).await;
        match outcome {
            Ok(Ok(refused)) => {
                unwritten.extend(refused);
                Ok(unwritten)
            }
            Ok(Err(err)) => {
                // -- 🔌 the socket is in an unknown state now. burn it, redial next time.
                self.stream = None;
                Err(err.context(format!("💀 set_multi against '{}' failed", self.address)))
            }
            Err(_) => {
                self.stream = None;
                Err(anyhow!(
                    "💀 set_multi against '{}' timed out after {:?}. memcached left us on read.",
                    self.address,
                    socket_timeout
                ))
            }
        }
    }
}

/// 🔒 memcached text protocol: ≤ 250 bytes, no whitespace, no control characters.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key.bytes().all(|byte| byte > b' ' && byte != 0x7f)
}
