//! 💀 Record-level errors — the ones we count instead of crash on.
//!
//! Everything fatal rides `anyhow` with a context string full of feelings.
//! Everything in here is small, typed, and ends up as `errors += 1` in a file summary.
//! The distinction matters: a bad line is a statistic, an unreadable file is a tragedy.

use thiserror::Error;

/// 🏷️ Why a line never made it into a batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// 🐛 Wrong field count, or a blank category/device id.
    #[error("malformed line: {reason}")]
    MalformedLine { reason: String },
    /// 🗺️ Parsed fine, but no memcached knows this device type.
    #[error("unknown device type: {category}")]
    UnknownCategory { category: String },
}

impl RecordError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RecordError::MalformedLine {
            reason: reason.into(),
        }
    }
}
