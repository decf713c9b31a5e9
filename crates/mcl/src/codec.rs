//! 🧬 The wire format — what actually lands in memcached.
//!
//! A tiny protobuf message, declared with `prost` derives instead of a `.proto` + build script,
//! because one message does not deserve a build.rs:
//!
//! ```text
//! message UserApps {
//!     repeated uint32 apps = 1;
//!     optional double lat = 2;
//!     optional double lon = 3;
//! }
//! ```
//!
//! 🧠 Knowledge graph:
//! - proto2 semantics: `apps` is NOT packed, `lat`/`lon` are optional.
//! - An unparsed coordinate (see `common::Coordinate`) is simply left unset.
//! - Readers on the other side of memcached decode with the same schema. Do not renumber tags.
//!   Renumbering tags is how you end up on a postmortem with your name in the title. 💀

use anyhow::{Context, ensure};
use prost::Message;
use tracing::info;

use crate::common::ParsedRecord;
use crate::parser::parse_line;

const APP_ID_SEPARATOR: char = ',';

const SELF_CHECK_SAMPLE: [&str; 2] = [
    "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23",
    "gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424",
];

/// 📦 The payload stored under `"<category>:<device_id>"`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl UserApps {
    /// 🏗️ Build the message for one record. App ids that aren't integers are dropped here.
    pub(crate) fn from_record(record: &ParsedRecord) -> Self {
        Self {
            apps: parse_app_ids(&record.raw_apps),
            lat: record.lat.value(),
            lon: record.lon.value(),
        }
    }

    /// 🚀 Serialize to the bytes memcached will hold.
    pub fn encode_payload(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// 🔄 The inverse. Mostly for tests and for the poor soul debugging a cache entry.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(payload)
    }
}

/// 🧪 Parse, encode, decode, compare, for a couple of known-good lines. `mcl --test` runs this
/// and exits, so a deploy can prove the wire format before touching any memcached.
pub fn self_check() -> anyhow::Result<()> {
    for line in SELF_CHECK_SAMPLE {
        let record =
            parse_line(line).with_context(|| format!("💀 Sample line `{}` did not parse", line))?;
        let message = UserApps::from_record(&record);
        let decoded = UserApps::decode_payload(&message.encode_payload())
            .with_context(|| format!("💀 Payload for {} did not decode", record.key()))?;
        ensure!(
            decoded == message,
            "💀 {} changed on the way through the codec: {:?} became {:?}",
            record.key(),
            message,
            decoded
        );
    }
    Ok(())
}

/// 🔢 `"1, 2,x,3"` → `[1, 2, 3]`.
///
/// Tokens are trimmed and parsed as `u32`. Anything that doesn't parse is filtered out with
/// an info line; the rest of the record survives. Empty tokens (an empty list, a trailing comma)
/// are skipped without comment.
pub(crate) fn parse_app_ids(raw_apps: &str) -> Vec<u32> {
    let mut apps = Vec::new();
    let mut rejected = false;
    for token in raw_apps.split(APP_ID_SEPARATOR).map(str::trim) {
        if token.is_empty() {
            continue;
        }
        match token.parse::<u32>() {
            Ok(app_id) => apps.push(app_id),
            Err(_) => rejected = true,
        }
    }
    if rejected {
        info!("🐛 Not all user apps are digits: `{}`", raw_apps);
    }
    apps
}
