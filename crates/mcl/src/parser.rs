//! 🔍 The Record Parser — one tab-separated line in, one `ParsedRecord` out (or a reason why not).
//!
//! ```text
//! idfa \t 1rfw452y52g2gq4g \t 55.55 \t 42.42 \t 1423,43,567
//!  │            │               │        │          │
//! category   device_id         lat      lon     raw_apps (left raw on purpose)
//! ```
//!
//! Pure, synchronous, allocation-light. memchr finds the tabs so we don't have to squint.
//!
//! ⚠️ Coordinates are parsed permissively: a lat/lon that isn't a float does NOT kill the record.
//! It rides along as `Coordinate::Unparsed` and we log about it. The old loader did that, the data
//! team depends on it, and we are not about to be the ones who drop 4% of idfa traffic over a comma. 🦆

use memchr::memchr_iter;
use tracing::info;

use crate::common::{Coordinate, ParsedRecord};
use crate::errors::RecordError;

const FIELD_DELIMITER: u8 = b'\t';
const FIELD_COUNT: usize = 5;

/// 🚀 Parse one raw line into a [`ParsedRecord`].
///
/// Surrounding whitespace is trimmed first. Exactly five tab-separated fields are
/// required; category and device id must be non-empty.
pub fn parse_line(line: &str) -> Result<ParsedRecord, RecordError> {
    let line = line.trim();
    let bytes = line.as_bytes();

    // -- 🔪 carve the line at every tab. six tabs? malformed. three tabs? also malformed.
    let mut fields: Vec<&str> = Vec::with_capacity(FIELD_COUNT);
    let mut start = 0usize;
    for tab in memchr_iter(FIELD_DELIMITER, bytes) {
        fields.push(&line[start..tab]);
        start = tab + 1;
    }
    fields.push(&line[start..]);

    let [category, device_id, raw_lat, raw_lon, raw_apps] = fields.as_slice() else {
        return Err(RecordError::malformed(format!(
            "expected {FIELD_COUNT} tab-separated fields, found {}",
            fields.len()
        )));
    };
    if category.is_empty() || device_id.is_empty() {
        return Err(RecordError::malformed("empty device type or device id"));
    }

    let lat = parse_coordinate(raw_lat);
    let lon = parse_coordinate(raw_lon);
    if matches!(lat, Coordinate::Unparsed(_)) || matches!(lon, Coordinate::Unparsed(_)) {
        info!("🌍 Invalid geo coords: `{}`", line);
    }

    Ok(ParsedRecord {
        category: category.to_string(),
        device_id: device_id.to_string(),
        lat,
        lon,
        raw_apps: raw_apps.to_string(),
    })
}

fn parse_coordinate(raw: &str) -> Coordinate {
    match raw.trim().parse::<f64>() {
        Ok(value) => Coordinate::Parsed(value),
        Err(_) => Coordinate::Unparsed(raw.to_string()),
    }
}
