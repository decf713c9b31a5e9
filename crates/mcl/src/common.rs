//! 📦 Common data structures — the building blocks of mcl
//!
//! 🎬 COLD OPEN — INT. LOG ARCHIVE — 3:47 AM
//!
//! A gzip file sits on disk. Inside it: three hundred thousand phones, each one
//! confessing which apps it has installed and roughly where it was standing when
//! it did. Nobody asked the phones. The phones told us anyway.
//!
//! This module defines the humble structs that carry those confessions from a
//! tab-separated line all the way to a memcached slot. They don't ask questions.
//! They carry the data. Please tip your structs. 🦆
//!
//! 🧠 Knowledge graph:
//! - `ParsedRecord` is born in `parser`, dies in a `converter_worker`.
//! - `RecordBatch` rides the convert queue (batcher → converter).
//! - `UploadBatch` rides the upload queue (converter → uploader).
//! - `RouteTable` is read-only for the whole run. Nobody mutates the map. Nobody.

use std::collections::{BTreeMap, HashMap};

/// 🌍 One half of a geo coordinate — or the text that refused to become one.
///
/// A line with `"55.55"` becomes `Parsed(55.55)`. A line with `"over there"`
/// becomes `Unparsed("over there")`. The record survives either way; the
/// encoder just leaves an unparsed coordinate out of the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinate {
    Parsed(f64),
    Unparsed(String),
}

impl Coordinate {
    /// 🎯 The numeric value, if there ever was one.
    pub fn value(&self) -> Option<f64> {
        match self {
            Coordinate::Parsed(value) => Some(*value),
            Coordinate::Unparsed(_) => None,
        }
    }
}

/// 🎯 A single parsed line: which phone, which kind of phone, where, and which apps.
///
/// `category` and `device_id` are never empty — the parser refuses to build one otherwise.
/// `raw_apps` stays a raw comma-separated string until the converter gets its hands on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    /// 📡 Device type (`idfa`, `gaid`, ...). Decides which memcached gets the record.
    pub category: String,
    pub device_id: String,
    pub lat: Coordinate,
    pub lon: Coordinate,
    /// 📦 `"1,2,3"` — unparsed, unjudged, untouched.
    pub raw_apps: String,
}

impl ParsedRecord {
    /// 🔑 `"<category>:<device_id>"` — the memcached key for this record.
    pub fn key(&self) -> String {
        format!("{}:{}", self.category, self.device_id)
    }
}

/// 📦 A bounded, single-category bundle of records headed for one converter.
pub(crate) type RecordBatch = Vec<ParsedRecord>;

/// 📦 Encoded key → payload pairs headed for one uploader. Duplicate keys:
/// last write wins, because that's what a `HashMap` does and what memcached would do anyway.
pub(crate) type UploadBatch = HashMap<String, Vec<u8>>;

/// 🗺️ Category → memcached address. Configured once, read forever.
///
/// A `BTreeMap` so that converters spawn (and log) in the same order every run.
/// Determinism is cheap. Debugging nondeterminism at 3am is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<String, String>,
}

impl RouteTable {
    pub fn new(routes: BTreeMap<String, String>) -> Self {
        Self { routes }
    }

    /// 📡 Where does this category live? `None` = nowhere we know of.
    pub fn address(&self, category: &str) -> Option<&str> {
        self.routes.get(category).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<(String, String)> for RouteTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
