//! 📂 GzipFileSource — gunzips a log file and hands it out one line at a time.
//!
//! 🚰 File → progress counter → MultiGzDecoder → BufReader → lines
//!
//! `MultiGzDecoder`, not `GzDecoder`: log rotation loves concatenating gzip members, and a plain
//! `GzDecoder` stops at the end of the first one and calls it a day. Silently. At 3am.
//!
//! 💀 Corrupt gzip or invalid UTF-8 → `Err`, and the whole file is abandoned. We don't guess.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use indicatif::ProgressBarIter;
use tracing::trace;

use crate::backends::Source;
use crate::progress::ProgressMetrics;

pub(crate) struct GzipFileSource {
    path: PathBuf,
    reader: BufReader<MultiGzDecoder<ProgressBarIter<File>>>,
    line: String,
    progress: ProgressMetrics,
}

// 🐛 progress is excluded: nobody debugging a source wants to read a progress bar's guts.
impl std::fmt::Debug for GzipFileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipFileSource")
            .field("path", &self.path)
            .finish()
    }
}

impl GzipFileSource {
    /// 🚀 Open the file and get the decoder ready. Blocking; call it off the async threads.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| {
            format!(
                "💀 The door to '{}' would not budge. It may not exist, it may not be ours to read, \
                 or someone renamed it out from under us.",
                path.display()
            )
        })?;
        // -- 📏 0 = unknown, the bar copes
        let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        let progress = ProgressMetrics::new(path.display().to_string(), file_size);
        let reader = BufReader::new(MultiGzDecoder::new(progress.wrap_read(file)));
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            line: String::new(),
            progress,
        })
    }
}

impl Source for GzipFileSource {
    fn next_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let bytes_read = self.reader.read_line(&mut self.line).with_context(|| {
            format!(
                "💀 Reading '{}' went sideways after {} lines. Corrupt gzip? Not UTF-8? Both?",
                self.path.display(),
                self.progress.total_lines()
            )
        })?;
        if bytes_read == 0 {
            trace!(
                "🏁 {} is dry after {} lines",
                self.path.display(),
                self.progress.total_lines()
            );
            self.progress.finish();
            return Ok(None);
        }
        self.progress.line_read();
        Ok(Some(std::mem::take(&mut self.line)))
    }
}
