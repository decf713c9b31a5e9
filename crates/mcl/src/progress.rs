//! 📊 progress.rs — "Are we there yet?" — every loader, every file, forever.
//!
//! 🚀 A byte progress bar over the *compressed* file (the only size we know up front),
//! plus a little comfy table of how many lines came out the other side of gunzip.
//!
//! ⚠️  Warning: Watching this progress bar will not make it go faster.
//! When stderr isn't a terminal, indicatif hides the bar and none of this draws. 🦆

use std::io::Read;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressBarIter, ProgressStyle};

// -- 📏 one mebibyte — not a megabyte, pedants.
const MIB: u64 = 1024 * 1024;

// -- 🎨 re-render the table every this many lines. every line would be a DDoS on the terminal.
const RENDER_EVERY_LINES: u64 = 16 * 1024;

/// 📦 "1073741824 bytes" is a war crime in a UI.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 "1000000" → "1,000,000" — you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS if you should probably go call your mom.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 The brains behind one file's progress display.
pub(crate) struct ProgressMetrics {
    source_name: String,
    total_size: u64,
    total_lines: u64,
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_size", &self.total_size)
            .field("total_lines", &self.total_lines)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 `total_size` is the compressed file size in bytes.
    pub(crate) fn new(source_name: String, total_size: u64) -> Self {
        let progress_bar = ProgressBar::new(total_size);
        // -- 🐛 the template is a literal; if it ever fails to parse we fall back to indicatif's default
        if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}]") {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        Self {
            source_name,
            total_size,
            total_lines: 0,
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// 🔌 Wrap the raw file so every compressed byte read moves the bar.
    pub(crate) fn wrap_read<R: Read>(&self, reader: R) -> ProgressBarIter<R> {
        self.progress_bar.wrap_read(reader)
    }

    /// 🔄 One more line out of the decoder.
    pub(crate) fn line_read(&mut self) {
        self.total_lines += 1;
        if self.total_lines % RENDER_EVERY_LINES == 0 {
            self.render();
        }
    }

    pub(crate) fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// ✅ EOF. Ring the bell.
    pub(crate) fn finish(&self) {
        self.render();
        self.progress_bar.finish();
    }

    /// 🎨 Two columns, right aligned, no borders:
    /// ```text
    /// source: /data/appsinstalled/20170929000000.tsv.gz
    ///   12,345 Lines/s     1,234,567 Lines
    ///   3.21 MiB / 9.87 MiB     00:42 elapsed
    /// | [=========>------------------------------]
    /// ```
    fn render(&self) {
        let elapsed = self.start_time.elapsed();
        let lines_per_sec = if elapsed.as_secs_f64() > 0.0 {
            (self.total_lines as f64 / elapsed.as_secs_f64()) as u64
        } else {
            0
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Lines/s", format_number(lines_per_sec)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Lines", format_number(self.total_lines)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!(
                "{} / {}",
                format_bytes(self.progress_bar.position()),
                format_bytes(self.total_size)
            ))
            .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_numbers_get_dressed_up() {
        assert_eq!(format_number(1_234_567), "1,234,567");
        assert_eq!(format_number(12), "12");
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 * MIB), "3.00 MiB");
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn the_one_where_lines_are_counted() {
        let mut metrics = ProgressMetrics::new("test".to_string(), 10);
        metrics.line_read();
        metrics.line_read();
        assert_eq!(metrics.total_lines(), 2);
        metrics.finish();
    }
}
