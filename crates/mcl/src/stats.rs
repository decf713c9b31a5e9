//! 📊 Statistics — counting things, the oldest job in computing.
//!
//! Every uploader hands back a [`Counts`]. Every converter sums its uploaders.
//! The supervisor sums the converters and adds the lines that never made it that far.
//! Then we divide, compare to 1%, and decide whether to feel good about ourselves.

use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};

/// 🎯 Anything at or above this error rate is a failed load. Advisory only; the file is
/// still marked as processed.
pub const NORMAL_ERR_RATE: f64 = 0.01;

/// 📦 `(errors, processed)` — the whole truth about a writer, a category, or a file.
///
/// - `processed`: keys memcached confirmed.
/// - `errors`: keys that never made it, plus (at file level) lines that never became keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub errors: u64,
    pub processed: u64,
}

impl Counts {
    pub fn new(errors: u64, processed: u64) -> Self {
        Self { errors, processed }
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, rhs: Counts) -> Counts {
        Counts {
            errors: self.errors + rhs.errors,
            processed: self.processed + rhs.processed,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        *self = *self + rhs;
    }
}

impl Sum for Counts {
    fn sum<I: Iterator<Item = Counts>>(iter: I) -> Counts {
        iter.fold(Counts::default(), Add::add)
    }
}

/// 🧮 The aggregator. Yes, it's just `sum()`. Some components are allowed to be easy.
pub(crate) fn aggregate(counts: impl IntoIterator<Item = Counts>) -> Counts {
    counts.into_iter().sum()
}

/// ⚖️ Did the load go well?
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// ✅ `error_rate < NORMAL_ERR_RATE`
    Acceptable(f64),
    /// 💀 `error_rate >= NORMAL_ERR_RATE`
    HighErrorRate(f64),
    /// 🤷 nothing was processed, so there is no rate to judge
    NothingProcessed,
}

/// 📋 Everything we know about one file once it's done.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub counts: Counts,
}

impl FileReport {
    pub fn error_rate(&self) -> Option<f64> {
        (self.counts.processed > 0)
            .then(|| self.counts.errors as f64 / self.counts.processed as f64)
    }

    pub fn verdict(&self) -> Verdict {
        match self.error_rate() {
            Some(rate) if rate < NORMAL_ERR_RATE => Verdict::Acceptable(rate),
            Some(rate) => Verdict::HighErrorRate(rate),
            None => Verdict::NothingProcessed,
        }
    }
}

/// 🍽️ One row per file. Rendered once at the end of a run for the humans.
pub(crate) fn summary_table(reports: &[FileReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["file", "errors", "processed", "error rate", "verdict"]);
    for report in reports {
        let (rate, verdict) = match report.verdict() {
            Verdict::Acceptable(rate) => (format!("{:.4}", rate), "✅ acceptable"),
            Verdict::HighErrorRate(rate) => (format!("{:.4}", rate), "💀 high error rate"),
            Verdict::NothingProcessed => ("-".to_string(), "🤷 nothing processed"),
        };
        table.add_row(vec![
            Cell::new(report.path.display()),
            Cell::new(report.counts.errors).set_alignment(CellAlignment::Right),
            Cell::new(report.counts.processed).set_alignment(CellAlignment::Right),
            Cell::new(rate).set_alignment(CellAlignment::Right),
            Cell::new(verdict),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(errors: u64, processed: u64) -> FileReport {
        FileReport {
            path: PathBuf::from("/data/appsinstalled/x.tsv.gz"),
            counts: Counts::new(errors, processed),
        }
    }

    #[test]
    fn the_one_where_the_aggregator_can_add() {
        let total = aggregate(vec![Counts::new(1, 10), Counts::new(0, 5), Counts::new(2, 0)]);
        assert_eq!(total, Counts::new(3, 15));
        assert_eq!(aggregate(Vec::new()), Counts::default());
    }

    #[test]
    fn the_one_where_one_percent_is_the_line_in_the_sand() {
        assert_eq!(report(0, 100).verdict(), Verdict::Acceptable(0.0));
        assert!(matches!(report(1, 1000).verdict(), Verdict::Acceptable(_)));
        assert!(matches!(report(1, 100).verdict(), Verdict::HighErrorRate(_)));
        assert_eq!(report(5, 0).verdict(), Verdict::NothingProcessed);
    }

    #[test]
    fn the_one_where_the_summary_table_mentions_every_file() {
        let rendered = summary_table(&[report(0, 10), report(3, 0)]).to_string();
        assert!(rendered.contains("x.tsv.gz"));
        assert!(rendered.contains("acceptable"));
        assert!(rendered.contains("nothing processed"));
    }
}
