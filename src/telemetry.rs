// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};

pub fn get_meter() -> Meter {
    global::meter("logparser")
}

/// Point-in-time copy of the parser counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub records_emitted: u64,
    pub lines_skipped: u64,
    pub read_errors: u64,
    pub files_opened: u64,
}

/// Parser counters, exported through the global meter and kept locally
/// so callers can inspect them without a metrics pipeline.
pub struct ParserStats {
    lines_read: AtomicU64,
    records_emitted: AtomicU64,
    lines_skipped: AtomicU64,
    read_errors: AtomicU64,
    files_opened: AtomicU64,

    lines_read_counter: Counter<u64>,
    records_emitted_counter: Counter<u64>,
    lines_skipped_counter: Counter<u64>,
    read_errors_counter: Counter<u64>,
    files_opened_counter: Counter<u64>,
    tags: [KeyValue; 1],
}

impl ParserStats {
    pub fn new(measurement: &str) -> Self {
        let meter = get_meter();
        Self {
            lines_read: AtomicU64::new(0),
            records_emitted: AtomicU64::new(0),
            lines_skipped: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            files_opened: AtomicU64::new(0),
            lines_read_counter: meter
                .u64_counter("logparser_lines_read")
                .with_description("Number of complete lines read from tailed files.")
                .with_unit("lines")
                .build(),
            records_emitted_counter: meter
                .u64_counter("logparser_records_emitted")
                .with_description("Number of records handed to the accumulator.")
                .with_unit("records")
                .build(),
            lines_skipped_counter: meter
                .u64_counter("logparser_lines_skipped")
                .with_description("Number of lines that matched no configured pattern.")
                .with_unit("lines")
                .build(),
            read_errors_counter: meter
                .u64_counter("logparser_read_errors")
                .with_description("Number of failed reads from tailed files.")
                .with_unit("errors")
                .build(),
            files_opened_counter: meter
                .u64_counter("logparser_files_opened")
                .with_description("Number of files a tailer was started for.")
                .with_unit("files")
                .build(),
            tags: [KeyValue::new("measurement", measurement.to_string())],
        }
    }

    pub fn lines_read(&self, n: u64) {
        self.lines_read.fetch_add(n, Ordering::Relaxed);
        self.lines_read_counter.add(n, &self.tags);
    }

    pub fn record_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
        self.records_emitted_counter.add(1, &self.tags);
    }

    pub fn line_skipped(&self) {
        self.lines_skipped.fetch_add(1, Ordering::Relaxed);
        self.lines_skipped_counter.add(1, &self.tags);
    }

    pub fn read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
        self.read_errors_counter.add(1, &self.tags);
    }

    pub fn file_opened(&self) {
        self.files_opened.fetch_add(1, Ordering::Relaxed);
        self.files_opened_counter.add(1, &self.tags);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            lines_skipped: self.lines_skipped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            files_opened: self.files_opened.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_counts() {
        let stats = ParserStats::new("test");
        stats.lines_read(3);
        stats.record_emitted();
        stats.record_emitted();
        stats.line_skipped();
        stats.file_opened();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                lines_read: 3,
                records_emitted: 2,
                lines_skipped: 1,
                read_errors: 0,
                files_opened: 1,
            }
        );
    }
}
