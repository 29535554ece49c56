// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::input::StartAt;

/// Measurement name used when no capture overrides it
pub const DEFAULT_MEASUREMENT: &str = "logparser_grok";

/// Configuration for the log parser
#[derive(Debug, Clone, Deserialize)]
pub struct LogParserConfig {
    /// Glob expressions selecting the files to tail
    pub files: Vec<String>,

    /// Read files found at startup from the start instead of only new lines
    #[serde(default)]
    pub from_beginning: bool,

    /// Start policy for files found by a later rescan, falls back to from_beginning
    #[serde(default)]
    pub rescan_from_beginning: Option<bool>,

    /// Top-level patterns, tried in order against each line
    pub patterns: Vec<String>,

    /// Files containing additional pattern definitions
    #[serde(default)]
    pub custom_pattern_files: Vec<PathBuf>,

    /// Inline pattern definitions, one per line
    #[serde(default)]
    pub custom_patterns: String,

    #[serde(default = "default_measurement_name")]
    pub measurement_name: String,

    /// Timezone for timestamps that carry no offset: "UTC", "Local" or an IANA name
    #[serde(default)]
    pub timezone: Option<String>,

    /// Require each pattern to match the whole line
    #[serde(default)]
    pub anchor_patterns: bool,

    /// How often an idle tailer checks for new data (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Interval for internally driven rescans (in milliseconds), none when unset
    #[serde(default)]
    pub rescan_interval_ms: Option<u64>,

    /// Maximum size of a single line (in bytes)
    #[serde(default = "default_max_line_size")]
    pub max_line_size: usize,

    /// Maximum number of lines taken from a file per read
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Capacity of the channel between tailers and the accumulator
    #[serde(default = "default_records_channel_size")]
    pub records_channel_size: usize,

    /// How long read errors on one file are tolerated (in milliseconds)
    #[serde(default = "default_max_read_failure_ms")]
    pub max_read_failure_ms: u64,

    /// How long stop waits for tailers to finish (in milliseconds)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_measurement_name() -> String {
    DEFAULT_MEASUREMENT.to_string()
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_max_line_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_max_batch_size() -> usize {
    100
}

fn default_records_channel_size() -> usize {
    1000
}

fn default_max_read_failure_ms() -> u64 {
    10_000
}

fn default_shutdown_timeout_ms() -> u64 {
    1000
}

impl Default for LogParserConfig {
    fn default() -> Self {
        Self {
            files: vec![],
            from_beginning: false,
            rescan_from_beginning: None,
            patterns: vec![],
            custom_pattern_files: vec![],
            custom_patterns: String::new(),
            measurement_name: default_measurement_name(),
            timezone: None,
            anchor_patterns: false,
            poll_interval_ms: default_poll_interval_ms(),
            rescan_interval_ms: None,
            max_line_size: default_max_line_size(),
            max_batch_size: default_max_batch_size(),
            records_channel_size: default_records_channel_size(),
            max_read_failure_ms: default_max_read_failure_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl LogParserConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rescan_interval(&self) -> Option<Duration> {
        self.rescan_interval_ms.map(Duration::from_millis)
    }

    pub fn max_read_failure_duration(&self) -> Duration {
        Duration::from_millis(self.max_read_failure_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Where files found by the startup scan begin reading
    pub fn initial_start_at(&self) -> StartAt {
        StartAt::from_beginning(self.from_beginning)
    }

    /// Where files found by later rescans begin reading
    pub fn rescan_start_at(&self) -> StartAt {
        StartAt::from_beginning(self.rescan_from_beginning.unwrap_or(self.from_beginning))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.files.is_empty() {
            return Err("files cannot be empty".to_string());
        }

        if self.patterns.iter().all(|p| p.trim().is_empty()) {
            return Err("at least one pattern must be configured".to_string());
        }

        if self.measurement_name.is_empty() {
            return Err("measurement_name cannot be empty".to_string());
        }

        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be positive".to_string());
        }

        if self.rescan_interval_ms == Some(0) {
            return Err("rescan_interval_ms must be positive".to_string());
        }

        if self.max_line_size == 0 {
            return Err("max_line_size must be positive".to_string());
        }

        if self.max_batch_size == 0 {
            return Err("max_batch_size must be positive".to_string());
        }

        if self.records_channel_size == 0 {
            return Err("records_channel_size must be positive".to_string());
        }

        Ok(())
    }
}
