// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::PathBuf;

use crate::config::{DEFAULT_MEASUREMENT, LogParserConfig};
use crate::error::{Error, Result};

#[derive(Debug, Args, Clone)]
pub struct LogParserArgs {
    /// JSON file holding the whole parser configuration; other parser flags are ignored when set
    #[arg(long, env = "LOGPARSER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma-separated glob patterns for files to tail (e.g., "/var/log/*.log,/tmp/*.log")
    #[arg(long, env = "LOGPARSER_FILES", value_delimiter = ',')]
    pub files: Vec<String>,

    /// Grok pattern tried against each line, repeat for more (first match wins).
    /// Patterns may contain commas, so values are never split.
    #[arg(long = "pattern", env = "LOGPARSER_PATTERN", action = clap::ArgAction::Append)]
    pub patterns: Vec<String>,

    /// Comma-separated files with additional pattern definitions
    #[arg(long, env = "LOGPARSER_CUSTOM_PATTERN_FILES", value_delimiter = ',')]
    pub custom_pattern_files: Vec<PathBuf>,

    /// Inline pattern definitions, one "NAME regex" per line
    #[arg(long, env = "LOGPARSER_CUSTOM_PATTERNS", default_value = "")]
    pub custom_patterns: String,

    /// Read existing file content instead of only new lines
    #[arg(long, env = "LOGPARSER_FROM_BEGINNING", default_value = "false")]
    pub from_beginning: bool,

    /// Start policy for files found by a rescan, defaults to --from-beginning
    #[arg(long, env = "LOGPARSER_RESCAN_FROM_BEGINNING")]
    pub rescan_from_beginning: Option<bool>,

    /// Measurement name for records that do not capture one
    #[arg(long, env = "LOGPARSER_MEASUREMENT", default_value = DEFAULT_MEASUREMENT)]
    pub measurement: String,

    /// Timezone for timestamps without an offset: UTC, Local or an IANA name
    #[arg(long, env = "LOGPARSER_TIMEZONE")]
    pub timezone: Option<String>,

    /// Require patterns to match whole lines
    #[arg(long, env = "LOGPARSER_ANCHOR_PATTERNS", default_value = "false")]
    pub anchor_patterns: bool,

    /// Poll interval in milliseconds for idle files
    #[arg(long, env = "LOGPARSER_POLL_INTERVAL_MS", default_value = "250")]
    pub poll_interval_ms: u64,

    /// Rescan the globs for new files at this interval in milliseconds
    #[arg(long, env = "LOGPARSER_RESCAN_INTERVAL_MS", default_value = "10000")]
    pub rescan_interval_ms: u64,

    /// Maximum line size in bytes (longer lines are truncated)
    #[arg(long, env = "LOGPARSER_MAX_LINE_SIZE", default_value = "1048576")]
    pub max_line_size: usize,

    /// Maximum time in milliseconds to wait for tailers during shutdown
    #[arg(long, env = "LOGPARSER_SHUTDOWN_TIMEOUT_MS", default_value = "1000")]
    pub shutdown_timeout_ms: u64,
}

impl LogParserArgs {
    /// Build the parser config from the config file or the command line
    pub fn build_config(&self) -> Result<LogParserConfig> {
        if let Some(path) = &self.config {
            let contents = std::fs::read_to_string(path)?;
            return serde_json::from_str(&contents).map_err(|e| {
                Error::Config(format!("failed to parse {}: {}", path.display(), e))
            });
        }

        Ok(LogParserConfig {
            files: self.files.clone(),
            patterns: self.patterns.clone(),
            custom_pattern_files: self.custom_pattern_files.clone(),
            custom_patterns: self.custom_patterns.clone(),
            from_beginning: self.from_beginning,
            rescan_from_beginning: self.rescan_from_beginning,
            measurement_name: self.measurement.clone(),
            timezone: self.timezone.clone(),
            anchor_patterns: self.anchor_patterns,
            poll_interval_ms: self.poll_interval_ms,
            rescan_interval_ms: Some(self.rescan_interval_ms),
            max_line_size: self.max_line_size,
            shutdown_timeout_ms: self.shutdown_timeout_ms,
            ..Default::default()
        })
    }
}
