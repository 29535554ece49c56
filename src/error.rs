// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("Failed to read pattern file {path}: {source}")]
    PatternFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid pattern definition at {origin}:{line}: {text:?}")]
    InvalidPatternDefinition {
        origin: String,
        line: usize,
        text: String,
    },

    #[error("Undefined pattern %{{{name}}} referenced by {referenced_by}")]
    UndefinedPattern { name: String, referenced_by: String },

    #[error("Pattern %{{{name}}} references itself through {chain}")]
    PatternCycle { name: String, chain: String },

    #[error("Regex error in pattern {pattern}: {message}")]
    Regex { pattern: String, message: String },

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid state: cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
