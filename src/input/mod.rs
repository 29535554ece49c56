// SPDX-License-Identifier: Apache-2.0

//! File discovery and tailing.

mod file_id;
mod finder;
mod reader;
mod tailer;

use serde::Deserialize;

pub use file_id::FileId;
pub use finder::FileFinder;
pub use reader::{FileReader, SourceStatus};
pub use tailer::{TailSettings, Tailer};

/// Where to start reading when a file is first opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartAt {
    /// Read the existing content first
    Beginning,
    /// Only lines appended after the file was opened
    #[default]
    End,
}

impl StartAt {
    pub fn from_beginning(from_beginning: bool) -> Self {
        if from_beginning {
            StartAt::Beginning
        } else {
            StartAt::End
        }
    }
}
