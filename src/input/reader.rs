// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::StartAt;
use super::file_id::FileId;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// What the path currently refers to, compared with the open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Unchanged,
    /// The path no longer exists
    Missing,
    /// The path names a different file (rotation)
    Replaced,
    /// The file shrank below the read offset
    Truncated,
}

/// Accumulates bytes of the line being read
#[derive(Debug)]
struct LineBuffer {
    partial: Vec<u8>,
    /// Set once a line exceeded the limit; the rest of it is dropped
    overflowed: bool,
    max_line_size: usize,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        if self.overflowed {
            return;
        }
        let room = self.max_line_size.saturating_sub(self.partial.len());
        if bytes.len() > room {
            self.partial.extend_from_slice(&bytes[..room]);
            self.overflowed = true;
        } else {
            self.partial.extend_from_slice(bytes);
        }
    }

    fn finish(&mut self) -> Option<String> {
        let mut bytes = std::mem::take(&mut self.partial);
        let overflowed = std::mem::replace(&mut self.overflowed, false);
        if !overflowed && bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        if bytes.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }
}

/// Read cursor over one open file
pub struct FileReader {
    path: PathBuf,
    file: File,
    file_id: FileId,
    /// Next byte to read from the file
    offset: u64,
    buffer: LineBuffer,
    last_activity: Instant,
}

impl FileReader {
    /// Opens the file and positions the cursor per `start_at`.
    pub fn open(
        path: impl AsRef<Path>,
        start_at: StartAt,
        max_line_size: usize,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        let offset = match start_at {
            StartAt::Beginning => 0,
            StartAt::End => metadata.len(),
        };

        Ok(Self {
            path,
            file_id: FileId::from_metadata(&metadata),
            file,
            offset,
            buffer: LineBuffer {
                partial: Vec::new(),
                overflowed: false,
                max_line_size,
            },
            last_activity: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn max_line_size(&self) -> usize {
        self.buffer.max_line_size
    }

    /// When data was last read from the file
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    #[cfg(test)]
    fn has_partial_line(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Reads up to `max_lines` complete lines. A trailing line without a
    /// newline stays buffered until it is completed. Empty lines are dropped.
    pub fn read_lines(&mut self, max_lines: usize) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        let start = self.offset;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, &self.file);
        reader.seek(SeekFrom::Start(self.offset))?;

        while lines.len() < max_lines {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                break;
            }

            let (consumed, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(newline) => {
                    self.buffer.push(&available[..newline]);
                    (newline + 1, true)
                }
                None => {
                    self.buffer.push(available);
                    (available.len(), false)
                }
            };
            reader.consume(consumed);
            self.offset += consumed as u64;

            if complete {
                if let Some(line) = self.buffer.finish() {
                    lines.push(line);
                }
            }
        }

        if self.offset != start {
            self.last_activity = Instant::now();
        }
        Ok(lines)
    }

    /// Hands out a buffered incomplete line; used once the file is done.
    pub fn take_partial_line(&mut self) -> Option<String> {
        self.buffer.finish()
    }

    /// Compares the path with the open handle.
    pub fn source_status(&self) -> SourceStatus {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return SourceStatus::Missing,
            // transient, look again on the next poll
            Err(_) => return SourceStatus::Unchanged,
        };

        if FileId::from_metadata(&metadata) != self.file_id {
            return SourceStatus::Replaced;
        }
        if metadata.len() < self.offset {
            return SourceStatus::Truncated;
        }
        SourceStatus::Unchanged
    }
}
