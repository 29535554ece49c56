// SPDX-License-Identifier: Apache-2.0

//! Async line stream over one file.
//!
//! Reads run on the blocking pool with the cursor moved in and out, so a slow
//! disk never stalls the runtime. When the file is drained and the path now
//! names a different file, or the file was truncated, a fresh cursor is opened
//! from the beginning. When the path is gone the stream ends. When reads keep
//! failing the stream ends too and the tailer remembers which file it gave up on.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, Stream, StreamExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::StartAt;
use super::file_id::FileId;
use super::reader::{FileReader, SourceStatus};
use crate::telemetry::ParserStats;

#[derive(Debug, Clone, Copy)]
pub struct TailSettings {
    pub poll_interval: Duration,
    pub max_batch_size: usize,
    pub max_read_failure: Duration,
}

/// Result of one blocking read step
enum Step {
    Lines(FileReader, Vec<String>),
    Idle(FileReader),
    /// The current cursor is done; `next` continues on the new file if any
    Finished {
        next: Option<FileReader>,
        status: SourceStatus,
        leftover: Option<String>,
    },
    Failed(FileReader, io::Error),
}

fn step(mut reader: FileReader, max_lines: usize) -> Step {
    match reader.read_lines(max_lines) {
        Err(e) => Step::Failed(reader, e),
        Ok(lines) if !lines.is_empty() => Step::Lines(reader, lines),
        Ok(_) => match reader.source_status() {
            SourceStatus::Unchanged => Step::Idle(reader),
            SourceStatus::Missing => Step::Finished {
                next: None,
                status: SourceStatus::Missing,
                leftover: reader.take_partial_line(),
            },
            status => {
                let leftover = reader.take_partial_line();
                // may have vanished again since the stat
                let next =
                    FileReader::open(reader.path(), StartAt::Beginning, reader.max_line_size())
                        .ok();
                Step::Finished {
                    next,
                    status,
                    leftover,
                }
            }
        },
    }
}

pub struct Tailer {
    path: PathBuf,
    reader: Option<FileReader>,
    settings: TailSettings,
    cancel: CancellationToken,
    stats: Arc<ParserStats>,
    first_failure: Option<Instant>,
    /// Identity of the file reads were abandoned on
    failed_file: Option<FileId>,
}

impl Tailer {
    pub fn new(
        reader: FileReader,
        settings: TailSettings,
        cancel: CancellationToken,
        stats: Arc<ParserStats>,
    ) -> Self {
        Self {
            path: reader.path().to_path_buf(),
            reader: Some(reader),
            settings,
            cancel,
            stats,
            first_failure: None,
            failed_file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set once the tailer stopped because reads kept failing
    pub fn failed_file(&self) -> Option<FileId> {
        self.failed_file
    }

    /// Waits for the next batch of complete lines. None once the tailer is
    /// cancelled, the file is gone, or reads kept failing.
    pub async fn next_batch(&mut self) -> Option<Vec<String>> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            let reader = self.reader.take()?;

            let max_lines = self.settings.max_batch_size;
            let outcome = match tokio::task::spawn_blocking(move || step(reader, max_lines)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(path = ?self.path, error = %e, "File read task failed");
                    return None;
                }
            };

            match outcome {
                Step::Lines(reader, lines) => {
                    self.reset_failures();
                    self.reader = Some(reader);
                    self.stats.lines_read(lines.len() as u64);
                    return Some(lines);
                }
                Step::Idle(reader) => {
                    self.reset_failures();
                    self.reader = Some(reader);
                    if !self.sleep().await {
                        return None;
                    }
                }
                Step::Finished {
                    next,
                    status,
                    leftover,
                } => {
                    match &next {
                        Some(reader) => {
                            self.stats.file_opened();
                            info!(
                                path = ?self.path,
                                status = ?status,
                                file_id = %reader.file_id(),
                                "File rotated, reading it again from the start"
                            );
                        }
                        None => {
                            debug!(path = ?self.path, status = ?status, "File is gone, closing tailer");
                        }
                    }
                    self.reader = next;
                    if let Some(line) = leftover {
                        self.stats.lines_read(1);
                        return Some(vec![line]);
                    }
                }
                Step::Failed(reader, e) => {
                    self.stats.read_error();
                    let first_failure = *self.first_failure.get_or_insert_with(Instant::now);
                    let failure_duration = first_failure.elapsed();

                    if failure_duration >= self.settings.max_read_failure {
                        error!(
                            path = ?self.path,
                            idle_for = ?reader.last_activity().elapsed(),
                            "Read failures persisted for {:?}, closing tailer: {}",
                            failure_duration, e
                        );
                        self.failed_file = Some(reader.file_id());
                        return None;
                    }
                    warn!(
                        path = ?self.path,
                        "File read failed (failures started {:?} ago): {}",
                        failure_duration, e
                    );
                    self.reader = Some(reader);
                    if !self.sleep().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Flattened stream of lines, in file order.
    pub fn lines(&mut self) -> impl Stream<Item = String> {
        stream::unfold(self, |tailer| async move {
            let batch = tailer.next_batch().await?;
            Some((stream::iter(batch), tailer))
        })
        .flatten()
    }

    fn reset_failures(&mut self) {
        if self.first_failure.take().is_some() {
            debug!(path = ?self.path, "File read succeeded after previous failures");
        }
    }

    /// False when cancelled while waiting
    async fn sleep(&self) -> bool {
        select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.settings.poll_interval) => true,
        }
    }
}
