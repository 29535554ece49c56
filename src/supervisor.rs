// SPDX-License-Identifier: Apache-2.0

//! Log parser lifecycle.
//!
//! Architecture:
//! - Start validates everything (config, globs, patterns, timezone) before any task runs
//! - One task per tailed file reads lines, matches them, and sends records
//!   into a bounded channel
//! - A single forwarder task owns the accumulator side of the channel
//! - Rescans add tailers for newly matching paths; live tailers are never reopened
//! - A file whose tailer gave up after read failures is left alone until it is replaced

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use futures::StreamExt;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bounded_channel::{self, BoundedReceiver, BoundedSender};
use crate::config::LogParserConfig;
use crate::error::{Error, Result};
use crate::grok::{GrokMatcher, PatternLibrary, TimeZoneSetting};
use crate::input::{FileFinder, FileId, FileReader, StartAt, TailSettings, Tailer};
use crate::record::Record;
use crate::sink::Accumulator;
use crate::telemetry::{ParserStats, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Created,
    Validating,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ParserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserState::Created => "created",
            ParserState::Validating => "validating",
            ParserState::Running => "running",
            ParserState::Stopping => "stopping",
            ParserState::Stopped => "stopped",
            ParserState::Failed => "failed",
        }
    }
}

/// Error type for send operations with cancellation support.
#[derive(Debug)]
enum SendError {
    Cancelled,
    ChannelClosed,
}

/// Resolves to the file identity when the tailer gave up after read failures
type TailHandle = JoinHandle<Option<FileId>>;

/// Shared between the supervisor, the rescan task and scan callers
struct Discovery {
    finder: FileFinder,
    matcher: Arc<GrokMatcher>,
    records_tx: BoundedSender<Record>,
    tailers: StdMutex<HashMap<PathBuf, TailHandle>>,
    /// Paths whose tailer gave up, with the identity of the file it gave up on
    idle: StdMutex<HashMap<PathBuf, FileId>>,
    /// Held for a whole scan so concurrent rescans never open a path twice
    scan_lock: tokio::sync::Mutex<()>,
    settings: TailSettings,
    max_line_size: usize,
    cancel: CancellationToken,
    stats: Arc<ParserStats>,
}

impl Discovery {
    /// Opens tailers for matching paths without a live tailer. Returns how
    /// many were started.
    async fn scan(&self, start_at: StartAt) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Ok(0);
        }
        let _scanning = self.scan_lock.lock().await;

        let finder = self.finder.clone();
        let paths = tokio::task::spawn_blocking(move || finder.find_files())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        self.reap_finished().await;

        let candidates: Vec<(PathBuf, Option<FileId>)> = {
            let tailers = self.lock_tailers();
            let idle = lock(&self.idle);
            paths
                .into_iter()
                .filter(|path| !tailers.contains_key(path))
                .map(|path| {
                    let gave_up_on = idle.get(&path).copied();
                    (path, gave_up_on)
                })
                .collect()
        };
        if candidates.is_empty() {
            return Ok(0);
        }

        let max_line_size = self.max_line_size;
        let readers = tokio::task::spawn_blocking(move || open_readers(candidates, start_at, max_line_size))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let mut started = 0;
        let mut tailers = self.lock_tailers();
        for reader in readers {
            if self.cancel.is_cancelled() {
                break;
            }
            let path = reader.path().to_path_buf();
            if tailers.contains_key(&path) {
                continue;
            }
            lock(&self.idle).remove(&path);

            info!(
                path = ?path,
                offset = reader.offset(),
                file_id = %reader.file_id(),
                "Started tailing file"
            );
            self.stats.file_opened();
            let tailer = Tailer::new(
                reader,
                self.settings,
                self.cancel.child_token(),
                self.stats.clone(),
            );
            let handle = tokio::spawn(tail_file(
                tailer,
                self.matcher.clone(),
                self.records_tx.clone(),
                self.cancel.clone(),
                self.stats.clone(),
            ));
            tailers.insert(path, handle);
            started += 1;
        }

        Ok(started)
    }

    /// Removes finished tailers. Those that gave up on their file leave the
    /// path idle until it names a different file.
    async fn reap_finished(&self) {
        let finished: Vec<(PathBuf, TailHandle)> = {
            let mut tailers = self.lock_tailers();
            let done: Vec<PathBuf> = tailers
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(path, _)| path.clone())
                .collect();
            done.iter()
                .filter_map(|path| tailers.remove_entry(path))
                .collect()
        };

        for (path, handle) in finished {
            match handle.await {
                Ok(Some(file_id)) => {
                    info!(
                        path = ?path,
                        file_id = %file_id,
                        "File left idle after read failures until it is replaced"
                    );
                    lock(&self.idle).insert(path, file_id);
                }
                Ok(None) => debug!(path = ?path, "Tailer finished, path can be picked up again"),
                Err(e) => warn!(path = ?path, error = %e, "Tailer task failed"),
            }
        }
    }

    fn lock_tailers(&self) -> MutexGuard<'_, HashMap<PathBuf, TailHandle>> {
        lock(&self.tailers)
    }

    fn live_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self
            .lock_tailers()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    fn take_tailers(&self) -> Vec<(PathBuf, TailHandle)> {
        self.lock_tailers().drain().collect()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Opens the candidates. A path left idle is skipped while it still names
/// the file that was given up on.
fn open_readers(
    candidates: Vec<(PathBuf, Option<FileId>)>,
    start_at: StartAt,
    max_line_size: usize,
) -> Vec<FileReader> {
    candidates
        .into_iter()
        .filter(|(path, gave_up_on)| {
            gave_up_on.is_none() || FileId::from_path(path).ok() != *gave_up_on
        })
        .filter_map(|(path, _)| match FileReader::open(&path, start_at, max_line_size) {
            Ok(reader) => Some(reader),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "File disappeared before it could be opened");
                None
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to open file, will retry on next scan");
                None
            }
        })
        .collect()
}

/// Things created by a successful start
struct Running {
    discovery: Arc<Discovery>,
    forwarder: JoinHandle<()>,
    rescanner: Option<JoinHandle<()>>,
}

/// Tails the configured files and turns matching lines into records.
pub struct LogParser {
    config: LogParserConfig,
    state: ParserState,
    cancel: CancellationToken,
    stats: Arc<ParserStats>,
    running: Option<Running>,
}

impl LogParser {
    pub fn new(config: LogParserConfig) -> Self {
        let stats = Arc::new(ParserStats::new(&config.measurement_name));
        Self {
            config,
            state: ParserState::Created,
            cancel: CancellationToken::new(),
            stats,
            running: None,
        }
    }

    pub fn config(&self) -> &LogParserConfig {
        &self.config
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Paths that currently have a live tailer
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        self.running
            .as_ref()
            .map(|running| running.discovery.live_paths())
            .unwrap_or_default()
    }

    /// Validates the configuration and starts tailing. On error nothing has
    /// been spawned and the parser is failed.
    pub async fn start(&mut self, accumulator: Arc<dyn Accumulator>) -> Result<()> {
        if self.state != ParserState::Created {
            return Err(Error::InvalidState {
                op: "start",
                state: self.state.as_str(),
            });
        }

        self.state = ParserState::Validating;
        let (finder, matcher) = match self.validate() {
            Ok(validated) => validated,
            Err(e) => {
                error!(error = %e, "Log parser configuration is invalid");
                self.state = ParserState::Failed;
                return Err(e);
            }
        };

        info!(
            files = ?self.config.files,
            patterns = ?self.config.patterns,
            from_beginning = self.config.from_beginning,
            "Starting log parser"
        );

        let (records_tx, records_rx) = bounded_channel::bounded(self.config.records_channel_size);
        let forwarder = tokio::spawn(forward_records(
            records_rx,
            accumulator,
            self.cancel.clone(),
            self.stats.clone(),
        ));

        let discovery = Arc::new(Discovery {
            finder,
            matcher: Arc::new(matcher),
            records_tx,
            tailers: StdMutex::new(HashMap::new()),
            idle: StdMutex::new(HashMap::new()),
            scan_lock: tokio::sync::Mutex::new(()),
            settings: TailSettings {
                poll_interval: self.config.poll_interval(),
                max_batch_size: self.config.max_batch_size,
                max_read_failure: self.config.max_read_failure_duration(),
            },
            max_line_size: self.config.max_line_size,
            cancel: self.cancel.clone(),
            stats: self.stats.clone(),
        });

        self.state = ParserState::Running;

        match discovery.scan(self.config.initial_start_at()).await {
            Ok(0) => warn!(
                "No files match the configured patterns yet: {:?}",
                self.config.files
            ),
            Ok(started) => debug!(started, "Initial file discovery complete"),
            Err(e) => warn!(error = %e, "Initial file discovery failed, will retry on rescan"),
        }

        let rescanner = self.config.rescan_interval().map(|interval| {
            tokio::spawn(rescan_periodically(
                discovery.clone(),
                interval,
                self.config.rescan_start_at(),
            ))
        });

        self.running = Some(Running {
            discovery,
            forwarder,
            rescanner,
        });
        Ok(())
    }

    fn validate(&self) -> Result<(FileFinder, GrokMatcher)> {
        self.config.validate().map_err(Error::Config)?;

        let finder = FileFinder::new(self.config.files.clone())?;
        let timezone = TimeZoneSetting::from_config(self.config.timezone.as_deref())?;

        let library = PatternLibrary::load(
            &self.config.custom_pattern_files,
            &self.config.custom_patterns,
        )?;
        let patterns = library.compile(&self.config.patterns, self.config.anchor_patterns)?;
        if patterns.iter().all(|p| !p.is_usable()) {
            warn!("None of the configured patterns can match, every line will be skipped");
        }

        Ok((
            finder,
            GrokMatcher::new(patterns, self.config.measurement_name.clone(), timezone),
        ))
    }

    /// Looks for files that appeared since the last scan. Returns how many
    /// new files are being tailed.
    pub async fn rescan(&self) -> Result<usize> {
        let Some(running) = self.running.as_ref().filter(|_| self.state == ParserState::Running)
        else {
            return Err(Error::InvalidState {
                op: "rescan",
                state: self.state.as_str(),
            });
        };
        running
            .discovery
            .scan(self.config.rescan_start_at())
            .await
    }

    /// Stops every tailer and the forwarder. No record reaches the
    /// accumulator once this returns. Calling it again does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            if self.state != ParserState::Stopped {
                debug!(state = self.state.as_str(), "Stopping log parser that never ran");
                self.cancel.cancel();
                self.state = ParserState::Stopped;
            }
            return;
        };

        self.state = ParserState::Stopping;
        info!("Stopping log parser");
        self.cancel.cancel();

        let deadline = Instant::now() + self.config.shutdown_timeout();

        if let Some(rescanner) = running.rescanner {
            join_with_deadline(rescanner, deadline, "rescan task").await;
        }

        let tailers = running.discovery.take_tailers();
        if !tailers.is_empty() {
            debug!("Waiting for {} tailers to finish", tailers.len());
        }
        for (path, handle) in tailers {
            join_with_deadline(handle, deadline, &path.display().to_string()).await;
        }

        // the forwarder only drains what is already queued, so it gets a fresh bound
        drop(running.discovery);
        let drain_deadline = Instant::now() + self.config.shutdown_timeout();
        join_with_deadline(running.forwarder, drain_deadline, "record forwarder").await;

        self.state = ParserState::Stopped;
        info!(stats = ?self.stats.snapshot(), "Log parser stopped");
    }
}

impl Drop for LogParser {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Waits for a task until the deadline, then aborts it. Returns only once the
/// task has ended either way.
async fn join_with_deadline<T>(mut handle: JoinHandle<T>, deadline: Instant, what: &str) {
    match timeout_at(deadline, &mut handle).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => error!(task = what, "Task failed: {}", e),
        Err(_) => {
            warn!(task = what, "Task did not finish before the shutdown timeout, aborting");
            handle.abort();
            // abort takes effect at the task's next yield point
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(task = what, "Task failed: {}", e);
                }
            }
        }
    }
}

/// Reads lines from one file, matches them and queues the records. Returns
/// the file identity if the tailer gave up on it after read failures.
async fn tail_file(
    mut tailer: Tailer,
    matcher: Arc<GrokMatcher>,
    records_tx: BoundedSender<Record>,
    cancel: CancellationToken,
    stats: Arc<ParserStats>,
) -> Option<FileId> {
    let path = tailer.path().to_path_buf();
    {
        let lines = tailer.lines();
        tokio::pin!(lines);

        while let Some(line) = lines.next().await {
            let Some(record) = match_line(&matcher, &path, &line) else {
                stats.line_skipped();
                debug!(path = ?path, line = %line, "Line matched no pattern");
                continue;
            };

            match send_with_cancellation(&records_tx, record, &cancel).await {
                Ok(()) => {}
                Err(SendError::Cancelled) => {
                    debug!(path = ?path, "Send cancelled during shutdown");
                    break;
                }
                Err(SendError::ChannelClosed) => {
                    error!(path = ?path, "Record channel closed, stopping tailer");
                    break;
                }
            }
        }
    }

    debug!(path = ?path, "Tailer exited");
    tailer.failed_file()
}

fn match_line(matcher: &GrokMatcher, path: &Path, line: &str) -> Option<Record> {
    let mut record = matcher.match_line(line)?;
    record.set_path(path);
    Some(record)
}

/// Helper to send records with cancellation support.
async fn send_with_cancellation(
    output: &BoundedSender<Record>,
    record: Record,
    cancel_token: &CancellationToken,
) -> std::result::Result<(), SendError> {
    let send_fut = output.send_async(record);
    tokio::pin!(send_fut);

    select! {
        biased;

        _ = cancel_token.cancelled() => Err(SendError::Cancelled),
        result = send_fut => result.map_err(|_| SendError::ChannelClosed),
    }
}

/// Sole caller of the accumulator. Delivers what is already queued when
/// cancelled, then exits.
async fn forward_records(
    mut records_rx: BoundedReceiver<Record>,
    accumulator: Arc<dyn Accumulator>,
    cancel: CancellationToken,
    stats: Arc<ParserStats>,
) {
    loop {
        select! {
            biased;

            _ = cancel.cancelled() => break,
            record = records_rx.next() => match record {
                Some(record) => {
                    accumulator.add_record(record);
                    stats.record_emitted();
                }
                None => return,
            },
        }
    }

    let mut drained = 0usize;
    while let Some(record) = records_rx.try_recv() {
        accumulator.add_record(record);
        stats.record_emitted();
        drained += 1;
    }
    if drained > 0 {
        debug!(drained, "Delivered queued records during shutdown");
    }
}

async fn rescan_periodically(
    discovery: Arc<Discovery>,
    interval: std::time::Duration,
    start_at: StartAt,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            biased;

            _ = discovery.cancel.cancelled() => break,
            _ = ticker.tick() => {
                match discovery.scan(start_at).await {
                    Ok(0) => {}
                    Ok(started) => debug!(started, "Rescan found new files"),
                    Err(e) => warn!(error = %e, "Rescan failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingAccumulator;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> LogParserConfig {
        LogParserConfig {
            files: vec![format!("{}/*.log", dir.path().display())],
            patterns: vec!["%{WORD:level:tag} %{NUMBER:value:int}".to_string()],
            from_beginning: true,
            poll_interval_ms: 10,
            shutdown_timeout_ms: 2000,
            ..Default::default()
        }
    }

    fn append(path: &Path, data: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(data.as_bytes()).unwrap();
    }

    fn test_discovery(dir: &TempDir) -> (Arc<Discovery>, BoundedReceiver<Record>) {
        let config = test_config(dir);
        let (finder, matcher) = LogParser::new(config.clone()).validate().unwrap();
        let (records_tx, records_rx) = bounded_channel::bounded(config.records_channel_size);
        let discovery = Discovery {
            finder,
            matcher: Arc::new(matcher),
            records_tx,
            tailers: StdMutex::new(HashMap::new()),
            idle: StdMutex::new(HashMap::new()),
            scan_lock: tokio::sync::Mutex::new(()),
            settings: TailSettings {
                poll_interval: config.poll_interval(),
                max_batch_size: config.max_batch_size,
                max_read_failure: config.max_read_failure_duration(),
            },
            max_line_size: config.max_line_size,
            cancel: CancellationToken::new(),
            stats: Arc::new(ParserStats::new("test")),
        };
        (Arc::new(discovery), records_rx)
    }

    async fn next_record(records_rx: &mut BoundedReceiver<Record>) -> Record {
        tokio::time::timeout(Duration::from_secs(5), records_rx.next())
            .await
            .expect("no record within 5s")
            .expect("record channel closed")
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "info 1\nnot matching\nwarn 2\n").unwrap();

        let acc = Arc::new(CollectingAccumulator::new());
        let mut parser = LogParser::new(test_config(&dir));
        parser.start(acc.clone()).await.unwrap();
        assert_eq!(parser.state(), ParserState::Running);
        assert_eq!(parser.tracked_files(), vec![path.clone()]);

        assert!(acc.wait_for(2, Duration::from_secs(5)).await);
        parser.stop().await;
        assert_eq!(parser.state(), ParserState::Stopped);

        let records = acc.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag("level"), Some("info"));
        assert_eq!(records[1].tag("level"), Some("warn"));
        assert_eq!(records[0].tag("path"), Some(path.display().to_string().as_str()));

        let stats = parser.stats();
        assert_eq!(stats.records_emitted, 2);
        assert_eq!(stats.lines_skipped, 1);
        assert_eq!(stats.files_opened, 1);
    }

    #[tokio::test]
    async fn test_start_fails_on_undefined_pattern() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.patterns = vec!["%{FOOBAR}".to_string()];

        let mut parser = LogParser::new(config);
        let result = parser.start(Arc::new(CollectingAccumulator::new())).await;
        assert!(matches!(result, Err(Error::UndefinedPattern { .. })));
        assert_eq!(parser.state(), ParserState::Failed);
        assert!(parser.tracked_files().is_empty());

        parser.stop().await;
        assert_eq!(parser.state(), ParserState::Stopped);
    }

    #[tokio::test]
    async fn test_start_fails_on_invalid_config() {
        let dir = TempDir::new().unwrap();

        let mut config = test_config(&dir);
        config.patterns = vec![];
        let mut parser = LogParser::new(config);
        let result = parser.start(Arc::new(CollectingAccumulator::new())).await;
        assert!(matches!(result, Err(Error::Config(_))));

        let mut config = test_config(&dir);
        config.timezone = Some("Nowhere/Special".to_string());
        let mut parser = LogParser::new(config);
        let result = parser.start(Arc::new(CollectingAccumulator::new())).await;
        assert!(matches!(result, Err(Error::InvalidTimezone(_))));

        let mut config = test_config(&dir);
        config.files = vec!["/tmp/[broken".to_string()];
        let mut parser = LogParser::new(config);
        let result = parser.start(Arc::new(CollectingAccumulator::new())).await;
        assert!(matches!(result, Err(Error::InvalidGlob(_))));
    }

    #[tokio::test]
    async fn test_invalid_state_transitions() {
        let dir = TempDir::new().unwrap();
        let mut parser = LogParser::new(test_config(&dir));

        assert!(matches!(
            parser.rescan().await,
            Err(Error::InvalidState { op: "rescan", .. })
        ));

        parser
            .start(Arc::new(CollectingAccumulator::new()))
            .await
            .unwrap();
        assert!(matches!(
            parser.start(Arc::new(CollectingAccumulator::new())).await,
            Err(Error::InvalidState { op: "start", .. })
        ));

        parser.stop().await;
        parser.stop().await;
        assert_eq!(parser.state(), ParserState::Stopped);
        assert!(parser.rescan().await.is_err());
    }

    #[tokio::test]
    async fn test_rescan_picks_up_new_files_once() {
        let dir = TempDir::new().unwrap();
        let acc = Arc::new(CollectingAccumulator::new());
        let mut parser = LogParser::new(test_config(&dir));
        parser.start(acc.clone()).await.unwrap();
        assert!(parser.tracked_files().is_empty());

        fs::write(dir.path().join("late.log"), "info 7\n").unwrap();
        assert_eq!(parser.rescan().await.unwrap(), 1);
        assert_eq!(parser.rescan().await.unwrap(), 0);

        assert!(acc.wait_for(1, Duration::from_secs(5)).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        parser.stop().await;

        assert_eq!(acc.len(), 1);
        assert_eq!(
            acc.records()[0].field("value"),
            Some(&crate::record::FieldValue::Int(7))
        );
    }

    #[tokio::test]
    async fn test_periodic_rescan() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.rescan_interval_ms = Some(20);

        let acc = Arc::new(CollectingAccumulator::new());
        let mut parser = LogParser::new(config);
        parser.start(acc.clone()).await.unwrap();

        fs::write(dir.path().join("later.log"), "debug 3\n").unwrap();
        assert!(acc.wait_for(1, Duration::from_secs(5)).await);
        parser.stop().await;
    }

    #[tokio::test]
    async fn test_from_end_skips_existing_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "info 1\n").unwrap();

        let mut config = test_config(&dir);
        config.from_beginning = false;

        let acc = Arc::new(CollectingAccumulator::new());
        let mut parser = LogParser::new(config);
        parser.start(acc.clone()).await.unwrap();

        append(&path, "error 2\n");
        assert!(acc.wait_for(1, Duration::from_secs(5)).await);
        parser.stop().await;

        let records = acc.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag("level"), Some("error"));
    }

    #[tokio::test]
    async fn test_nothing_delivered_after_stop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "info 1\n").unwrap();

        let acc = Arc::new(CollectingAccumulator::new());
        let mut parser = LogParser::new(test_config(&dir));
        parser.start(acc.clone()).await.unwrap();
        assert!(acc.wait_for(1, Duration::from_secs(5)).await);

        parser.stop().await;
        let delivered = acc.len();

        append(&path, "info 2\ninfo 3\n");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(acc.len(), delivered);
    }

    #[tokio::test]
    async fn test_removed_file_can_be_tracked_again() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "info 1\n").unwrap();

        let acc = Arc::new(CollectingAccumulator::new());
        let mut parser = LogParser::new(test_config(&dir));
        parser.start(acc.clone()).await.unwrap();
        assert!(acc.wait_for(1, Duration::from_secs(5)).await);

        fs::remove_file(&path).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !parser.tracked_files().is_empty() {
            assert!(std::time::Instant::now() < deadline, "tailer never closed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        fs::write(&path, "info 2\n").unwrap();
        assert_eq!(parser.rescan().await.unwrap(), 1);
        assert!(acc.wait_for(2, Duration::from_secs(5)).await);
        parser.stop().await;
    }

    #[tokio::test]
    async fn test_file_given_up_on_stays_idle_until_replaced() {
        let dir = TempDir::new().unwrap();
        let failing = dir.path().join("app.log");
        let healthy = dir.path().join("healthy.log");
        fs::write(&failing, "info 1\n").unwrap();
        let (discovery, mut records_rx) = test_discovery(&dir);

        // a tailer that ended after its reads kept failing
        let gave_up_on = FileId::from_path(&failing).unwrap();
        let handle = tokio::spawn(async move { Some(gave_up_on) });
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        discovery.lock_tailers().insert(failing.clone(), handle);

        fs::write(&healthy, "warn 2\n").unwrap();
        assert_eq!(discovery.scan(StartAt::Beginning).await.unwrap(), 1);
        assert_eq!(discovery.live_paths(), vec![healthy.clone()]);
        assert_eq!(next_record(&mut records_rx).await.tag("level"), Some("warn"));

        // same file, still idle; the healthy tailer keeps producing
        assert_eq!(discovery.scan(StartAt::Beginning).await.unwrap(), 0);
        append(&healthy, "warn 3\n");
        let record = next_record(&mut records_rx).await;
        assert_eq!(record.field("value"), Some(&crate::record::FieldValue::Int(3)));

        let staged = dir.path().join("app.staged");
        fs::write(&staged, "error 4\n").unwrap();
        fs::rename(&staged, &failing).unwrap();
        assert_eq!(discovery.scan(StartAt::Beginning).await.unwrap(), 1);
        assert_eq!(discovery.live_paths(), vec![failing.clone(), healthy.clone()]);
        assert_eq!(next_record(&mut records_rx).await.tag("level"), Some("error"));
        assert!(records_rx.try_recv().is_none());

        discovery.cancel.cancel();
        for (_, handle) in discovery.take_tailers() {
            assert_eq!(handle.await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_concurrent_scans_open_each_file_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.log"), "info 1\n").unwrap();
        let (discovery, mut records_rx) = test_discovery(&dir);

        let (a, b) = tokio::join!(
            discovery.scan(StartAt::Beginning),
            discovery.scan(StartAt::Beginning)
        );
        assert_eq!(a.unwrap() + b.unwrap(), 1);

        next_record(&mut records_rx).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(records_rx.try_recv().is_none());

        discovery.cancel.cancel();
        for (_, handle) in discovery.take_tailers() {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_stop_with_zero_timeout_still_ends_delivery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "info 1\n").unwrap();

        let mut config = test_config(&dir);
        config.shutdown_timeout_ms = 0;

        let acc = Arc::new(CollectingAccumulator::new());
        let mut parser = LogParser::new(config);
        parser.start(acc.clone()).await.unwrap();
        assert!(acc.wait_for(1, Duration::from_secs(5)).await);

        parser.stop().await;
        assert_eq!(parser.state(), ParserState::Stopped);
        let delivered = acc.len();

        append(&path, "info 2\ninfo 3\n");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(acc.len(), delivered);
    }
}
