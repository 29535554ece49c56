// SPDX-License-Identifier: Apache-2.0

use chrono::{TimeZone, Utc};
use logparser::{
    CollectingAccumulator, Error, FieldValue, LogParser, LogParserConfig, ParserState, Record,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn testdata(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("testdata")
        .join(name)
}

fn config(files: Vec<String>, patterns: &[&str]) -> LogParserConfig {
    LogParserConfig {
        files,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        custom_pattern_files: vec![testdata("test-patterns")],
        from_beginning: true,
        poll_interval_ms: 10,
        ..Default::default()
    }
}

fn find_by_path<'a>(records: &'a [Record], path: &Path) -> &'a Record {
    let path = path.display().to_string();
    records
        .iter()
        .find(|r| r.tag("path") == Some(path.as_str()))
        .unwrap_or_else(|| panic!("no record for {}", path))
}

fn assert_test_a(record: &Record) {
    assert_eq!(record.measurement, "logparser_grok");
    assert_eq!(
        record.field("clientip"),
        Some(&FieldValue::String("192.168.1.1".to_string()))
    );
    assert_eq!(record.field("myfloat"), Some(&FieldValue::Float(1.25)));
    assert_eq!(record.field("response_time"), Some(&FieldValue::Int(5432)));
    assert_eq!(record.field("myint"), Some(&FieldValue::Int(101)));
    assert_eq!(record.fields.len(), 4);
    assert_eq!(record.tag("response_code"), Some("200"));
    assert_eq!(record.tags.len(), 2);
    assert_eq!(
        record.timestamp,
        Utc.with_ymd_and_hms(2016, 6, 4, 11, 41, 45).unwrap()
    );
}

#[tokio::test]
async fn test_start_without_patterns_fails() {
    let mut parser = LogParser::new(config(
        vec![testdata("test_a.log").display().to_string()],
        &[],
    ));

    let result = parser.start(Arc::new(CollectingAccumulator::new())).await;
    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(parser.state(), ParserState::Failed);
}

#[tokio::test]
async fn test_undefined_pattern_fails_start() {
    let acc = Arc::new(CollectingAccumulator::new());
    let mut parser = LogParser::new(config(
        vec![testdata("*.log").display().to_string()],
        &["%{FOOBAR}"],
    ));

    let err = parser.start(acc.clone()).await.unwrap_err();
    assert!(err.to_string().contains("FOOBAR"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(acc.is_empty());
    parser.stop().await;
}

#[tokio::test]
async fn test_parse_log_files() {
    let path_a = testdata("test_a.log");
    let path_b = testdata("test_b.log");
    let acc = Arc::new(CollectingAccumulator::new());
    let mut parser = LogParser::new(config(
        vec![
            path_a.display().to_string(),
            path_b.display().to_string(),
        ],
        &["%{TEST_LOG_A}", "%{TEST_LOG_B}"],
    ));

    parser.start(acc.clone()).await.unwrap();
    assert!(acc.wait_for(2, WAIT).await);
    parser.stop().await;

    let records = acc.records();
    assert_eq!(records.len(), 2);

    assert_test_a(find_by_path(&records, &path_a));

    let b = find_by_path(&records, &path_b);
    assert_eq!(b.field("myfloat"), Some(&FieldValue::Float(1.25)));
    assert_eq!(
        b.field("mystring"),
        Some(&FieldValue::String("mystring".to_string()))
    );
    assert_eq!(
        b.field("nomodifier"),
        Some(&FieldValue::String("nomodifier".to_string()))
    );
    assert_eq!(b.field("dropme"), None);
    assert_eq!(b.fields.len(), 3);
    assert_eq!(b.tags.len(), 1);
    assert_eq!(
        b.timestamp,
        Utc.with_ymd_and_hms(2016, 6, 4, 12, 41, 45).unwrap()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_files_appearing_later_are_found_by_rescan() {
    let dir = TempDir::new().unwrap();
    let acc = Arc::new(CollectingAccumulator::new());
    let mut parser = LogParser::new(config(
        vec![format!("{}/*.log", dir.path().display())],
        &["%{TEST_LOG_A}", "%{TEST_LOG_B}"],
    ));

    parser.start(acc.clone()).await.unwrap();
    assert!(parser.tracked_files().is_empty());
    assert!(acc.is_empty());

    let link = dir.path().join("test_a.log");
    std::os::unix::fs::symlink(testdata("test_a.log"), &link).unwrap();
    assert_eq!(parser.rescan().await.unwrap(), 1);

    assert!(acc.wait_for(1, WAIT).await);
    parser.stop().await;

    let records = acc.records();
    assert_eq!(records.len(), 1);
    assert_test_a(&records[0]);
    assert_eq!(
        records[0].tag("path"),
        Some(link.display().to_string().as_str())
    );
}

#[tokio::test]
async fn test_unconvertible_capture_skips_line() {
    let path_a = testdata("test_a.log");
    let acc = Arc::new(CollectingAccumulator::new());
    let mut parser = LogParser::new(config(
        vec![
            path_a.display().to_string(),
            testdata("test_c.log").display().to_string(),
        ],
        &["%{TEST_LOG_A}", "%{TEST_LOG_BAD}"],
    ));

    parser.start(acc.clone()).await.unwrap();
    assert!(acc.wait_for(1, WAIT).await);

    // give the bad line time to be read and skipped
    let deadline = tokio::time::Instant::now() + WAIT;
    while parser.stats().lines_skipped == 0 {
        assert!(tokio::time::Instant::now() < deadline, "bad line never read");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    parser.stop().await;

    let records = acc.records();
    assert_eq!(records.len(), 1);
    assert_test_a(find_by_path(&records, &path_a));
}

#[tokio::test]
async fn test_lines_appended_while_running() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("access.log");
    std::fs::write(&path, "").unwrap();

    let acc = Arc::new(CollectingAccumulator::new());
    let mut config = config(vec![path.display().to_string()], &["%{TEST_LOG_A}"]);
    config.from_beginning = false;
    config.measurement_name = "access".to_string();

    let mut parser = LogParser::new(config);
    parser.start(acc.clone()).await.unwrap();

    let line = std::fs::read_to_string(testdata("test_a.log")).unwrap();
    std::fs::write(&path, format!("{}garbage\n{}", line, line)).unwrap();

    assert!(acc.wait_for(2, WAIT).await);
    parser.stop().await;

    let records = acc.records();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.measurement, "access");
        assert_eq!(record.field("myint"), Some(&FieldValue::Int(101)));
    }
    assert_eq!(parser.stats().lines_skipped, 1);
}
