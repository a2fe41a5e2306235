//! Tests for the Journal
//!
//! These tests verify:
//! - Appends are readable back in order
//! - Exactly one end-of-data sentinel on disk
//! - Checkpoints drop covered records and keep newer ones
//! - Replay of torn or garbage-tailed files

use std::fs;
use std::path::PathBuf;

use idserver::counter::CounterValue;
use idserver::journal::{Journal, JournalRecord, JournalReplay};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_journal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ids.journal");
    (temp_dir, path)
}

fn record(key: &str, value: u64) -> JournalRecord {
    JournalRecord::new(key, &CounterValue::Number(value))
}

fn replay(path: &PathBuf) -> Vec<(String, String)> {
    let (records, _) = JournalReplay::read(path).unwrap().unwrap();
    records.into_iter().map(|r| (r.key, r.value)).collect()
}

fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_then_replay() {
    let (_temp, path) = setup_temp_journal();
    let journal = Journal::create(&path).unwrap();

    journal.append(&record("a", 3)).unwrap();
    journal.append(&record("b", 1)).unwrap();
    journal.append(&record("a", 7)).unwrap();
    assert_eq!(journal.appended(), 3);

    assert_eq!(replay(&path), vec![pair("a", "3"), pair("b", "1"), pair("a", "7")]);
}

#[test]
fn test_single_sentinel_on_disk() {
    let (_temp, path) = setup_temp_journal();
    let journal = Journal::create(&path).unwrap();

    journal.append(&record("a", 1)).unwrap();
    journal.append(&record("a", 2)).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes, b"a\r1\na\r2\n\0".to_vec());
    assert_eq!(bytes.iter().filter(|&&b| b == 0).count(), 1);
    assert_eq!(journal.position(), bytes.len() as u64 - 1);
}

#[test]
fn test_create_refuses_existing_file() {
    let (_temp, path) = setup_temp_journal();
    fs::write(&path, b"a\r1\n\0").unwrap();

    assert!(Journal::create(&path).is_err());
    // The leftover must not be touched
    assert_eq!(fs::read(&path).unwrap(), b"a\r1\n\0".to_vec());
}

#[test]
fn test_remove_deletes_file() {
    let (_temp, path) = setup_temp_journal();
    let journal = Journal::create(&path).unwrap();
    journal.append(&record("a", 1)).unwrap();

    journal.remove().unwrap();
    assert!(!path.exists());
    assert!(JournalReplay::read(&path).unwrap().is_none());
}

// =============================================================================
// Checkpoint Tests
// =============================================================================

#[test]
fn test_checkpoint_without_tail_empties_file() {
    let (_temp, path) = setup_temp_journal();
    let journal = Journal::create(&path).unwrap();
    journal.append(&record("a", 1)).unwrap();

    let (mark, ()) = journal.at_mark(|| ());
    journal.checkpoint(mark).unwrap();

    assert_eq!(journal.position(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);

    // Appends start over at the beginning of the file
    journal.append(&record("b", 2)).unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"b\r2\n\0".to_vec());
}

#[test]
fn test_checkpoint_keeps_records_after_mark() {
    let (_temp, path) = setup_temp_journal();
    let journal = Journal::create(&path).unwrap();

    journal.append(&record("a", 1)).unwrap();
    let (mark, ()) = journal.at_mark(|| ());
    assert_eq!(mark.offset(), journal.position());
    journal.append(&record("b", 5)).unwrap();
    journal.append(&record("a", 2)).unwrap();

    journal.checkpoint(mark).unwrap();

    assert_eq!(replay(&path), vec![pair("b", "5"), pair("a", "2")]);

    // The replaced file is still the one we append to
    journal.append(&record("c", 9)).unwrap();
    assert_eq!(replay(&path), vec![pair("b", "5"), pair("a", "2"), pair("c", "9")]);
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_missing_file() {
    let (_temp, path) = setup_temp_journal();
    assert!(JournalReplay::read(&path).unwrap().is_none());
}

#[test]
fn test_replay_ignores_bytes_after_sentinel() {
    let (_temp, path) = setup_temp_journal();
    fs::write(&path, b"a\r1\nb\r2\n\0a\r99\nstale garbage").unwrap();

    let (records, stats) = JournalReplay::read(&path).unwrap().unwrap();
    assert_eq!(records.len(), 2);
    assert!(stats.sentinel_found);
    assert_eq!(stats.rows, 2);
}

#[test]
fn test_replay_torn_tail_without_sentinel() {
    let (_temp, path) = setup_temp_journal();
    fs::write(&path, b"a\r1\nb\r2\nc\r").unwrap();

    let (records, stats) = JournalReplay::read(&path).unwrap().unwrap();
    assert!(!stats.sentinel_found);
    assert_eq!(
        records.into_iter().map(|r| (r.key, r.value)).collect::<Vec<_>>(),
        vec![pair("a", "1"), pair("b", "2")]
    );
}

#[test]
fn test_replay_counts_malformed_lines() {
    let (_temp, path) = setup_temp_journal();
    fs::write(&path, b"a\r1\nno separator here\nb\r2\n\0").unwrap();

    let (records, stats) = JournalReplay::read(&path).unwrap().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.warnings(), 1);
}

#[test]
fn test_replay_empty_file() {
    let (_temp, path) = setup_temp_journal();
    fs::write(&path, b"").unwrap();

    let (records, stats) = JournalReplay::read(&path).unwrap().unwrap();
    assert!(records.is_empty());
    assert_eq!(stats.rows, 0);
}
