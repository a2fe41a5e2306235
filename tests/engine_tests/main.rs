//! Tests for Engine
//!
//! These tests verify:
//! - Numeric and pattern allocation
//! - Batch bounds and exhaustion
//! - Crash recovery from the journal
//! - Concurrent access patterns
//! - Engine lifecycle (open/close)

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use idserver::counter::CounterValue;
use idserver::engine::Engine;
use idserver::store::HookStore;
use idserver::{Config, IdError, Pattern};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn temp_config(dir: &Path) -> idserver::config::ConfigBuilder {
    Config::builder()
        .journal_path(dir.join("ids.journal"))
        .snapshot_path(dir.join("ids.data"))
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    (temp_dir, engine)
}

fn numbers(ids: &[CounterValue]) -> Vec<u64> {
    ids.iter()
        .map(|id| match id {
            CounterValue::Number(n) => *n,
            other => panic!("expected a number, got {:?}", other),
        })
        .collect()
}

fn strings(ids: &[CounterValue]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn read_snapshot(dir: &Path) -> BTreeMap<String, CounterValue> {
    let bytes = fs::read(dir.join("ids.data")).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn write_snapshot(dir: &Path, json: &str) {
    fs::write(dir.join("ids.data"), json).unwrap();
}

// =============================================================================
// Numeric Allocation Tests
// =============================================================================

#[test]
fn test_sequential_batches() {
    let (_temp, engine) = setup_temp_engine();

    assert_eq!(numbers(&engine.allocate("orders", 3).unwrap()), vec![1, 2, 3]);
    assert_eq!(numbers(&engine.allocate("orders", 2).unwrap()), vec![4, 5]);
    assert_eq!(engine.current_value("orders").unwrap(), CounterValue::Number(5));
}

#[test]
fn test_keys_are_independent() {
    let (_temp, engine) = setup_temp_engine();

    engine.allocate("a", 10).unwrap();
    assert_eq!(numbers(&engine.allocate("b", 1).unwrap()), vec![1]);
    assert_eq!(numbers(&engine.allocate("a", 1).unwrap()), vec![11]);
}

#[test]
fn test_zero_batch_changes_nothing() {
    let (_temp, engine) = setup_temp_engine();
    engine.allocate("k", 4).unwrap();
    let position = engine.journal_position();

    assert!(engine.allocate("k", 0).unwrap().is_empty());
    assert_eq!(engine.current_value("k").unwrap(), CounterValue::Number(4));
    assert_eq!(engine.journal_position(), position);
}

#[test]
fn test_batch_above_max_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(temp_config(temp_dir.path()).max_batch(10).build()).unwrap();

    let err = engine.allocate("k", 11).unwrap_err();
    assert_eq!(err.code(), "ENONUM");
    assert_eq!(numbers(&engine.allocate("k", 10).unwrap()).len(), 10);
}

#[test]
fn test_last_on_new_key_issues_nothing() {
    let (_temp, engine) = setup_temp_engine();

    assert_eq!(engine.current_value("fresh").unwrap(), CounterValue::Number(0));
    assert_eq!(engine.journal_position(), Some(0));
    assert_eq!(numbers(&engine.allocate("fresh", 1).unwrap()), vec![1]);
}

#[test]
fn test_last_on_new_key_seeds_and_commits() {
    let (temp_dir, engine) = setup_temp_engine();

    assert_eq!(engine.current_value("fresh").unwrap(), CounterValue::Number(0));
    assert!(engine.is_dirty("fresh"));

    engine.commit().unwrap();
    assert!(!engine.is_dirty("fresh"));

    let bytes = fs::read(temp_dir.path().join("ids.data")).unwrap();
    let image: BTreeMap<String, CounterValue> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(image.len(), 1);
    assert_eq!(image["fresh"], CounterValue::Number(0));
}

#[test]
fn test_continues_from_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    write_snapshot(temp_dir.path(), r#"{"orders": 41}"#);

    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    assert_eq!(numbers(&engine.allocate("orders", 1).unwrap()), vec![42]);
}

// =============================================================================
// Pattern Allocation Tests
// =============================================================================

#[test]
fn test_pattern_key() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_config(temp_dir.path())
        .key_pattern("invoice", Pattern::parse("INV-%#").unwrap())
        .build();
    let engine = Engine::open(config).unwrap();

    let ids = engine.allocate("invoice", 11).unwrap();
    assert_eq!(ids[0].to_string(), "INV-A1");
    assert_eq!(ids[8].to_string(), "INV-A9");
    assert_eq!(ids[9].to_string(), "INV-B0");
    assert_eq!(ids[10].to_string(), "INV-B1");

    // Keys without an entry stay numeric
    assert_eq!(numbers(&engine.allocate("other", 1).unwrap()), vec![1]);
}

#[test]
fn test_pattern_exhaustion() {
    let temp_dir = TempDir::new().unwrap();
    write_snapshot(temp_dir.path(), r#"{"k": "98"}"#);
    let config = temp_config(temp_dir.path())
        .default_pattern(Pattern::parse("##").unwrap())
        .build();
    let engine = Engine::open(config).unwrap();

    assert_eq!(strings(&engine.allocate("k", 1).unwrap()), vec!["99"]);

    let err = engine.allocate("k", 1).unwrap_err();
    assert!(matches!(err, IdError::Exhausted(_)));
    assert_eq!(err.code(), "EUNGENIDS");
    assert_eq!(engine.current_value("k").unwrap().to_string(), "99");
}

#[test]
fn test_overflowing_batch_fails_whole() {
    let temp_dir = TempDir::new().unwrap();
    write_snapshot(temp_dir.path(), r#"{"k": "98"}"#);
    let config = temp_config(temp_dir.path())
        .default_pattern(Pattern::parse("##").unwrap())
        .build();
    let engine = Engine::open(config).unwrap();

    assert_eq!(engine.allocate("k", 2).unwrap_err().code(), "EUNGENIDS");
    assert_eq!(engine.current_value("k").unwrap().to_string(), "98");
    assert_eq!(engine.journal_position(), Some(0));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recovery_after_crash() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
        engine.allocate("a", 5).unwrap();
        engine.allocate("b", 2).unwrap();
        // Dropped without close: the journal stays behind
    }
    assert!(temp_dir.path().join("ids.journal").exists());

    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    let stats = engine.recovery().unwrap();
    assert_eq!(stats.rows, 2);
    assert_eq!(stats.applied, 2);

    assert_eq!(numbers(&engine.allocate("a", 1).unwrap()), vec![6]);
    assert_eq!(numbers(&engine.allocate("b", 1).unwrap()), vec![3]);

    let snapshot = read_snapshot(temp_dir.path());
    assert_eq!(snapshot["a"], CounterValue::Number(5));
    assert_eq!(snapshot["b"], CounterValue::Number(2));
}

#[test]
fn test_recovery_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    write_snapshot(temp_dir.path(), r#"{"a": 10}"#);
    fs::write(temp_dir.path().join("ids.journal"), b"a\r7\na\r12\na\r9\n\0").unwrap();

    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    let stats = engine.recovery().unwrap().clone();
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.stale, 2);
    assert_eq!(engine.current_value("a").unwrap(), CounterValue::Number(12));
    assert_eq!(read_snapshot(temp_dir.path())["a"], CounterValue::Number(12));
}

#[test]
fn test_replaying_same_journal_twice() {
    let temp_dir = TempDir::new().unwrap();
    let journal_path = temp_dir.path().join("ids.journal");
    let records: &[u8] = b"a\r4\nb\r2\na\r6\n\0";

    fs::write(&journal_path, records).unwrap();
    {
        let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
        assert_eq!(engine.recovery().unwrap().applied, 3);
    }

    // Same records again on top of the snapshot they produced
    fs::write(&journal_path, records).unwrap();
    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    let stats = engine.recovery().unwrap();
    assert_eq!(stats.applied, 0);
    assert_eq!(stats.stale, 3);
    assert_eq!(engine.current_value("a").unwrap(), CounterValue::Number(6));
    assert_eq!(engine.current_value("b").unwrap(), CounterValue::Number(2));
}

#[test]
fn test_recovery_skips_unreadable_values() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("ids.journal"), b"a\rnot-a-number\nb\r4\n\0").unwrap();

    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    let stats = engine.recovery().unwrap();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.applied, 1);
    assert_eq!(engine.current_value("b").unwrap(), CounterValue::Number(4));
    assert_eq!(engine.current_value("a").unwrap(), CounterValue::Number(0));
}

#[test]
fn test_journal_kept_when_startup_commit_fails() {
    let temp_dir = TempDir::new().unwrap();
    let journal_path = temp_dir.path().join("ids.journal");
    fs::write(&journal_path, b"a\r3\n\0").unwrap();

    let store = HookStore::builder(|_key: &str| Ok(None))
        .committer(|_changes: &BTreeMap<String, CounterValue>| {
            Err(IdError::Storage("database unavailable".to_string()))
        })
        .build()
        .unwrap();

    let result = Engine::open_with_store(temp_config(temp_dir.path()).build(), Box::new(store));
    assert!(result.is_err());
    assert_eq!(fs::read(&journal_path).unwrap(), b"a\r3\n\0".to_vec());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_shared_while_still_in_use_only_commits() {
    let temp_dir = TempDir::new().unwrap();
    let journal_path = temp_dir.path().join("ids.journal");
    let engine = Arc::new(Engine::open(temp_config(temp_dir.path()).build()).unwrap());
    let other = Arc::clone(&engine);

    engine.allocate("k", 4).unwrap();
    Engine::close_shared(engine).unwrap();

    // The remaining handle can still journal, so the file stays
    assert!(journal_path.exists());
    assert!(!other.is_dirty("k"));
    assert_eq!(numbers(&other.allocate("k", 1).unwrap()), vec![5]);

    Engine::close_shared(other).unwrap();
    assert!(!journal_path.exists());
}

#[test]
fn test_close_commits_and_removes_journal() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    engine.allocate("a", 3).unwrap();
    engine.close().unwrap();

    assert!(!temp_dir.path().join("ids.journal").exists());
    assert_eq!(read_snapshot(temp_dir.path())["a"], CounterValue::Number(3));

    let engine = Engine::open(temp_config(temp_dir.path()).build()).unwrap();
    assert!(engine.recovery().is_none());
    assert_eq!(numbers(&engine.allocate("a", 1).unwrap()), vec![4]);
}

#[test]
fn test_journaling_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_config(temp_dir.path()).journaling(false).build();
    let engine = Engine::open(config).unwrap();

    engine.allocate("a", 2).unwrap();
    assert_eq!(engine.journal_position(), None);
    assert!(!temp_dir.path().join("ids.journal").exists());
}

#[test]
fn test_store_read_failure_is_eget() {
    let temp_dir = TempDir::new().unwrap();
    let store = HookStore::builder(|key: &str| {
        Err(IdError::Storage(format!("cannot read {}", key)))
    })
    .setter(|_key: &str, _value: &CounterValue| Ok(()))
    .build()
    .unwrap();

    let engine = Engine::open_with_store(temp_config(temp_dir.path()).build(), Box::new(store)).unwrap();
    let err = engine.allocate("k", 1).unwrap_err();
    assert_eq!(err.code(), "EGET");
    assert_eq!(engine.stats().keys, 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_same_key_never_repeats() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    let batch = numbers(&engine.allocate("shared", 3).unwrap());
                    // Every batch is contiguous and increasing
                    assert_eq!(batch[1], batch[0] + 1);
                    assert_eq!(batch[2], batch[1] + 1);
                    seen.extend(batch);
                }
                seen
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all.insert(id), "id {} issued twice", id);
        }
    }

    assert_eq!(all.len(), 8 * 50 * 3);
    assert_eq!(engine.current_value("shared").unwrap(), CounterValue::Number(1200));
}

#[test]
fn test_concurrent_distinct_keys() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let key = format!("key{}", i);
                for _ in 0..100 {
                    engine.allocate(&key, 1).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..4 {
        let key = format!("key{}", i);
        assert_eq!(engine.current_value(&key).unwrap(), CounterValue::Number(100));
    }
    assert_eq!(engine.stats().keys, 4);
}
