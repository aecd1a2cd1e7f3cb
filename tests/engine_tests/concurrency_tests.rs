//! Tests for concurrent access
//!
//! These tests verify:
//! - Concurrent writers never interleave records
//! - Readers running alongside a writer only ever see committed data
//! - Record IDs stay unique across threads

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use appendkv::config::{Config, SyncMode};
use appendkv::engine::Engine;
use appendkv::error::Error;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_shared_engine(mode: SyncMode) -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sync_mode(mode)
        .bloom_sizing(100_000, 0.01)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, Arc::new(engine))
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_concurrent_writers() {
    let (_dir, engine) = setup_shared_engine(SyncMode::None);
    let num_threads = 8;
    let writes_per_thread = 200;

    let mut handles = vec![];
    for t in 0..num_threads {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..writes_per_thread {
                let key = format!("t{}-k{}", t, i);
                let value = format!("t{}-v{}", t, i);
                engine.set(key.as_bytes(), value.as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len().unwrap(), num_threads * writes_per_thread);
    for t in 0..num_threads {
        for i in (0..writes_per_thread).step_by(37) {
            let key = format!("t{}-k{}", t, i);
            let value = format!("t{}-v{}", t, i);
            assert_eq!(engine.get(key.as_bytes()).unwrap().as_ref(), value.as_bytes());
        }
    }
}

#[test]
fn test_concurrent_ids_unique_and_ordered_in_file() {
    let (_dir, engine) = setup_shared_engine(SyncMode::Async);

    let mut handles = vec![];
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..250 {
                engine.set(format!("{}-{}", t, i).as_bytes(), b"v").unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen = HashSet::new();
    let mut last = 0u64;
    engine
        .for_each(|_, record, err| {
            assert!(err.is_none());
            let id = record.unwrap().id;
            assert!(id > last, "ids out of file order: {} after {}", id, last);
            assert!(seen.insert(id));
            last = id;
            ControlFlow::<()>::Continue(())
        })
        .unwrap();

    assert_eq!(seen.len(), 1000);
}

// =============================================================================
// Reader/Writer Tests
// =============================================================================

#[test]
fn test_readers_alongside_writer() {
    let (_dir, engine) = setup_shared_engine(SyncMode::None);
    engine.set(b"stable", b"value").unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let engine = Arc::clone(&engine);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..500 {
                engine
                    .set(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
                    .unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        let done = Arc::clone(&done);
        readers.push(thread::spawn(move || {
            let mut last_len = 0;
            while !done.load(Ordering::Acquire) {
                assert_eq!(engine.get(b"stable").unwrap().as_ref(), b"value");

                // Never sees a torn record, and the count never goes backwards
                let len = engine.len().unwrap();
                assert!(len >= last_len);
                last_len = len;

                match engine.get(b"key250") {
                    Ok(v) => assert_eq!(v.as_ref(), b"value250"),
                    Err(Error::KeyNotFound) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }));
    }

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(engine.len().unwrap(), 501);
}

#[test]
fn test_snapshot_during_writes_is_consistent() {
    let (_dir, engine) = setup_shared_engine(SyncMode::None);

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..300 {
                engine.set(format!("key{}", i).as_bytes(), b"v").unwrap();
            }
        })
    };

    let mut snapshots = vec![];
    for _ in 0..10 {
        let mut out = Vec::new();
        let written = engine.snapshot(&mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        snapshots.push(out);
    }
    writer.join().unwrap();

    // Every snapshot is a clean prefix: it reopens without truncation
    for snapshot in snapshots {
        let restore_dir = TempDir::new().unwrap();
        std::fs::write(
            restore_dir.path().join(appendkv::engine::LOG_FILENAME),
            &snapshot,
        )
        .unwrap();

        let restored = Engine::open_path(restore_dir.path()).unwrap();
        assert!(!restored.last_recovery().unwrap().was_truncated);
    }
}

#[test]
fn test_concurrent_set_and_delete() {
    let (_dir, engine) = setup_shared_engine(SyncMode::None);

    for i in 0..100 {
        engine.set(format!("key{}", i).as_bytes(), b"v").unwrap();
    }

    let mut handles = vec![];
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in (t..100).step_by(4) {
                engine.delete(format!("key{}", i).as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len().unwrap(), 0);
    for i in 0..100 {
        assert!(matches!(
            engine.get(format!("key{}", i).as_bytes()),
            Err(Error::KeyNotFound)
        ));
    }
}
