//! Concurrency Tests
//!
//! Many writers and readers sharing one repository.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use nodimus_e2e_tests::{TestDataFactory, TestDatabaseManager};

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

#[test]
fn test_parallel_writers_get_distinct_ids() {
    let db = TestDatabaseManager::new_temp();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = Arc::clone(&db.repo);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|i| {
                        repo.add_memory(&format!("thread {} note {}", t, i), &["Shared"])
                            .unwrap()
                            .id
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "id {} handed out twice", id);
        }
    }

    assert_eq!(ids.len(), THREADS * PER_THREAD);
    let stats = db.repo.stats().unwrap();
    assert_eq!(stats.memories, (THREADS * PER_THREAD) as i64);
    assert_eq!(stats.indexed_documents, stats.memories);
    assert_eq!(stats.pending_index, 0);
}

#[test]
fn test_racing_writers_create_one_entity_per_name() {
    let db = TestDatabaseManager::new_temp();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = Arc::clone(&db.repo);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let names = TestDataFactory::topic_entities(3, t + i);
                    repo.add_memory(&format!("race {} {}", t, i), &names).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let entities = db.repo.get_entities().unwrap();
    let names: HashSet<&str> = entities.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(entities.len(), names.len());
    assert_eq!(entities.len(), 10);
}

#[test]
fn test_readers_see_whole_writes() {
    let db = TestDatabaseManager::new_temp();
    db.seed_memories(10);

    let writer_repo = Arc::clone(&db.repo);
    let writer = thread::spawn(move || {
        for i in 0..100 {
            writer_repo
                .add_memory(&format!("streamed fact {}", i), &["Stream"])
                .unwrap();
        }
    });

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let repo = Arc::clone(&db.repo);
            thread::spawn(move || {
                for _ in 0..50 {
                    let results = repo.search("streamed").unwrap();
                    // Anything the index returns is fully readable
                    for hit in &results.hits {
                        assert_eq!(repo.get_memory(hit.id).unwrap(), hit.content);
                    }
                    assert!(results.orphaned.is_empty());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(db.memory_count(), 110);
}

#[test]
fn test_rebuild_while_writing_keeps_every_memory() {
    let db = TestDatabaseManager::new_temp();
    db.seed_memories(20);

    let writer_repo = Arc::clone(&db.repo);
    let writer = thread::spawn(move || {
        for i in 0..60 {
            writer_repo.add_memory(&format!("late arrival {}", i), &["Late"]).unwrap();
        }
    });
    for _ in 0..3 {
        db.repo.rebuild_index().unwrap();
    }
    writer.join().unwrap();

    // Writes that raced a rebuild are caught by reconciliation
    db.repo.reconcile_index().unwrap();
    let stats = db.repo.stats().unwrap();
    assert_eq!(stats.memories, 80);
    assert_eq!(stats.indexed_documents, 80);
}
