//! Index Repair Journey Tests
//!
//! The search index drifts from the relational store; search must stay
//! honest and repair must bring the two back together.

use nodimus_e2e_tests::{TestDataFactory, TestDatabaseManager};

#[test]
fn test_orphaned_hits_are_skipped_not_fatal() {
    let db = TestDatabaseManager::new_temp();
    db.repo.add_memory("capital one", &["A"]).unwrap();
    db.repo.add_memory("capital two", &["B"]).unwrap();
    db.repo.add_memory("capital three", &["C"]).unwrap();

    db.delete_memory_row(2);

    let results = db.repo.search("capital").unwrap();
    let ids: Vec<i64> = results.hits.iter().map(|h| h.id).collect();
    assert_eq!(results.hits.len(), 2);
    assert!(!ids.contains(&2));
    assert_eq!(results.orphaned, vec![2]);
}

#[test]
fn test_rebuild_removes_orphans() {
    let db = TestDatabaseManager::new_temp();
    db.seed_memories(5);
    db.delete_memory_row(3);

    assert_eq!(db.repo.reconcile_index().unwrap(), Some(4));
    assert_eq!(db.repo.stats().unwrap().indexed_documents, 4);
    assert!(db.repo.search("memory").unwrap().orphaned.is_empty());

    // Already in sync
    assert_eq!(db.repo.reconcile_index().unwrap(), None);
}

#[test]
fn test_lost_index_is_rebuilt_on_startup() {
    let mut db = TestDatabaseManager::new_temp();
    TestDataFactory::create_search_scenario(&db.repo);

    db.reopen();
    db.wipe_index_files();
    db.reopen();

    // Relational data intact, index empty until reconciled
    assert_eq!(db.memory_count(), 8);
    assert!(db.repo.search("pasta").unwrap().is_empty());

    assert_eq!(db.repo.reconcile_index().unwrap(), Some(8));
    assert_eq!(
        db.repo.search_memories("pasta").unwrap(),
        vec!["To make pasta, boil water and add salt".to_string()]
    );
}

#[test]
fn test_rebuild_is_idempotent() {
    let db = TestDatabaseManager::new_temp();
    db.seed_memories(12);

    let first = db.repo.rebuild_index().unwrap();
    let before = db.repo.search("memory").unwrap();
    let second = db.repo.rebuild_index().unwrap();
    let after = db.repo.search("memory").unwrap();

    assert_eq!(first, 12);
    assert_eq!(second, 12);
    let ids = |r: &nodimus_core::SearchResults| r.hits.iter().map(|h| h.id).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
}
