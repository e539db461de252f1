//! Persistence Tests
//!
//! Durability of root commits across reopen, store directory locking,
//! and how a corrupt store file surfaces at bootstrap.

use crate::common::*;
use std::sync::Arc;

#[test]
fn saved_rows_survive_a_reopen() {
    let mut stack = TestStack::new();
    let root = stack.root();

    add_book(&mut stack.manager, root, "Jane Eyre", "Charlotte Bronte");
    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.reopen();
    let root = stack.root();
    assert_eq!(stack.manager.store_version(), 1);

    let spec = FetchSpec::new(Book::NAME).sort_by(SortTerm::ascending("title"));
    let rows = stack.manager.fetch(root, &spec).unwrap();
    assert_eq!(titles(&rows), vec!["Emma", "Jane Eyre"]);
}

#[test]
fn updates_and_deletes_survive_a_reopen() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let kept = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    let doomed = add_book(&mut stack.manager, root, "Mathilda", "Mary Shelley");
    stack.manager.save(root).unwrap();

    stack.manager.set_attr(root, kept, "title", "Emma, Second Edition");
    stack.manager.delete(root, doomed);
    stack.manager.save(root).unwrap();

    stack.reopen();
    let root = stack.root();
    assert_eq!(stack.manager.store_version(), 2);

    let rows = stack
        .manager
        .fetch(root, &FetchSpec::new(Book::NAME))
        .unwrap();
    assert_eq!(titles(&rows), vec!["Emma, Second Edition"]);
}

#[test]
fn an_unsaved_stack_reopens_empty() {
    let mut stack = TestStack::new();
    let root = stack.root();

    add_book(&mut stack.manager, root, "Forgotten", "Nobody");
    // No save: pending changes die with the process

    stack.reopen();
    let root = stack.root();
    assert_eq!(stack.manager.store_version(), 0);
    assert!(stack
        .manager
        .fetch(root, &FetchSpec::new(Book::NAME))
        .unwrap()
        .is_empty());
}

#[test]
fn store_files_appear_on_disk() {
    let mut stack = TestStack::new();
    let root = stack.root();

    // The config is written at bootstrap, the store file at first commit
    assert!(stack.dir.path().join(CONFIG_FILE_NAME).exists());
    assert!(!stack.dir.path().join(STORE_FILE_NAME).exists());

    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();
    assert!(stack.dir.path().join(STORE_FILE_NAME).exists());
}

#[test]
fn commit_versions_count_up_one_per_root_save() {
    let mut stack = TestStack::new();
    let root = stack.root();

    for (n, title) in ["One", "Two", "Three"].into_iter().enumerate() {
        add_book(&mut stack.manager, root, title, "Counter");
        let commit = stack.manager.save(root).unwrap().unwrap();
        assert_eq!(commit.version, Some(n as u64 + 1));
        assert_eq!(stack.manager.store_version(), n as u64 + 1);
    }
}

#[test]
fn a_second_open_of_a_held_directory_is_refused() {
    let stack = TestStack::new();

    let err = ContextManager::bootstrap(stack.dir.path(), library_model()).unwrap_err();
    assert!(matches!(err, FolioError::Locked(_)));
}

#[test]
fn shared_returns_one_stack_per_directory() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let first = ContextManager::shared(dir.path(), library_model()).unwrap();
    let second = ContextManager::shared(dir.path(), library_model()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    {
        let mut manager = first.lock();
        let root = manager.root_context();
        add_book(&mut manager, root, "Emma", "Jane Austen");
        manager.save(root).unwrap();
    }

    // Dropping every handle releases the directory for a fresh open
    drop(first);
    drop(second);
    let mut manager = ContextManager::bootstrap(dir.path(), library_model()).unwrap();
    let root = manager.root_context();
    assert_eq!(manager.fetch(root, &FetchSpec::new(Book::NAME)).unwrap().len(), 1);
}

#[test]
fn a_corrupt_store_file_is_refused_at_bootstrap() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    {
        let mut manager = ContextManager::bootstrap(dir.path(), library_model()).unwrap();
        let root = manager.root_context();
        add_book(&mut manager, root, "Emma", "Jane Austen");
        manager.save(root).unwrap();
    }

    // Flip a byte of the checksum trailer
    let path = dir.path().join(STORE_FILE_NAME);
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let err = ContextManager::bootstrap(dir.path(), library_model()).unwrap_err();
    assert!(matches!(err, FolioError::Corruption(_)));
    assert!(err.to_string().contains("checksum mismatch"));
}
