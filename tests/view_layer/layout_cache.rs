//! Layout Cache Tests
//!
//! A fetch spec that names a cache persists its sectioned arrangement
//! next to the store. Across a restart the observer replays that
//! arrangement instead of sorting from scratch, provided the cache
//! still matches the spec fingerprint and the store version.

use crate::common::*;

fn shelf_cached() -> FetchSpec {
    shelf_spec().with_cache("shelf")
}

#[test]
fn a_named_cache_lands_in_the_stack_directory() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let cache_file = stack.manager.cache_dir().join("shelf.cache");

    let _observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    assert!(cache_file.exists(), "cache written at observer creation");

    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();
    assert!(cache_file.exists());
}

#[test]
fn the_cached_layout_is_replayed_across_a_restart() {
    let mut stack = TestStack::new();
    let root = stack.root();
    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    add_book(&mut stack.manager, root, "Persuasion", "Jane Austen");
    add_book(&mut stack.manager, root, "Villette", "Charlotte Bronte");
    stack.manager.save(root).unwrap();

    let before = {
        let observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
        observer.snapshot()
    };

    stack.reopen();
    let root = stack.root();
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    let after = observer.snapshot();

    assert_eq!(after, before);
    let fresh = ResultSet::build(
        stack.manager.fetch(root, &shelf_cached()).unwrap(),
        &shelf_cached(),
    );
    assert_eq!(after, fresh);
    assert_eq!(
        after.sections()[0].key,
        Some("Charlotte Bronte".to_string())
    );
    assert_eq!(counts_of(&after), vec![1, 2]);
}

#[test]
fn observed_saves_keep_the_cache_current() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();

    let emma = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    add_book(&mut stack.manager, root, "Villette", "Charlotte Bronte");
    stack.manager.save(root).unwrap();

    // A cross-section move after the initial write
    stack.manager.set_attr(root, emma, "author", "Charlotte Bronte");
    stack.manager.save(root).unwrap();
    let before = observer.snapshot();
    drop(observer);

    stack.reopen();
    let root = stack.root();
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    assert_eq!(observer.snapshot(), before);
    assert_eq!(counts_of(&observer.snapshot()), vec![2]);
}

#[test]
fn pending_changes_never_reach_the_cache() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let cache_file = stack.manager.cache_dir().join("shelf.cache");

    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    assert_eq!(observer.len(), 1);
    assert!(!cache_file.exists(), "no cache while the row is pending");

    stack.manager.save(root).unwrap();
    assert!(cache_file.exists(), "the commit wrote the cache");
    drop(observer);

    stack.reopen();
    let root = stack.root();
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    assert_eq!(counts_of(&observer.snapshot()), vec![1]);
}

#[test]
fn a_child_save_keeps_the_cache_at_the_store_state() {
    let mut stack = TestStack::new();
    let root = stack.root();
    add_book(&mut stack.manager, root, "Alpha", "Rachel Cusk");
    let zulu = add_book(&mut stack.manager, root, "Zulu", "Rachel Cusk");
    stack.manager.save(root).unwrap();

    let titled = FetchSpec::new(Book::NAME)
        .sort_by(SortTerm::ascending("title"))
        .with_cache("titles");
    let child = stack.manager.new_child_context(root);
    let observer = ResultObserver::new(&mut stack.manager, child, titled.clone()).unwrap();

    // The child's save reorders the observed set but never the store
    stack.manager.set_attr(child, zulu, "title", "Aardvark");
    stack.manager.save(child).unwrap();
    assert_eq!(
        titles(&observer.snapshot().sections()[0].rows),
        vec!["Aardvark", "Alpha"]
    );
    drop(observer);

    // The unsaved root state dies with the restart; the cache must
    // replay the committed arrangement, not the child's
    stack.reopen();
    let root = stack.root();
    let observer = ResultObserver::new(&mut stack.manager, root, titled).unwrap();
    assert_eq!(
        titles(&observer.snapshot().sections()[0].rows),
        vec!["Alpha", "Zulu"]
    );
}

#[test]
fn two_caches_share_the_stack_directory() {
    let mut stack = TestStack::new();
    let root = stack.root();
    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    add_book(&mut stack.manager, root, "Villette", "Charlotte Bronte");
    stack.manager.save(root).unwrap();

    let alphabet = FetchSpec::new(Book::NAME)
        .sort_by(SortTerm::ascending("title"))
        .group_by(GroupKey::first_letter("title"))
        .with_cache("alphabet");
    {
        let _shelf = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
        let _letters =
            ResultObserver::new(&mut stack.manager, root, alphabet.clone()).unwrap();
    }
    let cache_dir = stack.manager.cache_dir().to_path_buf();
    assert!(cache_dir.join("shelf.cache").exists());
    assert!(cache_dir.join("alphabet.cache").exists());

    stack.reopen();
    let root = stack.root();
    let shelf = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    let letters = ResultObserver::new(&mut stack.manager, root, alphabet).unwrap();
    assert_eq!(counts_of(&shelf.snapshot()), vec![1, 1]);
    assert_eq!(
        letters.snapshot().sections()[0].key,
        Some("E".to_string())
    );
    assert_eq!(
        letters.snapshot().sections()[1].key,
        Some("V".to_string())
    );
}

#[test]
fn a_deleted_cache_is_rebuilt_from_the_store() {
    let mut stack = TestStack::new();
    let root = stack.root();
    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();
    {
        let _observer =
            ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    }

    let cache_dir = stack.manager.cache_dir().to_path_buf();
    ResultObserver::delete_cache(&cache_dir, "shelf").unwrap();
    assert!(!cache_dir.join("shelf.cache").exists());

    stack.reopen();
    let root = stack.root();
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_cached()).unwrap();
    assert_eq!(observer.len(), 1);
    assert_eq!(
        titles(&observer.snapshot().sections()[0].rows),
        vec!["Emma"]
    );
    // Rebuilding wrote the file again
    assert!(cache_dir.join("shelf.cache").exists());
}
