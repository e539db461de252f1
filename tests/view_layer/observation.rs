//! Result Observation Tests
//!
//! An observer bound to a context turns each save into at most one
//! change batch and keeps its sectioned snapshot current. Commits that
//! do not touch the observed rows stay silent.

use crate::common::*;
use chrono::TimeZone;
use std::sync::Arc;

fn observed_shelf(stack: &mut TestStack) -> (Arc<ResultObserver>, Arc<CollectedBatches>) {
    let root = stack.root();
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_spec()).unwrap();
    let handler = CollectedBatches::new();
    observer.set_handler(handler.clone());
    (observer, handler)
}

fn rank(event: &ChangeEvent) -> u8 {
    match event {
        ChangeEvent::Begin => 0,
        ChangeEvent::ObjectDeleted { .. } => 1,
        ChangeEvent::SectionDeleted { .. } => 2,
        ChangeEvent::SectionInserted { .. } => 3,
        ChangeEvent::ObjectInserted { .. } => 4,
        ChangeEvent::ObjectMoved { .. } => 5,
        ChangeEvent::ObjectUpdated { .. } => 6,
        ChangeEvent::End => 7,
    }
}

// ============================================================================
// Batches per save
// ============================================================================

#[test]
fn each_save_arrives_as_one_bracketed_batch() {
    let mut stack = TestStack::new();
    let (observer, handler) = observed_shelf(&mut stack);
    let root = stack.root();

    add_book(&mut stack.manager, root, "Jane Eyre", "Charlotte Bronte");
    stack.manager.save(root).unwrap();
    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    let batches = handler.all();
    assert_eq!(batches.len(), 2);
    for batch in &batches {
        assert_eq!(batch.events().first(), Some(&ChangeEvent::Begin));
        assert_eq!(batch.events().last(), Some(&ChangeEvent::End));
        // One new section and one new row per save
        assert_eq!(batch.change_count(), 2);
    }

    // Sections sit in author order, one row each
    assert_eq!(observer.section_count(), 2);
    let snapshot = observer.snapshot();
    assert_eq!(snapshot.sections()[0].key.as_deref(), Some("Charlotte Bronte"));
    assert_eq!(snapshot.sections()[1].key.as_deref(), Some("Jane Austen"));
    assert_eq!(counts_of(&snapshot), vec![1, 1]);

    // The second save appended its section after the existing one
    match &batches[1].events()[1] {
        ChangeEvent::SectionInserted { key, at } => {
            assert_eq!(key.as_deref(), Some("Jane Austen"));
            assert_eq!(*at, 1);
        }
        other => panic!("expected a section insert, got {:?}", other),
    }
    match &batches[1].events()[2] {
        ChangeEvent::ObjectInserted { instance, at } => {
            assert_eq!(instance.str_attr("title"), Some("Emma"));
            assert_eq!(*at, RowPath::new(1, 0));
        }
        other => panic!("expected a row insert, got {:?}", other),
    }
}

#[test]
fn a_sort_relevant_edit_arrives_as_a_single_move() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let spec = FetchSpec::new(Book::NAME).sort_by(SortTerm::ascending("title"));
    let observer = ResultObserver::new(&mut stack.manager, root, spec).unwrap();
    let handler = CollectedBatches::new();
    observer.set_handler(handler.clone());

    add_book(&mut stack.manager, root, "Alpha", "Rachel Cusk");
    let id = add_book(&mut stack.manager, root, "Middle", "Rachel Cusk");
    add_book(&mut stack.manager, root, "Zulu", "Rachel Cusk");
    stack.manager.save(root).unwrap();

    stack.manager.set_attr(root, id, "title", "Aardvark");
    stack.manager.save(root).unwrap();

    let batch = handler.last().unwrap();
    assert_eq!(batch.change_count(), 1);
    match &batch.events()[1] {
        ChangeEvent::ObjectMoved { instance, from, to } => {
            assert_eq!(instance.str_attr("title"), Some("Aardvark"));
            assert_eq!(*from, RowPath::new(0, 1));
            assert_eq!(*to, RowPath::new(0, 0));
        }
        other => panic!("expected a move, got {:?}", other),
    }

    let snapshot = observer.snapshot();
    assert_eq!(
        titles(&snapshot.sections()[0].rows),
        vec!["Aardvark", "Alpha", "Zulu"]
    );
}

#[test]
fn a_mixed_save_keeps_the_canonical_event_order() {
    let mut stack = TestStack::new();
    let (observer, handler) = observed_shelf(&mut stack);
    let root = stack.root();

    let emma = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    add_book(&mut stack.manager, root, "Persuasion", "Jane Austen");
    let shirley = add_book(&mut stack.manager, root, "Shirley", "Charlotte Bronte");
    add_book(&mut stack.manager, root, "Villette", "Charlotte Bronte");
    stack.manager.save(root).unwrap();

    // One editing session: a delete, an insert, and an in-place update
    stack.manager.delete(root, emma);
    add_book(&mut stack.manager, root, "Agnes Grey", "Charlotte Bronte");
    let published = chrono::Utc.with_ymd_and_hms(1849, 10, 26, 0, 0, 0).unwrap();
    stack.manager.set_attr(root, shirley, "copyright", published);
    stack.manager.save(root).unwrap();

    let batch = handler.last().unwrap();
    assert_eq!(batch.change_count(), 3);

    let ranks: Vec<u8> = batch.events().iter().map(rank).collect();
    let mut sorted = ranks.clone();
    sorted.sort_unstable();
    assert_eq!(ranks, sorted, "events left canonical order: {:?}", batch.events());

    // Coordinates: the delete speaks pre-change, the rest post-change
    let events = batch.events();
    match &events[1] {
        ChangeEvent::ObjectDeleted { id, from } => {
            assert_eq!(*id, emma);
            assert_eq!(*from, RowPath::new(1, 0));
        }
        other => panic!("expected the delete first, got {:?}", other),
    }
    match &events[2] {
        ChangeEvent::ObjectInserted { instance, at } => {
            assert_eq!(instance.str_attr("title"), Some("Agnes Grey"));
            assert_eq!(*at, RowPath::new(0, 0));
        }
        other => panic!("expected the insert second, got {:?}", other),
    }
    match &events[3] {
        ChangeEvent::ObjectUpdated { instance, at } => {
            assert_eq!(instance.str_attr("title"), Some("Shirley"));
            assert_eq!(*at, RowPath::new(0, 1));
        }
        other => panic!("expected the update last, got {:?}", other),
    }

    assert_eq!(counts_of(&observer.snapshot()), vec![3, 1]);
}

// ============================================================================
// Silent commits
// ============================================================================

#[test]
fn commits_outside_the_predicate_stay_silent() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let spec = shelf_spec().filter(Predicate::ne("author", "Thomas Hardy"));
    let observer = ResultObserver::new(&mut stack.manager, root, spec).unwrap();
    let handler = CollectedBatches::new();
    observer.set_handler(handler.clone());

    let tess = add_book(&mut stack.manager, root, "Tess", "Thomas Hardy");
    stack.manager.save(root).unwrap();
    assert_eq!(handler.count(), 0);
    assert!(observer.is_empty());

    stack.manager.delete(root, tess);
    stack.manager.save(root).unwrap();
    assert_eq!(handler.count(), 0);

    // The deletion reached the store even though the observer never spoke
    assert!(stack
        .manager
        .fetch(root, &FetchSpec::new(Book::NAME))
        .unwrap()
        .is_empty());
}

#[test]
fn saves_of_other_kinds_stay_silent() {
    let mut stack = TestStack::new();
    let (observer, handler) = observed_shelf(&mut stack);
    let root = stack.root();

    let author = stack.manager.create(root, Author::NAME).unwrap();
    stack.manager.set_attr(root, author, "name", "George Eliot");
    stack.manager.save(root).unwrap();

    assert_eq!(handler.count(), 0);
    assert!(observer.is_empty());
}

#[test]
fn a_save_with_no_changes_emits_nothing() {
    let mut stack = TestStack::new();
    let (_observer, handler) = observed_shelf(&mut stack);
    let root = stack.root();

    assert!(stack.manager.save(root).unwrap().is_none());
    assert_eq!(handler.count(), 0);
}

// ============================================================================
// Snapshot fidelity
// ============================================================================

#[test]
fn the_snapshot_always_matches_a_fresh_build() {
    let mut stack = TestStack::new();
    let (observer, _handler) = observed_shelf(&mut stack);
    let root = stack.root();

    let austen = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    add_book(&mut stack.manager, root, "Jane Eyre", "Charlotte Bronte");
    add_book(&mut stack.manager, root, "Villette", "Charlotte Bronte");
    stack.manager.save(root).unwrap();

    // Cross-section move, then a delete, then more inserts
    stack.manager.set_attr(root, austen, "author", "Charlotte Bronte");
    stack.manager.save(root).unwrap();
    stack.manager.delete(root, austen);
    stack.manager.save(root).unwrap();
    add_book(&mut stack.manager, root, "Middlemarch", "George Eliot");
    add_book(&mut stack.manager, root, "Daniel Deronda", "George Eliot");
    stack.manager.save(root).unwrap();

    let spec = shelf_spec();
    let rebuilt = ResultSet::build(stack.manager.fetch(root, &spec).unwrap(), &spec);
    assert_eq!(observer.snapshot(), rebuilt);
}

#[test]
fn observers_on_a_child_context_hear_child_saves_only() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let child = stack.manager.new_child_context(root);
    let observer = ResultObserver::new(&mut stack.manager, child, shelf_spec()).unwrap();
    let handler = CollectedBatches::new();
    observer.set_handler(handler.clone());

    add_book(&mut stack.manager, child, "Villette", "Charlotte Bronte");
    stack.manager.save(child).unwrap();
    assert_eq!(handler.count(), 1);
    assert_eq!(observer.len(), 1);

    // The subsequent root commit dispatches to root subscribers only
    stack.manager.save(root).unwrap();
    assert_eq!(handler.count(), 1);
}

#[test]
fn a_dropped_observer_stops_receiving() {
    let mut stack = TestStack::new();
    let (observer, handler) = observed_shelf(&mut stack);
    let root = stack.root();

    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();
    assert_eq!(handler.count(), 1);

    drop(observer);
    add_book(&mut stack.manager, root, "Persuasion", "Jane Austen");
    stack.manager.save(root).unwrap();
    assert_eq!(handler.count(), 1);
}

// ============================================================================
// Binding over pending changes
// ============================================================================

#[test]
fn a_pending_create_visible_at_bind_is_not_reinserted() {
    let mut stack = TestStack::new();
    let root = stack.root();
    add_book(&mut stack.manager, root, "Emma", "Jane Austen");

    // The bind-time fetch already sees the pending create
    let observer = ResultObserver::new(&mut stack.manager, root, shelf_spec()).unwrap();
    assert_eq!(observer.len(), 1);

    let sync = Arc::new(ViewSynchronizer::new());
    sync.seed(&observer.snapshot());
    observer.set_handler(sync.clone());

    // Committing the create must not report the row a second time
    stack.manager.save(root).unwrap();
    assert_eq!(observer.len(), 1);
    assert_eq!(counts_of(&observer.snapshot()), vec![1]);
    assert_eq!(sync.row_counts(), vec![1]);
}

#[test]
fn edits_between_bind_and_save_arrive_as_their_own_changes() {
    let mut stack = TestStack::new();
    let root = stack.root();
    add_book(&mut stack.manager, root, "Alpha", "Rachel Cusk");
    let zulu = add_book(&mut stack.manager, root, "Zulu", "Rachel Cusk");

    let spec = FetchSpec::new(Book::NAME).sort_by(SortTerm::ascending("title"));
    let observer = ResultObserver::new(&mut stack.manager, root, spec).unwrap();
    let handler = CollectedBatches::new();
    observer.set_handler(handler.clone());
    assert_eq!(observer.len(), 2);

    // The save re-reports both pending creates alongside the retitle;
    // only the retitle may surface, as a move
    stack.manager.set_attr(root, zulu, "title", "Aardvark");
    stack.manager.save(root).unwrap();

    let batch = handler.last().unwrap();
    assert_eq!(batch.change_count(), 1);
    match &batch.events()[1] {
        ChangeEvent::ObjectMoved { instance, from, to } => {
            assert_eq!(instance.str_attr("title"), Some("Aardvark"));
            assert_eq!(*from, RowPath::new(0, 1));
            assert_eq!(*to, RowPath::new(0, 0));
        }
        other => panic!("expected a move, got {:?}", other),
    }
    assert_eq!(
        titles(&observer.snapshot().sections()[0].rows),
        vec!["Aardvark", "Alpha"]
    );
}
