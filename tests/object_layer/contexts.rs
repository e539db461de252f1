//! Context Tree Tests
//!
//! Saves travel exactly one hop: a child publishes into its parent's
//! pending set, and only a root save reaches the store file. Fetches
//! overlay the whole ancestor chain onto committed rows.

use crate::common::*;

// ============================================================================
// Visibility along the chain
// ============================================================================

#[test]
fn child_edits_stay_invisible_until_the_child_saves() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let child = stack.manager.new_child_context(root);

    add_book(&mut stack.manager, child, "Villette", "Charlotte Bronte");

    let spec = FetchSpec::new(Book::NAME);
    assert!(stack.manager.fetch(root, &spec).unwrap().is_empty());
    assert_eq!(stack.manager.fetch(child, &spec).unwrap().len(), 1);

    let commit = stack
        .manager
        .save(child)
        .unwrap()
        .expect("creation pending in child");
    assert_eq!(commit.version, None);

    // The parent now holds the book as its own pending change
    assert!(stack.manager.has_pending_changes(root));
    assert_eq!(stack.manager.fetch(root, &spec).unwrap().len(), 1);
    assert_eq!(stack.manager.store_version(), 0);
}

#[test]
fn children_see_the_parents_uncommitted_state() {
    let mut stack = TestStack::new();
    let root = stack.root();

    add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    let child = stack.manager.new_child_context(root);

    let rows = stack
        .manager
        .fetch(child, &FetchSpec::new(Book::NAME))
        .unwrap();
    assert_eq!(titles(&rows), vec!["Emma"]);
}

#[test]
fn sibling_contexts_are_isolated_until_a_parent_hop() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let left = stack.manager.new_child_context(root);
    let right = stack.manager.new_child_context(root);

    add_book(&mut stack.manager, left, "Shirley", "Charlotte Bronte");

    let spec = FetchSpec::new(Book::NAME);
    assert!(stack.manager.fetch(right, &spec).unwrap().is_empty());

    // After the left sibling saves, its book sits in the shared parent
    // and the right sibling sees it through the overlay
    stack.manager.save(left).unwrap();
    assert_eq!(stack.manager.fetch(right, &spec).unwrap().len(), 1);
}

// ============================================================================
// Propagation to the store
// ============================================================================

#[test]
fn a_full_chain_of_saves_reaches_the_store() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let child = stack.manager.new_child_context(root);
    let grandchild = stack.manager.new_child_context(child);

    add_book(&mut stack.manager, grandchild, "Agnes Grey", "Anne Bronte");

    assert_eq!(stack.manager.save(grandchild).unwrap().unwrap().version, None);
    assert!(stack.manager.has_pending_changes(child));

    assert_eq!(stack.manager.save(child).unwrap().unwrap().version, None);
    assert!(!stack.manager.has_pending_changes(child));
    assert!(stack.manager.has_pending_changes(root));

    let commit = stack.manager.save(root).unwrap().unwrap();
    assert_eq!(commit.version, Some(1));

    stack.reopen();
    let root = stack.root();
    let rows = stack
        .manager
        .fetch(root, &FetchSpec::new(Book::NAME))
        .unwrap();
    assert_eq!(titles(&rows), vec!["Agnes Grey"]);
}

#[test]
fn child_updates_propagate_through_the_chain() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    let child = stack.manager.new_child_context(root);
    stack
        .manager
        .fetch(child, &FetchSpec::new(Book::NAME))
        .unwrap();
    stack.manager.set_attr(child, id, "author", "Austen, Jane");

    stack.manager.save(child).unwrap();
    assert_eq!(
        stack.manager.instance_state(root, id),
        Some(InstanceState::Modified)
    );

    stack.manager.save(root).unwrap();
    stack.reopen();
    let root = stack.root();
    let rows = stack
        .manager
        .fetch(root, &FetchSpec::new(Book::NAME))
        .unwrap();
    assert_eq!(rows[0].str_attr("author"), Some("Austen, Jane"));
}

#[test]
fn child_deletions_propagate_through_the_chain() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    let child = stack.manager.new_child_context(root);
    let spec = FetchSpec::new(Book::NAME);
    stack.manager.fetch(child, &spec).unwrap();
    stack.manager.delete(child, id);
    stack.manager.save(child).unwrap();

    // Gone from the parent's view, still committed in the store
    assert!(stack.manager.fetch(root, &spec).unwrap().is_empty());
    assert_eq!(stack.manager.store_version(), 1);

    stack.manager.save(root).unwrap();
    assert_eq!(stack.manager.store_version(), 2);

    stack.reopen();
    let root = stack.root();
    assert!(stack.manager.fetch(root, &spec).unwrap().is_empty());
}

// ============================================================================
// Rollback and discarded contexts
// ============================================================================

#[test]
fn rollback_restores_the_last_saved_state() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let saved = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.set_attr(root, saved, "title", "Persuasion");
    let transient = stack.manager.create(root, Book::NAME).unwrap();
    stack.manager.rollback(root);

    assert_eq!(
        stack.manager.attr(root, saved, "title"),
        &AttrValue::from("Emma")
    );
    assert_eq!(stack.manager.instance_state(root, transient), None);
    assert!(!stack.manager.has_pending_changes(root));
}

#[test]
fn rollback_clears_delete_marks() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.delete(root, id);
    stack.manager.rollback(root);

    assert_eq!(
        stack.manager.instance_state(root, id),
        Some(InstanceState::Clean)
    );
    assert_eq!(stack.manager.attr(root, id, "title"), &AttrValue::from("Emma"));
}

#[test]
fn discarding_a_child_leaves_the_parent_untouched() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let child = stack.manager.new_child_context(root);

    add_book(&mut stack.manager, child, "Abandoned", "Nobody");
    stack.manager.discard_context(child);

    assert!(!stack.manager.has_pending_changes(root));
    assert!(stack.manager.save(root).unwrap().is_none());
}

#[test]
#[should_panic(expected = "unknown context")]
fn a_discarded_context_rejects_further_use() {
    let mut stack = TestStack::new();
    let root = stack.root();
    let child = stack.manager.new_child_context(root);
    stack.manager.discard_context(child);
    let _ = stack.manager.has_pending_changes(child);
}
