//! Undo Scope Tests
//!
//! A scope records prior values from its begin until it ends. Discard
//! reverts exactly the recorded mutations; end keeps them; a save
//! commits the editing session and closes the scope with it.

use crate::common::*;

#[test]
fn discarding_a_scope_reverts_its_edits() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.begin_scope(root);
    stack.manager.set_attr(root, id, "title", "Draft Title");
    stack.manager.set_attr(root, id, "author", "Draft Author");
    stack.manager.discard_scope(root);

    assert_eq!(stack.manager.attr(root, id, "title"), &AttrValue::from("Emma"));
    assert_eq!(
        stack.manager.attr(root, id, "author"),
        &AttrValue::from("Jane Austen")
    );
    assert!(!stack.manager.has_pending_changes(root));
    assert!(!stack.manager.has_scope(root));
}

#[test]
fn ending_a_scope_keeps_its_edits() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.begin_scope(root);
    stack.manager.set_attr(root, id, "title", "Emma: A Novel");
    stack.manager.end_scope(root);

    assert_eq!(
        stack.manager.attr(root, id, "title"),
        &AttrValue::from("Emma: A Novel")
    );
    assert!(stack.manager.has_pending_changes(root));

    stack.manager.save(root).unwrap();
    let rows = stack
        .manager
        .fetch(root, &FetchSpec::new(Book::NAME))
        .unwrap();
    assert_eq!(titles(&rows), vec!["Emma: A Novel"]);
}

#[test]
fn discarding_a_scope_removes_in_scope_creations() {
    let mut stack = TestStack::new();
    let root = stack.root();

    stack.manager.begin_scope(root);
    let id = stack.manager.create(root, Book::NAME).unwrap();
    stack.manager.set_attr(root, id, "title", "Never Was");
    stack.manager.discard_scope(root);

    assert_eq!(stack.manager.instance_state(root, id), None);
    assert!(!stack.manager.has_pending_changes(root));
}

#[test]
fn discarding_a_scope_clears_in_scope_delete_marks() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.begin_scope(root);
    stack.manager.delete(root, id);
    stack.manager.discard_scope(root);

    assert_eq!(
        stack.manager.instance_state(root, id),
        Some(InstanceState::Clean)
    );
    assert_eq!(stack.manager.attr(root, id, "title"), &AttrValue::from("Emma"));
}

#[test]
fn edits_made_before_the_scope_survive_its_discard() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.set_attr(root, id, "title", "Emma, Revised");
    stack.manager.begin_scope(root);
    stack.manager.set_attr(root, id, "author", "Somebody Else");
    stack.manager.discard_scope(root);

    // The pre-scope retitle is untouched; only the in-scope edit reverts
    assert_eq!(
        stack.manager.attr(root, id, "title"),
        &AttrValue::from("Emma, Revised")
    );
    assert_eq!(
        stack.manager.attr(root, id, "author"),
        &AttrValue::from("Jane Austen")
    );
    assert!(stack.manager.has_pending_changes(root));
}

#[test]
fn a_save_closes_the_active_scope() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Emma", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.begin_scope(root);
    stack.manager.set_attr(root, id, "title", "Committed Title");
    stack.manager.save(root).unwrap();

    assert!(!stack.manager.has_scope(root));
    assert_eq!(
        stack.manager.attr(root, id, "title"),
        &AttrValue::from("Committed Title")
    );
}

#[test]
fn a_second_begin_commits_the_first_recording() {
    let mut stack = TestStack::new();
    let root = stack.root();

    let id = add_book(&mut stack.manager, root, "Zero", "Jane Austen");
    stack.manager.save(root).unwrap();

    stack.manager.begin_scope(root);
    stack.manager.set_attr(root, id, "title", "One");
    stack.manager.begin_scope(root);
    stack.manager.set_attr(root, id, "title", "Two");
    stack.manager.discard_scope(root);

    // Only the second recording reverts; the first behaves as if ended
    assert_eq!(stack.manager.attr(root, id, "title"), &AttrValue::from("One"));
}

#[test]
#[should_panic(expected = "end_scope without an active scope")]
fn ending_without_an_active_scope_panics() {
    let mut stack = TestStack::new();
    let root = stack.root();
    stack.manager.end_scope(root);
}

#[test]
#[should_panic(expected = "discard_scope without an active scope")]
fn discarding_without_an_active_scope_panics() {
    let mut stack = TestStack::new();
    let root = stack.root();
    stack.manager.discard_scope(root);
}
