//! The result-set diff engine
//!
//! [`compute`] folds one save's record deltas into a sectioned result
//! set and derives the change batch separating the old arrangement from
//! the new one. It is a pure function over plain values, so the
//! classification rules can be tested without a store or a context.
//!
//! Classification per record:
//! - inserted and matching the fetch spec: object insert, unless the
//!   row is already in the set (a pending create seen by the initial
//!   fetch), in which case it is reconciled like an updated row;
//! - deleted while present in the set: object delete;
//! - updated: leaving membership is a delete, entering is an insert;
//!   a row that stays moves when an order-relevant attribute (sort
//!   term or group key) changed and its path changed, or when the
//!   section under it is replaced by the alignment; otherwise it is an
//!   in-place update.
//!
//! Section events come from aligning the old and new key sequences:
//! keys that vanish become section deletes, keys that appear become
//! section inserts. Deletes are emitted before inserts, deletes in
//! descending and inserts in ascending path order, so indices stay
//! valid while a consumer applies the batch.

use crate::event::{ChangeBatch, ChangeEvent};
use crate::result_set::ResultSet;
use folio_core::{EntityInstance, FetchSpec, InstanceId, RecordDeltas, RowPath};
use std::collections::{BTreeMap, BTreeSet};

/// Fold deltas into a result set.
///
/// Returns the post-save set and the batch describing the transition.
/// The batch is `None` when no delta touches the set: wrong entity
/// kind, rows outside the predicate, deletes of absent rows.
pub fn compute(
    old: &ResultSet,
    deltas: &RecordDeltas,
    spec: &FetchSpec,
) -> (ResultSet, Option<ChangeBatch>) {
    if !deltas.touches_kind(spec.entity()) {
        return (old.clone(), None);
    }

    let old_paths: BTreeMap<InstanceId, RowPath> =
        old.iter().map(|(path, row)| (row.id, path)).collect();

    // Next row population: the old rows with the deltas applied
    let mut next: BTreeMap<InstanceId, EntityInstance> =
        old.iter().map(|(_, row)| (row.id, row.clone())).collect();

    let mut removed: Vec<InstanceId> = Vec::new();
    let mut entered: Vec<InstanceId> = Vec::new();
    let mut stayed: Vec<(InstanceId, BTreeSet<String>)> = Vec::new();

    for deleted in &deltas.deleted {
        if deleted.kind != spec.entity() {
            continue;
        }
        if next.remove(&deleted.id).is_some() {
            removed.push(deleted.id);
        }
    }
    for inserted in &deltas.inserted {
        if inserted.kind != spec.entity() {
            continue;
        }
        // An id reported as inserted can already be present: the
        // initial fetch sees pending creates, and the first save then
        // re-reports them. Membership decides the class, not the
        // delta bucket.
        match (old_paths.get(&inserted.id), spec.matches(inserted)) {
            (Some(at), true) => {
                let changed = changed_attrs(old.instance_at(*at), inserted);
                next.insert(inserted.id, inserted.clone());
                stayed.push((inserted.id, changed));
            }
            (Some(_), false) => {
                next.remove(&inserted.id);
                removed.push(inserted.id);
            }
            (None, true) => {
                next.insert(inserted.id, inserted.clone());
                entered.push(inserted.id);
            }
            (None, false) => {}
        }
    }
    for updated in &deltas.updated {
        let row = &updated.instance;
        if row.kind != spec.entity() {
            continue;
        }
        match (old_paths.contains_key(&row.id), spec.matches(row)) {
            (true, true) => {
                next.insert(row.id, row.clone());
                stayed.push((row.id, updated.changed.clone()));
            }
            (true, false) => {
                next.remove(&row.id);
                removed.push(row.id);
            }
            (false, true) => {
                next.insert(row.id, row.clone());
                entered.push(row.id);
            }
            (false, false) => {}
        }
    }

    // Stayed rows with nothing changed come from re-reported creates;
    // alone they leave the set untouched
    if removed.is_empty()
        && entered.is_empty()
        && stayed.iter().all(|(_, changed)| changed.is_empty())
    {
        return (old.clone(), None);
    }

    let next_set = ResultSet::build(next.into_values().collect(), spec);
    let new_paths: BTreeMap<InstanceId, RowPath> =
        next_set.iter().map(|(path, row)| (row.id, path)).collect();
    let order_attrs = spec.order_relevant_attrs();

    let mut deletes: Vec<(RowPath, InstanceId)> =
        removed.iter().map(|id| (old_paths[id], *id)).collect();
    deletes.sort_by(|a, b| b.0.cmp(&a.0));

    let mut inserts: Vec<(RowPath, EntityInstance)> = entered
        .iter()
        .map(|id| {
            let at = new_paths[id];
            (at, next_set.instance_at(at).clone())
        })
        .collect();
    inserts.sort_by(|a, b| a.0.cmp(&b.0));

    let old_keys: Vec<Option<String>> = old.sections().iter().map(|s| s.key.clone()).collect();
    let new_keys: Vec<Option<String>> = next_set.sections().iter().map(|s| s.key.clone()).collect();
    let (section_deletes, section_inserts) = align_sections(&old_keys, &new_keys);
    let deleted_sections: BTreeSet<usize> = section_deletes.iter().copied().collect();
    let inserted_sections: BTreeSet<usize> = section_inserts.iter().copied().collect();

    let mut moves: Vec<(RowPath, RowPath, EntityInstance)> = Vec::new();
    let mut updates: Vec<(RowPath, EntityInstance)> = Vec::new();
    for (id, changed) in &stayed {
        let from = old_paths[id];
        let to = new_paths[id];
        let instance = next_set.instance_at(to).clone();
        let order_relevant = changed.iter().any(|attr| order_attrs.contains(attr));
        // A row under a deleted or inserted section must be re-homed by
        // a move even when its numeric path is unchanged; the section
        // arithmetic counts it out of the old section and into the new
        let rehomed = deleted_sections.contains(&from.section)
            || inserted_sections.contains(&to.section);
        if rehomed || (order_relevant && from != to) {
            moves.push((from, to, instance));
        } else if !changed.is_empty() {
            updates.push((to, instance));
        }
    }
    moves.sort_by(|a, b| a.1.cmp(&b.1));
    updates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut events = Vec::with_capacity(
        deletes.len()
            + inserts.len()
            + moves.len()
            + updates.len()
            + section_deletes.len()
            + section_inserts.len()
            + 2,
    );
    events.push(ChangeEvent::Begin);
    for (from, id) in deletes {
        events.push(ChangeEvent::ObjectDeleted { id, from });
    }
    for index in section_deletes.iter().rev() {
        events.push(ChangeEvent::SectionDeleted {
            key: old_keys[*index].clone(),
            from: *index,
        });
    }
    for index in &section_inserts {
        events.push(ChangeEvent::SectionInserted {
            key: new_keys[*index].clone(),
            at: *index,
        });
    }
    for (at, instance) in inserts {
        events.push(ChangeEvent::ObjectInserted { instance, at });
    }
    for (from, to, instance) in moves {
        events.push(ChangeEvent::ObjectMoved { instance, from, to });
    }
    for (at, instance) in updates {
        events.push(ChangeEvent::ObjectUpdated { instance, at });
    }
    events.push(ChangeEvent::End);

    (next_set, Some(ChangeBatch::new(events)))
}

/// Attributes whose values differ between two row snapshots.
fn changed_attrs(old: &EntityInstance, new: &EntityInstance) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (name, value) in &new.attrs {
        if old.attrs.get(name) != Some(value) {
            changed.insert(name.clone());
        }
    }
    for name in old.attrs.keys() {
        if !new.attrs.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

/// Align two section key sequences.
///
/// Longest common subsequence over the keys: unmatched old indices are
/// deletions, unmatched new indices insertions, both returned in
/// ascending order.
fn align_sections(old: &[Option<String>], new: &[Option<String>]) -> (Vec<usize>, Vec<usize>) {
    let m = old.len();
    let n = new.len();
    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut deleted = Vec::new();
    let mut inserted = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if old[i] == new[j] {
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            deleted.push(i);
            i += 1;
        } else {
            inserted.push(j);
            j += 1;
        }
    }
    deleted.extend(i..m);
    inserted.extend(j..n);
    (deleted, inserted)
}
