//! View synchronizers
//!
//! A [`ViewSynchronizer`] stands in for a sectioned UI: it tracks one
//! row count per section and applies change batches the way a table
//! view would, validating every index on the way. It never talks to the
//! store; batches are its only input, which makes it the reference
//! consumer for the diff engine's positional contract.

use crate::event::{BatchHandler, ChangeBatch, ChangeEvent};
use crate::result_set::ResultSet;
use folio_core::{EntityInstance, FolioError, FolioResult, RowPath};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::error;

type PopulateFn = dyn FnMut(&EntityInstance, RowPath) + Send;

struct SyncCore {
    sections: Vec<usize>,
    in_batch: bool,
    staged: Vec<ChangeEvent>,
    populate: Option<Box<PopulateFn>>,
}

/// Applies change batches to a tracked section layout, atomically
///
/// Events are staged as they arrive and the whole cycle is applied at
/// `End`. Row removals and move sources resolve as one set against the
/// pre-change layout, so their order inside the batch carries no
/// positional meaning; section deletes (which must be empty once their
/// rows are gone) and section inserts rearrange the section list; row
/// inserts and move destinations land in post-change coordinates,
/// bounded by each section's final count; updates invoke the
/// population callback at their current path. Any inconsistency leaves
/// the counts exactly as the last fully applied batch and reports
/// [`FolioError::Desync`].
pub struct ViewSynchronizer {
    core: Mutex<SyncCore>,
}

impl ViewSynchronizer {
    /// A synchronizer tracking an empty view
    pub fn new() -> Self {
        Self {
            core: Mutex::new(SyncCore {
                sections: Vec::new(),
                in_batch: false,
                staged: Vec::new(),
                populate: None,
            }),
        }
    }

    /// Install the callback run for every update event.
    ///
    /// The callback runs while the synchronizer is locked and must not
    /// call back into it.
    pub fn set_population<F>(&self, populate: F)
    where
        F: FnMut(&EntityInstance, RowPath) + Send + 'static,
    {
        self.core.lock().populate = Some(Box::new(populate));
    }

    /// Reset the tracked layout to match a snapshot.
    ///
    /// Used to adopt an observer's initial result set, and to recover
    /// from a desync by re-seeding from a fresh snapshot.
    pub fn seed(&self, set: &ResultSet) {
        let mut core = self.core.lock();
        core.sections = set.sections().iter().map(|s| s.rows.len()).collect();
        core.staged.clear();
        core.in_batch = false;
    }

    /// Number of sections after the last fully applied batch
    pub fn section_count(&self) -> usize {
        self.core.lock().sections.len()
    }

    /// Rows in one section after the last fully applied batch
    ///
    /// # Panics
    /// Panics if `section` is out of range.
    pub fn row_count(&self, section: usize) -> usize {
        self.core.lock().sections[section]
    }

    /// Row counts per section, in section order
    pub fn row_counts(&self) -> Vec<usize> {
        self.core.lock().sections.clone()
    }

    /// Apply one batch.
    ///
    /// Stages events in arrival order and applies each `Begin`..`End`
    /// cycle atomically. Brackets must close within the batch. On error
    /// the staged state is dropped and the counts stay at the last
    /// fully applied batch.
    pub fn apply(&self, batch: &ChangeBatch) -> FolioResult<()> {
        let mut core = self.core.lock();
        let result = Self::run(&mut core, batch);
        if result.is_err() {
            core.staged.clear();
            core.in_batch = false;
        }
        result
    }

    fn run(core: &mut SyncCore, batch: &ChangeBatch) -> FolioResult<()> {
        for event in batch.events() {
            match event {
                ChangeEvent::Begin => {
                    if core.in_batch {
                        return Err(desync("Begin inside an open batch".to_string()));
                    }
                    core.in_batch = true;
                    core.staged.clear();
                }
                ChangeEvent::End => {
                    if !core.in_batch {
                        return Err(desync("End without Begin".to_string()));
                    }
                    let staged = std::mem::take(&mut core.staged);
                    core.in_batch = false;
                    Self::commit(core, &staged)?;
                }
                other => {
                    if !core.in_batch {
                        return Err(desync("change event outside Begin/End".to_string()));
                    }
                    core.staged.push(other.clone());
                }
            }
        }
        if core.in_batch {
            return Err(desync("batch ended without End".to_string()));
        }
        Ok(())
    }

    fn commit(core: &mut SyncCore, staged: &[ChangeEvent]) -> FolioResult<()> {
        let mut counts = core.sections.clone();

        // Row removals and move sources all name pre-change rows, so
        // they resolve as one set: each source must exist in the old
        // layout and no row may be claimed twice
        let mut removals: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for event in staged {
            let from = match event {
                ChangeEvent::ObjectDeleted { from, .. } => *from,
                ChangeEvent::ObjectMoved { from, .. } => *from,
                _ => continue,
            };
            let count = counts
                .get(from.section)
                .copied()
                .ok_or_else(|| desync(format!("row removal from missing section {}", from.section)))?;
            if from.row >= count {
                return Err(desync(format!("row removal at {} out of range", from)));
            }
            if !removals.entry(from.section).or_default().insert(from.row) {
                return Err(desync(format!("duplicate row removal at {}", from)));
            }
        }
        for (section, rows) in &removals {
            counts[*section] -= rows.len();
        }

        // Section removals, validated empty once their rows are gone,
        // applied descending so the lower indices stay valid
        let mut dropped: BTreeSet<usize> = BTreeSet::new();
        for event in staged {
            if let ChangeEvent::SectionDeleted { from, .. } = event {
                if *from >= counts.len() {
                    return Err(desync(format!("section delete {} out of range", from)));
                }
                if counts[*from] != 0 {
                    return Err(desync(format!(
                        "section {} deleted while holding {} rows",
                        from, counts[*from]
                    )));
                }
                if !dropped.insert(*from) {
                    return Err(desync(format!("duplicate section delete {}", from)));
                }
            }
        }
        for index in dropped.iter().rev() {
            counts.remove(*index);
        }

        // Section insertions, applied ascending; a consistent index set
        // never outruns the growing list
        let mut opened: BTreeSet<usize> = BTreeSet::new();
        for event in staged {
            if let ChangeEvent::SectionInserted { at, .. } = event {
                if !opened.insert(*at) {
                    return Err(desync(format!("duplicate section insert {}", at)));
                }
            }
        }
        for at in &opened {
            if *at > counts.len() {
                return Err(desync(format!("section insert {} out of range", at)));
            }
            counts.insert(*at, 0);
        }

        // Row insertions and move destinations name post-change rows;
        // per section they must be distinct and fit under the final
        // count, which survivors plus arrivals determine together
        let mut additions: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for event in staged {
            let at = match event {
                ChangeEvent::ObjectInserted { at, .. } => *at,
                ChangeEvent::ObjectMoved { to, .. } => *to,
                _ => continue,
            };
            if at.section >= counts.len() {
                return Err(desync(format!("row insert into missing section {}", at.section)));
            }
            if !additions.entry(at.section).or_default().insert(at.row) {
                return Err(desync(format!("duplicate row insert at {}", at)));
            }
        }
        for (section, rows) in &additions {
            let total = counts[*section] + rows.len();
            if let Some(highest) = rows.iter().next_back() {
                if *highest >= total {
                    return Err(desync(format!(
                        "row insert at {} out of range",
                        RowPath::new(*section, *highest)
                    )));
                }
            }
            counts[*section] = total;
        }

        // Updates validated against the post-change layout before any
        // population side effect runs
        for event in staged {
            if let ChangeEvent::ObjectUpdated { at, .. } = event {
                if at.row >= counts.get(at.section).copied().unwrap_or(0) {
                    return Err(desync(format!("update at {} out of range", at)));
                }
            }
        }

        core.sections = counts;
        for event in staged {
            if let ChangeEvent::ObjectUpdated { instance, at } = event {
                if let Some(populate) = core.populate.as_mut() {
                    populate(instance, *at);
                }
            }
        }
        Ok(())
    }
}

impl Default for ViewSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchHandler for ViewSynchronizer {
    fn handle(&self, batch: &ChangeBatch) {
        if let Err(e) = self.apply(batch) {
            error!(target: "folio::view", error = %e, "View rejected a change batch");
        }
    }
}

fn desync(message: String) -> FolioError {
    FolioError::Desync(message)
}
