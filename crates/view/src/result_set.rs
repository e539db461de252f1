//! Sectioned result sets
//!
//! A [`ResultSet`] is an immutable snapshot of the rows a fetch spec
//! selects, sorted by its terms and split into sections as runs of
//! equal group key. Section order follows row order, so a spec whose
//! grouping attribute leads the sort terms yields one section per key.

use folio_core::{EntityInstance, FetchSpec, InstanceId, RowPath};

/// One section: a run of rows sharing a group key
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Group key shared by every row; `None` without grouping
    pub key: Option<String>,
    /// Rows in sort order
    pub rows: Vec<EntityInstance>,
}

/// Sorted, sectioned snapshot of the rows a spec selects
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    sections: Vec<Section>,
}

impl ResultSet {
    /// Build a set from unordered instances.
    ///
    /// Rows are filtered by the spec, sorted globally by its terms with
    /// ties broken by id, and grouped into sections as runs of equal
    /// group key. An empty row set has zero sections.
    pub fn build(instances: Vec<EntityInstance>, spec: &FetchSpec) -> Self {
        let mut rows: Vec<EntityInstance> = instances
            .into_iter()
            .filter(|row| spec.matches(row))
            .collect();
        rows.sort_by(|a, b| spec.compare(a, b));

        let mut sections: Vec<Section> = Vec::new();
        for row in rows {
            let key = spec.section_key(&row);
            match sections.last_mut() {
                Some(section) if section.key == key => section.rows.push(row),
                _ => sections.push(Section {
                    key,
                    rows: vec![row],
                }),
            }
        }
        Self { sections }
    }

    /// Adopt an already ordered and grouped layout, as replayed from a
    /// layout cache.
    pub(crate) fn from_layout(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// Number of sections
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Number of rows in one section
    ///
    /// # Panics
    /// Panics if `section` is out of range.
    pub fn row_count(&self, section: usize) -> usize {
        self.sections[section].rows.len()
    }

    /// Total number of rows across all sections
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.rows.len()).sum()
    }

    /// Whether the set has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sections in order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Row at a positional path
    ///
    /// # Panics
    /// Panics if the path is out of range.
    pub fn instance_at(&self, path: RowPath) -> &EntityInstance {
        &self.sections[path.section].rows[path.row]
    }

    /// Current path of an instance, if present
    pub fn path_of(&self, id: InstanceId) -> Option<RowPath> {
        for (s, section) in self.sections.iter().enumerate() {
            if let Some(r) = section.rows.iter().position(|row| row.id == id) {
                return Some(RowPath::new(s, r));
            }
        }
        None
    }

    /// Iterate rows with their paths, in path order
    pub fn iter(&self) -> impl Iterator<Item = (RowPath, &EntityInstance)> {
        self.sections.iter().enumerate().flat_map(|(s, section)| {
            section
                .rows
                .iter()
                .enumerate()
                .map(move |(r, row)| (RowPath::new(s, r), row))
        })
    }
}
