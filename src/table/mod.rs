//! Tables of experiment results with per-cell provenance
//!
//! A [`Table`] is an ordered list of columns and rows of [`TableEntry`]s.
//! Tables are built from experiments by [`ExperimentTable`] and reshaped by
//! [`TableTransformation`]s; every output cell either copies a pointer to
//! one source cell or aggregates the pointers of all contributing cells.
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_lab::experiment::{Experiment, ExperimentId};
//! use trueno_lab::table::{ExperimentTable, Select, TableTransformation};
//!
//! let exp = Arc::new(
//!     Experiment::from_fn(ExperimentId::new(1), |_| Ok(()))
//!         .with_input("n", 10)
//!         .with_input("algo", "quick"),
//! );
//! let table = ExperimentTable::new(["algo", "n"]).add(&exp).to_table();
//! let narrow = Select::new(["n"]).transform(&[&table]).unwrap();
//! assert_eq!(narrow.columns(), &["n".to_string()]);
//! ```

mod entry;
mod experiment_table;
mod export;
mod transform;

pub use entry::{Cell, TableEntry};
pub use experiment_table::ExperimentTable;
pub use transform::{
    ColumnSum, Composition, GroupInColumns, Join, RemoveColumns, RenameColumns, Select,
    TableTransformation,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::provenance::{Dependent, Part, PartRef, PartSegment, Provenance, Subject};

/// Identifier of a table registered in a lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(u64);

impl TableId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Rows and ordered columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    id: Option<TableId>,
    title: String,
    columns: Vec<String>,
    rows: Vec<TableEntry>,
}

impl Table {
    /// Empty table with the given columns.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set a display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Identifier, once registered in a lab.
    #[must_use]
    pub const fn id(&self) -> Option<TableId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: TableId) {
        self.id = Some(id);
    }

    /// Append a row; keys not yet present become new trailing columns.
    pub fn push(&mut self, row: TableEntry) {
        for key in row.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.to_string());
            }
        }
        self.rows.push(row);
    }

    /// Column names in display order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[TableEntry] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at a row and column position.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        let name = self.columns.get(col)?;
        self.rows.get(row)?.cell(name)
    }

    /// Pointer to use when a cell of this table is copied elsewhere.
    ///
    /// A registered table is referenced by cell; an anonymous intermediate
    /// table passes its own recorded lineage through.
    #[must_use]
    pub fn pointer(&self, row: usize, column: &str) -> Provenance {
        match (self.id, self.column_index(column)) {
            (Some(id), Some(col)) if self.rows.get(row).is_some_and(|r| r.contains(column)) => {
                Provenance::Part(PartRef::cell(id, row, col))
            }
            _ => self
                .rows
                .get(row)
                .and_then(|r| r.provenance(column))
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// One-step lineage of a piece of this table.
    ///
    /// A cell yields its recorded provenance; the whole table yields the
    /// conjunction of its cells; anything else is `Unknown`.
    #[must_use]
    pub fn lineage_of(&self, part: &Part) -> Provenance {
        match part.segments() {
            [] => match self.id {
                Some(id) => Provenance::all_of(self.rows.iter().enumerate().flat_map(|(r, row)| {
                    self.columns
                        .iter()
                        .enumerate()
                        .filter(move |(_, name)| row.contains(name))
                        .map(move |(c, _)| PartRef::cell(id, r, c))
                })),
                None => Provenance::Unknown,
            },
            [PartSegment::Cell { row, col }] => self
                .cell(*row, *col)
                .map(|c| c.provenance.clone())
                .unwrap_or_default(),
            _ => Provenance::Unknown,
        }
    }
}

impl Dependent<Subject> for Table {
    /// Subjects referenced directly by cell pointers.
    fn depends_on(&self) -> Vec<Subject> {
        let subjects: BTreeSet<Subject> = self
            .rows
            .iter()
            .flat_map(|row| row.keys().filter_map(|k| row.provenance(k)))
            .flat_map(|p| p.parts().into_iter().map(|r| r.subject))
            .collect();
        subjects.into_iter().collect()
    }
}
