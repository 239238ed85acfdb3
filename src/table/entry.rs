//! Table rows whose cells remember where they came from

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::provenance::Provenance;
use crate::value::Value;

/// A value plus the lineage recorded when it was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// The value
    pub value: Value,
    /// Where the value comes from
    pub provenance: Provenance,
}

impl Cell {
    /// Pair a value with its lineage.
    #[must_use]
    pub const fn new(value: Value, provenance: Provenance) -> Self {
        Self { value, provenance }
    }

    /// A `Null` of unknown origin (padding for missing values).
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            value: Value::Null,
            provenance: Provenance::Unknown,
        }
    }
}

/// One row of a table.
///
/// Every key carries a provenance, possibly `Unknown`: there is no way to
/// store a value without one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    cells: BTreeMap<String, Cell>,
}

impl TableEntry {
    /// Empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`put`](TableEntry::put).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>, provenance: Provenance) -> Self {
        self.put(key, value, provenance);
        self
    }

    /// Write a value with its lineage.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>, provenance: Provenance) {
        self.cells.insert(key.into(), Cell::new(value.into(), provenance));
    }

    /// Write a value whose lineage is not known.
    pub fn put_untracked(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.put(key, value, Provenance::Unknown);
    }

    /// Store a whole cell.
    pub fn put_cell(&mut self, key: impl Into<String>, cell: Cell) {
        self.cells.insert(key.into(), cell);
    }

    /// Value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cells.get(key).map(|c| &c.value)
    }

    /// Cell of a key.
    #[must_use]
    pub fn cell(&self, key: &str) -> Option<&Cell> {
        self.cells.get(key)
    }

    /// Lineage of a key.
    #[must_use]
    pub fn provenance(&self, key: &str) -> Option<&Provenance> {
        self.cells.get(key).map(|c| &c.provenance)
    }

    /// Remove a key.
    pub fn remove(&mut self, key: &str) -> Option<Cell> {
        self.cells.remove(key)
    }

    /// Keys (sorted).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.cells.contains_key(key)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check whether the row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Values without lineage.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.cells
            .iter()
            .map(|(k, c)| (k.clone(), c.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentId;
    use crate::provenance::PartRef;

    #[test]
    fn test_every_value_has_provenance() {
        let mut row = TableEntry::new();
        row.put_untracked("n", 3);
        row.put(
            "time",
            1.5,
            Provenance::Part(PartRef::parameter(ExperimentId::new(1), "time")),
        );
        assert_eq!(row.provenance("n"), Some(&Provenance::Unknown));
        assert!(matches!(row.provenance("time"), Some(Provenance::Part(_))));
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["n", "time"]);
    }

    #[test]
    fn test_missing_cell() {
        let cell = Cell::missing();
        assert!(cell.value.is_null());
        assert!(cell.provenance.is_unknown());
    }
}
