//! Table transformations
//!
//! Each transformation consumes one or more tables and produces a new one.
//! Copied cells carry a pointer to their source cell; aggregated cells
//! carry the conjunction of every contributing pointer. A cell whose origin
//! cannot be determined is explicitly `Unknown`.

use rustc_hash::FxHashMap;
use std::fmt;

use super::{Cell, Table, TableEntry};
use crate::provenance::Provenance;
use crate::value::Value;
use crate::{Error, Result};

/// A table-to-table operation.
pub trait TableTransformation: Send + Sync {
    /// Apply the transformation.
    ///
    /// # Errors
    ///
    /// Implementation specific; typically [`Error::MissingColumn`] or a
    /// wrong number of inputs.
    fn transform(&self, inputs: &[&Table]) -> Result<Table>;
}

fn single<'a>(inputs: &[&'a Table], operation: &str) -> Result<&'a Table> {
    match inputs {
        [table] => Ok(*table),
        _ => Err(Error::Other(format!(
            "{operation} expects exactly one input table, got {}",
            inputs.len()
        ))),
    }
}

/// Copy of a source cell pointing back at it; `Null`/`Unknown` if absent.
fn copy_cell(source: &Table, row: usize, column: &str) -> Cell {
    source.rows()[row]
        .get(column)
        .map_or_else(Cell::missing, |v| Cell::new(v.clone(), source.pointer(row, column)))
}

fn require_columns(table: &Table, columns: &[String]) -> Result<()> {
    match columns.iter().find(|c| table.column_index(c).is_none()) {
        Some(missing) => Err(Error::MissingColumn(missing.clone())),
        None => Ok(()),
    }
}

fn owned<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Vec<String> {
    names.into_iter().map(Into::into).collect()
}

/// Keep a subset of columns, in the given order.
#[derive(Debug, Clone)]
pub struct Select {
    columns: Vec<String>,
}

impl Select {
    /// Select the named columns.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: owned(columns),
        }
    }
}

impl TableTransformation for Select {
    fn transform(&self, inputs: &[&Table]) -> Result<Table> {
        let source = single(inputs, "select")?;
        require_columns(source, &self.columns)?;
        let mut out = Table::new(self.columns.iter().cloned());
        for row in 0..source.len() {
            let mut entry = TableEntry::new();
            for column in &self.columns {
                entry.put_cell(column.clone(), copy_cell(source, row, column));
            }
            out.push(entry);
        }
        Ok(out)
    }
}

/// Rename columns, keeping their position.
#[derive(Debug, Clone)]
pub struct RenameColumns {
    renames: Vec<(String, String)>,
}

impl RenameColumns {
    /// Rename each `(from, to)` pair.
    #[must_use]
    pub fn new<A: Into<String>, B: Into<String>>(renames: impl IntoIterator<Item = (A, B)>) -> Self {
        Self {
            renames: renames.into_iter().map(|(a, b)| (a.into(), b.into())).collect(),
        }
    }

    fn target<'a>(&'a self, column: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(from, _)| from == column)
            .map_or(column, |(_, to)| to.as_str())
    }
}

impl TableTransformation for RenameColumns {
    fn transform(&self, inputs: &[&Table]) -> Result<Table> {
        let source = single(inputs, "rename")?;
        let froms: Vec<String> = self.renames.iter().map(|(f, _)| f.clone()).collect();
        require_columns(source, &froms)?;
        let mut out = Table::new(source.columns().iter().map(|c| self.target(c).to_string()));
        for row in 0..source.len() {
            let mut entry = TableEntry::new();
            for column in source.columns() {
                if source.rows()[row].contains(column) {
                    entry.put_cell(self.target(column), copy_cell(source, row, column));
                }
            }
            out.push(entry);
        }
        Ok(out)
    }
}

/// Drop columns; names that do not exist are ignored.
#[derive(Debug, Clone)]
pub struct RemoveColumns {
    columns: Vec<String>,
}

impl RemoveColumns {
    /// Remove the named columns.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: owned(columns),
        }
    }
}

impl TableTransformation for RemoveColumns {
    fn transform(&self, inputs: &[&Table]) -> Result<Table> {
        let source = single(inputs, "remove-columns")?;
        let kept: Vec<String> = source
            .columns()
            .iter()
            .filter(|c| !self.columns.contains(c))
            .cloned()
            .collect();
        Select::new(kept).transform(inputs)
    }
}

/// Merge rows of several tables on the columns they all share.
///
/// Rows agreeing on every shared column become one output row. Columns a
/// merged row never received are padded with `Null` of unknown origin.
/// Tables with no column in common are merged row by row.
#[derive(Debug, Clone, Default)]
pub struct Join;

impl Join {
    /// Join on the common columns.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TableTransformation for Join {
    fn transform(&self, inputs: &[&Table]) -> Result<Table> {
        let Some((first, rest)) = inputs.split_first() else {
            return Err(Error::Other("join expects at least one input table".to_string()));
        };
        let keys: Vec<String> = first
            .columns()
            .iter()
            .filter(|c| rest.iter().all(|t| t.column_index(c).is_some()))
            .cloned()
            .collect();

        let mut columns = keys.clone();
        for table in inputs {
            for column in table.columns() {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut merged: Vec<TableEntry> = Vec::new();
        let mut slots: FxHashMap<Vec<Value>, usize> = FxHashMap::default();
        for table in inputs {
            for (row_idx, row) in table.rows().iter().enumerate() {
                let key: Vec<Value> = if keys.is_empty() {
                    vec![Value::from(row_idx)]
                } else {
                    keys.iter().map(|k| row.get(k).cloned().unwrap_or_default()).collect()
                };
                let slot = *slots.entry(key).or_insert_with(|| {
                    let mut entry = TableEntry::new();
                    for k in &keys {
                        entry.put_cell(k.clone(), copy_cell(table, row_idx, k));
                    }
                    merged.push(entry);
                    merged.len() - 1
                });
                for column in table.columns() {
                    if !merged[slot].contains(column) && row.contains(column) {
                        merged[slot].put_cell(column.clone(), copy_cell(table, row_idx, column));
                    }
                }
            }
        }

        let mut out = Table::new(columns.iter().cloned());
        for mut entry in merged {
            for column in &columns {
                if !entry.contains(column) {
                    entry.put_cell(column.clone(), Cell::missing());
                }
            }
            out.push(entry);
        }
        Ok(out)
    }
}

/// Pivot: one output column per distinct value of a header column.
///
/// `(x, group, y)` rows become rows keyed by `x` with one column per
/// `group` value holding `y`. Header columns appear in first-appearance
/// order.
#[derive(Debug, Clone)]
pub struct GroupInColumns {
    key: String,
    header: String,
    value: String,
}

impl GroupInColumns {
    /// Group `value` by `key`, spreading it across columns named by `header`.
    #[must_use]
    pub fn new(key: impl Into<String>, header: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            value: value.into(),
        }
    }
}

impl TableTransformation for GroupInColumns {
    fn transform(&self, inputs: &[&Table]) -> Result<Table> {
        let source = single(inputs, "group-in-columns")?;
        require_columns(
            source,
            &[self.key.clone(), self.header.clone(), self.value.clone()],
        )?;

        let mut headers: Vec<String> = Vec::new();
        let mut rows: Vec<(Value, TableEntry)> = Vec::new();
        for (idx, row) in source.rows().iter().enumerate() {
            let key = row.get(&self.key).cloned().unwrap_or_default();
            let header = match row.get(&self.header) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => continue,
            };
            if header == self.key {
                return Err(Error::Other(format!(
                    "group-in-columns: header value `{header}` collides with the key column"
                )));
            }
            if !headers.contains(&header) {
                headers.push(header.clone());
            }
            let slot = match rows.iter().position(|(k, _)| *k == key) {
                Some(slot) => slot,
                None => {
                    let mut entry = TableEntry::new();
                    entry.put_cell(self.key.clone(), copy_cell(source, idx, &self.key));
                    rows.push((key, entry));
                    rows.len() - 1
                }
            };
            rows[slot]
                .1
                .put_cell(header, copy_cell(source, idx, &self.value));
        }

        let mut out = Table::new(std::iter::once(self.key.clone()).chain(headers.iter().cloned()));
        for (_, mut entry) in rows {
            for header in &headers {
                if !entry.contains(header) {
                    entry.put_cell(header.clone(), Cell::missing());
                }
            }
            out.push(entry);
        }
        Ok(out)
    }
}

/// One-row table holding the sum of every numeric column.
///
/// Integer columns are summed exactly; a total that does not fit `i64` is
/// reported as the nearest `Float`. Columns with floats are summed in `f64`
/// with Neumaier compensation. Each sum points at the conjunction of the
/// cells that contributed; columns without numbers are `Null` of unknown
/// origin.
#[derive(Debug, Clone, Default)]
pub struct ColumnSum;

impl ColumnSum {
    /// Sum every column.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Compensated `f64` sum (Neumaier's variant of Kahan summation).
fn sum_f64(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for v in values {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            compensation += (sum - t) + v;
        } else {
            compensation += (v - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

#[allow(clippy::cast_precision_loss)]
fn sum_numbers(values: &[&Value]) -> Value {
    let ints: Option<Vec<i64>> = values
        .iter()
        .map(|v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })
        .collect();
    if let Some(ints) = ints {
        // i128 cannot overflow for any column that fits in memory
        let total: i128 = ints.iter().map(|i| i128::from(*i)).sum();
        return i64::try_from(total).map_or(Value::Float(total as f64), Value::Int);
    }
    Value::Float(sum_f64(values.iter().filter_map(|v| v.as_f64())))
}

impl TableTransformation for ColumnSum {
    fn transform(&self, inputs: &[&Table]) -> Result<Table> {
        let source = single(inputs, "column-sum")?;
        let mut entry = TableEntry::new();
        for column in source.columns() {
            let mut numbers = Vec::new();
            let mut pointers = Vec::new();
            for (row, r) in source.rows().iter().enumerate() {
                if let Some(v) = r.get(column).filter(|v| v.is_number()) {
                    numbers.push(v);
                    pointers.push(source.pointer(row, column));
                }
            }
            let cell = if numbers.is_empty() {
                Cell::missing()
            } else {
                Cell::new(sum_numbers(&numbers), Provenance::conjunction(pointers))
            };
            entry.put_cell(column.clone(), cell);
        }
        let mut out = Table::new(source.columns().iter().cloned());
        out.push(entry);
        Ok(out)
    }
}

/// Pipeline: the first stage sees the inputs, each later stage the
/// previous output.
#[derive(Default)]
pub struct Composition {
    stages: Vec<Box<dyn TableTransformation>>,
}

impl Composition {
    /// Empty pipeline (passes a single input through).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    #[must_use]
    pub fn then(mut self, stage: impl TableTransformation + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check whether the pipeline has no stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl TableTransformation for Composition {
    fn transform(&self, inputs: &[&Table]) -> Result<Table> {
        let Some((first, rest)) = self.stages.split_first() else {
            return single(inputs, "composition").cloned();
        };
        let mut current = first.transform(inputs)?;
        for stage in rest {
            current = stage.transform(&[&current])?;
        }
        Ok(current)
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentId;
    use crate::provenance::PartRef;
    use crate::table::TableId;

    fn p(id: u64, key: &str) -> Provenance {
        Provenance::Part(PartRef::parameter(ExperimentId::new(id), key))
    }

    fn runs() -> Table {
        let mut t = Table::new(["algo", "n", "time"]);
        let data = [("quick", 10, 1.5), ("quick", 20, 2.5), ("merge", 10, 2.0)];
        for (i, (algo, n, time)) in data.into_iter().enumerate() {
            let id = u64::try_from(i).unwrap() + 1;
            t.push(
                TableEntry::new()
                    .with("algo", algo, p(id, "algo"))
                    .with("n", n, p(id, "n"))
                    .with("time", time, p(id, "time")),
            );
        }
        t
    }

    #[test]
    fn test_select_copies_pointers() {
        let out = Select::new(["time"]).transform(&[&runs()]).unwrap();
        assert_eq!(out.columns(), &["time".to_string()]);
        assert_eq!(out.rows()[1].provenance("time"), Some(&p(2, "time")));
    }

    #[test]
    fn test_select_missing_column() {
        let err = Select::new(["nope"]).transform(&[&runs()]).unwrap_err();
        assert!(matches!(err, Error::MissingColumn(c) if c == "nope"));
    }

    #[test]
    fn test_registered_source_is_referenced_by_cell() {
        let mut source = runs();
        source.set_id(TableId::new(9));
        let out = Select::new(["n"]).transform(&[&source]).unwrap();
        assert_eq!(
            out.rows()[2].provenance("n"),
            Some(&Provenance::Part(PartRef::cell(TableId::new(9), 2, 1)))
        );
    }

    #[test]
    fn test_rename_and_remove() {
        let renamed = RenameColumns::new([("time", "duration")]).transform(&[&runs()]).unwrap();
        assert_eq!(renamed.columns()[2], "duration");
        assert_eq!(renamed.rows()[0].provenance("duration"), Some(&p(1, "time")));
        let removed = RemoveColumns::new(["algo", "ghost"]).transform(&[&runs()]).unwrap();
        assert_eq!(removed.columns(), &["n".to_string(), "time".to_string()]);
    }

    #[test]
    fn test_join_pads_missing() {
        let mut left = Table::new(["n", "a"]);
        left.push(TableEntry::new().with("n", 1, p(1, "n")).with("a", "x", p(1, "a")));
        left.push(TableEntry::new().with("n", 2, p(2, "n")).with("a", "y", p(2, "a")));
        let mut right = Table::new(["n", "b"]);
        right.push(TableEntry::new().with("n", 2, p(3, "n")).with("b", true, p(3, "b")));

        let out = Join::new().transform(&[&left, &right]).unwrap();
        assert_eq!(out.columns(), &["n".to_string(), "a".to_string(), "b".to_string()]);
        assert_eq!(out.len(), 2);
        assert!(out.rows()[0].get("b").unwrap().is_null());
        assert!(out.rows()[0].provenance("b").unwrap().is_unknown());
        assert_eq!(out.rows()[1].provenance("b"), Some(&p(3, "b")));
        assert_eq!(out.rows()[1].provenance("n"), Some(&p(2, "n")));
    }

    #[test]
    fn test_group_in_columns() {
        let out = GroupInColumns::new("n", "algo", "time").transform(&[&runs()]).unwrap();
        assert_eq!(
            out.columns(),
            &["n".to_string(), "quick".to_string(), "merge".to_string()]
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0].get("merge"), Some(&Value::Float(2.0)));
        assert_eq!(out.rows()[0].provenance("merge"), Some(&p(3, "time")));
        assert!(out.rows()[1].get("merge").unwrap().is_null());
    }

    #[test]
    fn test_column_sum() {
        let out = ColumnSum::new().transform(&[&runs()]).unwrap();
        assert_eq!(out.len(), 1);
        let row = &out.rows()[0];
        assert_eq!(row.get("n"), Some(&Value::Int(40)));
        assert_eq!(row.get("time"), Some(&Value::Float(6.0)));
        assert!(matches!(row.provenance("time"), Some(Provenance::And(v)) if v.len() == 3));
        assert!(row.get("algo").unwrap().is_null());
        assert!(row.provenance("algo").unwrap().is_unknown());
    }

    fn column(values: &[Value]) -> Table {
        let mut t = Table::new(["x"]);
        for (i, v) in values.iter().enumerate() {
            let id = u64::try_from(i).unwrap() + 1;
            t.push(TableEntry::new().with("x", v.clone(), p(id, "x")));
        }
        t
    }

    fn sum_of(values: &[Value]) -> Value {
        let out = ColumnSum::new().transform(&[&column(values)]).unwrap();
        out.rows()[0].get("x").cloned().unwrap()
    }

    #[test]
    fn test_column_sum_keeps_f64_precision() {
        assert_eq!(sum_of(&[Value::Float(16_777_217.0)]), Value::Float(16_777_217.0));
        assert_eq!(
            sum_of(&[Value::Float(0.5), Value::Float(0.25), Value::Float(16_777_217.0)]),
            Value::Float(16_777_217.75)
        );
        // naive left-to-right f64 addition yields 1e16 here
        assert_eq!(
            sum_of(&[Value::Float(1e16), Value::Float(1.0), Value::Float(1.0)]),
            Value::Float(1e16 + 2.0)
        );
        assert_eq!(sum_of(&[Value::Int(3), Value::Float(0.25)]), Value::Float(3.25));
    }

    #[test]
    fn test_column_sum_integer_overflow_widens() {
        assert_eq!(
            sum_of(&[Value::Int(i64::MAX), Value::Int(1)]),
            Value::Float(9_223_372_036_854_775_808.0)
        );
        assert_eq!(sum_of(&[Value::Int(i64::MAX), Value::Int(-1), Value::Int(1)]), Value::Int(i64::MAX));
    }

    #[test]
    fn test_composition() {
        let pipeline = Composition::new()
            .then(GroupInColumns::new("n", "algo", "time"))
            .then(Select::new(["quick"]))
            .then(ColumnSum::new());
        let out = pipeline.transform(&[&runs()]).unwrap();
        assert_eq!(out.rows()[0].get("quick"), Some(&Value::Float(4.0)));
        let leaves: Vec<_> = out.rows()[0].provenance("quick").unwrap().parts().into_iter().cloned().collect();
        assert_eq!(
            leaves,
            vec![
                PartRef::parameter(ExperimentId::new(1), "time"),
                PartRef::parameter(ExperimentId::new(2), "time")
            ]
        );
    }

    #[test]
    fn test_wrong_arity() {
        assert!(Select::new(["n"]).transform(&[]).is_err());
        assert!(Join::new().transform(&[]).is_err());
    }
}
