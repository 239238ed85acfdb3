//! Tables whose rows come straight from experiments

use std::sync::Arc;

use super::{Cell, Table, TableEntry};
use crate::experiment::{Experiment, ExperimentId};
use crate::provenance::{Dependent, Part, PartRef, Provenance, Subject};
use crate::value::{ParameterPath, Value};

/// Builds one or more rows per experiment from named parameters.
///
/// Scalar parameters give one row. List-valued parameters expand into one
/// row per element, pointing at `param[i]`; scalar columns repeat on each
/// expanded row. Missing parameters become `Null` of unknown origin.
#[derive(Debug, Clone, Default)]
pub struct ExperimentTable {
    columns: Vec<String>,
    experiments: Vec<Arc<Experiment>>,
}

impl ExperimentTable {
    /// Table over the given parameter names.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            experiments: Vec::new(),
        }
    }

    /// Add an experiment (ignored if already present).
    #[must_use]
    pub fn add(mut self, experiment: &Arc<Experiment>) -> Self {
        if !self.experiments.iter().any(|e| e.id() == experiment.id()) {
            self.experiments.push(Arc::clone(experiment));
        }
        self
    }

    /// Add several experiments.
    #[must_use]
    pub fn add_all<'a>(self, experiments: impl IntoIterator<Item = &'a Arc<Experiment>>) -> Self {
        experiments.into_iter().fold(self, Self::add)
    }

    /// Read the experiments' current parameters into a table.
    #[must_use]
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(self.columns.iter().cloned());
        for experiment in &self.experiments {
            for row in self.rows_of(experiment) {
                table.push(row);
            }
        }
        table
    }

    fn rows_of(&self, experiment: &Experiment) -> Vec<TableEntry> {
        let id = experiment.id();
        let values: Vec<Option<Value>> = self
            .columns
            .iter()
            .map(|c| experiment.read_path(&ParameterPath::key(c.clone())))
            .collect();
        let expanded = values
            .iter()
            .filter_map(|v| v.as_ref().and_then(Value::as_list).map(<[Value]>::len))
            .max();

        let Some(count) = expanded else {
            let mut row = TableEntry::new();
            for (column, value) in self.columns.iter().zip(&values) {
                row.put_cell(column.clone(), scalar_cell(id, column, value.as_ref()));
            }
            return vec![row];
        };

        (0..count)
            .map(|i| {
                let mut row = TableEntry::new();
                for (column, value) in self.columns.iter().zip(&values) {
                    let cell = match value.as_ref().and_then(Value::as_list) {
                        Some(list) => list.get(i).map_or_else(Cell::missing, |v| {
                            Cell::new(
                                v.clone(),
                                Provenance::Part(PartRef::new(
                                    Subject::Experiment(id),
                                    Part::parameter(column.clone()).then_index(i),
                                )),
                            )
                        }),
                        None => scalar_cell(id, column, value.as_ref()),
                    };
                    row.put_cell(column.clone(), cell);
                }
                row
            })
            .collect()
    }
}

fn scalar_cell(id: ExperimentId, column: &str, value: Option<&Value>) -> Cell {
    value.map_or_else(Cell::missing, |v| {
        Cell::new(v.clone(), Provenance::Part(PartRef::parameter(id, column)))
    })
}

impl Dependent<ExperimentId> for ExperimentTable {
    fn depends_on(&self) -> Vec<ExperimentId> {
        self.experiments.iter().map(|e| e.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(id: u64) -> Arc<Experiment> {
        Arc::new(Experiment::from_fn(ExperimentId::new(id), |_| Ok(())).with_input("n", i64::try_from(id).unwrap()))
    }

    #[test]
    fn test_scalar_rows() {
        let table = ExperimentTable::new(["n", "missing"])
            .add(&exp(1))
            .add(&exp(2))
            .add(&exp(1))
            .to_table();
        assert_eq!(table.len(), 2);
        let row = &table.rows()[1];
        assert_eq!(row.get("n"), Some(&Value::Int(2)));
        assert_eq!(
            row.provenance("n"),
            Some(&Provenance::Part(PartRef::parameter(ExperimentId::new(2), "n")))
        );
        assert!(row.get("missing").unwrap().is_null());
        assert!(row.provenance("missing").unwrap().is_unknown());
    }

    #[test]
    fn test_list_parameters_expand() {
        let e = exp(3);
        e.write("times", vec![1.0, 2.0, 3.0]).unwrap();
        let table = ExperimentTable::new(["n", "times"]).add(&e).to_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[2].get("times"), Some(&Value::Float(3.0)));
        assert_eq!(table.rows()[2].get("n"), Some(&Value::Int(3)));
        let expected = PartRef::new(
            Subject::Experiment(ExperimentId::new(3)),
            Part::parameter("times").then_index(2),
        );
        assert_eq!(table.rows()[2].provenance("times"), Some(&Provenance::Part(expected)));
    }

    #[test]
    fn test_depends_on() {
        let t = ExperimentTable::new(["n"]).add_all([&exp(5), &exp(6)]);
        assert_eq!(t.depends_on(), vec![ExperimentId::new(5), ExperimentId::new(6)]);
    }
}
