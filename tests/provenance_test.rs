//! Explanation graphs unfolded against a laboratory

use std::collections::BTreeSet;
use trueno_lab::experiment::{Experiment, ExperimentFactory};
use trueno_lab::provenance::{Node, NodeId, PartRef, Provenance, Subject};
use trueno_lab::table::{ColumnSum, ExperimentTable, Select, TableEntry, TableTransformation};
use trueno_lab::{Laboratory, Region, Table};

fn sorting_lab() -> Laboratory {
    let lab = Laboratory::builder().build().unwrap();
    lab.register_factory(ExperimentFactory::new("sort").with_default_builder(|id| {
        Ok(Experiment::from_fn(id, |ctx| {
            let n = ctx.read_i64("n");
            let factor = if ctx.read_string("algo") == "bubble" { n } else { 2 };
            ctx.write("time", n * factor)?;
            ctx.write("passes", vec![n, n + 1])?;
            Ok(())
        }))
    }));
    let region = Region::new().add("algo", ["quick", "bubble"]).add("n", [10, 20]);
    for exp in lab.get_experiments("sort", &region).unwrap() {
        exp.run();
    }
    lab
}

/// Every reachable node, checking the walk never revisits an ancestor.
fn assert_acyclic(graph: &trueno_lab::ExplanationGraph) {
    fn visit(graph: &trueno_lab::ExplanationGraph, id: NodeId, path: &mut Vec<NodeId>) {
        assert!(!path.contains(&id), "cycle through {id:?}");
        path.push(id);
        for child in graph.node(id).unwrap().children() {
            visit(graph, *child, path);
        }
        path.pop();
    }
    visit(graph, graph.root(), &mut Vec::new());
}

#[test]
fn test_experiment_parameter_is_leaf() {
    let lab = sorting_lab();
    let exp = lab.experiments()[0].clone();
    let graph = lab.explain(&PartRef::parameter(exp.id(), "time"));
    assert_eq!(graph.len(), 1);
    assert!(graph.node(graph.root()).unwrap().is_leaf());
}

#[test]
fn test_chain_of_tables_reaches_parameters() {
    let lab = sorting_lab();
    let experiments = lab.experiments();
    let raw = lab.add_table(ExperimentTable::new(["algo", "n", "time"]).add_all(&experiments).to_table());
    let narrow = Select::new(["time"]).transform(&[lab.table(raw).unwrap().as_ref()]).unwrap();
    let narrow = lab.add_table(narrow);
    let total = ColumnSum::new().transform(&[lab.table(narrow).unwrap().as_ref()]).unwrap();
    let total = lab.add_table(total);

    let graph = lab.explain(&PartRef::cell(total, 0, 0));
    assert_acyclic(&graph);
    let expected: Vec<PartRef> = experiments
        .iter()
        .map(|e| PartRef::parameter(e.id(), "time"))
        .collect();
    assert_eq!(graph.leaf_parts(), expected);

    // Every intermediate cell shows up exactly once
    let cells: BTreeSet<Subject> = graph
        .reachable()
        .into_iter()
        .filter_map(|id| match graph.node(id) {
            Some(Node::Part { target, .. }) => Some(target.subject),
            _ => None,
        })
        .collect();
    assert!(cells.contains(&Subject::Table(raw)));
    assert!(cells.contains(&Subject::Table(narrow)));
}

#[test]
fn test_simplify_keeps_leaves() {
    let lab = sorting_lab();
    let experiments = lab.experiments();
    let raw = lab.add_table(ExperimentTable::new(["n", "time"]).add_all(&experiments).to_table());
    let total = ColumnSum::new().transform(&[lab.table(raw).unwrap().as_ref()]).unwrap();
    let total = lab.add_table(total);
    let graph = lab.explain(&PartRef::cell(total, 0, 1));
    let simple = graph.simplify();
    assert_eq!(simple.leaf_parts(), graph.leaf_parts());
    assert!(simple.reachable().len() <= graph.reachable().len());
    assert_acyclic(&simple);
}

#[test]
fn test_list_element_lineage() {
    let lab = sorting_lab();
    let experiments = lab.experiments();
    let raw = lab.add_table(ExperimentTable::new(["n", "passes"]).add_all(&experiments[..1]).to_table());
    let table = lab.table(raw).unwrap();
    assert_eq!(table.len(), 2);
    let graph = lab.explain(&PartRef::cell(raw, 1, 1));
    let leaf = &graph.leaf_parts()[0];
    assert_eq!(leaf.to_string(), format!("{}:passes:1", experiments[0].id()));
}

#[test]
fn test_self_reference_becomes_loop() {
    let lab = sorting_lab();
    let id = lab.add_table(Table::new(["x"]));
    let mut looping = Table::new(["x"]);
    looping.push(TableEntry::new().with("x", 1, Provenance::Part(PartRef::cell(id, 0, 0))));
    lab.replace_table(id, looping).unwrap();

    let graph = lab.explain(&PartRef::cell(id, 0, 0));
    assert_acyclic(&graph);
    assert!(graph
        .reachable()
        .into_iter()
        .any(|n| matches!(graph.node(n), Some(Node::Loop(_)))));
}

#[test]
fn test_datapoint_round_trip_through_lab() {
    let lab = sorting_lab();
    let raw = lab.add_table(ExperimentTable::new(["n", "time"]).add_all(&lab.experiments()).to_table());
    let target = PartRef::cell(raw, 2, 1);
    let datapoint = target.to_string();
    assert_eq!(datapoint, format!("{raw}:2:1"));
    let graph = lab.explain_datapoint(&datapoint).unwrap();
    assert_eq!(graph.find(&target), Some(graph.root()));
    assert_eq!(graph.leaf_parts().len(), 1);
}

#[test]
fn test_unknown_cells_stay_explicit() {
    let lab = sorting_lab();
    let mut table = Table::new(["a"]);
    table.push(TableEntry::new().with("a", 3, Provenance::Unknown));
    let id = lab.add_table(table);
    let graph = lab.explain(&PartRef::cell(id, 0, 0));
    assert!(graph
        .reachable()
        .into_iter()
        .any(|n| matches!(graph.node(n), Some(Node::Unknown))));
    assert!(graph.leaf_parts().is_empty());
}
