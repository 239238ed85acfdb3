//! Property-based tests for trueno-lab
//!
//! Following ruchy/trueno/aprender pattern:
//! - Test enumeration and identity invariants
//! - Test provenance totality properties
//! - Run with ProptestConfig::with_cases(100)
//! - Must complete in <30 seconds for pre-commit hook

use proptest::prelude::*;
use quickcheck::{quickcheck, Arbitrary, Gen};
use std::collections::BTreeSet;
use std::sync::Arc;
use trueno_lab::experiment::{Experiment, ExperimentFactory, ExperimentId, ExperimentRegistry};
use trueno_lab::provenance::{Part, PartRef, PartSegment, Subject};
use trueno_lab::table::{ColumnSum, TableEntry, TableTransformation};
use trueno_lab::{ClaimId, Point, Provenance, Region, Table, TableId, Value};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Generate a region with 1..=4 dimensions of 1..=4 distinct integers each
fn arb_region() -> impl Strategy<Value = (Region, Vec<usize>)> {
    proptest::collection::vec(proptest::collection::btree_set(0i64..50, 1..=4), 1..=4).prop_map(|domains| {
        let sizes: Vec<usize> = domains.iter().map(BTreeSet::len).collect();
        let region = domains
            .into_iter()
            .enumerate()
            .fold(Region::new(), |r, (i, values)| r.add(format!("d{i}"), values));
        (region, sizes)
    })
}

fn square_factory() -> ExperimentFactory {
    ExperimentFactory::new("square").with_default_builder(|id| Ok(Experiment::from_fn(id, |_| Ok(()))))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Region Properties
    // ========================================================================

    /// Property: enumeration yields exactly the product of domain sizes
    #[test]
    fn prop_region_cardinality((region, sizes) in arb_region()) {
        let points = region.all();
        prop_assert_eq!(points.len(), sizes.iter().product::<usize>());
        prop_assert_eq!(points.len(), region.cardinality());
        for point in &points {
            prop_assert_eq!(point.len(), sizes.len());
        }
    }

    /// Property: enumerated points are pairwise distinct
    #[test]
    fn prop_region_points_distinct((region, _) in arb_region()) {
        let points = region.all();
        let unique: BTreeSet<String> = points.iter().map(ToString::to_string).collect();
        prop_assert_eq!(unique.len(), points.len());
    }

    /// Property: the predicate only removes points
    #[test]
    fn prop_predicate_filters((region, _) in arb_region(), threshold in 0i64..50) {
        let all = region.all();
        let kept = region
            .clone()
            .with_predicate(move |p| p.get("d0").and_then(Value::as_i64).is_some_and(|v| v < threshold))
            .all();
        prop_assert!(kept.len() <= all.len());
        prop_assert!(kept.iter().all(|p| all.contains(p)));
    }

    // ========================================================================
    // Factory Properties
    // ========================================================================

    /// Property: equal points map to the same experiment, distinct points never share one
    #[test]
    fn prop_factory_identity((region, _) in arb_region()) {
        let registry = ExperimentRegistry::new();
        let factory = square_factory();
        let first = factory.get_region(&region, &registry);
        let second = factory.get_region(&region, &registry);
        prop_assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            prop_assert!(Arc::ptr_eq(a, b));
        }
        let ids: BTreeSet<ExperimentId> = first.iter().map(|e| e.id()).collect();
        prop_assert_eq!(ids.len(), first.len());
        prop_assert_eq!(registry.len(), first.len());
    }

    // ========================================================================
    // Table Properties
    // ========================================================================

    /// Property: an integer column sum is exact and points at every row
    #[test]
    fn prop_column_sum_exact(values in proptest::collection::vec(-10_000i64..10_000, 1..50)) {
        let mut table = Table::new(["x"]);
        for (i, v) in values.iter().enumerate() {
            let source = PartRef::parameter(ExperimentId::new(i as u64 + 1), "x");
            table.push(TableEntry::new().with("x", *v, Provenance::Part(source)));
        }
        let sum = ColumnSum::new().transform(&[&table]).unwrap();
        prop_assert_eq!(sum.rows()[0].get("x"), Some(&Value::Int(values.iter().sum())));
        prop_assert_eq!(sum.rows()[0].provenance("x").unwrap().parts().len(), values.len());
    }

    /// Property: projecting a point keeps only the requested dimensions
    #[test]
    fn prop_point_projection(a in 0i64..10, b in 0i64..10) {
        let point = Point::new().with("a", a).with("b", b);
        let projected = point.project(&["b"]);
        prop_assert_eq!(projected.len(), 1);
        prop_assert_eq!(projected.get("b"), Some(&Value::Int(b)));
    }
}

// ============================================================================
// Datapoint identifiers (quickcheck)
// ============================================================================

#[derive(Debug, Clone)]
struct Datapoint(PartRef);

/// Parameter names, including ones that collide with the datapoint syntax
/// (digits only, `:`, leading quote, empty)
fn key(g: &mut Gen) -> String {
    let alphabet: Vec<char> = ('a'..='z').chain('0'..='9').chain([':', '\'', '.', ' ']).collect();
    match u8::arbitrary(g) % 4 {
        0 => (usize::arbitrary(g) % 1000).to_string(),
        1 if bool::arbitrary(g) => String::new(),
        _ => {
            let len = 1 + usize::arbitrary(g) % 8;
            (0..len).map(|_| *g.choose(&alphabet).unwrap_or(&'x')).collect()
        }
    }
}

impl Arbitrary for Datapoint {
    fn arbitrary(g: &mut Gen) -> Self {
        let id = u64::arbitrary(g) % 1000;
        let part = match u8::arbitrary(g) % 5 {
            0 => PartRef::whole(Subject::Experiment(ExperimentId::new(id))),
            1 => {
                let mut segments = vec![PartSegment::Parameter(key(g))];
                if bool::arbitrary(g) {
                    segments.push(PartSegment::Index(usize::arbitrary(g) % 100));
                }
                if bool::arbitrary(g) {
                    segments.push(PartSegment::Parameter(key(g)));
                }
                PartRef::new(Subject::Experiment(ExperimentId::new(id)), Part::from_segments(segments))
            }
            2 => PartRef::whole(Subject::Table(TableId::new(id))),
            3 => PartRef::cell(TableId::new(id), usize::arbitrary(g) % 500, usize::arbitrary(g) % 20),
            _ => PartRef::claim(ClaimId::new(id)),
        };
        Self(part)
    }
}

quickcheck! {
    fn qc_datapoint_round_trip(point: Datapoint) -> bool {
        PartRef::parse_datapoint(&point.0.to_string()).ok() == Some(point.0)
    }
}
