//! Provenance: where does a value come from?
//!
//! Every lab object is a [`Subject`]; a [`PartRef`] names a piece of one.
//! Objects that derive values record, per piece, a [`Provenance`]
//! expression over other pieces. A [`LineageSource`] (the laboratory)
//! answers one-step lineage queries, and [`ExplanationGraph`] unfolds them
//! into an AND/OR DAG whose leaves are experiment parameters.
//!
//! ```text
//! C1 ──> Or ──> And ──> T2(0,1) ──> And ──> T1(0,1) ──> E3:time
//!                                      └──> T1(1,1) ──> E4:time
//! ```

mod datapoint;
mod graph;
mod part;

pub use graph::{ExplanationGraph, Node, NodeId};
pub use part::{Part, PartRef, PartSegment};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::claim::ClaimId;
use crate::experiment::ExperimentId;
use crate::table::TableId;

/// Kind and identity of a lab object that can be explained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    /// An experiment
    Experiment(ExperimentId),
    /// A table registered in the lab
    Table(TableId),
    /// A claim registered in the lab
    Claim(ClaimId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Experiment(id) => write!(f, "{id}"),
            Self::Table(id) => write!(f, "{id}"),
            Self::Claim(id) => write!(f, "{id}"),
        }
    }
}

/// One-step lineage of a piece of data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Origin cannot be determined
    #[default]
    Unknown,
    /// Ground truth: nothing explains it further
    Leaf,
    /// Copied from another piece
    Part(PartRef),
    /// Derived from every listed source
    And(Vec<Provenance>),
    /// Explained by any of the listed alternatives
    Or(Vec<Provenance>),
}

impl Provenance {
    /// Conjunction of pointers; `Unknown` when there are none.
    #[must_use]
    pub fn all_of(parts: impl IntoIterator<Item = PartRef>) -> Self {
        let mut parts: Vec<Self> = parts.into_iter().map(Self::Part).collect();
        match parts.len() {
            0 => Self::Unknown,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }

    /// Conjunction of expressions; `Unknown` when there are none.
    #[must_use]
    pub fn conjunction(mut items: Vec<Self>) -> Self {
        match items.len() {
            0 => Self::Unknown,
            1 => items.remove(0),
            _ => Self::And(items),
        }
    }

    /// Check whether no origin is recorded.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Every pointer mentioned in the expression.
    #[must_use]
    pub fn parts(&self) -> Vec<&PartRef> {
        let mut out = Vec::new();
        self.collect_parts(&mut out);
        out
    }

    fn collect_parts<'a>(&'a self, out: &mut Vec<&'a PartRef>) {
        match self {
            Self::Part(r) => out.push(r),
            Self::And(v) | Self::Or(v) => v.iter().for_each(|p| p.collect_parts(out)),
            Self::Unknown | Self::Leaf => {}
        }
    }
}

/// Anything that can state the one-step lineage of its pieces.
pub trait LineageSource {
    /// Lineage of `part`, or `None` if its subject does not exist.
    fn lineage(&self, part: &PartRef) -> Option<Provenance>;
}

/// Objects that declare which objects feed them.
///
/// Answers "which experiments feed this view" without unfolding lineage.
pub trait Dependent<T> {
    /// Direct dependencies, without duplicates.
    fn depends_on(&self) -> Vec<T>;
}
