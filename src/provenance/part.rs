//! Addressable pieces of lab objects

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Subject;
use crate::claim::ClaimId;
use crate::experiment::ExperimentId;
use crate::table::TableId;
use crate::value::{ParameterPath, Segment};

/// One step of a [`Part`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartSegment {
    /// Named parameter (or nested key)
    Parameter(String),
    /// Element of a list-valued parameter
    Index(usize),
    /// Table cell, by row and column position
    Cell {
        /// Row position
        row: usize,
        /// Column position
        col: usize,
    },
}

/// A piece of an object, as a sequence of segments.
///
/// The empty part designates the whole object. Equality is structural.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Part {
    segments: Vec<PartSegment>,
}

impl Part {
    /// The whole object.
    #[must_use]
    pub const fn whole() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// A named parameter.
    #[must_use]
    pub fn parameter(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PartSegment::Parameter(name.into())],
        }
    }

    /// A table cell.
    #[must_use]
    pub fn cell(row: usize, col: usize) -> Self {
        Self {
            segments: vec![PartSegment::Cell { row, col }],
        }
    }

    /// Part addressing the same node as a parameter path.
    #[must_use]
    pub fn from_path(path: &ParameterPath) -> Self {
        Self {
            segments: path
                .segments()
                .iter()
                .map(|s| match s {
                    Segment::Key(k) => PartSegment::Parameter(k.clone()),
                    Segment::Index(i) => PartSegment::Index(*i),
                })
                .collect(),
        }
    }

    /// Build from raw segments.
    #[must_use]
    pub fn from_segments(segments: Vec<PartSegment>) -> Self {
        Self { segments }
    }

    /// Append a list index.
    #[must_use]
    pub fn then_index(mut self, index: usize) -> Self {
        self.segments.push(PartSegment::Index(index));
        self
    }

    /// Segments, head first.
    #[must_use]
    pub fn segments(&self) -> &[PartSegment] {
        &self.segments
    }

    /// Check whether this designates the whole object.
    #[must_use]
    pub fn is_whole(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment.
    #[must_use]
    pub fn head(&self) -> Option<&PartSegment> {
        self.segments.first()
    }

    /// Remainder after the head segment (whole when nothing is left).
    #[must_use]
    pub fn tail(&self) -> Self {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Equivalent parameter path, when the part starts with a parameter
    /// and contains no cell segment.
    #[must_use]
    pub fn to_path(&self) -> Option<ParameterPath> {
        let mut segments = self.segments.iter();
        let Some(PartSegment::Parameter(head)) = segments.next() else {
            return None;
        };
        let mut path = ParameterPath::key(head.clone());
        for segment in segments {
            path = match segment {
                PartSegment::Index(i) => path.index(*i),
                PartSegment::Parameter(k) => ParameterPath::parse(&format!("{path}.{k}")).ok()?,
                PartSegment::Cell { .. } => return None,
            };
        }
        Some(path)
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                PartSegment::Parameter(k) if idx == 0 => write!(f, "{k}")?,
                PartSegment::Parameter(k) => write!(f, ".{k}")?,
                PartSegment::Index(i) => write!(f, "[{i}]")?,
                PartSegment::Cell { row, col } => write!(f, "({row},{col})")?,
            }
        }
        Ok(())
    }
}

/// A part of a specific subject: the key of every lineage query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartRef {
    /// Object the part belongs to
    pub subject: Subject,
    /// Piece of that object
    pub part: Part,
}

impl PartRef {
    /// Pair a subject with a part.
    #[must_use]
    pub const fn new(subject: Subject, part: Part) -> Self {
        Self { subject, part }
    }

    /// A whole subject.
    #[must_use]
    pub const fn whole(subject: Subject) -> Self {
        Self::new(subject, Part::whole())
    }

    /// A named parameter of an experiment.
    #[must_use]
    pub fn parameter(experiment: ExperimentId, name: impl Into<String>) -> Self {
        Self::new(Subject::Experiment(experiment), Part::parameter(name))
    }

    /// A cell of a table.
    #[must_use]
    pub fn cell(table: TableId, row: usize, col: usize) -> Self {
        Self::new(Subject::Table(table), Part::cell(row, col))
    }

    /// A whole claim.
    #[must_use]
    pub const fn claim(claim: ClaimId) -> Self {
        Self::whole(Subject::Claim(claim))
    }

    /// Experiment this part belongs to, if any.
    #[must_use]
    pub const fn experiment(&self) -> Option<ExperimentId> {
        match self.subject {
            Subject::Experiment(id) => Some(id),
            _ => None,
        }
    }
}
