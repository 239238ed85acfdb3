//! Claims: checkable statements about lab results
//!
//! A [`Claim`] wraps a predicate over the [`Laboratory`]. Checking it
//! clears the previous explanations, runs the predicate and records the
//! [`ClaimResult`]. When the result is not `Ok`, the predicate is expected
//! to push [`Explanation`]s naming the faulty pieces of data; those become
//! the claim's lineage.
//!
//! ```rust
//! use trueno_lab::claim::{Claim, ClaimId, ClaimResult};
//! use trueno_lab::lab::Laboratory;
//!
//! let lab = Laboratory::builder().build().unwrap();
//! let mut claim = Claim::new(ClaimId::new(1), "lab is empty", |lab, _| {
//!     Ok(if lab.experiments().is_empty() { ClaimResult::Ok } else { ClaimResult::Fail })
//! });
//! assert_eq!(claim.check(&lab), ClaimResult::Ok);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::experiment::{panic_message, ExperimentId};
use crate::lab::Laboratory;
use crate::provenance::{Dependent, PartRef, Provenance};

/// Identifier of a claim registered in a lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(u64);

impl ClaimId {
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

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Outcome of a claim check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimResult {
    /// The claim holds
    Ok,
    /// The claim holds with reservations
    Warning,
    /// The claim does not hold
    Fail,
    /// The claim could not be evaluated
    Unknown,
}

impl ClaimResult {
    /// Keep the worse of two results: `Fail`, then `Unknown`, then
    /// `Warning`, then `Ok`.
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        const fn rank(r: ClaimResult) -> u8 {
            match r {
                ClaimResult::Fail => 3,
                ClaimResult::Unknown => 2,
                ClaimResult::Warning => 1,
                ClaimResult::Ok => 0,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for ClaimResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Why a claim is not `Ok`: free text plus the faulty pieces of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    /// Human-readable reason
    pub text: String,
    /// Pieces of data at fault
    pub objects: Vec<PartRef>,
}

impl Explanation {
    /// Explanation with no object yet.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            objects: Vec::new(),
        }
    }

    /// Add a faulty piece of data.
    #[must_use]
    pub fn with_object(mut self, object: PartRef) -> Self {
        self.objects.push(object);
        self
    }
}

/// Predicate evaluated against the lab; pushes explanations when not `Ok`.
pub type ClaimPredicate =
    Box<dyn Fn(&Laboratory, &mut Vec<Explanation>) -> anyhow::Result<ClaimResult> + Send + Sync>;

/// A checkable statement about lab results.
pub struct Claim {
    id: ClaimId,
    statement: String,
    description: String,
    predicate: ClaimPredicate,
    result: ClaimResult,
    explanations: Vec<Explanation>,
    dependencies: BTreeSet<ExperimentId>,
}

impl Claim {
    /// Create a claim; its result is `Unknown` until checked.
    pub fn new<F>(id: ClaimId, statement: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Laboratory, &mut Vec<Explanation>) -> anyhow::Result<ClaimResult> + Send + Sync + 'static,
    {
        Self {
            id,
            statement: statement.into(),
            description: String::new(),
            predicate: Box::new(predicate),
            result: ClaimResult::Unknown,
            explanations: Vec::new(),
            dependencies: BTreeSet::new(),
        }
    }

    /// Set a longer description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare the experiments the claim reads.
    #[must_use]
    pub fn depending_on(mut self, experiments: impl IntoIterator<Item = ExperimentId>) -> Self {
        self.dependencies.extend(experiments);
        self
    }

    pub(crate) fn set_id(&mut self, id: ClaimId) {
        self.id = id;
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> ClaimId {
        self.id
    }

    /// One-line statement.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Longer description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Result of the last check.
    #[must_use]
    pub const fn result(&self) -> ClaimResult {
        self.result
    }

    /// Explanations collected by the last check.
    #[must_use]
    pub fn explanations(&self) -> &[Explanation] {
        &self.explanations
    }

    /// Evaluate the predicate and record the result.
    ///
    /// A predicate that errors or panics yields `Unknown`, with the fault
    /// recorded as an explanation.
    pub fn check(&mut self, lab: &Laboratory) -> ClaimResult {
        self.explanations.clear();
        let mut explanations = Vec::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(lab, &mut explanations)));
        self.result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(claim = %self.id, error = %err, "claim predicate failed");
                explanations.push(Explanation::new(format!("The claim could not be evaluated: {err:#}")));
                ClaimResult::Unknown
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(claim = %self.id, %message, "claim predicate panicked");
                explanations.push(Explanation::new(format!("The claim could not be evaluated: {message}")));
                ClaimResult::Unknown
            }
        };
        self.explanations = explanations;
        debug!(claim = %self.id, result = %self.result, "claim checked");
        self.result
    }

    /// One-step lineage: `Leaf` when `Ok`, otherwise an `Or` over the
    /// explanations, each the conjunction of its objects.
    #[must_use]
    pub fn lineage(&self) -> Provenance {
        if self.result == ClaimResult::Ok {
            return Provenance::Leaf;
        }
        let alternatives: Vec<Provenance> = self
            .explanations
            .iter()
            .filter(|e| !e.objects.is_empty())
            .map(|e| Provenance::all_of(e.objects.iter().cloned()))
            .collect();
        if alternatives.is_empty() {
            Provenance::Unknown
        } else {
            Provenance::Or(alternatives)
        }
    }
}

impl Dependent<ExperimentId> for Claim {
    fn depends_on(&self) -> Vec<ExperimentId> {
        self.dependencies.iter().copied().collect()
    }
}

impl fmt::Debug for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claim")
            .field("id", &self.id)
            .field("statement", &self.statement)
            .field("result", &self.result)
            .field("explanations", &self.explanations.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab() -> Laboratory {
        Laboratory::builder().build().unwrap()
    }

    #[test]
    fn test_result_ordering() {
        assert_eq!(ClaimResult::Ok.worst(ClaimResult::Warning), ClaimResult::Warning);
        assert_eq!(ClaimResult::Unknown.worst(ClaimResult::Fail), ClaimResult::Fail);
        assert_eq!(ClaimResult::Fail.worst(ClaimResult::Unknown), ClaimResult::Fail);
        assert_eq!(ClaimResult::Warning.worst(ClaimResult::Unknown), ClaimResult::Unknown);
    }

    #[test]
    fn test_unchecked_is_unknown() {
        let claim = Claim::new(ClaimId::new(1), "x", |_, _| Ok(ClaimResult::Ok));
        assert_eq!(claim.result(), ClaimResult::Unknown);
    }

    #[test]
    fn test_explanations_cleared_between_checks() {
        let mut claim = Claim::new(ClaimId::new(1), "always fails", |_, out| {
            out.push(Explanation::new("bad").with_object(PartRef::parameter(ExperimentId::new(1), "t")));
            Ok(ClaimResult::Fail)
        });
        let lab = lab();
        claim.check(&lab);
        claim.check(&lab);
        assert_eq!(claim.explanations().len(), 1);
        assert!(matches!(claim.lineage(), Provenance::Or(v) if v.len() == 1));
    }

    #[test]
    fn test_errors_and_panics_are_unknown() {
        let lab = lab();
        let mut erring = Claim::new(ClaimId::new(1), "e", |_, _| Err(anyhow::anyhow!("no data")));
        assert_eq!(erring.check(&lab), ClaimResult::Unknown);
        assert!(erring.explanations()[0].text.contains("no data"));

        let mut panicking = Claim::new(ClaimId::new(2), "p", |_, _| panic!("index out of range"));
        assert_eq!(panicking.check(&lab), ClaimResult::Unknown);
        assert!(panicking.lineage().is_unknown());
    }

    #[test]
    fn test_ok_claim_is_leaf() {
        let mut claim = Claim::new(ClaimId::new(1), "fine", |_, _| Ok(ClaimResult::Ok));
        claim.check(&lab());
        assert_eq!(claim.lineage(), Provenance::Leaf);
    }
}
