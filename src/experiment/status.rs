//! Experiment lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an experiment.
///
/// ```text
/// Uninitialized ─(prereqs met)─> Ready ─> Running ─> Done | DoneWarning | Failed | Cancelled
///       │                                    ▲          (Timeout | Killed imposed from outside)
///       └─> RunningPrereq ───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Created; prerequisites not (yet) known to be fulfilled.
    Uninitialized,
    /// Generating prerequisites before execution.
    RunningPrereq,
    /// Prerequisites fulfilled, ready to execute.
    Ready,
    /// Execution body is running.
    Running,
    /// Completed normally.
    Done,
    /// Completed normally but recorded warnings.
    DoneWarning,
    /// Prerequisite or execution failure.
    Failed,
    /// Interrupted (cooperatively) before completion.
    Cancelled,
    /// Exceeded its own timeout on a direct run.
    Timeout,
    /// Killed by the assistant for taking too long.
    Killed,
}

impl Status {
    /// Terminal states: the experiment will not run again until reset.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(
            self,
            Self::Done | Self::DoneWarning | Self::Failed | Self::Cancelled | Self::Timeout | Self::Killed
        )
    }

    /// Terminal states that did not complete normally.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Timeout | Self::Killed)
    }

    /// Completed normally, with or without warnings.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Done | Self::DoneWarning)
    }

    /// Either execution phase is in progress.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::RunningPrereq)
    }

    /// Merge two statuses, keeping the "lowest" one.
    ///
    /// Failures dominate running, which dominates uninitialized, which
    /// dominates ready, which dominates done-with-warnings, which dominates
    /// done. Any failure collapses to `Failed`; either running phase
    /// collapses to `Running`.
    #[must_use]
    pub const fn lowest(self, other: Self) -> Self {
        if self.is_failure() || other.is_failure() {
            return Self::Failed;
        }
        if self.is_running() || other.is_running() {
            return Self::Running;
        }
        if matches!(self, Self::Uninitialized) || matches!(other, Self::Uninitialized) {
            return Self::Uninitialized;
        }
        if matches!(self, Self::Ready) || matches!(other, Self::Ready) {
            return Self::Ready;
        }
        if matches!(self, Self::DoneWarning) || matches!(other, Self::DoneWarning) {
            return Self::DoneWarning;
        }
        Self::Done
    }

    /// Fold [`Status::lowest`] over a collection; `Done` for an empty one.
    pub fn lowest_of(statuses: impl IntoIterator<Item = Self>) -> Self {
        statuses.into_iter().fold(Self::Done, Self::lowest)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::RunningPrereq => "RUNNING_PREREQ",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::DoneWarning => "DONE_WARNING",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::Killed => "KILLED",
        };
        f.write_str(s)
    }
}
