//! Error types for Trueno-Lab
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

use crate::claim::ClaimId;
use crate::experiment::ExperimentId;
use crate::table::TableId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Lab error types
#[derive(Error, Debug)]
pub enum Error {
    /// Parameter path could not be parsed
    #[error("Invalid parameter path: {0}\nExpected dotted keys with optional indices, e.g. `a.b[2]`")]
    InvalidPath(String),

    /// Datapoint identifier could not be parsed
    #[error("Invalid datapoint identifier: {0}\nExpected forms: E7, E7:key, E7:key:2, T3, T3:2:0, C1")]
    InvalidDatapoint(String),

    /// Input parameters are write-once
    #[error("Input parameter `{key}` is already set\nInputs are write-once; reset the experiment or use a new point")]
    InputAlreadySet {
        /// Offending key
        key: String,
    },

    /// No experiment with this identifier is registered in the lab
    #[error("Unknown experiment: {0}")]
    UnknownExperiment(ExperimentId),

    /// No table with this identifier is registered in the lab
    #[error("Unknown table: {0}")]
    UnknownTable(TableId),

    /// No claim with this identifier is registered in the lab
    #[error("Unknown claim: {0}")]
    UnknownClaim(ClaimId),

    /// No factory registered for an experiment kind
    #[error("Unknown experiment kind: {0}\nRegister a factory with Laboratory::register_factory()")]
    UnknownKind(String),

    /// A transformation referenced a column that does not exist
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A worker wrote after its run was killed, timed out, interrupted or reset
    #[error("Run of experiment {0} is over\nThe write was discarded; check RunContext::is_cancelled() in long loops")]
    RunInterrupted(ExperimentId),

    /// An experiment with this identifier is already registered
    #[error("Duplicate experiment id: {0}\nAllocate identifiers with Laboratory::next_experiment_id()")]
    DuplicateExperiment(ExperimentId),

    /// `Assistant::run()` is not re-entrant
    #[error("Assistant is already running\nCall stop() and wait for run() to return before starting it again")]
    SchedulerBusy,

    /// The operating system refused to spawn a worker thread
    #[error("Failed to spawn experiment worker: {0}")]
    WorkerSpawn(String),

    /// Lab configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error (table export)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON error (configuration parsing)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
