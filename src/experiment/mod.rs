//! Experiments and their lifecycle
//!
//! An [`Experiment`] is a parameterized unit of work. Its behavior lives in
//! an [`ExperimentBody`]; the struct itself owns identity, parameters,
//! timing and a status state machine that may be read from any thread while
//! a worker executes the body.
//!
//! ## Lifecycle
//!
//! ```text
//! status() ──(prereqs met)──> Ready
//! run():  [RunningPrereq: fulfill_prerequisites] ──> Running: execute
//!         ──> Done / DoneWarning / Failed / Cancelled
//! kill() / run_with_timeout(): Killed / Timeout (imposed from outside)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trueno_lab::experiment::{Experiment, ExperimentId, Status};
//!
//! let exp = Experiment::from_fn(ExperimentId::new(1), |ctx| {
//!     let n = ctx.read_i64("n");
//!     ctx.write("square", n * n)?;
//!     Ok(())
//! });
//! exp.write_input("n", 7).unwrap();
//! exp.run();
//! assert_eq!(exp.status(), Status::Done);
//! assert_eq!(exp.read_i64("square"), 49);
//! ```

mod context;
mod factory;
mod registry;
mod status;

pub use context::{CancelToken, RunContext};
pub use factory::ExperimentFactory;
pub use registry::{ExperimentRegistry, IdAllocator};
pub use status::Status;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::provenance::Dependent;
use crate::region::Point;
use crate::value::{ParameterPath, Value};
use crate::{Error, Result};

/// Message recorded when the assistant kills an experiment.
pub const KILLED_MESSAGE: &str =
    "The experiment was interrupted by the lab assistant because it was taking too long";

/// Message recorded when a direct run exceeds its own timeout.
pub const TIMEOUT_MESSAGE: &str = "The experiment exceeded its maximum running time";

/// Message recorded when the body observes cancellation.
pub const CANCELLED_MESSAGE: &str = "The experiment was interrupted";

/// Unique experiment identifier, allocated by the lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentId(u64);

impl ExperimentId {
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

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Outcome signalled by an experiment hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExperimentError {
    /// Unrecoverable condition; the experiment ends `Failed`.
    #[error("{0}")]
    Failed(String),

    /// The body observed cancellation; the experiment ends `Cancelled`.
    #[error("{CANCELLED_MESSAGE}")]
    Interrupted,
}

impl ExperimentError {
    /// Shorthand for [`ExperimentError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<anyhow::Error> for ExperimentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

impl From<Error> for ExperimentError {
    fn from(err: Error) -> Self {
        match err {
            Error::RunInterrupted(_) => Self::Interrupted,
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Behavior of an experiment.
///
/// Only [`execute`](ExperimentBody::execute) is mandatory. Prerequisite
/// hooks model expensive setup (generated files, downloaded data) that
/// survives [`Experiment::reset`] and is only removed by
/// [`Experiment::clean`].
pub trait ExperimentBody: Send + Sync {
    /// Run the experiment, writing outputs through the context.
    ///
    /// # Errors
    ///
    /// [`ExperimentError::Failed`] ends the run `Failed`;
    /// [`ExperimentError::Interrupted`] ends it `Cancelled`.
    fn execute(&self, ctx: &RunContext<'_>) -> std::result::Result<(), ExperimentError>;

    /// Whether prerequisites are already in place.
    fn prerequisites_fulfilled(&self, _experiment: &Experiment) -> bool {
        true
    }

    /// Generate missing prerequisites.
    ///
    /// # Errors
    ///
    /// Same mapping as [`execute`](ExperimentBody::execute).
    fn fulfill_prerequisites(&self, _ctx: &RunContext<'_>) -> std::result::Result<(), ExperimentError> {
        Ok(())
    }

    /// Remove generated prerequisites.
    fn clean_prerequisites(&self, _experiment: &Experiment) {}

    /// Self-reported running time at speed factor 1.0, divided by `speed_factor`.
    fn duration_estimate(&self, _experiment: &Experiment, _speed_factor: f32) -> Duration {
        Duration::ZERO
    }

    /// Free-text description.
    fn description(&self) -> String {
        String::new()
    }
}

/// Adapter turning a closure into an [`ExperimentBody`].
pub struct FnBody<F>(pub F);

impl<F> ExperimentBody for FnBody<F>
where
    F: Fn(&RunContext<'_>) -> std::result::Result<(), ExperimentError> + Send + Sync,
{
    fn execute(&self, ctx: &RunContext<'_>) -> std::result::Result<(), ExperimentError> {
        (self.0)(ctx)
    }
}

/// Identity of the current run; a new run or a reset supersedes it.
#[derive(Debug, Default)]
struct RunSlot {
    generation: u64,
    token: Option<CancelToken>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Timing {
    start: Option<DateTime<Utc>>,
    prereq: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

/// A parameterized unit of work with a lifecycle state machine.
///
/// All mutators take `&self`: experiments are shared as `Arc<Experiment>`
/// between the lab, the assistant and the worker running them. Status and
/// progression are locked independently so that neither read blocks on the
/// other.
pub struct Experiment {
    id: ExperimentId,
    kind: String,
    body: Box<dyn ExperimentBody>,
    status: Mutex<Status>,
    progression: Mutex<f32>,
    inputs: RwLock<BTreeMap<String, Value>>,
    outputs: RwLock<BTreeMap<String, Value>>,
    descriptions: RwLock<BTreeMap<String, String>>,
    timing: Mutex<Timing>,
    warnings: Mutex<Vec<String>>,
    fault: Mutex<Option<String>>,
    dependencies: RwLock<BTreeSet<ExperimentId>>,
    max_duration: Mutex<Option<Duration>>,
    run_slot: Mutex<RunSlot>,
    ran_by: Mutex<Option<String>>,
}

impl Experiment {
    /// Create an experiment with the given behavior.
    pub fn new(id: ExperimentId, body: impl ExperimentBody + 'static) -> Self {
        Self {
            id,
            kind: "experiment".to_string(),
            body: Box::new(body),
            status: Mutex::new(Status::Uninitialized),
            progression: Mutex::new(0.0),
            inputs: RwLock::new(BTreeMap::new()),
            outputs: RwLock::new(BTreeMap::new()),
            descriptions: RwLock::new(BTreeMap::new()),
            timing: Mutex::new(Timing::default()),
            warnings: Mutex::new(Vec::new()),
            fault: Mutex::new(None),
            dependencies: RwLock::new(BTreeSet::new()),
            max_duration: Mutex::new(None),
            run_slot: Mutex::new(RunSlot::default()),
            ran_by: Mutex::new(None),
        }
    }

    /// Create an experiment whose body is a closure.
    pub fn from_fn<F>(id: ExperimentId, f: F) -> Self
    where
        F: Fn(&RunContext<'_>) -> std::result::Result<(), ExperimentError> + Send + Sync + 'static,
    {
        Self::new(id, FnBody(f))
    }

    /// Create an experiment and copy each coordinate of `point` into its inputs.
    pub fn from_point(id: ExperimentId, point: &Point, body: impl ExperimentBody + 'static) -> Self {
        let exp = Self::new(id, body);
        {
            let mut inputs = exp.inputs.write();
            for (dim, value) in point.iter() {
                inputs.insert(dim.to_string(), value.clone());
            }
        }
        exp
    }

    /// Tag the experiment with a kind name (the factory kind, usually).
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Builder-style input assignment (overwrites).
    #[must_use]
    pub fn with_input(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.write().insert(key.into(), value.into());
        self
    }

    /// Builder-style timeout used by the assistant.
    #[must_use]
    pub fn with_max_duration(self, max: Duration) -> Self {
        *self.max_duration.lock() = Some(max);
        self
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> ExperimentId {
        self.id
    }

    /// Kind tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Body description.
    #[must_use]
    pub fn description(&self) -> String {
        self.body.description()
    }

    // ---- status ----------------------------------------------------------

    /// Current status.
    ///
    /// Reading the status of an `Uninitialized` experiment whose
    /// prerequisites are now fulfilled advances it to `Ready`.
    #[must_use]
    pub fn status(&self) -> Status {
        let current = *self.status.lock();
        if current != Status::Uninitialized || !self.body.prerequisites_fulfilled(self) {
            return current;
        }
        let mut status = self.status.lock();
        if *status == Status::Uninitialized {
            *status = Status::Ready;
        }
        *status
    }

    /// Move to `to` only if the current status is one of `from`.
    fn transition(&self, from: &[Status], to: Status) -> bool {
        let mut status = self.status.lock();
        if from.contains(&*status) {
            debug!(experiment = %self.id, from = %*status, to = %to, "status transition");
            *status = to;
            true
        } else {
            false
        }
    }

    /// Impose a terminal status from outside the worker.
    pub(crate) fn terminate(&self, to: Status, message: &str) -> bool {
        let slot = self.run_slot.lock();
        {
            let mut status = self.status.lock();
            if status.is_finished() {
                return false;
            }
            *status = to;
        }
        *self.fault.lock() = Some(message.to_string());
        {
            let now = Utc::now();
            let mut timing = self.timing.lock();
            timing.prereq.get_or_insert(now);
            timing.end.get_or_insert(now);
        }
        if let Some(token) = slot.token.as_ref() {
            token.cancel();
        }
        true
    }

    /// Progress in `[0, 1]`.
    ///
    /// Failed states read as 0, completed states as 1, anything else as the
    /// last value reported by the body.
    #[must_use]
    pub fn progression(&self) -> f32 {
        let status = self.status();
        if status.is_failure() {
            0.0
        } else if status.is_success() {
            1.0
        } else {
            *self.progression.lock()
        }
    }

    pub(crate) fn set_progression(&self, ratio: f32) {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        *self.progression.lock() = ratio;
    }

    // ---- execution -------------------------------------------------------

    /// Run the experiment on the calling thread.
    ///
    /// No-op if the experiment is finished or already running elsewhere.
    /// Panics raised by the body are caught and recorded as `Failed`.
    /// Once the run is killed, timed out, reset or superseded, nothing the
    /// worker does afterwards is applied to the experiment.
    pub fn run(&self) {
        let Some((generation, token)) = self.begin_run() else {
            return;
        };
        let ctx = RunContext::new(self, token, generation);
        info!(experiment = %self.id, kind = %self.kind, "experiment started");

        if !self.body.prerequisites_fulfilled(self) {
            if !self.settle(generation, &[Status::Uninitialized, Status::Ready], Status::RunningPrereq) {
                self.release_run(generation);
                return;
            }
            if let Err(err) = guarded(|| self.body.fulfill_prerequisites(&ctx)) {
                self.fail_from(generation, Status::RunningPrereq, &err, "prerequisites");
                self.release_run(generation);
                return;
            }
        }

        if !self.settle(
            generation,
            &[Status::Uninitialized, Status::Ready, Status::RunningPrereq],
            Status::Running,
        ) {
            self.release_run(generation);
            return;
        }

        let outcome = guarded(|| self.body.execute(&ctx));
        match outcome {
            Ok(()) => {
                let to = if self.has_warnings() { Status::DoneWarning } else { Status::Done };
                if self.settle(generation, &[Status::Running], to) {
                    info!(experiment = %self.id, status = %to, "experiment finished");
                } else {
                    debug!(experiment = %self.id, "late completion ignored");
                }
            }
            Err(err) => self.fail_from(generation, Status::Running, &err, "execution"),
        }
        self.release_run(generation);
    }

    /// Claim a new run generation unless the experiment is finished or busy.
    fn begin_run(&self) -> Option<(u64, CancelToken)> {
        // advances Uninitialized to Ready outside the slot lock
        let _ = self.status();
        let mut slot = self.run_slot.lock();
        let status = *self.status.lock();
        if status.is_finished() || status.is_running() {
            debug!(experiment = %self.id, %status, "run skipped");
            return None;
        }
        if let Some(previous) = slot.token.take() {
            previous.cancel();
        }
        slot.generation += 1;
        let token = CancelToken::new();
        slot.token = Some(token.clone());
        *self.timing.lock() = Timing {
            start: Some(Utc::now()),
            ..Timing::default()
        };
        Some((slot.generation, token))
    }

    /// Apply a status transition on behalf of run `generation`.
    ///
    /// Refused once a newer run or a reset has taken over, so a stale worker
    /// can neither finish nor fail the current run.
    fn settle(&self, generation: u64, from: &[Status], to: Status) -> bool {
        let slot = self.run_slot.lock();
        if slot.generation != generation || !self.transition(from, to) {
            return false;
        }
        let now = Utc::now();
        let mut timing = self.timing.lock();
        match to {
            Status::RunningPrereq => {}
            Status::Running => {
                timing.prereq.get_or_insert(now);
            }
            _ => {
                timing.end.get_or_insert(now);
                if to.is_success() {
                    *self.progression.lock() = 1.0;
                }
            }
        }
        true
    }

    /// Run `f` only while run `generation` is live: current, not cancelled
    /// and still executing. The slot lock is held across `f`, so a kill or
    /// reset is ordered entirely before or after it.
    pub(crate) fn if_live<R>(&self, generation: u64, token: &CancelToken, f: impl FnOnce() -> R) -> Option<R> {
        let slot = self.run_slot.lock();
        let live = slot.generation == generation && !token.is_cancelled() && self.status.lock().is_running();
        if !live {
            return None;
        }
        let out = f();
        drop(slot);
        Some(out)
    }

    fn fail_from(&self, generation: u64, from: Status, err: &ExperimentError, stage: &str) {
        let to = match err {
            ExperimentError::Failed(_) => Status::Failed,
            ExperimentError::Interrupted => Status::Cancelled,
        };
        if self.settle(generation, &[from], to) {
            *self.fault.lock() = Some(err.to_string());
            warn!(experiment = %self.id, stage, status = %to, error = %err, "experiment did not complete");
        }
    }

    fn release_run(&self, generation: u64) {
        let mut slot = self.run_slot.lock();
        if slot.generation == generation {
            slot.token = None;
        }
    }

    /// Run on a dedicated worker, imposing `Timeout` if it exceeds `timeout`.
    ///
    /// Returns the status observed once the worker completes or the
    /// deadline passes. A worker still running after the deadline is left
    /// to observe cancellation; its late completion has no effect.
    pub fn run_with_timeout(self: &Arc<Self>, timeout: Duration) -> Status {
        let (tx, rx) = mpsc::channel();
        let experiment = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("experiment-{}", self.id.as_raw()))
            .spawn(move || {
                experiment.run();
                let _ = tx.send(());
            });
        if let Err(err) = spawned {
            self.terminate(Status::Failed, &Error::WorkerSpawn(err.to_string()).to_string());
            return self.status();
        }
        if let Err(mpsc::RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
            if self.terminate(Status::Timeout, TIMEOUT_MESSAGE) {
                warn!(experiment = %self.id, ?timeout, "experiment timed out");
            }
        }
        self.status()
    }

    /// Forcibly end the experiment as `Killed`.
    ///
    /// Applies the status override immediately and signals cancellation to
    /// the worker; does not wait for it. Returns `false` if the experiment
    /// had already finished.
    pub fn kill(&self) -> bool {
        let killed = self.terminate(Status::Killed, KILLED_MESSAGE);
        if killed {
            warn!(experiment = %self.id, "experiment killed");
        }
        killed
    }

    /// Ask a running body to stop at its next checkpoint.
    pub fn interrupt(&self) {
        if let Some(token) = self.run_slot.lock().token.as_ref() {
            token.cancel();
        }
    }

    /// Clear outputs, timing, warnings and errors; back to `Uninitialized`.
    ///
    /// A run still in flight is cancelled and detached: whatever its worker
    /// does afterwards is discarded. Generated prerequisites are kept; see
    /// [`Experiment::clean`].
    pub fn reset(&self) {
        {
            let mut slot = self.run_slot.lock();
            slot.generation += 1;
            if let Some(token) = slot.token.take() {
                token.cancel();
            }
        }
        self.outputs.write().clear();
        *self.timing.lock() = Timing::default();
        self.warnings.lock().clear();
        *self.fault.lock() = None;
        *self.progression.lock() = 0.0;
        *self.status.lock() = Status::Uninitialized;
        debug!(experiment = %self.id, "experiment reset");
    }

    /// Remove generated prerequisites, then [`reset`](Experiment::reset).
    pub fn clean(&self) {
        self.body.clean_prerequisites(self);
        self.reset();
    }

    /// Timeout applied by the assistant, if any.
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        *self.max_duration.lock()
    }

    /// Change the assistant timeout.
    pub fn set_max_duration(&self, max: Option<Duration>) {
        *self.max_duration.lock() = max;
    }

    /// Name of the assistant that queued the experiment.
    #[must_use]
    pub fn who_ran(&self) -> Option<String> {
        self.ran_by.lock().clone()
    }

    pub(crate) fn set_who_ran(&self, name: &str) {
        *self.ran_by.lock() = Some(name.to_string());
    }

    /// Self-reported running time scaled by `speed_factor`.
    #[must_use]
    pub fn duration_estimate(&self, speed_factor: f32) -> Duration {
        self.body.duration_estimate(self, speed_factor)
    }

    // ---- timing, warnings, errors ---------------------------------------

    /// When the last run started.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timing.lock().start
    }

    /// When prerequisites were in place for the last run.
    #[must_use]
    pub fn prereq_time(&self) -> Option<DateTime<Utc>> {
        self.timing.lock().prereq
    }

    /// When the last run ended.
    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.timing.lock().end
    }

    /// Time from start to end (or to now, while running).
    #[must_use]
    pub fn total_duration(&self) -> Option<Duration> {
        let timing = *self.timing.lock();
        let start = timing.start?;
        let end = timing.end.unwrap_or_else(Utc::now);
        (end - start).to_std().ok()
    }

    pub(crate) fn push_warning(&self, message: String) {
        warn!(experiment = %self.id, %message, "experiment warning");
        self.warnings.lock().push(message);
    }

    /// Warnings recorded during the last run.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    /// Check whether the last run recorded warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.lock().is_empty()
    }

    /// Failure, cancellation or kill message of the last run.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.fault.lock().clone()
    }

    // ---- parameters ------------------------------------------------------

    /// Set an input parameter.
    ///
    /// # Errors
    ///
    /// [`Error::InputAlreadySet`] if the key already holds a different value.
    pub fn write_input(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let mut inputs = self.inputs.write();
        match inputs.get(&key) {
            Some(existing) if *existing != value => Err(Error::InputAlreadySet { key }),
            Some(_) => Ok(()),
            None => {
                inputs.insert(key, value);
                Ok(())
            }
        }
    }

    /// Write an output at a path such as `times[2]` or `stats.mean`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPath`] if the path does not parse or cannot be
    /// written into the current output tree.
    pub fn write(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.write_path(&ParameterPath::parse(path)?, value.into())
    }

    /// [`write`](Experiment::write) with a pre-parsed path.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPath`] if the path cannot be written.
    pub fn write_path(&self, path: &ParameterPath, value: Value) -> Result<()> {
        let head = path
            .head()
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        let mut outputs = self.outputs.write();
        match path.tail() {
            None => {
                outputs.insert(head.to_string(), value);
            }
            Some(rest) => outputs.entry(head.to_string()).or_default().set_path(&rest, value)?,
        }
        Ok(())
    }

    /// Read a parameter, inputs first, then outputs.
    ///
    /// Fails softly: malformed or missing paths yield `None`.
    #[must_use]
    pub fn read(&self, path: &str) -> Option<Value> {
        ParameterPath::parse(path)
            .ok()
            .and_then(|p| self.read_path(&p))
    }

    /// [`read`](Experiment::read) with a pre-parsed path.
    #[must_use]
    pub fn read_path(&self, path: &ParameterPath) -> Option<Value> {
        lookup(&self.inputs.read(), path).or_else(|| lookup(&self.outputs.read(), path))
    }

    /// Numeric parameter, `0.0` when absent or not a number.
    #[must_use]
    pub fn read_f64(&self, path: &str) -> f64 {
        self.read(path).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    /// Integer parameter, `0` when absent or not an integer.
    #[must_use]
    pub fn read_i64(&self, path: &str) -> i64 {
        self.read(path).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    /// Parameter rendered as text, empty when absent.
    #[must_use]
    pub fn read_string(&self, path: &str) -> String {
        match self.read(path) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        }
    }

    /// Snapshot of the inputs.
    #[must_use]
    pub fn inputs(&self) -> BTreeMap<String, Value> {
        self.inputs.read().clone()
    }

    /// Snapshot of the outputs.
    #[must_use]
    pub fn outputs(&self) -> BTreeMap<String, Value> {
        self.outputs.read().clone()
    }

    /// Inputs and outputs merged; inputs win on a key clash.
    #[must_use]
    pub fn all_parameters(&self) -> BTreeMap<String, Value> {
        let mut all = self.outputs();
        all.extend(self.inputs());
        all
    }

    /// Input parameter names.
    #[must_use]
    pub fn input_keys(&self) -> Vec<String> {
        self.inputs.read().keys().cloned().collect()
    }

    /// Output parameter names.
    #[must_use]
    pub fn output_keys(&self) -> Vec<String> {
        self.outputs.read().keys().cloned().collect()
    }

    /// Number of output values produced.
    #[must_use]
    pub fn count_data_points(&self) -> usize {
        self.outputs.read().len()
    }

    /// Attach a human-readable description to a parameter.
    pub fn describe(&self, key: impl Into<String>, text: impl Into<String>) {
        self.descriptions.write().insert(key.into(), text.into());
    }

    /// Description of a parameter.
    #[must_use]
    pub fn description_of(&self, key: &str) -> Option<String> {
        self.descriptions.read().get(key).cloned()
    }

    // ---- dependencies ----------------------------------------------------

    /// Declare a logical dependency on another experiment.
    pub fn add_dependency(&self, other: ExperimentId) {
        self.dependencies.write().insert(other);
    }

    /// Serializable view of the experiment's current state.
    #[must_use]
    pub fn snapshot(&self) -> ExperimentSnapshot {
        let timing = *self.timing.lock();
        ExperimentSnapshot {
            id: self.id,
            kind: self.kind.clone(),
            status: self.status(),
            progression: self.progression(),
            started_at: timing.start,
            prereq_at: timing.prereq,
            ended_at: timing.end,
            inputs: self.inputs(),
            outputs: self.outputs(),
            warnings: self.warnings(),
            error: self.error_message(),
        }
    }
}

fn lookup(map: &BTreeMap<String, Value>, path: &ParameterPath) -> Option<Value> {
    let root = map.get(path.head()?)?;
    match path.tail() {
        None => Some(root.clone()),
        Some(rest) => root.get_path(&rest).cloned(),
    }
}

/// Run a hook, turning a panic into [`ExperimentError::Failed`].
fn guarded<F>(hook: F) -> std::result::Result<(), ExperimentError>
where
    F: FnOnce() -> std::result::Result<(), ExperimentError>,
{
    panic::catch_unwind(AssertUnwindSafe(hook))
        .unwrap_or_else(|payload| Err(ExperimentError::Failed(panic_message(payload.as_ref()))))
}

/// Text carried by a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked with a non-string payload".to_string())
}

impl Dependent<ExperimentId> for Experiment {
    fn depends_on(&self) -> Vec<ExperimentId> {
        self.dependencies.read().iter().copied().collect()
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &*self.status.lock())
            .field("inputs", &*self.inputs.read())
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of an experiment, for front ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSnapshot {
    /// Identifier
    pub id: ExperimentId,
    /// Kind tag
    pub kind: String,
    /// Status at snapshot time
    pub status: Status,
    /// Progress in `[0, 1]`
    pub progression: f32,
    /// Start of the last run
    pub started_at: Option<DateTime<Utc>>,
    /// Prerequisites in place
    pub prereq_at: Option<DateTime<Utc>>,
    /// End of the last run
    pub ended_at: Option<DateTime<Utc>>,
    /// Input parameters
    pub inputs: BTreeMap<String, Value>,
    /// Output parameters
    pub outputs: BTreeMap<String, Value>,
    /// Warnings
    pub warnings: Vec<String>,
    /// Error message
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn square(id: u64) -> Experiment {
        Experiment::from_fn(ExperimentId::new(id), |ctx| {
            let n = ctx.read_i64("n");
            ctx.set_progression(0.5);
            ctx.write("square", n * n)?;
            Ok(())
        })
        .with_input("n", 4)
    }

    #[test]
    fn test_lazy_ready_transition() {
        let exp = square(1);
        assert_eq!(exp.status(), Status::Ready);
    }

    #[test]
    fn test_run_to_done() {
        let exp = square(1);
        exp.run();
        assert_eq!(exp.status(), Status::Done);
        assert_eq!(exp.read_i64("square"), 16);
        assert!((exp.progression() - 1.0).abs() < f32::EPSILON);
        assert!(exp.start_time().is_some());
        assert!(exp.prereq_time().is_some());
        assert!(exp.end_time().is_some());
        assert!(exp.error_message().is_none());
    }

    #[test]
    fn test_run_is_noop_when_finished() {
        let exp = square(1);
        exp.run();
        let end = exp.end_time();
        exp.run();
        assert_eq!(exp.end_time(), end);
    }

    #[test]
    fn test_warning_escalates_done() {
        let exp = Experiment::from_fn(ExperimentId::new(2), |ctx| {
            ctx.add_warning("noisy measurement");
            Ok(())
        });
        exp.run();
        assert_eq!(exp.status(), Status::DoneWarning);
        assert_eq!(exp.warnings(), vec!["noisy measurement".to_string()]);
    }

    #[test]
    fn test_failure_records_message() {
        let exp = Experiment::from_fn(ExperimentId::new(3), |_| Err(ExperimentError::failed("boom")));
        exp.run();
        assert_eq!(exp.status(), Status::Failed);
        assert_eq!(exp.error_message().as_deref(), Some("boom"));
        assert!(exp.progression().abs() < f32::EPSILON);
    }

    #[test]
    fn test_panic_becomes_failed() {
        let exp = Experiment::from_fn(ExperimentId::new(4), |_| panic!("kaboom"));
        exp.run();
        assert_eq!(exp.status(), Status::Failed);
        assert!(exp.error_message().unwrap().contains("kaboom"));
    }

    #[test]
    fn test_anyhow_error_converts() {
        let exp = Experiment::from_fn(ExperimentId::new(5), |_| {
            Err(anyhow::anyhow!("disk full").context("writing trace").into())
        });
        exp.run();
        assert_eq!(exp.status(), Status::Failed);
        assert!(exp.error_message().unwrap().contains("disk full"));
    }

    struct NeedsSetup {
        ready: AtomicBool,
        fail: bool,
    }

    impl ExperimentBody for NeedsSetup {
        fn execute(&self, ctx: &RunContext<'_>) -> std::result::Result<(), ExperimentError> {
            ctx.write("ran", true)?;
            Ok(())
        }

        fn prerequisites_fulfilled(&self, _experiment: &Experiment) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn fulfill_prerequisites(&self, _ctx: &RunContext<'_>) -> std::result::Result<(), ExperimentError> {
            if self.fail {
                return Err(ExperimentError::failed("cannot generate input file"));
            }
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn clean_prerequisites(&self, _experiment: &Experiment) {
            self.ready.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_prerequisites_generated_then_run() {
        let exp = Experiment::new(
            ExperimentId::new(6),
            NeedsSetup {
                ready: AtomicBool::new(false),
                fail: false,
            },
        );
        assert_eq!(exp.status(), Status::Uninitialized);
        exp.run();
        assert_eq!(exp.status(), Status::Done);
        assert_eq!(exp.read("ran"), Some(Value::Bool(true)));

        exp.reset();
        assert_eq!(exp.status(), Status::Ready, "reset keeps prerequisites");
        exp.clean();
        assert_eq!(exp.status(), Status::Uninitialized);
    }

    #[test]
    fn test_prerequisite_failure_is_terminal() {
        let exp = Experiment::new(
            ExperimentId::new(7),
            NeedsSetup {
                ready: AtomicBool::new(false),
                fail: true,
            },
        );
        exp.run();
        assert_eq!(exp.status(), Status::Failed);
        assert!(exp.read("ran").is_none());
        assert!(exp.prereq_time().is_none());
    }

    #[test]
    fn test_reset_clears_outputs() {
        let exp = square(8);
        exp.run();
        exp.reset();
        assert!(exp.outputs().is_empty());
        assert!(exp.start_time().is_none());
        assert_eq!(exp.status(), Status::Ready);
        assert_eq!(exp.read_i64("n"), 4, "inputs survive reset");
    }

    #[test]
    fn test_write_input_is_write_once() {
        let exp = square(9);
        assert!(exp.write_input("n", 4).is_ok());
        assert!(matches!(
            exp.write_input("n", 5),
            Err(Error::InputAlreadySet { .. })
        ));
    }

    #[test]
    fn test_nested_output_paths() {
        let exp = square(10);
        exp.write("times[0]", 1.5).unwrap();
        exp.write("times[1]", 2.5).unwrap();
        exp.write("stats.mean", 2.0).unwrap();
        assert!((exp.read_f64("times[1]") - 2.5).abs() < f64::EPSILON);
        assert!((exp.read_f64("stats.mean") - 2.0).abs() < f64::EPSILON);
        assert!(exp.read("times[7]").is_none());
        assert!(exp.read("times[").is_none());
        assert_eq!(exp.count_data_points(), 2);
        assert_eq!(exp.read_string("missing"), "");
    }

    #[test]
    fn test_kill_overrides_status() {
        let exp = square(11);
        assert!(exp.kill());
        assert_eq!(exp.status(), Status::Killed);
        assert_eq!(exp.error_message().as_deref(), Some(KILLED_MESSAGE));
        assert!(!exp.kill(), "already finished");
    }

    #[test]
    fn test_run_with_timeout() {
        let exp = Arc::new(Experiment::from_fn(ExperimentId::new(12), |ctx| {
            ctx.sleep(Duration::from_secs(5))?;
            Ok(())
        }));
        let status = exp.run_with_timeout(Duration::from_millis(50));
        assert_eq!(status, Status::Timeout);
        assert!(exp.end_time().is_some());
    }

    #[test]
    fn test_dependencies() {
        let exp = square(13);
        exp.add_dependency(ExperimentId::new(2));
        exp.add_dependency(ExperimentId::new(1));
        exp.add_dependency(ExperimentId::new(2));
        assert_eq!(exp.depends_on(), vec![ExperimentId::new(1), ExperimentId::new(2)]);
    }

    #[test]
    fn test_snapshot_serializes() {
        let exp = square(14);
        exp.run();
        let json = serde_json::to_string(&exp.snapshot()).unwrap();
        assert!(json.contains("\"Done\""));
        assert!(json.contains("square"));
    }
}
