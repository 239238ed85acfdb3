//! Execution context handed to experiment hooks
//!
//! Cancellation is cooperative: the body polls [`RunContext::checkpoint`]
//! or sleeps through [`RunContext::sleep`], both of which return
//! [`ExperimentError::Interrupted`] once the run's token fires.
//!
//! Writes made through a [`RunContext`] only land while its run is live.
//! After a kill, timeout, interrupt or reset they are discarded, so a worker
//! that outlives its run cannot touch the experiment.

use parking_lot::{Condvar, Mutex};
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Experiment, ExperimentError};
use crate::value::{ParameterPath, Value};
use crate::Error;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// Shared cancellation flag for one run of an experiment.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Create a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token and wake every sleeper.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.wakeup.notify_all();
    }

    /// Check whether the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Block for up to `duration`; returns `true` if the token fired.
    #[must_use]
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            if self
                .state
                .wakeup
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }
}

/// View of a running experiment, passed to its hooks.
///
/// Dereferences to the [`Experiment`] so hooks can `read` inputs and
/// `write` outputs directly.
pub struct RunContext<'a> {
    experiment: &'a Experiment,
    token: CancelToken,
    generation: u64,
}

impl<'a> RunContext<'a> {
    pub(crate) const fn new(experiment: &'a Experiment, token: CancelToken, generation: u64) -> Self {
        Self {
            experiment,
            token,
            generation,
        }
    }

    fn live<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        self.experiment.if_live(self.generation, &self.token, f)
    }

    /// Report progress in `[0, 1]` (clamped). Ignored once the run is over.
    pub fn set_progression(&self, ratio: f32) {
        self.live(|| self.experiment.set_progression(ratio));
    }

    /// Record a non-fatal warning; a normal completion becomes `DoneWarning`.
    pub fn add_warning(&self, message: impl Into<String>) {
        let message = message.into();
        self.live(|| self.experiment.push_warning(message));
    }

    /// Write an output of the running experiment.
    ///
    /// # Errors
    ///
    /// [`Error::RunInterrupted`] once the run was killed, timed out,
    /// interrupted or reset (the value is discarded), or
    /// [`Error::InvalidPath`] as for [`Experiment::write`].
    pub fn write(&self, path: &str, value: impl Into<Value>) -> crate::Result<()> {
        self.write_path(&ParameterPath::parse(path)?, value.into())
    }

    /// [`write`](RunContext::write) with a pre-parsed path.
    ///
    /// # Errors
    ///
    /// Same as [`write`](RunContext::write).
    pub fn write_path(&self, path: &ParameterPath, value: Value) -> crate::Result<()> {
        self.live(|| self.experiment.write_path(path, value))
            .unwrap_or_else(|| Err(Error::RunInterrupted(self.experiment.id())))
    }

    /// Set an input of the running experiment (e.g. a generated seed).
    ///
    /// # Errors
    ///
    /// [`Error::RunInterrupted`] once the run is over, or
    /// [`Error::InputAlreadySet`] as for [`Experiment::write_input`].
    pub fn write_input(&self, key: impl Into<String>, value: impl Into<Value>) -> crate::Result<()> {
        let (key, value) = (key.into(), value.into());
        self.live(|| self.experiment.write_input(key, value))
            .unwrap_or_else(|| Err(Error::RunInterrupted(self.experiment.id())))
    }

    /// Check whether the run has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Return early if the run has been asked to stop.
    ///
    /// # Errors
    ///
    /// [`ExperimentError::Interrupted`] once cancelled.
    pub fn checkpoint(&self) -> Result<(), ExperimentError> {
        if self.token.is_cancelled() {
            return Err(ExperimentError::Interrupted);
        }
        Ok(())
    }

    /// Sleep, waking early on cancellation.
    ///
    /// # Errors
    ///
    /// [`ExperimentError::Interrupted`] if cancelled while sleeping.
    pub fn sleep(&self, duration: Duration) -> Result<(), ExperimentError> {
        if self.token.wait(duration) {
            return Err(ExperimentError::Interrupted);
        }
        Ok(())
    }

    /// The run's cancellation token (e.g. to hand to helper threads).
    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl Deref for RunContext<'_> {
    type Target = Experiment;

    fn deref(&self) -> &Self::Target {
        self.experiment
    }
}
