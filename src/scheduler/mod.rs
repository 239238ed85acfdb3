//! Lab assistant: sequential single-flight experiment runner
//!
//! The assistant owns a FIFO queue of experiments and executes them one at
//! a time. Each experiment runs on its own worker thread; the supervisor
//! loop waits on a completion channel with a poll-interval timeout so it can
//! observe `stop()` and per-experiment timeouts while the body runs.
//!
//! A timed-out experiment is marked `Killed` and dequeued immediately; the
//! worker is signalled to cancel but never joined, so a hung body cannot
//! block the queue.
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_lab::experiment::{Experiment, ExperimentId, Status};
//! use trueno_lab::scheduler::Assistant;
//!
//! let assistant = Assistant::new("George Jetson");
//! let exp = Arc::new(Experiment::from_fn(ExperimentId::new(1), |_| Ok(())));
//! assistant.queue(Arc::clone(&exp));
//! assistant.run().unwrap();
//! assert_eq!(exp.status(), Status::Done);
//! assert!(!assistant.is_queued(exp.id()));
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::LabConfig;
use crate::experiment::{Experiment, ExperimentId, Status};
use crate::{Error, Result};

/// Default supervisor poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct RunClock {
    started: Option<Instant>,
    accumulated: Duration,
}

impl RunClock {
    fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    fn total(&self) -> Duration {
        self.accumulated + self.started.map_or(Duration::ZERO, |s| s.elapsed())
    }
}

/// How one supervised execution ended.
enum Supervised {
    Completed,
    Killed,
    Stopped,
}

/// Sequential experiment runner.
#[derive(Debug)]
pub struct Assistant {
    name: String,
    queue: Mutex<VecDeque<Arc<Experiment>>>,
    running: AtomicBool,
    active: AtomicBool,
    poll_interval: Duration,
    speed_factor: f32,
    default_max_duration: Option<Duration>,
    clock: Mutex<RunClock>,
    current: Mutex<Option<Arc<Experiment>>>,
}

impl Assistant {
    /// Assistant with the default poll interval and speed factor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            active: AtomicBool::new(false),
            poll_interval: DEFAULT_POLL_INTERVAL,
            speed_factor: 1.0,
            default_max_duration: None,
            clock: Mutex::new(RunClock::default()),
            current: Mutex::new(None),
        }
    }

    /// Assistant configured from a [`LabConfig`].
    #[must_use]
    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(config.assistant_name.clone())
            .with_poll_interval(config.poll_interval())
            .with_speed_factor(config.speed_factor)
            .with_default_max_duration(config.default_max_duration())
    }

    /// Set the supervisor poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the environment speed factor used by [`time_estimate`](Assistant::time_estimate).
    #[must_use]
    pub const fn with_speed_factor(mut self, factor: f32) -> Self {
        self.speed_factor = factor;
        self
    }

    /// Timeout for experiments that do not declare their own.
    #[must_use]
    pub const fn with_default_max_duration(mut self, max: Option<Duration>) -> Self {
        self.default_max_duration = max;
        self
    }

    /// Assistant name, recorded on every experiment it queues.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Supervisor poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    // ---- queue -----------------------------------------------------------

    /// Append an experiment; returns `false` if it was already queued.
    pub fn queue(&self, experiment: Arc<Experiment>) -> bool {
        let mut queue = self.queue.lock();
        if queue.iter().any(|e| e.id() == experiment.id()) {
            return false;
        }
        experiment.set_who_ran(&self.name);
        debug!(assistant = %self.name, experiment = %experiment.id(), "queued");
        queue.push_back(experiment);
        true
    }

    /// Append several experiments; returns how many were newly queued.
    pub fn queue_all(&self, experiments: impl IntoIterator<Item = Arc<Experiment>>) -> usize {
        experiments.into_iter().filter(|e| self.queue(Arc::clone(e))).count()
    }

    /// Remove an experiment from the queue; returns `false` if absent.
    pub fn unqueue(&self, id: ExperimentId) -> bool {
        let mut queue = self.queue.lock();
        let Some(pos) = queue.iter().position(|e| e.id() == id) else {
            return false;
        };
        queue.remove(pos);
        debug!(assistant = %self.name, experiment = %id, "unqueued");
        true
    }

    /// Check whether an experiment is waiting (or running) in the queue.
    #[must_use]
    pub fn is_queued(&self, id: ExperimentId) -> bool {
        self.queue.lock().iter().any(|e| e.id() == id)
    }

    /// Identifiers in queue order.
    #[must_use]
    pub fn current_queue(&self) -> Vec<ExperimentId> {
        self.queue.lock().iter().map(|e| e.id()).collect()
    }

    /// Stop and empty the queue.
    pub fn clear(&self) {
        self.stop();
        self.queue.lock().clear();
    }

    /// Approximate time to drain the queue.
    ///
    /// Sums every experiment's self-reported estimate at the configured
    /// speed factor, plus one poll interval of overhead per experiment.
    #[must_use]
    pub fn time_estimate(&self) -> Duration {
        let queued: Vec<Arc<Experiment>> = self.queue.lock().iter().cloned().collect();
        queued
            .iter()
            .filter(|e| !e.status().is_finished())
            .map(|e| e.duration_estimate(self.speed_factor) + self.poll_interval)
            .sum()
    }

    // ---- control ---------------------------------------------------------

    /// Check whether the run loop is (still) meant to be executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the run loop to stop after its next poll.
    ///
    /// The in-flight experiment, if any, is interrupted (not killed) before
    /// [`run`](Assistant::run) returns.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(assistant = %self.name, "assistant stopping");
        }
        self.clock.lock().stop();
    }

    /// Cumulative time spent running, across every `run` call.
    #[must_use]
    pub fn running_time(&self) -> Duration {
        self.clock.lock().total()
    }

    /// Experiment currently being executed.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Experiment>> {
        self.current.lock().clone()
    }

    /// Drain the queue on the calling thread.
    ///
    /// Returns once the queue is empty or [`stop`](Assistant::stop) is
    /// observed.
    ///
    /// # Errors
    ///
    /// [`Error::SchedulerBusy`] if another `run` is in progress.
    pub fn run(&self) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::SchedulerBusy);
        }
        self.running.store(true, Ordering::SeqCst);
        self.clock.lock().start();
        info!(assistant = %self.name, queued = self.queue.lock().len(), "assistant started");

        while self.is_running() {
            let head = self.queue.lock().front().cloned();
            let Some(head) = head else {
                self.running.store(false, Ordering::SeqCst);
                self.clock.lock().stop();
                break;
            };
            let status = head.status();
            if status.is_finished() || status.is_running() {
                debug!(experiment = %head.id(), %status, "dequeuing experiment that was not started here");
                self.unqueue(head.id());
                continue;
            }
            match self.supervise(&head) {
                Supervised::Completed | Supervised::Killed => {
                    self.unqueue(head.id());
                }
                Supervised::Stopped => break,
            }
        }

        info!(assistant = %self.name, remaining = self.queue.lock().len(), "assistant idle");
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn supervise(&self, experiment: &Arc<Experiment>) -> Supervised {
        let id = experiment.id();
        let (done_tx, done_rx) = mpsc::channel();
        let worker = Arc::clone(experiment);
        let spawned = thread::Builder::new()
            .name(format!("lab-worker-{}", id.as_raw()))
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            });
        if let Err(err) = spawned {
            let err = Error::WorkerSpawn(err.to_string());
            warn!(experiment = %id, error = %err, "cannot start experiment");
            experiment.terminate(Status::Failed, &err.to_string());
            return Supervised::Completed;
        }

        *self.current.lock() = Some(Arc::clone(experiment));
        let started = Instant::now();
        let max_duration = experiment.max_duration().or(self.default_max_duration);
        let outcome = loop {
            match done_rx.recv_timeout(self.poll_interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break Supervised::Completed,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if !self.is_running() {
                        experiment.interrupt();
                        break Supervised::Stopped;
                    }
                    if max_duration.is_some_and(|max| started.elapsed() > max) {
                        experiment.kill();
                        warn!(assistant = %self.name, experiment = %id, "killed after exceeding its maximum duration");
                        break Supervised::Killed;
                    }
                }
            }
        };
        *self.current.lock() = None;
        outcome
    }

    /// Run the loop on a background thread.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerSpawn`] if the thread cannot be created.
    pub fn run_in_background(self: &Arc<Self>) -> Result<JoinHandle<Result<()>>> {
        let assistant = Arc::clone(self);
        thread::Builder::new()
            .name(format!("assistant-{}", self.name))
            .spawn(move || assistant.run())
            .map_err(|e| Error::WorkerSpawn(e.to_string()))
    }

    /// Run the loop from async code without blocking the executor.
    ///
    /// # Errors
    ///
    /// [`Error::SchedulerBusy`] if another run is in progress, or
    /// [`Error::Other`] if the blocking task panicked.
    #[cfg(feature = "tokio")]
    pub async fn run_async(self: Arc<Self>) -> Result<()> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .map_err(|e| Error::Other(format!("assistant task failed: {e}")))?
    }
}

impl Default for Assistant {
    fn default() -> Self {
        Self::from_config(&LabConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentError;

    fn fast() -> Assistant {
        Assistant::new("test").with_poll_interval(Duration::from_millis(10))
    }

    fn noop(id: u64) -> Arc<Experiment> {
        Arc::new(Experiment::from_fn(ExperimentId::new(id), |_| Ok(())))
    }

    #[test]
    fn test_queue_skips_duplicates() {
        let assistant = fast();
        assert!(assistant.queue(noop(1)));
        assert!(!assistant.queue(noop(1)));
        assert_eq!(assistant.current_queue(), vec![ExperimentId::new(1)]);
    }

    #[test]
    fn test_run_drains_queue() {
        let assistant = fast();
        let exps: Vec<_> = (1..=3).map(noop).collect();
        assert_eq!(assistant.queue_all(exps.iter().cloned()), 3);
        assistant.run().unwrap();
        assert!(exps.iter().all(|e| e.status() == Status::Done));
        assert!(assistant.current_queue().is_empty());
        assert!(!assistant.is_running());
        assert_eq!(exps[0].who_ran().as_deref(), Some("test"));
    }

    #[test]
    fn test_finished_head_dequeued_without_running() {
        let assistant = fast();
        let exp = noop(1);
        exp.run();
        let end = exp.end_time();
        assistant.queue(Arc::clone(&exp));
        assistant.run().unwrap();
        assert_eq!(exp.end_time(), end);
        assert!(!assistant.is_queued(exp.id()));
    }

    #[test]
    fn test_timeout_kills() {
        let assistant = fast();
        let exp = Arc::new(
            Experiment::from_fn(ExperimentId::new(1), |ctx| {
                ctx.sleep(Duration::from_secs(5))?;
                Ok(())
            })
            .with_max_duration(Duration::from_millis(30)),
        );
        assistant.queue(Arc::clone(&exp));
        let started = Instant::now();
        assistant.run().unwrap();
        assert_eq!(exp.status(), Status::Killed);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(assistant.current_queue().is_empty());
    }

    #[test]
    fn test_failure_does_not_stop_loop() {
        let assistant = fast();
        let bad = Arc::new(Experiment::from_fn(ExperimentId::new(1), |_| {
            Err(ExperimentError::failed("bad input"))
        }));
        let good = noop(2);
        assistant.queue(Arc::clone(&bad));
        assistant.queue(Arc::clone(&good));
        assistant.run().unwrap();
        assert_eq!(bad.status(), Status::Failed);
        assert_eq!(good.status(), Status::Done);
    }

    #[test]
    fn test_time_estimate_includes_poll_overhead() {
        let assistant = fast();
        assistant.queue(noop(1));
        assistant.queue(noop(2));
        assert_eq!(assistant.time_estimate(), Duration::from_millis(20));
    }
}
