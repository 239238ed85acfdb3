//! The laboratory: every experiment, table and claim of one study
//!
//! A [`Laboratory`] is the unit of exclusion: it owns the experiment
//! registry, the factories, the registered tables and claims, and the
//! assistant that runs experiments. It is also the
//! [`LineageSource`](crate::provenance::LineageSource)
//! that explanation graphs are unfolded against.
//!
//! ```rust
//! use trueno_lab::experiment::ExperimentFactory;
//! use trueno_lab::lab::Laboratory;
//! use trueno_lab::region::Region;
//!
//! let lab = Laboratory::builder().assistant_name("Rosie").build()?;
//! lab.register_factory(ExperimentFactory::new("sort").with_default_builder(|id| {
//!     Ok(trueno_lab::experiment::Experiment::from_fn(id, |ctx| {
//!         let n = ctx.read_i64("n");
//!         ctx.write("time", n * 2)?;
//!         Ok(())
//!     }))
//! }));
//! let region = Region::new().add("n", [10, 20, 30]);
//! let experiments = lab.get_experiments("sort", &region)?;
//! assert_eq!(experiments.len(), 3);
//! # Ok::<(), trueno_lab::Error>(())
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::claim::{Claim, ClaimId, ClaimResult};
use crate::config::LabConfig;
use crate::experiment::{Experiment, ExperimentFactory, ExperimentId, ExperimentRegistry, IdAllocator, Status};
use crate::provenance::{Dependent, ExplanationGraph, PartRef, Provenance, Subject};
use crate::region::{Point, Region};
use crate::scheduler::Assistant;
use crate::table::{Table, TableId};
use crate::{Error, Result};

/// A study: experiments, the views derived from them, and their runner.
pub struct Laboratory {
    config: LabConfig,
    experiments: ExperimentRegistry,
    factories: RwLock<HashMap<String, Arc<ExperimentFactory>>>,
    tables: RwLock<BTreeMap<TableId, Arc<Table>>>,
    claims: RwLock<BTreeMap<ClaimId, Arc<Mutex<Claim>>>>,
    table_ids: IdAllocator,
    claim_ids: IdAllocator,
    assistant: Arc<Assistant>,
}

impl Laboratory {
    /// Create a new laboratory builder
    #[must_use]
    pub fn builder() -> LaboratoryBuilder {
        LaboratoryBuilder::default()
    }

    /// Configuration the lab was built with.
    #[must_use]
    pub const fn config(&self) -> &LabConfig {
        &self.config
    }

    /// The assistant running this lab's experiments.
    #[must_use]
    pub fn assistant(&self) -> Arc<Assistant> {
        Arc::clone(&self.assistant)
    }

    // ---- experiments ----

    /// Allocate an identifier for an experiment built by hand.
    pub fn next_experiment_id(&self) -> ExperimentId {
        self.experiments.next_id()
    }

    /// Register an experiment built by hand.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateExperiment`] if its identifier is already in use;
    /// take identifiers from [`next_experiment_id`](Laboratory::next_experiment_id).
    pub fn add_experiment(&self, experiment: Experiment) -> Result<Arc<Experiment>> {
        let experiment = self.experiments.insert(experiment)?;
        self.apply_default_timeout(&experiment);
        Ok(experiment)
    }

    /// Look up an experiment.
    #[must_use]
    pub fn experiment(&self, id: ExperimentId) -> Option<Arc<Experiment>> {
        self.experiments.get(id)
    }

    /// All experiments in identifier order.
    #[must_use]
    pub fn experiments(&self) -> Vec<Arc<Experiment>> {
        self.experiments.all()
    }

    /// Experiments whose parameters lie inside `region`.
    #[must_use]
    pub fn filter(&self, region: &Region) -> Vec<Arc<Experiment>> {
        self.experiments.filter(region)
    }

    /// Lowest status over every experiment.
    #[must_use]
    pub fn overall_status(&self) -> Status {
        self.experiments.overall_status()
    }

    fn apply_default_timeout(&self, experiment: &Experiment) {
        if experiment.max_duration().is_none() {
            if let Some(max) = self.config.default_max_duration() {
                experiment.set_max_duration(Some(max));
            }
        }
    }

    // ---- factories ----

    /// Register a factory under its kind, replacing any previous one.
    pub fn register_factory(&self, factory: ExperimentFactory) -> Arc<ExperimentFactory> {
        let factory = Arc::new(factory);
        self.factories
            .write()
            .insert(factory.kind().to_string(), Arc::clone(&factory));
        factory
    }

    /// Factory registered for a kind.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownKind`] if no factory is registered for `kind`.
    pub fn factory(&self, kind: &str) -> Result<Arc<ExperimentFactory>> {
        self.factories
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    /// The unique experiment of `kind` for `point`, created on first use.
    ///
    /// Returns `Ok(None)` when the factory could not build the experiment.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownKind`] if no factory is registered for `kind`.
    pub fn get_experiment(&self, kind: &str, point: &Point) -> Result<Option<Arc<Experiment>>> {
        let factory = self.factory(kind)?;
        let experiment = factory.get(point, &self.experiments);
        if let Some(exp) = &experiment {
            self.apply_default_timeout(exp);
        }
        Ok(experiment)
    }

    /// Experiments of `kind` for every point of `region`; points whose
    /// construction fails are omitted.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownKind`] if no factory is registered for `kind`.
    pub fn get_experiments(&self, kind: &str, region: &Region) -> Result<Vec<Arc<Experiment>>> {
        let factory = self.factory(kind)?;
        let experiments = factory.get_region(region, &self.experiments);
        for exp in &experiments {
            self.apply_default_timeout(exp);
        }
        Ok(experiments)
    }

    // ---- tables ----

    /// Register a table snapshot and give it an identifier.
    pub fn add_table(&self, mut table: Table) -> TableId {
        let id = TableId::new(self.table_ids.allocate());
        table.set_id(id);
        self.tables.write().insert(id, Arc::new(table));
        id
    }

    /// Replace the snapshot of a registered table, keeping its identifier.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownTable`] if `id` is not registered.
    pub fn replace_table(&self, id: TableId, mut table: Table) -> Result<()> {
        let mut tables = self.tables.write();
        let slot = tables.get_mut(&id).ok_or(Error::UnknownTable(id))?;
        table.set_id(id);
        *slot = Arc::new(table);
        Ok(())
    }

    /// Look up a table.
    #[must_use]
    pub fn table(&self, id: TableId) -> Option<Arc<Table>> {
        self.tables.read().get(&id).cloned()
    }

    /// Identifiers of every registered table.
    #[must_use]
    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.read().keys().copied().collect()
    }

    // ---- claims ----

    /// Register a claim, giving it a fresh identifier.
    pub fn add_claim(&self, mut claim: Claim) -> ClaimId {
        let id = ClaimId::new(self.claim_ids.allocate());
        claim.set_id(id);
        self.claims.write().insert(id, Arc::new(Mutex::new(claim)));
        id
    }

    /// Identifiers of every registered claim.
    #[must_use]
    pub fn claim_ids(&self) -> Vec<ClaimId> {
        self.claims.read().keys().copied().collect()
    }

    /// Result of the last check of a claim.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownClaim`] if `id` is not registered.
    pub fn claim_result(&self, id: ClaimId) -> Result<ClaimResult> {
        Ok(self.claim_handle(id)?.lock().result())
    }

    /// Run a closure against a registered claim.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownClaim`] if `id` is not registered.
    pub fn with_claim<R>(&self, id: ClaimId, f: impl FnOnce(&Claim) -> R) -> Result<R> {
        Ok(f(&self.claim_handle(id)?.lock()))
    }

    fn claim_handle(&self, id: ClaimId) -> Result<Arc<Mutex<Claim>>> {
        self.claims
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownClaim(id))
    }

    /// Evaluate one claim against the current lab state.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownClaim`] if `id` is not registered.
    pub fn check_claim(&self, id: ClaimId) -> Result<ClaimResult> {
        let handle = self.claim_handle(id)?;
        let result = handle.lock().check(self);
        Ok(result)
    }

    /// Evaluate every claim; returns each result by identifier.
    #[must_use]
    pub fn check_claims(&self) -> BTreeMap<ClaimId, ClaimResult> {
        let handles: Vec<(ClaimId, Arc<Mutex<Claim>>)> = self
            .claims
            .read()
            .iter()
            .map(|(id, c)| (*id, Arc::clone(c)))
            .collect();

        #[cfg(feature = "rayon")]
        let results = {
            use rayon::prelude::*;
            handles
                .par_iter()
                .map(|(id, claim)| (*id, claim.lock().check(self)))
                .collect::<BTreeMap<_, _>>()
        };
        #[cfg(not(feature = "rayon"))]
        let results = handles
            .iter()
            .map(|(id, claim)| (*id, claim.lock().check(self)))
            .collect::<BTreeMap<_, _>>();

        let worst = results
            .values()
            .fold(ClaimResult::Ok, |acc, r| acc.worst(*r));
        info!(claims = results.len(), worst = %worst, "claims checked");
        results
    }

    // ---- provenance ----

    /// Unfold the lineage of a piece of data into an explanation graph.
    #[must_use]
    pub fn explain(&self, target: &PartRef) -> ExplanationGraph {
        ExplanationGraph::explain(self, target)
    }

    /// Parse a datapoint identifier (`T3:2:0`, `E7:time`, `C1`) and explain it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDatapoint`] on a malformed identifier.
    pub fn explain_datapoint(&self, datapoint: &str) -> Result<ExplanationGraph> {
        let target = PartRef::parse_datapoint(datapoint)?;
        Ok(self.explain(&target))
    }

    /// Experiments feeding a lab object, following declared dependencies
    /// through tables and claims without unfolding cell lineage.
    #[must_use]
    pub fn dependencies(&self, subject: &Subject) -> Vec<ExperimentId> {
        let mut seen = BTreeSet::new();
        let mut out = BTreeSet::new();
        self.collect_dependencies(*subject, &mut seen, &mut out);
        out.into_iter().collect()
    }

    fn collect_dependencies(&self, subject: Subject, seen: &mut BTreeSet<Subject>, out: &mut BTreeSet<ExperimentId>) {
        if !seen.insert(subject) {
            return;
        }
        match subject {
            Subject::Experiment(id) => {
                out.insert(id);
                if let Some(exp) = self.experiment(id) {
                    for dep in exp.depends_on() {
                        self.collect_dependencies(Subject::Experiment(dep), seen, out);
                    }
                }
            }
            Subject::Table(id) => {
                if let Some(table) = self.table(id) {
                    for dep in table.depends_on() {
                        self.collect_dependencies(dep, seen, out);
                    }
                }
            }
            Subject::Claim(id) => {
                let deps = self
                    .claim_handle(id)
                    .map(|c| c.lock().depends_on())
                    .unwrap_or_default();
                for dep in deps {
                    self.collect_dependencies(Subject::Experiment(dep), seen, out);
                }
            }
        }
    }

    // ---- scheduling ----

    /// Queue experiments on the lab's assistant; returns how many were added.
    pub fn queue(&self, experiments: impl IntoIterator<Item = Arc<Experiment>>) -> usize {
        self.assistant.queue_all(experiments)
    }

    /// Queue every experiment that has not finished yet.
    pub fn queue_unfinished(&self) -> usize {
        self.queue(
            self.experiments()
                .into_iter()
                .filter(|e| !e.status().is_finished()),
        )
    }

    /// Estimated time to drain the assistant's queue.
    #[must_use]
    pub fn time_estimate(&self) -> Duration {
        self.assistant.time_estimate()
    }
}

impl crate::provenance::LineageSource for Laboratory {
    fn lineage(&self, part: &PartRef) -> Option<Provenance> {
        match part.subject {
            Subject::Experiment(id) => self.experiments.contains(id).then_some(Provenance::Leaf),
            Subject::Table(id) => self.table(id).map(|t| t.lineage_of(&part.part)),
            Subject::Claim(id) => {
                let handle = self.claims.read().get(&id).cloned()?;
                // A claim being checked right now has no settled lineage.
                let lineage = handle
                    .try_lock()
                    .map_or(Provenance::Unknown, |c| c.lineage());
                Some(lineage)
            }
        }
    }
}

impl std::fmt::Debug for Laboratory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Laboratory")
            .field("experiments", &self.experiments.len())
            .field("factories", &self.factories.read().len())
            .field("tables", &self.tables.read().len())
            .field("claims", &self.claims.read().len())
            .field("assistant", &self.assistant.name())
            .finish()
    }
}

/// Laboratory builder
#[derive(Debug, Default)]
pub struct LaboratoryBuilder {
    config: LabConfig,
}

impl LaboratoryBuilder {
    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: LabConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the assistant's name
    #[must_use]
    pub fn assistant_name(mut self, name: impl Into<String>) -> Self {
        self.config.assistant_name = name.into();
        self
    }

    /// Set the scheduler poll interval
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the environment speed factor used for time estimates
    #[must_use]
    pub const fn speed_factor(mut self, factor: f32) -> Self {
        self.config.speed_factor = factor;
        self
    }

    /// Timeout applied to experiments that do not declare one
    #[must_use]
    pub fn default_max_duration(mut self, max: Option<Duration>) -> Self {
        self.config.default_max_duration_ms =
            max.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Build the laboratory
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the configuration fails validation.
    pub fn build(self) -> Result<Laboratory> {
        self.config.validate()?;
        let assistant = Arc::new(Assistant::from_config(&self.config));
        info!(assistant = %self.config.assistant_name, "laboratory ready");
        Ok(Laboratory {
            config: self.config,
            experiments: ExperimentRegistry::new(),
            factories: RwLock::new(HashMap::new()),
            tables: RwLock::new(BTreeMap::new()),
            claims: RwLock::new(BTreeMap::new()),
            table_ids: IdAllocator::new(),
            claim_ids: IdAllocator::new(),
            assistant,
        })
    }
}
