//! Identifier allocation and the lab's experiment index

use parking_lot::RwLock;
use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Experiment, ExperimentId, Status};
use crate::region::Region;
use crate::{Error, Result};

/// Monotonic identifier source, owned by a lab rather than a global.
///
/// Identifiers start at 1 and are never reused for the allocator's
/// lifetime.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Allocator whose first identifier is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Take the next identifier.
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Make sure `raw` is never handed out again.
    pub fn reserve(&self, raw: u64) {
        self.next.fetch_max(raw.saturating_add(1), Ordering::SeqCst);
    }

    /// Identifier the next call to [`allocate`](IdAllocator::allocate) returns.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Every experiment known to a lab, by identifier.
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    ids: IdAllocator,
    experiments: RwLock<BTreeMap<ExperimentId, Arc<Experiment>>>,
}

impl ExperimentRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identifier for an experiment about to be built.
    pub fn next_id(&self) -> ExperimentId {
        ExperimentId::new(self.ids.allocate())
    }

    /// Register an experiment.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateExperiment`] if the identifier is already taken;
    /// the registered experiment is left in place.
    pub fn insert(&self, experiment: Experiment) -> Result<Arc<Experiment>> {
        self.insert_arc(Arc::new(experiment))
    }

    /// Register an already shared experiment.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](ExperimentRegistry::insert).
    pub fn insert_arc(&self, experiment: Arc<Experiment>) -> Result<Arc<Experiment>> {
        let id = experiment.id();
        match self.experiments.write().entry(id) {
            Entry::Occupied(_) => return Err(Error::DuplicateExperiment(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&experiment));
            }
        }
        self.ids.reserve(id.as_raw());
        Ok(experiment)
    }

    /// Look up an experiment.
    #[must_use]
    pub fn get(&self, id: ExperimentId) -> Option<Arc<Experiment>> {
        self.experiments.read().get(&id).cloned()
    }

    /// Check whether an identifier is registered.
    #[must_use]
    pub fn contains(&self, id: ExperimentId) -> bool {
        self.experiments.read().contains_key(&id)
    }

    /// All experiments in identifier order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Experiment>> {
        self.experiments.read().values().cloned().collect()
    }

    /// Experiments whose parameters lie inside `region`.
    #[must_use]
    pub fn filter(&self, region: &Region) -> Vec<Arc<Experiment>> {
        self.all()
            .into_iter()
            .filter(|exp| {
                let params = exp.all_parameters();
                region.includes(|dim| params.get(dim))
            })
            .collect()
    }

    /// Lowest status over every registered experiment.
    #[must_use]
    pub fn overall_status(&self) -> Status {
        Status::lowest_of(self.all().iter().map(|e| e.status()))
    }

    /// Number of registered experiments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.read().len()
    }

    /// Check whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.read().is_empty()
    }
}
