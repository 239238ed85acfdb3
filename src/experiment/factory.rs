//! Get-or-create experiments keyed by parameter point
//!
//! A factory hands out at most one experiment per structurally distinct
//! [`Point`]. Construction goes through an explicit builder registered by
//! lab setup code, tried in order:
//!
//! 1. the point builder, `(id, &Point) -> Experiment`;
//! 2. the default builder, `(id) -> Experiment`, after which every
//!    coordinate of the point is written as an input.
//!
//! Construction failures are logged and yield no experiment. A failed point
//! is remembered, so later lookups return `None` without building again.
//!
//! Builders run outside the cache's locks and may call back into the
//! factory, except to look up the very point being built.

use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::{Experiment, ExperimentId, ExperimentRegistry};
use crate::region::{Point, Region};
use crate::{Error, Result};

/// Builder taking the point directly.
pub type PointBuilder = Arc<dyn Fn(ExperimentId, &Point) -> Result<Experiment> + Send + Sync>;

/// Builder producing a bare experiment; inputs are filled in afterwards.
pub type DefaultBuilder = Arc<dyn Fn(ExperimentId) -> Result<Experiment> + Send + Sync>;

/// Outcome of building one point; `None` records a failed construction.
type Slot = Arc<OnceLock<Option<Arc<Experiment>>>>;

/// Single-flight cache of experiments of one kind.
pub struct ExperimentFactory {
    kind: String,
    point_builder: Option<PointBuilder>,
    default_builder: Option<DefaultBuilder>,
    projection: Option<Vec<String>>,
    cache: DashMap<Point, Slot>,
}

impl ExperimentFactory {
    /// Factory for `kind` with no builder yet.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            point_builder: None,
            default_builder: None,
            projection: None,
            cache: DashMap::new(),
        }
    }

    /// Register the preferred builder.
    #[must_use]
    pub fn with_point_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(ExperimentId, &Point) -> Result<Experiment> + Send + Sync + 'static,
    {
        self.point_builder = Some(Arc::new(builder));
        self
    }

    /// Register the fallback builder.
    #[must_use]
    pub fn with_default_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(ExperimentId) -> Result<Experiment> + Send + Sync + 'static,
    {
        self.default_builder = Some(Arc::new(builder));
        self
    }

    /// Only the named dimensions identify an experiment of this kind.
    ///
    /// Points are projected before lookup, so a sweep over extra dimensions
    /// maps onto the same instances.
    #[must_use]
    pub fn project_onto(mut self, dimensions: &[&str]) -> Self {
        self.projection = Some(dimensions.iter().map(|d| (*d).to_string()).collect());
        self
    }

    /// Kind tag given to every experiment built here.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    fn key_of(&self, point: &Point) -> Point {
        self.projection.as_ref().map_or_else(
            || point.clone(),
            |dims| {
                let dims: Vec<&str> = dims.iter().map(String::as_str).collect();
                point.project(&dims)
            },
        )
    }

    /// Experiment for `point`, creating and registering it on first use.
    ///
    /// Concurrent callers for the same point wait for a single construction.
    /// Returns `None` if construction fails, now or on an earlier call.
    pub fn get(&self, point: &Point, registry: &ExperimentRegistry) -> Option<Arc<Experiment>> {
        let key = self.key_of(point);
        let slot = Arc::clone(self.cache.entry(key.clone()).or_default().value());
        slot.get_or_init(|| self.build(&key, registry)).clone()
    }

    fn build(&self, key: &Point, registry: &ExperimentRegistry) -> Option<Arc<Experiment>> {
        let id = registry.next_id();
        let built = self
            .create(id, key)
            .and_then(|experiment| registry.insert(experiment.with_kind(self.kind.clone())));
        match built {
            Ok(experiment) => {
                debug!(kind = %self.kind, experiment = %id, point = %key, "experiment created");
                Some(experiment)
            }
            Err(err) => {
                warn!(kind = %self.kind, point = %key, error = %err, "cannot create experiment");
                None
            }
        }
    }

    /// Experiments for every point of `region`; failed points are omitted.
    pub fn get_region(&self, region: &Region, registry: &ExperimentRegistry) -> Vec<Arc<Experiment>> {
        let points = match &self.projection {
            Some(dims) => {
                let dims: Vec<&str> = dims.iter().map(String::as_str).collect();
                region.project(&dims).all()
            }
            None => region.all(),
        };
        points
            .iter()
            .filter_map(|p| self.get(p, registry))
            .collect()
    }

    fn create(&self, id: ExperimentId, point: &Point) -> Result<Experiment> {
        if let Some(build) = &self.point_builder {
            return build(id, point);
        }
        let build = self
            .default_builder
            .as_ref()
            .ok_or_else(|| Error::UnknownKind(format!("{} has no builder", self.kind)))?;
        let experiment = build(id)?;
        for (dim, value) in point.iter() {
            experiment.write_input(dim, value.clone())?;
        }
        Ok(experiment)
    }

    /// Experiment already created for `point`, without creating one.
    #[must_use]
    pub fn cached(&self, point: &Point) -> Option<Arc<Experiment>> {
        let slot = self.cache.get(&self.key_of(point)).map(|e| Arc::clone(e.value()))?;
        slot.get().cloned().flatten()
    }

    /// Every experiment created so far.
    #[must_use]
    pub fn experiments(&self) -> Vec<Arc<Experiment>> {
        let slots: Vec<Slot> = self.cache.iter().map(|e| Arc::clone(e.value())).collect();
        let mut all: Vec<_> = slots.iter().filter_map(|s| s.get().cloned().flatten()).collect();
        all.sort_by_key(|e| e.id());
        all
    }

    /// Number of experiments created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments().len()
    }

    /// Check whether nothing has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ExperimentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentFactory")
            .field("kind", &self.kind)
            .field("projection", &self.projection)
            .field("points", &self.cache.len())
            .finish_non_exhaustive()
    }
}
