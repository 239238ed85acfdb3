//! Parameter-space regions and the points they enumerate
//!
//! A [`Region`] maps dimension names to ordered lists of candidate values.
//! [`Region::all`] enumerates the Cartesian product in dimension-major,
//! value-list order, then drops points rejected by the inclusion predicate.
//!
//! ```
//! use trueno_lab::region::Region;
//!
//! let region = Region::new().add("A", [1, 2]).add("B", ["x", "y"]);
//! let points = region.all();
//! assert_eq!(points.len(), 4);
//! assert_eq!(points[1].get("B").and_then(|v| v.as_str()), Some("y"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Inclusion predicate for non-rectangular regions.
pub type PointPredicate = Arc<dyn Fn(&Point) -> bool + Send + Sync>;

/// One concrete assignment of a value to each dimension.
///
/// Equality is structural: two points are equal iff they assign the same
/// values to the same dimensions, regardless of construction order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    coordinates: BTreeMap<String, Value>,
}

impl Point {
    /// Create an empty point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style coordinate assignment.
    #[must_use]
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<Value>) -> Self {
        self.coordinates.insert(dimension.into(), value.into());
        self
    }

    /// Value of a dimension.
    #[must_use]
    pub fn get(&self, dimension: &str) -> Option<&Value> {
        self.coordinates.get(dimension)
    }

    /// Dimension names (sorted).
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.coordinates.keys().map(String::as_str)
    }

    /// `(dimension, value)` pairs (sorted by dimension).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.coordinates.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// True for the point of a zero-dimensional region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Keep only the given dimensions.
    #[must_use]
    pub fn project(&self, dimensions: &[&str]) -> Self {
        Self {
            coordinates: self
                .coordinates
                .iter()
                .filter(|(k, _)| dimensions.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, (k, v)) in self.coordinates.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, ")")
    }
}

/// Multi-dimensional parameter sweep.
#[derive(Clone, Default)]
pub struct Region {
    /// Dimensions in insertion order
    domains: Vec<(String, Vec<Value>)>,
    predicate: Option<PointPredicate>,
}

impl Region {
    /// Create an empty region (enumerates exactly one empty point).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the candidate values of a dimension.
    ///
    /// Re-adding an existing dimension replaces its domain in place.
    #[must_use]
    pub fn add<V: Into<Value>>(
        mut self,
        dimension: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let dimension = dimension.into();
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if let Some(slot) = self.domains.iter_mut().find(|(d, _)| *d == dimension) {
            slot.1 = values;
        } else {
            self.domains.push((dimension, values));
        }
        self
    }

    /// Integer range `start..=end` with the given positive step.
    #[must_use]
    pub fn add_range(self, dimension: impl Into<String>, start: i64, end: i64, step: i64) -> Self {
        let step = step.max(1);
        let mut values = Vec::new();
        let mut n = start;
        while n <= end {
            values.push(n);
            n += step;
        }
        self.add(dimension, values)
    }

    /// Restrict the region with an inclusion predicate.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Point) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Dimension names in insertion order.
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|(d, _)| d.as_str())
    }

    /// Candidate values of a dimension (empty if absent).
    #[must_use]
    pub fn domain(&self, dimension: &str) -> &[Value] {
        self.domains
            .iter()
            .find(|(d, _)| d == dimension)
            .map_or(&[], |(_, v)| v.as_slice())
    }

    /// Check whether the region has a dimension.
    #[must_use]
    pub fn has_dimension(&self, dimension: &str) -> bool {
        self.domains.iter().any(|(d, _)| d == dimension)
    }

    /// Region keeping only the given dimensions' domains (and the predicate).
    #[must_use]
    pub fn project(&self, dimensions: &[&str]) -> Self {
        let domains = dimensions
            .iter()
            .filter_map(|name| {
                self.domains
                    .iter()
                    .find(|(d, _)| d == name)
                    .map(|(d, v)| (d.clone(), v.clone()))
            })
            .collect();
        Self {
            domains,
            predicate: self.predicate.clone(),
        }
    }

    /// Enumerate every point over all dimensions, in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Point> {
        let names: Vec<&str> = self.dimensions().collect();
        self.all_of(&names)
    }

    /// Enumerate every point over the named dimensions.
    ///
    /// The first named dimension varies slowest. Naming a dimension the
    /// region does not have yields no points.
    #[must_use]
    pub fn all_of(&self, dimensions: &[&str]) -> Vec<Point> {
        let mut out = Vec::new();
        self.expand(dimensions, Point::new(), &mut out);
        out.retain(|p| self.is_in_region(p));
        out
    }

    fn expand(&self, remaining: &[&str], fixed: Point, out: &mut Vec<Point>) {
        let Some((first, rest)) = remaining.split_first() else {
            out.push(fixed);
            return;
        };
        if !self.has_dimension(first) {
            return;
        }
        for value in self.domain(first) {
            self.expand(rest, fixed.clone().with(*first, value.clone()), out);
        }
    }

    /// Apply the inclusion predicate (always true when none is set).
    #[must_use]
    pub fn is_in_region(&self, point: &Point) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(point))
    }

    /// Check whether a set of parameters lies inside the region.
    ///
    /// Every region dimension must be present with one of its candidate
    /// values; the predicate must accept the projected point.
    pub fn includes<'a, F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        let mut point = Point::new();
        for (dimension, values) in &self.domains {
            match lookup(dimension) {
                Some(v) if values.contains(v) => point = point.with(dimension.clone(), v.clone()),
                _ => return false,
            }
        }
        self.is_in_region(&point)
    }

    /// Number of points before predicate filtering.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        self.domains.iter().map(|(_, v)| v.len()).product()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("domains", &self.domains)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}
