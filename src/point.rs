//! Points, point sets, and integer distance.
//!
//! A [`PointSet`] is an arena: every point is addressed by its [`PointId`],
//! the index it was loaded at. Two points with equal coordinates are still
//! distinct entities, so neighbor sets and "is this the query point" checks
//! compare ids, never coordinates.
//!
//! Distances are compared squared, in `u64`, so no floating point is involved.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use crate::error::{Error, Result};

/// Stable identifier of a point inside its [`PointSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(pub usize);

impl PointId {
    /// Position of the point in load order.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One point: immutable coordinates plus per-run clustering state.
#[derive(Debug, Clone)]
pub struct Point {
    coords: Box<[i32]>,
    pub(crate) visited: bool,
    pub(crate) neighbors: HashSet<PointId>,
}

impl Point {
    fn new(coords: Vec<i32>) -> Self {
        Self {
            coords: coords.into_boxed_slice(),
            visited: false,
            neighbors: HashSet::new(),
        }
    }

    /// Coordinate vector.
    #[inline]
    pub fn coords(&self) -> &[i32] {
        &self.coords
    }

    /// Whether the last clustering run visited this point.
    pub fn is_visited(&self) -> bool {
        self.visited
    }

    /// Neighbors found by the last completed neighbor-finding run. Never contains the point itself.
    pub fn neighbors(&self) -> &HashSet<PointId> {
        &self.neighbors
    }

    /// Size of the neighbor set.
    #[inline]
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }
}

/// Whether the neighbor sets of a [`PointSet`] can be clustered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    /// Never computed, cancelled, or reset.
    Stale,
    /// Populated by a completed run with this ε.
    Ready {
        /// Threshold the neighbor sets were computed with.
        epsilon: u32,
    },
}

/// A fixed collection of points with uniform dimensionality.
#[derive(Debug, Clone)]
pub struct PointSet {
    points: Vec<Point>,
    dims: usize,
    state: NeighborState,
}

impl PointSet {
    /// Build a point set from coordinate vectors.
    ///
    /// An empty input is allowed and produces an empty set with zero
    /// dimensions. Every point must have the same, non-zero, number of
    /// coordinates; otherwise nothing is built.
    pub fn from_coords(coords: Vec<Vec<i32>>) -> Result<Self> {
        let dims = coords.first().map_or(0, Vec::len);
        if !coords.is_empty() && dims == 0 {
            return Err(Error::InvalidParameter {
                name: "coordinates",
                message: "points need at least one coordinate",
            });
        }
        if let Some(bad) = coords.iter().find(|c| c.len() != dims) {
            return Err(Error::DimensionMismatch {
                expected: dims,
                found: bad.len(),
            });
        }

        Ok(Self {
            points: coords.into_iter().map(Point::new).collect(),
            dims,
            state: NeighborState::Stale,
        })
    }

    /// Number of coordinates per point (0 for an empty set).
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the set holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Look up a point by id.
    pub fn get(&self, id: PointId) -> Option<&Point> {
        self.points.get(id.0)
    }

    /// Coordinates of a point. Panics on an id from another set.
    #[inline]
    pub fn coords(&self, id: PointId) -> &[i32] {
        self.points[id.0].coords()
    }

    /// All ids in load order.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = PointId> + '_ {
        (0..self.points.len()).map(PointId)
    }

    /// All points with their ids, in load order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (PointId, &Point)> + '_ {
        self.points.iter().enumerate().map(|(i, p)| (PointId(i), p))
    }

    /// Current neighbor-set state.
    pub fn neighbor_state(&self) -> NeighborState {
        self.state
    }

    /// Clear every neighbor set and mark them stale.
    pub fn reset_neighbors(&mut self) {
        for p in &mut self.points {
            p.neighbors.clear();
        }
        self.state = NeighborState::Stale;
    }

    /// Clear every visited flag.
    pub fn reset_visited(&mut self) {
        for p in &mut self.points {
            p.visited = false;
        }
    }

    #[inline]
    pub(crate) fn point(&self, id: PointId) -> &Point {
        &self.points[id.0]
    }

    #[inline]
    pub(crate) fn point_mut(&mut self, id: PointId) -> &mut Point {
        &mut self.points[id.0]
    }

    /// Adopt `neighbors` as the neighbor set of `id`, dropping any self reference.
    pub(crate) fn set_neighbors(&mut self, id: PointId, mut neighbors: HashSet<PointId>) {
        neighbors.remove(&id);
        self.points[id.0].neighbors = neighbors;
    }

    pub(crate) fn mark_ready(&mut self, epsilon: u32) {
        self.state = NeighborState::Ready { epsilon };
    }
}

/// Squared Euclidean distance between two coordinate vectors.
///
/// Saturates at `u64::MAX` instead of overflowing.
#[inline]
pub fn squared_distance(a: &[i32], b: &[i32]) -> u64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).fold(0u64, |acc, (&x, &y)| {
        let d = (i64::from(x) - i64::from(y)).unsigned_abs();
        acc.saturating_add(d * d)
    })
}

/// `radius²` as used by every range comparison.
#[inline]
pub fn radius_squared(radius: u32) -> u64 {
    u64::from(radius) * u64::from(radius)
}

/// Parse one point per line: whitespace-separated integers.
///
/// Blank lines and lines starting with `#` are skipped. All points must have
/// the same number of coordinates as the first one.
pub fn parse_points<R: BufRead>(reader: R) -> Result<Vec<Vec<i32>>> {
    let mut out: Vec<Vec<i32>> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let coords = trimmed
            .split_whitespace()
            .map(|tok| {
                tok.parse::<i32>().map_err(|_| Error::Parse {
                    line: idx + 1,
                    token: tok.to_string(),
                })
            })
            .collect::<Result<Vec<i32>>>()?;

        if let Some(first) = out.first() {
            if first.len() != coords.len() {
                return Err(Error::DimensionMismatch {
                    expected: first.len(),
                    found: coords.len(),
                });
            }
        }
        out.push(coords);
    }
    Ok(out)
}

/// Parse points from `reader` into a [`PointSet`]. An input with no points is an error.
pub fn load_points<R: BufRead>(reader: R) -> Result<PointSet> {
    let coords = parse_points(reader)?;
    if coords.is_empty() {
        return Err(Error::EmptyInput);
    }
    let set = PointSet::from_coords(coords)?;
    log::debug!("loaded {} points with {} dimensions", set.len(), set.dims());
    Ok(set)
}

/// Load points from a text file.
pub fn load_points_file(path: impl AsRef<Path>) -> Result<PointSet> {
    let file = std::fs::File::open(path.as_ref())?;
    load_points(std::io::BufReader::new(file))
}
