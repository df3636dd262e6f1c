//! Balanced k-d tree.
//!
//! Construction sorts the current sublist on axis `depth mod D` (stable, so
//! equal coordinates keep load order), stores the median at the node and
//! recurses on both halves. Everything left of a node has an axis coordinate
//! `<=` the node's, everything right `>=`.
//!
//! Queries descend into the near side first and visit the far side only if
//! the squared distance to the splitting plane does not exceed the current
//! bound (`ε²` for range queries, the worst of the k best for nearest).

use std::collections::BinaryHeap;

use super::traits::SpatialIndex;
use crate::error::{Error, Result};
use crate::point::{radius_squared, squared_distance, PointId, PointSet};

#[derive(Debug)]
struct KdNode {
    id: PointId,
    coords: Box<[i32]>,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

impl KdNode {
    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Static balanced k-d tree over integer points.
#[derive(Debug)]
pub struct KdTree {
    root: Option<Box<KdNode>>,
    dims: usize,
    len: usize,
}

type Entry = (PointId, Box<[i32]>);

impl KdTree {
    /// Build a tree over every point of `points`.
    ///
    /// Fails with [`Error::EmptyInput`] for an empty set, since the axis
    /// count is undefined.
    pub fn build(points: &PointSet) -> Result<Self> {
        let entries = points
            .iter()
            .map(|(id, p)| (id, p.coords().to_vec()))
            .collect();
        Self::from_entries(entries)
    }

    /// Build a tree from `(id, coords)` pairs.
    pub fn from_entries(entries: Vec<(PointId, Vec<i32>)>) -> Result<Self> {
        let dims = match entries.first() {
            None => return Err(Error::EmptyInput),
            Some((_, c)) => c.len(),
        };
        if dims == 0 {
            return Err(Error::InvalidParameter {
                name: "coordinates",
                message: "points need at least one coordinate",
            });
        }
        if let Some((_, bad)) = entries.iter().find(|(_, c)| c.len() != dims) {
            return Err(Error::DimensionMismatch {
                expected: dims,
                found: bad.len(),
            });
        }

        let len = entries.len();
        let entries: Vec<Entry> = entries
            .into_iter()
            .map(|(id, c)| (id, c.into_boxed_slice()))
            .collect();
        let root = Self::build_node(entries, 0, dims);

        Ok(Self { root, dims, len })
    }

    fn build_node(mut entries: Vec<Entry>, depth: usize, dims: usize) -> Option<Box<KdNode>> {
        if entries.is_empty() {
            return None;
        }
        let axis = depth % dims;
        entries.sort_by_key(|(_, c)| c[axis]);

        let median = entries.len() / 2;
        let right = entries.split_off(median + 1);
        let (id, coords) = entries.pop()?;

        Some(Box::new(KdNode {
            id,
            coords,
            left: Self::build_node(entries, depth + 1, dims),
            right: Self::build_node(right, depth + 1, dims),
        }))
    }

    /// Dimensionality of the indexed points.
    pub fn dims(&self) -> usize {
        self.dims
    }

    fn check_query(&self, query: &[i32]) {
        assert_eq!(
            query.len(),
            self.dims,
            "query has {} coordinates, tree has {}",
            query.len(),
            self.dims
        );
    }

    fn range_node(
        &self,
        node: &KdNode,
        query: &[i32],
        r2: u64,
        exclude: Option<PointId>,
        depth: usize,
        out: &mut Vec<PointId>,
    ) {
        if Some(node.id) != exclude && squared_distance(&node.coords, query) <= r2 {
            out.push(node.id);
        }

        let axis = depth % self.dims;
        let diff = i64::from(query[axis]) - i64::from(node.coords[axis]);
        let (near, far) = if diff < 0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(n) = near {
            self.range_node(n, query, r2, exclude, depth + 1, out);
        }
        let plane = diff.unsigned_abs();
        if plane.saturating_mul(plane) <= r2 {
            if let Some(f) = far {
                self.range_node(f, query, r2, exclude, depth + 1, out);
            }
        }
    }

    /// The `k` points closest to `query`, nearest first, paired with squared distances.
    ///
    /// `exclude` (typically the query point's own id) is never returned.
    /// Equidistant points are ordered by ascending [`PointId`], so ties go
    /// to whichever point was loaded first. Returns fewer than `k` entries
    /// only when the tree holds fewer candidates.
    pub fn nearest_with_distances(
        &self,
        query: &[i32],
        k: usize,
        exclude: Option<PointId>,
    ) -> Vec<(PointId, u64)> {
        self.check_query(query);
        if k == 0 {
            return Vec::new();
        }
        let mut best = KBest::new(k);
        if let Some(root) = &self.root {
            self.nearest_node(root, query, exclude, 0, &mut best);
        }
        best.into_sorted()
    }

    /// The `k` points closest to `query`, nearest first. See [`KdTree::nearest_with_distances`].
    pub fn nearest(&self, query: &[i32], k: usize, exclude: Option<PointId>) -> Vec<PointId> {
        self.nearest_with_distances(query, k, exclude)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    fn nearest_node(
        &self,
        node: &KdNode,
        query: &[i32],
        exclude: Option<PointId>,
        depth: usize,
        best: &mut KBest,
    ) {
        let axis = depth % self.dims;
        let diff = i64::from(query[axis]) - i64::from(node.coords[axis]);
        let (near, far) = if diff <= 0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(n) = near {
            self.nearest_node(n, query, exclude, depth + 1, best);
        }
        if Some(node.id) != exclude {
            best.offer(squared_distance(&node.coords, query), node.id);
        }

        // Equal plane distance still descends: an equidistant point with a
        // lower id may be on the far side.
        let plane = diff.unsigned_abs();
        let visit_far = match best.worst() {
            None => true,
            Some(worst) => plane.saturating_mul(plane) <= worst,
        };
        if visit_far {
            if let Some(f) = far {
                self.nearest_node(f, query, exclude, depth + 1, best);
            }
        }
    }

    /// Verify the median-split invariant at every node.
    pub fn is_valid(&self) -> bool {
        let mut lo = vec![i32::MIN; self.dims];
        let mut hi = vec![i32::MAX; self.dims];
        match &self.root {
            None => true,
            Some(root) => Self::valid_node(root, 0, self.dims, &mut lo, &mut hi),
        }
    }

    fn valid_node(node: &KdNode, depth: usize, dims: usize, lo: &mut [i32], hi: &mut [i32]) -> bool {
        let within = node
            .coords
            .iter()
            .zip(lo.iter().zip(hi.iter()))
            .all(|(c, (l, h))| l <= c && c <= h);
        if !within {
            return false;
        }

        let axis = depth % dims;
        let split = node.coords[axis];
        if let Some(left) = &node.left {
            let saved = hi[axis];
            hi[axis] = split;
            let ok = Self::valid_node(left, depth + 1, dims, lo, hi);
            hi[axis] = saved;
            if !ok {
                return false;
            }
        }
        if let Some(right) = &node.right {
            let saved = lo[axis];
            lo[axis] = split;
            let ok = Self::valid_node(right, depth + 1, dims, lo, hi);
            lo[axis] = saved;
            if !ok {
                return false;
            }
        }
        true
    }
}

fn max_depth_node(node: Option<&KdNode>) -> usize {
    match node {
        None => 0,
        Some(n) => 1 + max_depth_node(n.left.as_deref()).max(max_depth_node(n.right.as_deref())),
    }
}

fn leaf_depths(node: &KdNode, depth: usize, sum: &mut usize, count: &mut usize) {
    if node.is_leaf() {
        *sum += depth;
        *count += 1;
        return;
    }
    for child in [&node.left, &node.right].into_iter().flatten() {
        leaf_depths(child, depth + 1, sum, count);
    }
}

fn collect_points(node: &KdNode, out: &mut Vec<PointId>) {
    out.push(node.id);
    for child in [&node.left, &node.right].into_iter().flatten() {
        collect_points(child, out);
    }
}

impl SpatialIndex for KdTree {
    fn name(&self) -> &'static str {
        "kd-tree"
    }

    fn len(&self) -> usize {
        self.len
    }

    fn insert(&mut self, _id: PointId, _coords: &[i32]) -> Result<()> {
        Err(Error::UnsupportedOperation {
            index: "kd-tree",
            operation: "incremental insert",
        })
    }

    fn range_search(&self, center: &[i32], radius: u32, exclude: Option<PointId>) -> Vec<PointId> {
        self.check_query(center);
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            self.range_node(root, center, radius_squared(radius), exclude, 0, &mut out);
        }
        out
    }

    fn max_depth(&self) -> usize {
        max_depth_node(self.root.as_deref())
    }

    fn avg_depth(&self) -> f64 {
        let (mut sum, mut count) = (0, 0);
        if let Some(root) = &self.root {
            leaf_depths(root, 1, &mut sum, &mut count);
        }
        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64
        }
    }

    fn all_points(&self) -> Vec<PointId> {
        let mut out = Vec::with_capacity(self.len);
        if let Some(root) = &self.root {
            collect_points(root, &mut out);
        }
        out
    }
}

/// At most `k` candidates, ordered by `(squared distance, id)`.
struct KBest {
    k: usize,
    heap: BinaryHeap<(u64, PointId)>,
}

impl KBest {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    /// Current k-th best distance, once `k` candidates are held.
    fn worst(&self) -> Option<u64> {
        if self.heap.len() < self.k {
            None
        } else {
            self.heap.peek().map(|&(d, _)| d)
        }
    }

    fn offer(&mut self, dist: u64, id: PointId) {
        if self.heap.len() < self.k {
            self.heap.push((dist, id));
        } else if let Some(&top) = self.heap.peek() {
            if (dist, id) < top {
                self.heap.pop();
                self.heap.push((dist, id));
            }
        }
    }

    fn into_sorted(self) -> Vec<(PointId, u64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|(d, id)| (id, d))
            .collect()
    }
}
