//! Point-region quadtree over two-dimensional points.
//!
//! Every node splits the plane at its own `(x, y)`:
//!
//! ```text
//!   NW: x <  h.x, y >= h.y    NE: x >= h.x, y >= h.y
//!   SW: x <  h.x, y <  h.y    SE: x >= h.x, y <  h.y
//! ```
//!
//! Points at the node's exact location go into its bucket. Nothing is ever
//! rebalanced, so the shape is decided by insertion order. A sorted input
//! inserted front to back degenerates into a chain; [`QuadTree::balanced`]
//! inserts medians first instead.
//!
//! Nodes live in an arena and every traversal uses an explicit stack, so a
//! chain thousands of nodes deep costs heap, not call stack.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use super::traits::SpatialIndex;
use crate::error::{Error, Result};
use crate::point::{radius_squared, squared_distance, PointId, PointSet};

const NW: usize = 0;
const NE: usize = 1;
const SW: usize = 2;
const SE: usize = 3;

#[derive(Debug, Clone)]
struct QuadNode {
    x: i32,
    y: i32,
    bucket: Vec<PointId>,
    children: [Option<usize>; 4],
}

impl QuadNode {
    fn new(x: i32, y: i32, id: PointId) -> Self {
        Self {
            x,
            y,
            bucket: vec![id],
            children: [None; 4],
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    fn quadrant(&self, x: i32, y: i32) -> usize {
        match (x < self.x, y < self.y) {
            (true, true) => SW,
            (true, false) => NW,
            (false, true) => SE,
            (false, false) => NE,
        }
    }
}

/// Query circle and its bounding square, widened to `i64`.
#[derive(Debug, Clone, Copy)]
struct Circle {
    cx: i32,
    cy: i32,
    r2: u64,
    xmin: i64,
    xmax: i64,
    ymin: i64,
    ymax: i64,
}

impl Circle {
    fn new(center: &[i32], radius: u32) -> Self {
        let (cx, cy) = (center[0], center[1]);
        let r = i64::from(radius);
        Self {
            cx,
            cy,
            r2: radius_squared(radius),
            xmin: i64::from(cx) - r,
            xmax: i64::from(cx) + r,
            ymin: i64::from(cy) - r,
            ymax: i64::from(cy) + r,
        }
    }

    fn covers(&self, node: &QuadNode) -> bool {
        squared_distance(&[self.cx, self.cy], &[node.x, node.y]) <= self.r2
    }

    /// Whether quadrant `q` of `node` can overlap the bounding square.
    fn reaches(&self, node: &QuadNode, q: usize) -> bool {
        let (x, y) = (i64::from(node.x), i64::from(node.y));
        match q {
            SW => self.xmin < x && self.ymin < y,
            NW => self.xmin < x && self.ymax >= y,
            SE => self.xmax >= x && self.ymin < y,
            _ => self.xmax >= x && self.ymax >= y,
        }
    }
}

/// A two-dimensional point-region quadtree.
#[derive(Debug, Clone, Default)]
pub struct QuadTree {
    nodes: Vec<QuadNode>,
    len: usize,
}

fn require_2d(dims: usize) -> Result<()> {
    if dims == 2 {
        Ok(())
    } else {
        Err(Error::UnsupportedDimension {
            index: "quadtree",
            dims,
        })
    }
}

fn xy_cmp(p: &[i32], q: &[i32]) -> Ordering {
    p[0].cmp(&q[0]).then(p[1].cmp(&q[1]))
}

/// Insertion positions for a sorted list of `len` items: the median of the
/// whole range first, then the medians of each half, breadth first.
fn median_order(len: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(len);
    let mut ranges = VecDeque::from([(0usize, len)]);
    while let Some((lo, hi)) = ranges.pop_front() {
        if lo >= hi {
            continue;
        }
        let mid = lo + (hi - 1 - lo) / 2;
        order.push(mid);
        ranges.push_back((lo, mid));
        ranges.push_back((mid + 1, hi));
    }
    order
}

#[inline]
fn less_msb(a: u32, b: u32) -> bool {
    a < b && a < (a ^ b)
}

#[inline]
fn biased(v: i32) -> u32 {
    (v as u32) ^ 0x8000_0000
}

/// Z-order (Morton) comparison without interleaving.
///
/// Picks the dimension whose coordinates differ in the most significant bit
/// and compares on it. Coordinates are sign-biased so negative values order
/// below positive ones.
pub fn zorder_cmp(p: &[i32], q: &[i32]) -> Ordering {
    let mut dim = 0;
    let mut top = 0u32;
    for k in 0..p.len().min(q.len()) {
        let diff = biased(p[k]) ^ biased(q[k]);
        if less_msb(top, diff) {
            dim = k;
            top = diff;
        }
    }
    match (p.get(dim), q.get(dim)) {
        (Some(&a), Some(&b)) => biased(a).cmp(&biased(b)),
        _ => Ordering::Equal,
    }
}

impl QuadTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every point of `points` in load order.
    pub fn from_points(points: &PointSet) -> Result<Self> {
        let ids: Vec<PointId> = points.ids().collect();
        Self::from_order(points, &ids)
    }

    /// Sort by `x` then `y` and insert medians first, keeping the tree shallow.
    pub fn balanced(points: &PointSet) -> Result<Self> {
        Self::balanced_by(points, xy_cmp)
    }

    /// Sort with `cmp` and insert medians first.
    pub fn balanced_by<F>(points: &PointSet, cmp: F) -> Result<Self>
    where
        F: FnMut(&[i32], &[i32]) -> Ordering,
    {
        let sorted = Self::sorted_ids(points, cmp)?;
        let order: Vec<PointId> = median_order(sorted.len()).into_iter().map(|i| sorted[i]).collect();
        Self::from_order(points, &order)
    }

    /// Sort with `cmp` and insert front to back.
    ///
    /// For comparators that keep nearby points adjacent (x-then-y, z-order)
    /// this is the worst case for depth; useful as a baseline.
    pub fn sorted_by<F>(points: &PointSet, cmp: F) -> Result<Self>
    where
        F: FnMut(&[i32], &[i32]) -> Ordering,
    {
        let sorted = Self::sorted_ids(points, cmp)?;
        Self::from_order(points, &sorted)
    }

    fn sorted_ids<F>(points: &PointSet, mut cmp: F) -> Result<Vec<PointId>>
    where
        F: FnMut(&[i32], &[i32]) -> Ordering,
    {
        if !points.is_empty() {
            require_2d(points.dims())?;
        }
        let mut ids: Vec<PointId> = points.ids().collect();
        ids.sort_by(|&a, &b| cmp(points.coords(a), points.coords(b)));
        Ok(ids)
    }

    fn from_order(points: &PointSet, order: &[PointId]) -> Result<Self> {
        if !points.is_empty() {
            require_2d(points.dims())?;
        }
        let mut tree = Self::new();
        tree.nodes.reserve(order.len());
        for &id in order {
            tree.insert_xy(id, points.coords(id))?;
        }
        log::trace!(
            "quadtree built: {} points, {} nodes, max depth {}",
            tree.len,
            tree.nodes.len(),
            tree.max_depth()
        );
        Ok(tree)
    }

    /// Number of distinct locations (nodes).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn insert_xy(&mut self, id: PointId, coords: &[i32]) -> Result<()> {
        require_2d(coords.len())?;
        let (x, y) = (coords[0], coords[1]);
        self.len += 1;

        if self.nodes.is_empty() {
            self.nodes.push(QuadNode::new(x, y, id));
            return Ok(());
        }

        let mut cur = 0;
        loop {
            let node = &mut self.nodes[cur];
            if node.x == x && node.y == y {
                node.bucket.push(id);
                return Ok(());
            }
            let q = node.quadrant(x, y);
            match node.children[q] {
                Some(child) => cur = child,
                None => {
                    let next = self.nodes.len();
                    self.nodes[cur].children[q] = Some(next);
                    self.nodes.push(QuadNode::new(x, y, id));
                    return Ok(());
                }
            }
        }
    }

    /// Whether some point sits exactly at `coords`.
    pub fn contains(&self, coords: &[i32]) -> bool {
        if coords.len() != 2 || self.nodes.is_empty() {
            return false;
        }
        let (x, y) = (coords[0], coords[1]);
        let mut cur = 0;
        loop {
            let node = &self.nodes[cur];
            if node.x == x && node.y == y {
                return true;
            }
            match node.children[node.quadrant(x, y)] {
                Some(child) => cur = child,
                None => return false,
            }
        }
    }

    fn check_query(center: &[i32]) {
        assert_eq!(center.len(), 2, "quadtree queries take two coordinates");
    }

    /// Collect matches in the subtree rooted at `start`.
    fn search_from(&self, start: usize, circle: &Circle, exclude: Option<PointId>, out: &mut Vec<PointId>) {
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if circle.covers(node) {
                out.extend(node.bucket.iter().copied().filter(|&id| Some(id) != exclude));
            }
            for (q, child) in node.children.iter().enumerate() {
                if let Some(c) = child {
                    if circle.reaches(node, q) {
                        stack.push(*c);
                    }
                }
            }
        }
    }

    /// [`SpatialIndex::range_search`] with the root's four quadrants searched
    /// as separate tasks on the rayon pool.
    ///
    /// Each task writes to its own buffer and the results are concatenated
    /// once all of them finished. A panicking task is reported as
    /// [`Error::WorkerFailed`] instead of yielding partial results.
    pub fn range_search_concurrent(
        &self,
        center: &[i32],
        radius: u32,
        exclude: Option<PointId>,
    ) -> Result<Vec<PointId>> {
        Self::check_query(center);
        let mut out = Vec::new();
        let Some(root) = self.nodes.first() else {
            return Ok(out);
        };
        let circle = Circle::new(center, radius);
        if circle.covers(root) {
            out.extend(root.bucket.iter().copied().filter(|&id| Some(id) != exclude));
        }

        let mut slots: [Option<std::thread::Result<Vec<PointId>>>; 4] = [None, None, None, None];
        rayon::scope(|s| {
            for (q, slot) in slots.iter_mut().enumerate() {
                let Some(child) = root.children[q] else {
                    continue;
                };
                if !circle.reaches(root, q) {
                    continue;
                }
                let circle = &circle;
                s.spawn(move |_| {
                    *slot = Some(panic::catch_unwind(AssertUnwindSafe(|| {
                        let mut part = Vec::new();
                        self.search_from(child, circle, exclude, &mut part);
                        part
                    })));
                });
            }
        });

        for slot in slots.into_iter().flatten() {
            match slot {
                Ok(part) => out.extend(part),
                Err(payload) => return Err(Error::worker_failed("quadrant query", payload)),
            }
        }
        Ok(out)
    }

    /// Verify every node lies in the quadrant its ancestors assigned it.
    pub fn is_valid(&self) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        // (node, x range, y range), lower bound inclusive, upper exclusive.
        let mut stack = vec![(0usize, (i64::MIN, i64::MAX), (i64::MIN, i64::MAX))];
        while let Some((idx, (xlo, xhi), (ylo, yhi))) = stack.pop() {
            let node = &self.nodes[idx];
            let (x, y) = (i64::from(node.x), i64::from(node.y));
            if x < xlo || x >= xhi || y < ylo || y >= yhi {
                return false;
            }
            for (q, child) in node.children.iter().enumerate() {
                let Some(c) = *child else { continue };
                let xr = if q == NW || q == SW { (xlo, x) } else { (x, xhi) };
                let yr = if q == SW || q == SE { (ylo, y) } else { (y, yhi) };
                stack.push((c, xr, yr));
            }
        }
        true
    }
}

impl SpatialIndex for QuadTree {
    fn name(&self) -> &'static str {
        "quadtree"
    }

    fn len(&self) -> usize {
        self.len
    }

    fn insert(&mut self, id: PointId, coords: &[i32]) -> Result<()> {
        self.insert_xy(id, coords)
    }

    fn range_search(&self, center: &[i32], radius: u32, exclude: Option<PointId>) -> Vec<PointId> {
        Self::check_query(center);
        let mut out = Vec::new();
        if !self.nodes.is_empty() {
            self.search_from(0, &Circle::new(center, radius), exclude, &mut out);
        }
        out
    }

    fn max_depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(self.nodes[idx].children.iter().flatten().map(|&c| (c, depth + 1)));
        }
        deepest
    }

    fn avg_depth(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let (mut sum, mut leaves) = (0usize, 0usize);
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                sum += depth;
                leaves += 1;
            } else {
                stack.extend(node.children.iter().flatten().map(|&c| (c, depth + 1)));
            }
        }
        sum as f64 / leaves as f64
    }

    fn all_points(&self) -> Vec<PointId> {
        let mut out = Vec::with_capacity(self.len);
        if self.nodes.is_empty() {
            return out;
        }
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            out.extend_from_slice(&node.bucket);
            stack.extend(node.children.iter().flatten());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(coords: &[(i32, i32)]) -> PointSet {
        PointSet::from_coords(coords.iter().map(|&(x, y)| vec![x, y]).collect()).unwrap()
    }

    fn grid(n: i32) -> PointSet {
        let mut coords = Vec::new();
        for x in 0..n {
            for y in 0..n {
                coords.push((x * 3, y * 2));
            }
        }
        set(&coords)
    }

    fn brute(points: &PointSet, center: &[i32], r: u32, exclude: Option<PointId>) -> Vec<PointId> {
        points
            .iter()
            .filter(|(id, p)| Some(*id) != exclude && squared_distance(p.coords(), center) <= radius_squared(r))
            .map(|(id, _)| id)
            .collect()
    }

    fn sorted(mut v: Vec<PointId>) -> Vec<PointId> {
        v.sort();
        v
    }

    #[test]
    fn test_median_order() {
        assert_eq!(median_order(0), Vec::<usize>::new());
        assert_eq!(median_order(1), vec![0]);
        assert_eq!(median_order(7), vec![3, 1, 5, 0, 2, 4, 6]);
        let mut all = median_order(10);
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_insert_and_contains() {
        let mut tree = QuadTree::new();
        tree.insert(PointId(0), &[5, 5]).unwrap();
        tree.insert(PointId(1), &[1, 9]).unwrap();
        tree.insert(PointId(2), &[5, 5]).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.node_count(), 2);
        assert!(tree.contains(&[5, 5]));
        assert!(tree.contains(&[1, 9]));
        assert!(!tree.contains(&[9, 1]));
        assert!(tree.is_valid());
    }

    #[test]
    fn test_insert_rejects_other_dimensions() {
        let mut tree = QuadTree::new();
        let err = tree.insert(PointId(0), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDimension { dims: 3, .. }));
        assert!(tree.is_empty());

        let points = PointSet::from_coords(vec![vec![1, 2, 3]]).unwrap();
        assert!(QuadTree::balanced(&points).is_err());
    }

    #[test]
    fn test_colocated_points_share_bucket() {
        let points = set(&[(2, 2), (2, 2), (2, 2), (0, 0)]);
        let tree = QuadTree::from_points(&points).unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(
            sorted(tree.range_search(&[2, 2], 0, Some(PointId(1)))),
            vec![PointId(0), PointId(2)]
        );
    }

    #[test]
    fn test_range_search_matches_brute_force_all_orders() {
        let points = grid(7);
        let trees = [
            QuadTree::from_points(&points).unwrap(),
            QuadTree::balanced(&points).unwrap(),
            QuadTree::sorted_by(&points, xy_cmp).unwrap(),
            QuadTree::sorted_by(&points, zorder_cmp).unwrap(),
            QuadTree::balanced_by(&points, zorder_cmp).unwrap(),
        ];
        for tree in &trees {
            assert!(tree.is_valid());
            assert_eq!(tree.len(), points.len());
            for r in [0, 1, 2, 3, 5, 8] {
                for id in points.ids().step_by(5) {
                    let c = points.coords(id);
                    assert_eq!(
                        sorted(tree.range_search(c, r, Some(id))),
                        sorted(brute(&points, c, r, Some(id))),
                    );
                }
            }
        }
    }

    #[test]
    fn test_query_center_outside_tree() {
        let points = set(&[(0, 0), (10, 0), (0, 10), (10, 10)]);
        let tree = QuadTree::balanced(&points).unwrap();
        assert_eq!(sorted(tree.range_search(&[5, 5], 8, None)), points.ids().collect::<Vec<_>>());
        assert!(tree.range_search(&[5, 5], 7, None).is_empty());
        assert_eq!(tree.range_search(&[-3, -4], 5, None), vec![PointId(0)]);
    }

    #[test]
    fn test_concurrent_matches_serial() {
        let points = grid(9);
        let tree = QuadTree::balanced(&points).unwrap();
        for r in [0, 2, 4, 9, 30] {
            for id in points.ids() {
                let c = points.coords(id);
                let serial = sorted(tree.range_search(c, r, Some(id)));
                let concurrent = sorted(tree.range_search_concurrent(c, r, Some(id)).unwrap());
                assert_eq!(serial, concurrent);
            }
        }
        assert!(QuadTree::new().range_search_concurrent(&[0, 0], 3, None).unwrap().is_empty());
    }

    #[test]
    fn test_chain_depth_does_not_overflow_stack() {
        let coords: Vec<(i32, i32)> = (0..5_000).map(|i| (i, i)).collect();
        let points = set(&coords);
        let tree = QuadTree::from_points(&points).unwrap();
        assert_eq!(tree.max_depth(), 5_000);
        assert_eq!(tree.avg_depth(), 5_000.0);
        assert_eq!(
            sorted(tree.range_search(&[10, 10], 2, Some(PointId(10)))),
            vec![PointId(9), PointId(11)]
        );

        let balanced = QuadTree::balanced(&points).unwrap();
        assert!(balanced.max_depth() <= 13);
        assert!(balanced.is_valid());
    }

    #[test]
    fn test_balanced_is_shallower_than_sorted() {
        let points = grid(16);
        let chain = QuadTree::sorted_by(&points, xy_cmp).unwrap();
        let balanced = QuadTree::balanced(&points).unwrap();
        assert!(balanced.max_depth() < chain.max_depth());
    }

    #[test]
    fn test_depth_conventions() {
        let empty = QuadTree::new();
        assert_eq!(empty.max_depth(), 0);
        assert_eq!(empty.avg_depth(), 0.0);
        assert!(empty.all_points().is_empty());

        let one = QuadTree::from_points(&set(&[(3, 3)])).unwrap();
        assert_eq!(one.max_depth(), 1);
        assert_eq!(one.avg_depth(), 1.0);
    }

    #[test]
    fn test_all_points() {
        let points = grid(4);
        let tree = QuadTree::balanced(&points).unwrap();
        assert_eq!(sorted(tree.all_points()), points.ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_zorder_cmp() {
        assert_eq!(zorder_cmp(&[0, 0], &[0, 0]), Ordering::Equal);
        assert_eq!(zorder_cmp(&[1, 0], &[0, 1]), Ordering::Greater);
        assert_eq!(zorder_cmp(&[3, 0], &[0, 2]), Ordering::Greater);
        // y differs in a higher bit than x, so y decides.
        assert_eq!(zorder_cmp(&[1, 4], &[2, 0]), Ordering::Greater);
        assert_eq!(zorder_cmp(&[-1, 0], &[1, 0]), Ordering::Less);

        let mut cells = vec![[1, 1], [0, 0], [1, 0], [0, 1]];
        cells.sort_by(|a, b| zorder_cmp(a, b));
        assert_eq!(cells, vec![[0, 0], [0, 1], [1, 0], [1, 1]]);
    }
}
