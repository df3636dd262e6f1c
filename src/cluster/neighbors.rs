//! Neighbor discovery: populate every point's ε-neighborhood.
//!
//! Whatever the strategy, the result is the same symmetric relation:
//! `q ∈ N(p) ⟺ dist(p, q) <= ε ⟺ p ∈ N(q)` for `p != q`.
//!
//! - [`Strategy::BruteForce`]: every unordered pair once, O(n²).
//! - [`Strategy::BruteForceParallel`]: the same pairs split by row across the
//!   rayon pool. Each point accumulates behind its own lock, so workers only
//!   contend when they hit the same point.
//! - [`Strategy::KdTree`], [`Strategy::QuadTree`]: build the index once and
//!   adopt one range query per point as that point's neighbor set.
//! - [`Strategy::QuadTreeThreaded`]: as `QuadTree`, with each query split
//!   four ways over the root's quadrants.
//!
//! Every strategy checks for cancellation and reports progress once per point.

use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::index::{KdTree, QuadTree, SpatialIndex};
use crate::point::{radius_squared, squared_distance, PointId, PointSet};
use crate::progress::{CancelToken, NoProgress, RunContext, RunStatus, Stage};

/// How neighbor sets are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Serial all-pairs comparison.
    BruteForce,
    /// All-pairs comparison on the worker pool.
    BruteForceParallel,
    /// One range query per point against a balanced k-d tree.
    #[default]
    KdTree,
    /// One range query per point against a balanced quadtree (2-D only).
    QuadTree,
    /// Quadtree queries with the four root quadrants searched concurrently (2-D only).
    QuadTreeThreaded,
}

impl Strategy {
    /// Every strategy, cheapest to build first.
    pub const ALL: [Strategy; 5] = [
        Strategy::BruteForce,
        Strategy::BruteForceParallel,
        Strategy::KdTree,
        Strategy::QuadTree,
        Strategy::QuadTreeThreaded,
    ];

    /// Stable short name, accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Strategy::BruteForce => "brute-force",
            Strategy::BruteForceParallel => "brute-force-parallel",
            Strategy::KdTree => "kd-tree",
            Strategy::QuadTree => "quadtree",
            Strategy::QuadTreeThreaded => "quadtree-threaded",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.name() == s)
            .ok_or(Error::InvalidParameter {
                name: "strategy",
                message: "expected one of brute-force, brute-force-parallel, kd-tree, quadtree, quadtree-threaded",
            })
    }
}

/// Populates neighbor sets with a chosen [`Strategy`].
#[derive(Debug, Clone, Default)]
pub struct NeighborFinder {
    strategy: Strategy,
    threads: Option<usize>,
}

impl NeighborFinder {
    /// Create a finder. Parallel strategies use the global rayon pool.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            threads: None,
        }
    }

    /// Run parallel strategies on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Selected strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Populate neighbor sets without progress reporting or cancellation.
    pub fn find(&self, points: &mut PointSet, epsilon: u32) -> Result<()> {
        let cancel = CancelToken::new();
        self.run(points, epsilon, RunContext::new(&NoProgress, &cancel))
            .map(|_| ())
    }

    /// Populate neighbor sets, reporting progress and honoring cancellation.
    ///
    /// Neighbor sets and visited flags are cleared first. On
    /// [`RunStatus::Cancelled`] or on error the neighbor sets are cleared
    /// again and left [`crate::NeighborState::Stale`].
    pub fn run(&self, points: &mut PointSet, epsilon: u32, ctx: RunContext<'_>) -> Result<RunStatus<()>> {
        if self.threads == Some(0) {
            return Err(Error::InvalidParameter {
                name: "threads",
                message: "must be at least 1",
            });
        }

        points.reset_neighbors();
        points.reset_visited();
        log::debug!(
            "finding neighbors of {} points: strategy={}, epsilon={}",
            points.len(),
            self.strategy,
            epsilon
        );

        let result = if points.is_empty() {
            Ok(RunStatus::Completed(()))
        } else {
            match self.strategy {
                Strategy::BruteForce => brute_force(points, epsilon, ctx),
                Strategy::BruteForceParallel => {
                    self.in_pool(|| brute_force_parallel(points, epsilon, ctx))
                        .and_then(|r| r)
                }
                Strategy::KdTree => KdTree::build(points).and_then(|tree| {
                    adopt_queries(&tree, points, ctx, |t, c, id| Ok(t.range_search(c, epsilon, Some(id))))
                }),
                Strategy::QuadTree => QuadTree::balanced(points).and_then(|tree| {
                    adopt_queries(&tree, points, ctx, |t, c, id| Ok(t.range_search(c, epsilon, Some(id))))
                }),
                Strategy::QuadTreeThreaded => QuadTree::balanced(points).and_then(|tree| {
                    self.in_pool(|| {
                        adopt_queries(&tree, points, ctx, |t, c, id| {
                            t.range_search_concurrent(c, epsilon, Some(id))
                        })
                    })
                    .and_then(|r| r)
                }),
            }
        };

        match result {
            Ok(RunStatus::Completed(())) => {
                points.mark_ready(epsilon);
                log::debug!("neighbor finding complete");
                Ok(RunStatus::Completed(()))
            }
            Ok(RunStatus::Cancelled) => {
                points.reset_neighbors();
                log::info!("neighbor finding cancelled");
                Ok(RunStatus::Cancelled)
            }
            Err(e) => {
                points.reset_neighbors();
                log::warn!("neighbor finding failed: {e}");
                Err(e)
            }
        }
    }

    fn in_pool<R, F>(&self, f: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match self.threads {
            None => Ok(f()),
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("dbscan-neighbors-{i}"))
                    .build()
                    .map_err(|e| Error::ThreadPool(e.to_string()))?;
                Ok(pool.install(f))
            }
        }
    }
}

fn brute_force(points: &mut PointSet, epsilon: u32, ctx: RunContext<'_>) -> Result<RunStatus<()>> {
    let n = points.len();
    let r2 = radius_squared(epsilon);
    let mut found: Vec<HashSet<PointId>> = vec![HashSet::new(); n];

    for i in 0..n {
        if ctx.is_cancelled() {
            return Ok(RunStatus::Cancelled);
        }
        let ci = points.coords(PointId(i));
        for j in (i + 1)..n {
            if squared_distance(ci, points.coords(PointId(j))) <= r2 {
                found[i].insert(PointId(j));
                found[j].insert(PointId(i));
            }
        }
        ctx.report(Stage::Neighbors, i + 1, n);
    }

    for (i, set) in found.into_iter().enumerate() {
        points.set_neighbors(PointId(i), set);
    }
    Ok(RunStatus::Completed(()))
}

fn brute_force_parallel(points: &mut PointSet, epsilon: u32, ctx: RunContext<'_>) -> Result<RunStatus<()>> {
    let n = points.len();
    let r2 = radius_squared(epsilon);
    let found: Vec<Mutex<HashSet<PointId>>> = (0..n).map(|_| Mutex::new(HashSet::new())).collect();
    let done = AtomicUsize::new(0);

    let shared: &PointSet = points;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        (0..n).into_par_iter().for_each(|i| {
            if ctx.is_cancelled() {
                return;
            }
            let ci = shared.coords(PointId(i));
            let mut row = Vec::new();
            for j in (i + 1)..n {
                if squared_distance(ci, shared.coords(PointId(j))) <= r2 {
                    row.push(PointId(j));
                    found[j].lock().insert(PointId(i));
                }
            }
            found[i].lock().extend(row);
            let processed = done.fetch_add(1, Ordering::AcqRel) + 1;
            ctx.report(Stage::Neighbors, processed, n);
        });
    }));
    if let Err(payload) = outcome {
        return Err(Error::worker_failed("brute-force row", payload));
    }

    if done.load(Ordering::Acquire) < n {
        return Ok(RunStatus::Cancelled);
    }
    for (i, set) in found.into_iter().enumerate() {
        points.set_neighbors(PointId(i), set.into_inner());
    }
    Ok(RunStatus::Completed(()))
}

/// Issue one query per point and adopt its result as the neighbor set.
fn adopt_queries<I, Q>(index: &I, points: &mut PointSet, ctx: RunContext<'_>, query: Q) -> Result<RunStatus<()>>
where
    I: SpatialIndex,
    Q: Fn(&I, &[i32], PointId) -> Result<Vec<PointId>>,
{
    let shape = index.shape();
    log::debug!(
        "{} built: size={}, max_depth={}, avg_depth={:.3}",
        index.name(),
        shape.size,
        shape.max_depth,
        shape.avg_depth
    );

    let n = points.len();
    for i in 0..n {
        if ctx.is_cancelled() {
            return Ok(RunStatus::Cancelled);
        }
        let id = PointId(i);
        let found = query(index, points.coords(id), id)?;
        points.set_neighbors(id, found.into_iter().collect());
        ctx.report(Stage::Neighbors, i + 1, n);
    }
    Ok(RunStatus::Completed(()))
}
