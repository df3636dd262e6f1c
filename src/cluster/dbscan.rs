//! DBSCAN: Density-Based Spatial Clustering of Applications with Noise.
//!
//! # The Algorithm (Ester et al., 1996)
//!
//! DBSCAN groups points by neighborhood density. It discovers clusters of
//! arbitrary shape, needs no cluster count, and labels outliers as noise.
//!
//! ## Core Concepts
//!
//! - **Epsilon (ε)**: Maximum distance between two points to be neighbors.
//! - **MinPts**: Minimum neighbor count for a point to be "core". The point
//!   itself is not counted.
//! - **Core point**: Has at least MinPts neighbors within ε.
//! - **Border point**: Within ε of a core point but not core itself.
//! - **Noise point**: Neither core nor border.
//!
//! ## Two Phases
//!
//! Neighbor sets are computed once per ε by a [`NeighborFinder`]; the
//! [`DbscanEngine`] then only reads them. Changing MinPts reruns the engine
//! without touching the neighbor sets.
//!
//! ## Engine Steps
//!
//! 1. For each unvisited point P, in load order:
//!    - Mark visited, report progress.
//!    - If |N(P)| < MinPts, mark as noise (may become a border point later).
//!    - Else start a new cluster containing P and expand it.
//!
//! 2. Expansion works through an explicit frontier seeded with N(P):
//!    - An unvisited point is marked visited; if it is core, its neighbors join
//!      the frontier.
//!    - Any point not yet in a cluster joins the current one, including
//!      points previously marked as noise.
//!
//! Each point enters a given cluster's frontier at most once, so a cluster
//! expansion is linear in the sizes of the neighbor sets it reads.
//!
//! ## References
//!
//! Ester et al. (1996). "A Density-Based Algorithm for Discovering Clusters
//! in Large Spatial Databases with Noise." KDD-96.

use std::collections::VecDeque;

use super::neighbors::{NeighborFinder, Strategy};
use super::traits::Clustering;
use crate::error::{Error, Result};
use crate::point::{NeighborState, PointId, PointSet};
use crate::progress::{CancelToken, NoProgress, RunContext, RunStatus, Stage};

/// Sentinel for noise when flattening [`DbscanExt::fit_predict_with_noise`] labels.
pub const NOISE: usize = usize::MAX;

const UNQUEUED: usize = usize::MAX;

/// Result of a clustering run: disjoint clusters plus a noise set.
///
/// Clusters are listed in discovery order; ids inside every set are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterPartition {
    clusters: Vec<Vec<PointId>>,
    noise: Vec<PointId>,
}

impl ClusterPartition {
    /// The clusters.
    pub fn clusters(&self) -> &[Vec<PointId>] {
        &self.clusters
    }

    /// Points in no cluster.
    pub fn noise(&self) -> &[PointId] {
        &self.noise
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Number of points placed anywhere (clusters and noise).
    pub fn n_points(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum::<usize>() + self.noise.len()
    }

    /// One label per point of an `n`-point set, `None` for noise.
    pub fn labels(&self, n: usize) -> Vec<Option<usize>> {
        let mut labels = vec![None; n];
        for (c, members) in self.clusters.iter().enumerate() {
            for id in members {
                labels[id.index()] = Some(c);
            }
        }
        labels
    }
}

/// Partitions points with populated neighbor sets into clusters and noise.
#[derive(Debug, Clone, Copy)]
pub struct DbscanEngine {
    min_pts: usize,
}

impl DbscanEngine {
    /// Create an engine. `min_pts` must be at least 1.
    pub fn new(min_pts: usize) -> Result<Self> {
        if min_pts == 0 {
            return Err(Error::InvalidParameter {
                name: "min_pts",
                message: "must be at least 1",
            });
        }
        Ok(Self { min_pts })
    }

    /// Configured minimum neighbor count.
    pub fn min_pts(&self) -> usize {
        self.min_pts
    }

    /// Cluster without progress reporting or cancellation.
    pub fn cluster(&self, points: &mut PointSet) -> Result<ClusterPartition> {
        let cancel = CancelToken::new();
        match self.run(points, RunContext::new(&NoProgress, &cancel))? {
            RunStatus::Completed(partition) => Ok(partition),
            RunStatus::Cancelled => Err(Error::Other("clustering cancelled without a cancel request".into())),
        }
    }

    /// Run one clustering pass.
    ///
    /// Visited flags are reset first. Fails with [`Error::NeighborsNotReady`]
    /// unless the neighbor sets come from a completed run; an empty set needs
    /// no neighbor run. Neighbor sets are never modified.
    pub fn run(&self, points: &mut PointSet, ctx: RunContext<'_>) -> Result<RunStatus<ClusterPartition>> {
        let n = points.len();
        if n == 0 {
            return Ok(RunStatus::Completed(ClusterPartition::default()));
        }
        if points.neighbor_state() == NeighborState::Stale {
            return Err(Error::NeighborsNotReady);
        }
        points.reset_visited();
        log::debug!("clustering {} points with min_pts={}", n, self.min_pts);

        let mut clusters: Vec<Vec<PointId>> = Vec::new();
        let mut assigned: Vec<Option<usize>> = vec![None; n];
        let mut queued: Vec<usize> = vec![UNQUEUED; n];
        let mut noise_mark = vec![false; n];
        let mut processed = 0usize;
        let mut frontier: VecDeque<PointId> = VecDeque::new();

        for i in 0..n {
            if ctx.is_cancelled() {
                log::info!("clustering cancelled after {processed} of {n} points");
                return Ok(RunStatus::Cancelled);
            }
            let pid = PointId(i);
            if points.point(pid).visited {
                continue;
            }
            points.point_mut(pid).visited = true;
            processed += 1;
            ctx.report(Stage::Clustering, processed, n);

            if points.point(pid).neighbor_count() < self.min_pts {
                noise_mark[i] = true;
                continue;
            }

            let c = clusters.len();
            clusters.push(vec![pid]);
            assigned[i] = Some(c);
            queued[i] = c;
            for &q in points.point(pid).neighbors() {
                queued[q.index()] = c;
                frontier.push_back(q);
            }

            while let Some(j) = frontier.pop_front() {
                let ji = j.index();
                if !points.point(j).visited {
                    if ctx.is_cancelled() {
                        log::info!("clustering cancelled after {processed} of {n} points");
                        return Ok(RunStatus::Cancelled);
                    }
                    points.point_mut(j).visited = true;
                    processed += 1;
                    ctx.report(Stage::Clustering, processed, n);

                    let pj = points.point(j);
                    if pj.neighbor_count() >= self.min_pts {
                        for &q in pj.neighbors() {
                            if queued[q.index()] != c {
                                queued[q.index()] = c;
                                frontier.push_back(q);
                            }
                        }
                    }
                }
                if assigned[ji].is_none() {
                    assigned[ji] = Some(c);
                    clusters[c].push(j);
                    noise_mark[ji] = false;
                }
            }
        }

        for members in &mut clusters {
            members.sort_unstable();
        }
        let noise: Vec<PointId> = (0..n)
            .filter(|&i| noise_mark[i] && assigned[i].is_none())
            .map(PointId)
            .collect();

        log::debug!("found {} clusters, {} noise points", clusters.len(), noise.len());
        Ok(RunStatus::Completed(ClusterPartition { clusters, noise }))
    }
}

/// DBSCAN clustering over raw coordinate vectors.
///
/// Loads the data, finds neighbors with the configured [`Strategy`] and runs
/// the [`DbscanEngine`] in one call.
#[derive(Debug, Clone)]
pub struct Dbscan {
    /// Epsilon: maximum distance for neighborhood.
    epsilon: u32,
    /// Minimum neighbors for core point classification.
    min_pts: usize,
    strategy: Strategy,
}

impl Dbscan {
    /// Create a new DBSCAN clusterer.
    ///
    /// # Arguments
    ///
    /// * `epsilon` - Maximum distance between two points to be neighbors.
    /// * `min_pts` - Minimum number of neighbors for a core point.
    ///
    /// # Typical Values
    ///
    /// - `epsilon`: Often determined by k-distance plot (k = min_pts).
    /// - `min_pts`: 2 * dimension is a common heuristic.
    pub fn new(epsilon: u32, min_pts: usize) -> Self {
        Self {
            epsilon,
            min_pts,
            strategy: Strategy::default(),
        }
    }

    /// Set epsilon (neighborhood radius).
    pub fn with_epsilon(mut self, epsilon: u32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set minimum neighbors for core classification.
    pub fn with_min_pts(mut self, min_pts: usize) -> Self {
        self.min_pts = min_pts;
        self
    }

    /// Set the neighbor-finding strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Cluster `data`, returning the partition by point index.
    pub fn fit(&self, data: &[Vec<i32>]) -> Result<ClusterPartition> {
        let engine = DbscanEngine::new(self.min_pts)?;
        let mut points = PointSet::from_coords(data.to_vec())?;
        NeighborFinder::new(self.strategy).find(&mut points, self.epsilon)?;
        engine.cluster(&mut points)
    }
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(1, 3)
    }
}

impl Clustering for Dbscan {
    /// Noise points are placed in a final "noise cluster" labeled
    /// `n_clusters`, so the labels always form a partition.
    fn fit_predict(&self, data: &[Vec<i32>]) -> Result<Vec<usize>> {
        let partition = self.fit(data)?;
        let noise_cluster = partition.n_clusters();
        Ok(partition
            .labels(data.len())
            .into_iter()
            .map(|l| l.unwrap_or(noise_cluster))
            .collect())
    }

    /// DBSCAN discovers clusters dynamically, so this returns 0.
    ///
    /// To get the actual number of clusters, examine the labels after `fit_predict`.
    fn n_clusters(&self) -> usize {
        0 // Unknown until fit
    }
}

/// Extended DBSCAN interface with noise detection.
pub trait DbscanExt {
    /// Fit and predict, returning labels where noise is marked as `None`.
    fn fit_predict_with_noise(&self, data: &[Vec<i32>]) -> Result<Vec<Option<usize>>>;

    /// Check if a label represents noise.
    fn is_noise(label: usize) -> bool {
        label == NOISE
    }
}

impl DbscanExt for Dbscan {
    fn fit_predict_with_noise(&self, data: &[Vec<i32>]) -> Result<Vec<Option<usize>>> {
        Ok(self.fit(data)?.labels(data.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Progress;
    use std::sync::Mutex;

    fn clustered(coords: Vec<Vec<i32>>, epsilon: u32, min_pts: usize) -> (PointSet, ClusterPartition) {
        let mut points = PointSet::from_coords(coords).unwrap();
        NeighborFinder::new(Strategy::BruteForce).find(&mut points, epsilon).unwrap();
        let partition = DbscanEngine::new(min_pts).unwrap().cluster(&mut points).unwrap();
        (points, partition)
    }

    #[test]
    fn test_square_and_outlier() {
        let data = vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1], vec![10, 10]];
        let (_, partition) = clustered(data, 2, 3);
        assert_eq!(partition.n_clusters(), 1);
        assert_eq!(
            partition.clusters()[0],
            vec![PointId(0), PointId(1), PointId(2), PointId(3)]
        );
        assert_eq!(partition.noise(), &[PointId(4)]);
    }

    #[test]
    fn test_fit_predict_puts_noise_in_trailing_cluster() {
        let data = vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1], vec![10, 10]];
        let labels = Dbscan::new(2, 3).fit_predict(&data).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0, 1]);

        let lone = Dbscan::new(2, 3).fit_predict(&[vec![4, 4]]).unwrap();
        assert_eq!(lone, vec![0]);
        assert!(Dbscan::new(2, 3).fit_predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_dbscan_two_clusters() {
        // Two well-separated clusters
        let data = vec![
            // Cluster 1: around (0, 0)
            vec![0, 0],
            vec![1, 0],
            vec![0, 1],
            vec![1, 1],
            vec![2, 2],
            // Cluster 2: around (50, 50)
            vec![50, 50],
            vec![51, 50],
            vec![50, 51],
            vec![51, 51],
            vec![52, 52],
        ];

        let labels = Dbscan::new(2, 2).fit_predict(&data).unwrap();
        assert_eq!(labels.len(), 10);

        let cluster1 = labels[0];
        for label in &labels[1..5] {
            assert_eq!(*label, cluster1);
        }
        let cluster2 = labels[5];
        for label in &labels[6..10] {
            assert_eq!(*label, cluster2);
        }
        assert_ne!(cluster1, cluster2);
        assert!(labels.iter().all(|&l| l < 2));
    }

    #[test]
    fn test_dbscan_with_noise() {
        let data = vec![
            vec![0, 0],
            vec![1, 0],
            vec![0, 1],
            vec![1, 1],
            // Outlier
            vec![100, 100],
            vec![50, 50],
            vec![51, 50],
            vec![50, 51],
            vec![51, 51],
        ];

        let labels = Dbscan::new(2, 3).fit_predict_with_noise(&data).unwrap();
        assert_eq!(labels.len(), 9);
        assert!(labels[4].is_none());
        for (i, label) in labels.iter().enumerate() {
            if i != 4 {
                assert!(label.is_some());
            }
        }
        let flat = Dbscan::new(2, 3).fit_predict(&data).unwrap();
        assert_eq!(flat[4], 2);
        assert!(flat.iter().enumerate().all(|(i, &l)| i == 4 || l < 2));
        assert!(!Dbscan::is_noise(flat[4]));
    }

    #[test]
    fn test_dbscan_all_noise() {
        let data = vec![vec![0, 0], vec![10, 0], vec![0, 10], vec![10, 10]];
        let labels = Dbscan::new(5, 1).fit_predict_with_noise(&data).unwrap();
        assert!(labels.into_iter().all(|l| l.is_none()));
    }

    #[test]
    fn test_dbscan_chain() {
        // Chain of points - DBSCAN should connect them
        let data: Vec<Vec<i32>> = (0..10).map(|i| vec![i * 3, 0]).collect();
        let labels = Dbscan::new(3, 2).fit_predict(&data).unwrap();
        let cluster = labels[0];
        assert_eq!(cluster, 0);
        for label in labels {
            assert_eq!(label, cluster);
        }
    }

    #[test]
    fn test_border_point_absorbed_after_noise() {
        // Point 0 is visited first and has one neighbor, so it is marked
        // noise; the core point 1 later absorbs it as a border point.
        let data = vec![vec![-2, 0], vec![0, 0], vec![1, 0], vec![0, 1], vec![0, -1]];
        let (_, partition) = clustered(data, 2, 3);
        assert_eq!(partition.n_clusters(), 1);
        assert_eq!(partition.clusters()[0].len(), 5);
        assert!(partition.noise().is_empty());
    }

    #[test]
    fn test_border_does_not_expand() {
        // 0..=3 are core; 4 is a border point whose other neighbor 5 is
        // out of reach of any core point.
        let data = vec![
            vec![0, 0],
            vec![1, 0],
            vec![0, 1],
            vec![1, 1],
            vec![3, 1],
            vec![5, 1],
        ];
        let (_, partition) = clustered(data, 2, 3);
        assert_eq!(partition.n_clusters(), 1);
        assert!(partition.clusters()[0].contains(&PointId(4)));
        assert_eq!(partition.noise(), &[PointId(5)]);
    }

    #[test]
    fn test_singleton_core_cluster() {
        // min_pts = 1: an isolated pair forms a cluster, an isolated point is noise.
        let data = vec![vec![0, 0], vec![1, 0], vec![9, 9]];
        let (_, partition) = clustered(data, 1, 1);
        assert_eq!(partition.clusters(), &[vec![PointId(0), PointId(1)]]);
        assert_eq!(partition.noise(), &[PointId(2)]);
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(
            Dbscan::new(1, 1).fit(&[]).unwrap(),
            ClusterPartition::default()
        );
        for min_pts in [1, 2, 10] {
            let partition = Dbscan::new(100, min_pts).fit(&[vec![3, 4]]).unwrap();
            assert_eq!(partition.n_clusters(), 0);
            assert_eq!(partition.noise(), &[PointId(0)]);
        }
    }

    #[test]
    fn test_invalid_params() {
        let data = vec![vec![0, 0]];
        assert!(Dbscan::new(1, 0).fit_predict(&data).is_err());
        assert!(DbscanEngine::new(0).is_err());
        assert!(Dbscan::new(1, 2).fit_predict(&[vec![0, 0], vec![1]]).is_err());
    }

    #[test]
    fn test_requires_neighbors() {
        let mut points = PointSet::from_coords(vec![vec![0, 0], vec![1, 1]]).unwrap();
        let engine = DbscanEngine::new(1).unwrap();
        assert!(matches!(engine.cluster(&mut points), Err(Error::NeighborsNotReady)));
    }

    #[test]
    fn test_rerun_with_new_min_pts_keeps_neighbors() {
        let data = vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1], vec![10, 10]];
        let (mut points, first) = clustered(data, 2, 3);
        let before: Vec<usize> = points.iter().map(|(_, p)| p.neighbor_count()).collect();

        let strict = DbscanEngine::new(4).unwrap().cluster(&mut points).unwrap();
        assert_eq!(strict.n_clusters(), 0);
        assert_eq!(strict.noise().len(), 5);

        let again = DbscanEngine::new(3).unwrap().cluster(&mut points).unwrap();
        assert_eq!(again, first);
        let after: Vec<usize> = points.iter().map(|(_, p)| p.neighbor_count()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_progress_and_cancel() {
        let data: Vec<Vec<i32>> = (0..20).map(|i| vec![i * 10, 0]).collect();
        let mut points = PointSet::from_coords(data).unwrap();
        NeighborFinder::new(Strategy::KdTree).find(&mut points, 1).unwrap();
        let engine = DbscanEngine::new(1).unwrap();

        let seen = Mutex::new(Vec::new());
        let cancel = CancelToken::new();
        let sink = |p: Progress| {
            seen.lock().unwrap().push(p.processed);
            if p.processed == 5 {
                cancel.cancel();
            }
        };
        let status = engine.run(&mut points, RunContext::new(&sink, &cancel)).unwrap();
        assert!(status.is_cancelled());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);

        // A fresh run starts over.
        let partition = engine.cluster(&mut points).unwrap();
        assert_eq!(partition.noise().len(), 20);
        assert!(points.iter().all(|(_, p)| p.is_visited()));
    }

    #[test]
    fn test_labels() {
        let data = vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1], vec![10, 10]];
        let (points, partition) = clustered(data, 2, 3);
        assert_eq!(
            partition.labels(points.len()),
            vec![Some(0), Some(0), Some(0), Some(0), None]
        );
        assert_eq!(partition.n_points(), 5);
    }
}
