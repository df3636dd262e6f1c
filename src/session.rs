//! Background runs for interactive callers.
//!
//! A [`Session`] owns a point set and runs neighbor finding and clustering
//! on a background thread, so a UI or CLI thread can watch the
//! [`Progress`] stream and cancel at any time. Each run holds the point set
//! exclusively; a run started while another is in flight waits for it.
//!
//! [`Session::spawn_pipeline`] runs both phases on one thread: clustering
//! starts only once neighbor finding completed, and is skipped if it was
//! cancelled.

use std::io::BufRead;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::cluster::{ClusterPartition, DbscanEngine, DbscanParams, NeighborFinder, Strategy};
use crate::error::{Error, Result};
use crate::index::{zorder_cmp, IndexShape, KdTree, QuadTree, SpatialIndex};
use crate::point::{load_points, NeighborState, PointSet};
use crate::progress::{CancelToken, Progress, RunContext, RunStatus};

/// Index layouts that [`Session::index_shape`] can measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Balanced k-d tree.
    KdTree,
    /// Quadtree with points inserted in load order.
    QuadTreeArbitrary,
    /// Quadtree sorted by x then y, medians inserted first.
    QuadTreeBalanced,
    /// Quadtree with points inserted in z-order.
    QuadTreeZOrder,
}

/// A background run: progress stream, cancel switch, and final result.
pub struct RunHandle<T> {
    progress: Receiver<Progress>,
    cancel: CancelToken,
    thread: JoinHandle<Result<RunStatus<T>>>,
}

impl<T> RunHandle<T> {
    /// Progress updates, in the order the run produced them.
    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    /// Ask the run to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token the run checks; cancelling it is the same as [`RunHandle::cancel`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the background thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> Result<RunStatus<T>> {
        self.thread
            .join()
            .map_err(|payload| Error::worker_failed("session run", payload))?
    }
}

/// Point set, parameters, and last partition, shared with background runs.
pub struct Session {
    points: Arc<RwLock<PointSet>>,
    partition: Arc<Mutex<Option<ClusterPartition>>>,
    params: DbscanParams,
    threads: Option<usize>,
}

impl Session {
    /// Start a session over `points`.
    pub fn new(points: PointSet, params: DbscanParams) -> Self {
        Self {
            points: Arc::new(RwLock::new(points)),
            partition: Arc::new(Mutex::new(None)),
            params,
            threads: None,
        }
    }

    /// Parse points from text (see [`crate::parse_points`]) and start a session.
    pub fn load<R: BufRead>(reader: R, params: DbscanParams) -> Result<Self> {
        Ok(Self::new(load_points(reader)?, params))
    }

    /// Run parallel strategies on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Validate and apply new parameters.
    ///
    /// Neighbor sets stay valid if ε is unchanged; otherwise clustering will
    /// require a fresh neighbor-finding run.
    pub fn configure(&mut self, epsilon: i64, min_pts: i64) -> Result<()> {
        self.params = DbscanParams::new(epsilon, min_pts)?;
        log::debug!(
            "session configured: epsilon={}, min_pts={}",
            self.params.epsilon,
            self.params.min_pts
        );
        Ok(())
    }

    /// Current parameters.
    pub fn params(&self) -> DbscanParams {
        self.params
    }

    /// Number of points.
    pub fn size(&self) -> usize {
        self.points.read().len()
    }

    /// Read access to the points. Blocks while a run holds them.
    pub fn points(&self) -> RwLockReadGuard<'_, PointSet> {
        self.points.read()
    }

    /// The partition from the last completed clustering run, if still current.
    pub fn partition(&self) -> Option<ClusterPartition> {
        self.partition.lock().clone()
    }

    /// Clear neighbor sets, visited flags and the stored partition.
    pub fn reset(&self) {
        let mut points = self.points.write();
        points.reset_neighbors();
        points.reset_visited();
        self.partition.lock().take();
    }

    /// Build an index over the current points and measure it.
    pub fn index_shape(&self, kind: IndexKind) -> Result<IndexShape> {
        let points = self.points.read();
        Ok(match kind {
            IndexKind::KdTree => KdTree::build(&points)?.shape(),
            IndexKind::QuadTreeArbitrary => QuadTree::from_points(&points)?.shape(),
            IndexKind::QuadTreeBalanced => QuadTree::balanced(&points)?.shape(),
            IndexKind::QuadTreeZOrder => QuadTree::sorted_by(&points, zorder_cmp)?.shape(),
        })
    }

    fn finder(&self, strategy: Strategy) -> NeighborFinder {
        let finder = NeighborFinder::new(strategy);
        match self.threads {
            Some(n) => finder.with_threads(n),
            None => finder,
        }
    }

    fn spawn<T, F>(&self, name: &str, job: F) -> Result<RunHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Sender<Progress>, &CancelToken) -> Result<RunStatus<T>> + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || job(&tx, &token))?;
        Ok(RunHandle {
            progress: rx,
            cancel,
            thread,
        })
    }

    /// Populate neighbor sets in the background with the current ε.
    pub fn spawn_neighbor_finding(&self, strategy: Strategy) -> Result<RunHandle<()>> {
        let points = Arc::clone(&self.points);
        let partition = Arc::clone(&self.partition);
        let finder = self.finder(strategy);
        let epsilon = self.params.epsilon;

        self.spawn("dbscan-neighbors", move |tx, token| {
            let mut points = points.write();
            partition.lock().take();
            finder.run(&mut points, epsilon, RunContext::new(tx, token))
        })
    }

    /// Cluster in the background with the current MinPts.
    ///
    /// The run fails with [`Error::NeighborsNotReady`] unless neighbor sets
    /// were completed for the current ε.
    pub fn spawn_clustering(&self) -> Result<RunHandle<ClusterPartition>> {
        let points = Arc::clone(&self.points);
        let partition = Arc::clone(&self.partition);
        let params = self.params;
        let engine = DbscanEngine::new(params.min_pts)?;

        self.spawn("dbscan-cluster", move |tx, token| {
            let mut points = points.write();
            cluster_locked(&mut points, &partition, engine, params, RunContext::new(tx, token))
        })
    }

    /// Neighbor finding followed by clustering on one background thread.
    pub fn spawn_pipeline(&self, strategy: Strategy) -> Result<RunHandle<ClusterPartition>> {
        let points = Arc::clone(&self.points);
        let partition = Arc::clone(&self.partition);
        let finder = self.finder(strategy);
        let params = self.params;
        let engine = DbscanEngine::new(params.min_pts)?;

        self.spawn("dbscan-pipeline", move |tx, token| {
            let mut points = points.write();
            partition.lock().take();
            let ctx = RunContext::new(tx, token);
            match finder.run(&mut points, params.epsilon, ctx)? {
                RunStatus::Cancelled => Ok(RunStatus::Cancelled),
                RunStatus::Completed(()) => cluster_locked(&mut points, &partition, engine, params, ctx),
            }
        })
    }
}

fn cluster_locked(
    points: &mut PointSet,
    partition: &Mutex<Option<ClusterPartition>>,
    engine: DbscanEngine,
    params: DbscanParams,
    ctx: RunContext<'_>,
) -> Result<RunStatus<ClusterPartition>> {
    partition.lock().take();
    if !points.is_empty() && points.neighbor_state() != (NeighborState::Ready { epsilon: params.epsilon }) {
        return Err(Error::NeighborsNotReady);
    }
    let status = engine.run(points, ctx)?;
    if let RunStatus::Completed(found) = &status {
        log::info!(
            "clustered {} points: {} clusters, {} noise",
            points.len(),
            found.n_clusters(),
            found.noise().len()
        );
        *partition.lock() = Some(found.clone());
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PointId;

    fn square_session() -> Session {
        let points = PointSet::from_coords(vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1], vec![10, 10]]).unwrap();
        Session::new(points, DbscanParams::new(2, 3).unwrap())
    }

    #[test]
    fn test_pipeline() {
        let session = square_session();
        let handle = session.spawn_pipeline(Strategy::QuadTree).unwrap();
        let partition = handle.join().unwrap().completed().unwrap();
        assert_eq!(partition.n_clusters(), 1);
        assert_eq!(partition.noise(), &[PointId(4)]);
        assert_eq!(session.partition(), Some(partition));
    }

    #[test]
    fn test_clustering_before_neighbors_fails() {
        let session = square_session();
        let err = session.spawn_clustering().unwrap().join().unwrap_err();
        assert!(matches!(err, Error::NeighborsNotReady));
    }

    #[test]
    fn test_epsilon_change_invalidates_neighbors() {
        let mut session = square_session();
        session
            .spawn_neighbor_finding(Strategy::KdTree)
            .unwrap()
            .join()
            .unwrap();

        session.configure(2, 4).unwrap();
        assert!(session.spawn_clustering().unwrap().join().is_ok());

        session.configure(3, 3).unwrap();
        let err = session.spawn_clustering().unwrap().join().unwrap_err();
        assert!(matches!(err, Error::NeighborsNotReady));
    }

    #[test]
    fn test_configure_rejects_bad_params() {
        let mut session = square_session();
        assert!(session.configure(-1, 3).is_err());
        assert!(session.configure(2, 0).is_err());
        assert_eq!(session.params(), DbscanParams::new(2, 3).unwrap());
    }

    #[test]
    fn test_load_and_shapes() {
        let session = Session::load("0 0\n1 1\n2 2\n3 3\n4 4\n5 5\n6 6\n".as_bytes(), DbscanParams::default()).unwrap();
        assert_eq!(session.size(), 7);

        let chain = session.index_shape(IndexKind::QuadTreeArbitrary).unwrap();
        assert_eq!(chain.max_depth, 7);
        let balanced = session.index_shape(IndexKind::QuadTreeBalanced).unwrap();
        assert_eq!(balanced.max_depth, 3);
        assert_eq!(session.index_shape(IndexKind::KdTree).unwrap().size, 7);
        assert_eq!(session.index_shape(IndexKind::QuadTreeZOrder).unwrap().size, 7);
    }

    #[test]
    fn test_reset_clears_partition() {
        let session = square_session();
        session.spawn_pipeline(Strategy::BruteForce).unwrap().join().unwrap();
        assert!(session.partition().is_some());
        session.reset();
        assert!(session.partition().is_none());
        assert_eq!(session.points().neighbor_state(), NeighborState::Stale);
    }
}
