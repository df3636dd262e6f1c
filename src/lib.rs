//! Density clustering over integer points with spatial neighbor indexes.
//!
//! `dbscan-index` clusters points in k-dimensional integer space with DBSCAN.
//! The expensive part of DBSCAN is neighbor discovery, so the crate provides
//! two spatial indexes to answer "all points within ε of p" well below
//! O(n²):
//!
//! - [`index`]: a balanced k-d tree (range and k-nearest queries) and a
//!   point-region quadtree (range queries, optionally four-way concurrent).
//! - [`cluster`]: the neighbor finder (five strategies) and the DBSCAN engine.
//! - [`session`]: background runs with a progress stream and cancellation.
//!
//! Coordinates are `i32` and all distance comparisons are made on squared
//! integer distances, so results do not depend on floating-point rounding.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod error;
pub mod index;
pub mod point;
pub mod progress;
pub mod session;

pub use cluster::{
    ClusterPartition, Clustering, Dbscan, DbscanEngine, DbscanExt, DbscanParams, NeighborFinder,
    Strategy, NOISE,
};
pub use error::{Error, Result};
pub use index::{IndexShape, KdTree, QuadTree, SpatialIndex};
pub use point::{load_points, load_points_file, parse_points, NeighborState, Point, PointId, PointSet};
pub use progress::{CancelToken, NoProgress, Progress, ProgressSink, RunContext, RunStatus, Stage};
pub use session::{IndexKind, RunHandle, Session};
