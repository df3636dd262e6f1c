//! Density-based clustering over integer points.
//!
//! Clustering runs in two phases, each cancellable and each reporting
//! progress after every point:
//!
//! 1. [`NeighborFinder`] populates every point's ε-neighborhood, using one
//!    of five interchangeable [`Strategy`] values (serial or parallel brute
//!    force, k-d tree, quadtree, four-way threaded quadtree).
//! 2. [`DbscanEngine`] reads those neighbor sets and partitions the points
//!    into clusters and noise for a given MinPts.
//!
//! Phase 1 depends only on ε and phase 2 only on MinPts, so sweeping MinPts
//! reruns phase 2 alone.
//!
//! ### DBSCAN
//!
//! Density-based clustering that can discover non-convex clusters and identify
//! outliers (noise points). DBSCAN does not require specifying the number of
//! clusters in advance.
//!
//! ## Usage
//!
//! ```rust
//! use dbscan_index::cluster::{Clustering, Dbscan, DbscanEngine, NeighborFinder, Strategy};
//! use dbscan_index::PointSet;
//!
//! let data = vec![
//!     vec![0, 0],
//!     vec![0, 1],
//!     vec![1, 0],
//!     vec![1, 1],
//!     vec![10, 10],
//! ];
//!
//! // One call: neighbors plus clustering.
//! let labels = Dbscan::new(2, 3).fit_predict(&data).unwrap();
//! assert_eq!(labels[..4], [0, 0, 0, 0]);
//! assert_eq!(labels[4], 1); // noise gets the trailing label
//!
//! // Two phases, reusing neighbor sets across MinPts values.
//! let mut points = PointSet::from_coords(data).unwrap();
//! NeighborFinder::new(Strategy::QuadTree).find(&mut points, 2).unwrap();
//! for min_pts in 1..=4 {
//!     let partition = DbscanEngine::new(min_pts).unwrap().cluster(&mut points).unwrap();
//!     assert_eq!(partition.n_points(), 5);
//! }
//! ```

mod dbscan;
mod neighbors;
mod params;
mod traits;

pub use dbscan::{ClusterPartition, Dbscan, DbscanEngine, DbscanExt, NOISE};
pub use neighbors::{NeighborFinder, Strategy};
pub use params::DbscanParams;
pub use traits::Clustering;
