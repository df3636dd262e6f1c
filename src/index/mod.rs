//! Spatial indexes answering "which points lie within ε of p".
//!
//! Two structures are provided, both implementing [`SpatialIndex`]:
//!
//! ### K-d tree
//!
//! A static, balanced binary tree. Each level splits on axis `depth mod D`
//! at the median of the points below it, so depth is `⌈log2 n⌉` regardless
//! of the distribution. Built once; [`SpatialIndex::insert`] is rejected.
//! Supports radius queries and bounded k-nearest queries.
//!
//! ### Point-region quadtree
//!
//! A two-dimensional tree where every node splits the plane at its own
//! `(x, y)` into four quadrants. Points at the same location share a node.
//! Shape depends on insertion order, so [`QuadTree::balanced`] sorts the
//! points and inserts medians first. A four-way concurrent query
//! ([`QuadTree::range_search_concurrent`]) descends the root's quadrants in
//! parallel.
//!
//! ## Usage
//!
//! ```rust
//! use dbscan_index::index::{KdTree, QuadTree, SpatialIndex};
//! use dbscan_index::{PointId, PointSet};
//!
//! let points = PointSet::from_coords(vec![vec![0, 0], vec![1, 1], vec![9, 9]]).unwrap();
//!
//! let kd = KdTree::build(&points).unwrap();
//! let mut near = kd.range_search(&[0, 0], 2, Some(PointId(0)));
//! near.sort();
//! assert_eq!(near, vec![PointId(1)]);
//!
//! let quad = QuadTree::balanced(&points).unwrap();
//! assert_eq!(quad.range_search(&[9, 9], 0, None), vec![PointId(2)]);
//! ```

mod kdtree;
mod quadtree;
mod traits;

pub use kdtree::KdTree;
pub use quadtree::{zorder_cmp, QuadTree};
pub use traits::{IndexShape, SpatialIndex};
