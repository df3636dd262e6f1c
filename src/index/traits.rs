use crate::error::Result;
use crate::point::PointId;

/// Structural measurements of a built index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexShape {
    /// Number of indexed points.
    pub size: usize,
    /// Nodes on the longest root-to-leaf path (0 for an empty index).
    pub max_depth: usize,
    /// Mean depth of the leaves (0.0 for an empty index).
    pub avg_depth: f64,
}

/// Common interface for the neighbor indexes.
pub trait SpatialIndex: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Number of indexed points.
    fn len(&self) -> usize;

    /// True if no point is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add one point. Static indexes return [`crate::Error::UnsupportedOperation`].
    fn insert(&mut self, id: PointId, coords: &[i32]) -> Result<()>;

    /// Every indexed point within Euclidean `radius` of `center`, except `exclude`.
    ///
    /// The boundary is inclusive. Output order is unspecified.
    fn range_search(&self, center: &[i32], radius: u32, exclude: Option<PointId>) -> Vec<PointId>;

    /// Nodes on the longest root-to-leaf path.
    fn max_depth(&self) -> usize;

    /// Mean leaf depth.
    fn avg_depth(&self) -> f64;

    /// Every indexed point, in traversal order.
    fn all_points(&self) -> Vec<PointId>;

    /// Size and depth diagnostics in one value.
    fn shape(&self) -> IndexShape {
        IndexShape {
            size: self.len(),
            max_depth: self.max_depth(),
            avg_depth: self.avg_depth(),
        }
    }
}
