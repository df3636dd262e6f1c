use crate::error::{Error, Result};

/// Validated clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbscanParams {
    /// Neighborhood radius. Points exactly `epsilon` apart are neighbors.
    pub epsilon: u32,
    /// Minimum neighbor count (not counting the point itself) for a core point.
    pub min_pts: usize,
}

impl DbscanParams {
    /// Validate raw parameter values.
    ///
    /// `epsilon` must be in `0..=u32::MAX`; `min_pts` must be at least 1.
    pub fn new(epsilon: i64, min_pts: i64) -> Result<Self> {
        let epsilon = u32::try_from(epsilon).map_err(|_| Error::InvalidParameter {
            name: "epsilon",
            message: if epsilon < 0 {
                "must be non-negative"
            } else {
                "must fit in 32 bits"
            },
        })?;
        if min_pts < 1 {
            return Err(Error::InvalidParameter {
                name: "min_pts",
                message: "must be at least 1",
            });
        }
        let min_pts = usize::try_from(min_pts).map_err(|_| Error::InvalidParameter {
            name: "min_pts",
            message: "too large for this platform",
        })?;
        Ok(Self { epsilon, min_pts })
    }
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            epsilon: 1,
            min_pts: 3,
        }
    }
}
