//! Volume layout - shape of an intermediate volume and the planes cut from it

use crate::error::{Result, ThumbError};
use crate::types::{Axis, PlaneSpec};
use serde::{Deserialize, Serialize};

/// Shape of a 3D `u8` volume stored in `(z, y, x)` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLayout {
    /// Number of planes along the stacking axis
    pub depth: usize,
    /// Rows per plane
    pub height: usize,
    /// Columns per plane
    pub width: usize,
}

impl VolumeLayout {
    /// Create a new layout
    pub fn new(depth: usize, height: usize, width: usize) -> Result<Self> {
        if depth == 0 || height == 0 || width == 0 {
            return Err(ThumbError::InvalidFormat(format!(
                "volume dimensions must be non-zero, got {}x{}x{}",
                width, height, depth
            )));
        }
        Ok(Self {
            depth,
            height,
            width,
        })
    }

    /// Cube with `size` samples along every axis
    pub fn cube(size: usize) -> Result<Self> {
        Self::new(size, size, size)
    }

    /// Shape as an ndarray dimension tuple
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }

    /// Number of samples along an axis
    pub fn len_along(&self, axis: Axis) -> usize {
        match axis {
            Axis::Z => self.depth,
            Axis::Y => self.height,
            Axis::X => self.width,
        }
    }

    /// `(width, height)` of the image obtained by cutting perpendicular to `axis`
    pub fn plane_dimensions(&self, axis: Axis) -> (usize, usize) {
        match axis {
            Axis::Z => (self.width, self.height),
            Axis::Y => (self.width, self.depth),
            Axis::X => (self.height, self.depth),
        }
    }

    /// Index of the plane selected by `plane`
    pub fn plane_index(&self, plane: &PlaneSpec) -> usize {
        plane.index(self.len_along(plane.axis))
    }

    /// Total number of voxels
    pub fn voxel_count(&self) -> usize {
        self.depth * self.height * self.width
    }

    /// Get a summary string of the layout
    pub fn summary(&self) -> String {
        format!(
            "{} x {} x {} volume, {}",
            self.width,
            self.height,
            self.depth,
            crate::utils::format_bytes(self.voxel_count())
        )
    }
}
