//! Core data types for artifact requests

use crate::error::{Result, ThumbError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default edge length, in pixels, of generated artifacts
pub const DEFAULT_SIZE: u32 = 128;

/// Default position of a slice along its axis (the mid-plane)
pub const DEFAULT_INTERCEPT: f64 = 0.5;

/// Identity of a dataset as supplied by the caller
///
/// Both parts are opaque; they are only used to build cache paths and are
/// forwarded to the dataset service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetId {
    pub owner: String,
    pub dataset: String,
}

impl DatasetId {
    /// Create a dataset identity, rejecting components that are unsafe as path segments
    pub fn new(owner: impl Into<String>, dataset: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let dataset = dataset.into();
        validate_segment("owner", &owner)?;
        validate_segment("dataset", &dataset)?;
        Ok(Self { owner, dataset })
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.dataset)
    }
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0')
    {
        return Err(ThumbError::InvalidParameter(format!(
            "invalid {} identifier: {:?}",
            what, value
        )));
    }
    Ok(())
}

/// Kind of artifact kept in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Final thumbnail image
    Thumbnail,
    /// Grayscale thumbnail written before a local colormap is applied
    ThumbnailIntermediate,
    /// Compact per-size volume used for slicing
    Volume,
    /// Final slice image
    Slice,
}

impl ArtifactKind {
    /// File extension used on disk
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Thumbnail => "jpg",
            ArtifactKind::ThumbnailIntermediate => "tif",
            ArtifactKind::Volume => "cct",
            ArtifactKind::Slice => "png",
        }
    }

    /// MIME type served for this kind; intermediates are never served
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::Thumbnail => Some("image/jpeg"),
            ArtifactKind::Slice => Some("image/png"),
            ArtifactKind::ThumbnailIntermediate | ArtifactKind::Volume => None,
        }
    }
}

/// Axis perpendicular to a cutting plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Index of this axis in a `(z, y, x)` shaped volume
    pub fn array_axis(&self) -> usize {
        match self {
            Axis::Z => 0,
            Axis::Y => 1,
            Axis::X => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = ThumbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" | "X" => Ok(Axis::X),
            "y" | "Y" => Ok(Axis::Y),
            "z" | "Z" => Ok(Axis::Z),
            _ => Err(ThumbError::InvalidParameter(format!("unknown axis: {}", s))),
        }
    }
}

/// Value range for a volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Inclusive intensity window applied before colormap lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntensityWindow {
    pub min: u8,
    pub max: u8,
}

impl IntensityWindow {
    pub fn new(min: u8, max: u8) -> Result<Self> {
        if min > max {
            return Err(ThumbError::InvalidParameter(format!(
                "intensity window is inverted: mint={} > maxt={}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Clamp a voxel value into the window
    pub fn clamp(&self, value: u8) -> u8 {
        num_traits::clamp(value, self.min, self.max)
    }

    /// Clamp a voxel value and, when `normalize` is set, stretch the window onto `0..=255`
    pub fn apply(&self, value: u8, normalize: bool) -> u8 {
        let clamped = self.clamp(value);
        if !normalize {
            return clamped;
        }
        let span = u32::from(self.max - self.min);
        if span == 0 {
            return 0;
        }
        (u32::from(clamped - self.min) * 255 / span) as u8
    }
}

impl Default for IntensityWindow {
    fn default() -> Self {
        Self { min: 0, max: 255 }
    }
}

/// Parameters of a thumbnail request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailParams {
    pub size: u32,
    pub force: bool,
}

impl Default for ThumbnailParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            force: false,
        }
    }
}

/// Parameters of a slice request
#[derive(Debug, Clone, PartialEq)]
pub struct SliceParams {
    pub size: u32,
    pub axis: Axis,
    pub intercept: f64,
    pub colormap: Option<String>,
    pub window: IntensityWindow,
}

impl Default for SliceParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            axis: Axis::Z,
            intercept: DEFAULT_INTERCEPT,
            colormap: None,
            window: IntensityWindow::default(),
        }
    }
}

/// Cutting plane: an axis plus a fractional position along it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneSpec {
    pub axis: Axis,
    pub intercept: f64,
}

impl PlaneSpec {
    pub fn new(axis: Axis, intercept: f64) -> Result<Self> {
        if !intercept.is_finite() || !(0.0..=1.0).contains(&intercept) {
            return Err(ThumbError::InvalidParameter(format!(
                "intercept must be within [0, 1], got {}",
                intercept
            )));
        }
        Ok(Self { axis, intercept })
    }

    /// Sample index along an axis with `len` samples
    pub fn index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let last = (len - 1) as f64;
        (self.intercept * last).round().max(0.0).min(last) as usize
    }
}

impl fmt::Display for PlaneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.axis, self.intercept)
    }
}

impl FromStr for PlaneSpec {
    type Err = ThumbError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let axis = chars
            .next()
            .ok_or_else(|| ThumbError::InvalidParameter("empty plane spec".to_string()))?;
        let axis: Axis = axis.to_string().parse()?;
        let intercept: f64 = chars.as_str().parse().map_err(|_| {
            ThumbError::InvalidParameter(format!("invalid intercept in plane spec: {}", s))
        })?;
        PlaneSpec::new(axis, intercept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_id_rejects_traversal() {
        assert!(DatasetId::new("alice", "scan-01").is_ok());
        assert!(DatasetId::new("..", "scan").is_err());
        assert!(DatasetId::new("alice", "a/b").is_err());
        assert!(DatasetId::new("", "scan").is_err());
    }

    #[test]
    fn test_artifact_extensions() {
        assert_eq!(ArtifactKind::Thumbnail.extension(), "jpg");
        assert_eq!(ArtifactKind::ThumbnailIntermediate.extension(), "tif");
        assert_eq!(ArtifactKind::Volume.extension(), "cct");
        assert_eq!(ArtifactKind::Slice.extension(), "png");
        assert_eq!(ArtifactKind::Slice.content_type(), Some("image/png"));
        assert_eq!(ArtifactKind::Volume.content_type(), None);
    }

    #[test]
    fn test_plane_spec_parse() {
        let plane: PlaneSpec = "z0.5".parse().unwrap();
        assert_eq!(plane.axis, Axis::Z);
        assert_eq!(plane.intercept, 0.5);
        assert_eq!(plane.to_string(), "z0.5");

        let plane: PlaneSpec = "x1".parse().unwrap();
        assert_eq!(plane.to_string(), "x1.0");

        assert!("w0.5".parse::<PlaneSpec>().is_err());
        assert!("y1.5".parse::<PlaneSpec>().is_err());
        assert!("".parse::<PlaneSpec>().is_err());
    }

    #[test]
    fn test_plane_index() {
        let plane = PlaneSpec::new(Axis::Y, 0.5).unwrap();
        assert_eq!(plane.index(129), 64);
        assert_eq!(plane.index(1), 0);
        assert_eq!(PlaneSpec::new(Axis::Y, 1.0).unwrap().index(10), 9);
        assert_eq!(PlaneSpec::new(Axis::Y, 0.0).unwrap().index(10), 0);
    }

    #[test]
    fn test_window_clamps_instead_of_wrapping() {
        let window = IntensityWindow::new(50, 200).unwrap();
        assert_eq!(window.clamp(255), 200);
        assert_eq!(window.clamp(0), 50);
        assert_eq!(window.clamp(120), 120);

        assert_eq!(window.apply(255, true), 255);
        assert_eq!(window.apply(10, true), 0);
        assert_eq!(window.apply(255, false), 200);
    }

    #[test]
    fn test_window_degenerate_and_inverted() {
        let flat = IntensityWindow::new(80, 80).unwrap();
        assert_eq!(flat.apply(200, true), 0);
        assert!(IntensityWindow::new(200, 50).is_err());
    }
}
