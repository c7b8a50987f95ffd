//! Intermediate volume metadata structures

use crate::compression::CompressionMethod;
use crate::layout::VolumeLayout;
use crate::types::ValueRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Intermediate volume format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Header of an intermediate volume file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeHeader {
    /// Format version
    pub version: FormatVersion,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Number of source planes the volume was built from
    pub source_slices: usize,

    /// Whether intensities were stretched onto the full 8-bit range
    pub normalized: bool,

    /// Intensity range of the source planes before conversion
    pub source_range: ValueRange,

    /// Compression method used for level payloads
    pub compression: CompressionMethod,

    /// One entry per resampled size
    pub levels: Vec<LevelDescriptor>,
}

impl VolumeHeader {
    /// Create a header with no levels
    pub fn new(source_slices: usize, normalized: bool, source_range: ValueRange) -> Self {
        Self {
            version: FormatVersion::default(),
            created_at: Utc::now(),
            source_slices,
            normalized,
            source_range,
            compression: CompressionMethod::default(),
            levels: Vec::new(),
        }
    }

    /// Set compression method
    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Level resampled to `size`, if present
    pub fn level(&self, size: u32) -> Option<&LevelDescriptor> {
        self.levels.iter().find(|l| l.size == size)
    }

    /// Level for `size`, falling back to the largest level
    pub fn level_or_largest(&self, size: u32) -> Option<&LevelDescriptor> {
        self.level(size)
            .or_else(|| self.levels.iter().max_by_key(|l| l.size))
    }

    /// Sum of the compressed level payloads
    pub fn payload_len(&self) -> u64 {
        self.levels.iter().map(|l| l.compressed_len).sum()
    }
}

/// Location and shape of one resampled level inside the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    /// Requested edge length
    pub size: u32,

    /// Voxel dimensions of the level
    pub layout: VolumeLayout,

    /// Offset of the compressed bytes from the start of the payload
    pub offset: u64,

    /// Compressed size in bytes
    pub compressed_len: u64,

    /// Uncompressed size in bytes
    pub uncompressed_len: u64,

    /// CRC32 of the compressed bytes
    pub checksum: u32,
}

impl LevelDescriptor {
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_len == 0 {
            0.0
        } else {
            self.uncompressed_len as f64 / self.compressed_len as f64
        }
    }
}
