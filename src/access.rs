//! Intermediate volume access - reading `.cct` volumes and cutting planes from them
//!
//! File layout:
//!
//! ```text
//! +-------+-----------------+-------------------+---------------------------+
//! | CCT\0 | header len (LE) | bincode header    | level payloads (compressed) |
//! +-------+-----------------+-------------------+---------------------------+
//! ```

use crate::compression::get_compressor;
use crate::error::{Result, ThumbError};
use crate::layout::VolumeLayout;
use crate::metadata::{FormatVersion, LevelDescriptor, VolumeHeader};
use crate::types::PlaneSpec;
use crate::utils::verify_checksum;
use crate::CCT_MAGIC;
use bytes::Bytes;
use image::GrayImage;
use ndarray::{Array3, Axis as ArrayAxis};
use std::path::Path;

const PREFIX_LEN: usize = CCT_MAGIC.len() + 4;

/// A loaded intermediate volume
#[derive(Debug, Clone)]
pub struct IntermediateVolume {
    header: VolumeHeader,
    payload: Bytes,
}

impl IntermediateVolume {
    /// Read and validate a volume file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(Bytes::from(data))
    }

    /// Parse a volume from its serialized form
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let (header, payload_start) = parse_header(&data)?;
        let payload = data.slice(payload_start..);
        if (payload.len() as u64) < header.payload_len() {
            return Err(ThumbError::InvalidFormat(format!(
                "truncated volume: expected {} payload bytes, found {}",
                header.payload_len(),
                payload.len()
            )));
        }
        Ok(Self { header, payload })
    }

    /// Get the volume header
    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Decompress the level for `size` (or the largest level if absent)
    pub fn read_level(&self, size: u32) -> Result<(LevelDescriptor, Array3<u8>)> {
        let level = self
            .header
            .level_or_largest(size)
            .ok_or_else(|| ThumbError::InvalidFormat("volume has no levels".to_string()))?
            .clone();

        let start = level.offset as usize;
        let end = start + level.compressed_len as usize;
        let compressed = self.payload.get(start..end).ok_or_else(|| {
            ThumbError::InvalidFormat(format!("level {} lies outside the payload", level.size))
        })?;
        if !verify_checksum(compressed, level.checksum) {
            return Err(ThumbError::InvalidFormat(format!(
                "checksum mismatch in level {}",
                level.size
            )));
        }

        let compressor = get_compressor(self.header.compression);
        let voxels = compressor.decompress(compressed, Some(level.uncompressed_len as usize))?;
        let array = Array3::from_shape_vec(level.layout.shape(), voxels)
            .map_err(|e| ThumbError::InvalidFormat(format!("level {}: {}", level.size, e)))?;
        Ok((level, array))
    }

    /// Cut a plane out of the level for `size`
    pub fn read_plane(&self, size: u32, plane: &PlaneSpec) -> Result<GrayImage> {
        let (level, voxels) = self.read_level(size)?;
        extract_plane(&level.layout, &voxels, plane)
    }
}

/// Cut the plane selected by `plane` out of a `(z, y, x)` volume
pub fn extract_plane(
    layout: &VolumeLayout,
    voxels: &Array3<u8>,
    plane: &PlaneSpec,
) -> Result<GrayImage> {
    let index = layout.plane_index(plane);
    let view = voxels.index_axis(ArrayAxis(plane.axis.array_axis()), index);
    let (width, height) = layout.plane_dimensions(plane.axis);
    let pixels: Vec<u8> = view.iter().copied().collect();
    GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        ThumbError::InvalidFormat(format!(
            "plane {} does not match {}x{}",
            plane, width, height
        ))
    })
}

/// Serialize a header and its level payloads
pub fn encode(header: &VolumeHeader, payloads: &[Vec<u8>]) -> Result<Vec<u8>> {
    let header_bytes = bincode::serialize(header)?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| ThumbError::Serialization("volume header too large".to_string()))?;

    let payload_len: usize = payloads.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(PREFIX_LEN + header_bytes.len() + payload_len);
    out.extend_from_slice(CCT_MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    for payload in payloads {
        out.extend_from_slice(payload);
    }
    Ok(out)
}

fn parse_header(data: &[u8]) -> Result<(VolumeHeader, usize)> {
    if data.len() < PREFIX_LEN || &data[..CCT_MAGIC.len()] != CCT_MAGIC {
        return Err(ThumbError::InvalidFormat("missing volume magic".to_string()));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&data[CCT_MAGIC.len()..PREFIX_LEN]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_end = PREFIX_LEN + header_len;
    let header_bytes = data
        .get(PREFIX_LEN..header_end)
        .ok_or_else(|| ThumbError::InvalidFormat("truncated volume header".to_string()))?;

    let header: VolumeHeader = bincode::deserialize(header_bytes)
        .map_err(|e| ThumbError::InvalidFormat(format!("volume header: {}", e)))?;
    if !header.version.is_compatible(&FormatVersion::CURRENT) {
        return Err(ThumbError::InvalidFormat(format!(
            "unsupported volume version {}.{}",
            header.version.major, header.version.minor
        )));
    }
    Ok((header, header_end))
}
