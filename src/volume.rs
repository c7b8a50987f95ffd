//! Intermediate volume builder
//!
//! Turns an ordered directory of 2D planes into a compact `.cct` volume
//! holding one `size`³ cube per requested size. Slices are then cut from the
//! volume instead of re-reading the raw planes on every request.

use crate::access::encode;
use crate::compression::{get_compressor, CompressionLevel, CompressionMethod};
use crate::error::{Result, ThumbError};
use crate::io::temp_path_for;
use crate::layout::VolumeLayout;
use crate::metadata::{LevelDescriptor, VolumeHeader};
use crate::types::ValueRange;
use crate::utils::{calculate_checksum, format_bytes, sorted_files_blocking};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type Plane16 = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Result of a successful build
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSummary {
    /// Number of source planes found
    pub source_slices: usize,
    /// Layout of each level, keyed by size
    pub levels: Vec<(u32, VolumeLayout)>,
    /// Size of the written file
    pub bytes: usize,
}

/// Builds intermediate volumes
#[async_trait]
pub trait VolumeBuilder: Send + Sync {
    /// Build a volume from `source_dir` containing one level per entry of `sizes`
    async fn build(
        &self,
        source_dir: &Path,
        sizes: &[u32],
        normalize: bool,
        output: &Path,
    ) -> Result<VolumeSummary>;
}

/// Builder producing `.cct` volumes
#[derive(Debug, Clone, Copy)]
pub struct CctVolumeBuilder {
    compression: CompressionMethod,
    level: CompressionLevel,
}

impl Default for CctVolumeBuilder {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Zstd,
            level: CompressionLevel::default(),
        }
    }
}

impl CctVolumeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compression method and level for level payloads
    pub fn with_compression(mut self, method: CompressionMethod, level: CompressionLevel) -> Self {
        self.compression = method;
        self.level = level;
        self
    }

    /// Synchronous build; call from a blocking context
    pub fn build_blocking(
        &self,
        source_dir: &Path,
        sizes: &[u32],
        normalize: bool,
        output: &Path,
    ) -> Result<VolumeSummary> {
        if sizes.is_empty() || sizes.contains(&0) {
            return Err(ThumbError::InvalidParameter(
                "volume sizes must be non-empty and positive".to_string(),
            ));
        }

        let files = sorted_files_blocking(source_dir)?;
        if files.is_empty() {
            return Err(ThumbError::NotFound(format!(
                "no slices in {}",
                source_dir.display()
            )));
        }
        debug!(dir = %source_dir.display(), slices = files.len(), ?sizes, "building volume");

        let cubes = resample(&files, sizes)?;
        let range = value_range(cubes.values().flatten().copied());

        let mut header = VolumeHeader::new(files.len(), normalize, range)
            .with_compression(self.compression);
        let compressor = get_compressor(self.compression);
        let mut payloads = Vec::with_capacity(cubes.len());
        let mut offset = 0u64;
        let mut levels = Vec::with_capacity(cubes.len());

        for (size, samples) in cubes {
            let layout = VolumeLayout::cube(size as usize)?;
            let voxels = to_u8(&samples, normalize, &range);
            let compressed = compressor.compress(&voxels, self.level)?;
            let level = LevelDescriptor {
                size,
                layout,
                offset,
                compressed_len: compressed.len() as u64,
                uncompressed_len: voxels.len() as u64,
                checksum: calculate_checksum(&compressed),
            };
            debug!(
                size,
                layout = %layout.summary(),
                ratio = level.compression_ratio(),
                "level encoded"
            );
            header.levels.push(level);
            offset += compressed.len() as u64;
            levels.push((size, layout));
            payloads.push(compressed);
        }

        let encoded = encode(&header, &payloads)?;
        write_atomic(output, &encoded)?;
        info!(
            output = %output.display(),
            size = %format_bytes(encoded.len()),
            slices = files.len(),
            "intermediate volume written"
        );

        Ok(VolumeSummary {
            source_slices: files.len(),
            levels,
            bytes: encoded.len(),
        })
    }
}

#[async_trait]
impl VolumeBuilder for CctVolumeBuilder {
    async fn build(
        &self,
        source_dir: &Path,
        sizes: &[u32],
        normalize: bool,
        output: &Path,
    ) -> Result<VolumeSummary> {
        let builder = *self;
        let source_dir = source_dir.to_path_buf();
        let sizes = sizes.to_vec();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || {
            builder.build_blocking(&source_dir, &sizes, normalize, &output)
        })
        .await?
    }
}

/// Source plane used for output plane `k` of `size` (nearest neighbour)
fn source_index(k: usize, size: usize, count: usize) -> usize {
    if size <= 1 || count <= 1 {
        return count / 2;
    }
    let position = k as f64 * (count - 1) as f64 / (size - 1) as f64;
    (position.round() as usize).min(count - 1)
}

/// Resample the stack to a `size`³ cube of 16-bit samples for every size
///
/// Each source plane is decoded at most once, however many sizes use it.
fn resample(files: &[PathBuf], sizes: &[u32]) -> Result<BTreeMap<u32, Vec<u16>>> {
    let mut users: BTreeMap<usize, Vec<(u32, usize)>> = BTreeMap::new();
    let mut cubes: BTreeMap<u32, Vec<u16>> = BTreeMap::new();

    for &size in sizes {
        let edge = size as usize;
        cubes.entry(size).or_insert_with(|| vec![0u16; edge * edge * edge]);
        for k in 0..edge {
            users
                .entry(source_index(k, edge, files.len()))
                .or_default()
                .push((size, k));
        }
    }

    for (index, targets) in users {
        let plane: Plane16 = image::open(&files[index])?.to_luma16();
        for (size, k) in targets {
            let resized = imageops::resize(&plane, size, size, FilterType::Triangle);
            let edge = size as usize;
            let start = k * edge * edge;
            if let Some(cube) = cubes.get_mut(&size) {
                cube[start..start + edge * edge].copy_from_slice(resized.as_raw());
            }
        }
    }
    Ok(cubes)
}

fn value_range(samples: impl Iterator<Item = u16>) -> ValueRange {
    let (min, max) = samples.fold((u16::MAX, u16::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min > max {
        ValueRange::new(0.0, 0.0)
    } else {
        ValueRange::new(min as f64, max as f64)
    }
}

/// Convert 16-bit samples to 8 bits, stretching `range` onto `0..=255` when normalizing
fn to_u8(samples: &[u16], normalize: bool, range: &ValueRange) -> Vec<u8> {
    if !normalize {
        return samples.iter().map(|&v| (v >> 8) as u8).collect();
    }
    let min = range.min;
    let span = range.max - range.min;
    if span <= 0.0 {
        return vec![0; samples.len()];
    }
    samples
        .iter()
        .map(|&v| (((v as f64 - min) * 255.0 / span).round()).clamp(0.0, 255.0) as u8)
        .collect()
}

fn write_atomic(output: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let staging = temp_path_for(output);
    let written = std::fs::write(&staging, data).and_then(|_| std::fs::rename(&staging, output));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(ThumbError::Storage(format!(
            "failed to write {}: {}",
            output.display(),
            e
        )));
    }
    Ok(())
}
