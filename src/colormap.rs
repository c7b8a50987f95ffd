//! Colormap lookup tables
//!
//! A colormap maps an 8-bit intensity to an RGB triple. Tables are built by
//! linear interpolation between anchor colors and hold one entry per
//! intensity, so a lookup is three independent channel reads.

use crate::error::{Result, ThumbError};
use image::{GrayImage, RgbImage};

/// Names accepted by [`Colormap::from_name`]
pub const COLORMAP_NAMES: &[&str] = &["gray", "hot", "jet", "viridis", "bone", "cool"];

/// 256-entry RGB lookup table
#[derive(Clone)]
pub struct Colormap {
    name: &'static str,
    table: [[u8; 3]; 256],
}

impl std::fmt::Debug for Colormap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Colormap").field("name", &self.name).finish()
    }
}

impl Colormap {
    /// Look up a colormap by name
    pub fn from_name(name: &str) -> Result<Self> {
        let anchors: &[[u8; 3]] = match name.to_ascii_lowercase().as_str() {
            "gray" | "grey" => &[[0, 0, 0], [255, 255, 255]],
            "hot" => &[[0, 0, 0], [230, 0, 0], [255, 210, 0], [255, 255, 255]],
            "jet" => &[
                [0, 0, 128],
                [0, 0, 255],
                [0, 255, 255],
                [255, 255, 0],
                [255, 0, 0],
                [128, 0, 0],
            ],
            "viridis" => &[
                [68, 1, 84],
                [59, 82, 139],
                [33, 145, 140],
                [94, 201, 98],
                [253, 231, 37],
            ],
            "bone" => &[[0, 0, 0], [84, 84, 116], [167, 199, 199], [255, 255, 255]],
            "cool" => &[[0, 255, 255], [255, 0, 255]],
            _ => {
                return Err(ThumbError::InvalidParameter(format!(
                    "unknown colormap: {} (expected one of {})",
                    name,
                    COLORMAP_NAMES.join(", ")
                )))
            }
        };
        let canonical = COLORMAP_NAMES
            .iter()
            .copied()
            .find(|n| n.eq_ignore_ascii_case(name))
            .unwrap_or("gray");
        Ok(Self {
            name: canonical,
            table: interpolate(anchors),
        })
    }

    /// Resolve an optional name, defaulting to gray
    pub fn from_optional(name: Option<&str>) -> Result<Self> {
        Self::from_name(name.unwrap_or("gray"))
    }

    pub fn gray() -> Self {
        Self {
            name: "gray",
            table: interpolate(&[[0, 0, 0], [255, 255, 255]]),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// RGB triple for an intensity
    pub fn map(&self, value: u8) -> [u8; 3] {
        self.table[value as usize]
    }

    /// Colorize a grayscale image
    pub fn apply(&self, gray: &GrayImage) -> RgbImage {
        let (width, height) = gray.dimensions();
        let mut out = Vec::with_capacity(width as usize * height as usize * 3);
        for &value in gray.as_raw() {
            out.extend_from_slice(&self.map(value));
        }
        // dimensions are taken from the source so the buffer always fits
        RgbImage::from_raw(width, height, out).unwrap_or_else(|| RgbImage::new(width, height))
    }
}

fn interpolate(anchors: &[[u8; 3]]) -> [[u8; 3]; 256] {
    let mut table = [[0u8; 3]; 256];
    let segments = (anchors.len() - 1) as f64;
    for (i, entry) in table.iter_mut().enumerate() {
        let position = i as f64 / 255.0 * segments;
        let lower = (position.floor() as usize).min(anchors.len() - 2);
        let t = position - lower as f64;
        for channel in 0..3 {
            let a = anchors[lower][channel] as f64;
            let b = anchors[lower + 1][channel] as f64;
            entry[channel] = (a + (b - a) * t).round().clamp(0.0, 255.0) as u8;
        }
    }
    table
}
