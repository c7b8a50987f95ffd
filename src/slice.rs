//! Slice extraction from intermediate volumes

use crate::access::IntermediateVolume;
use crate::colormap::Colormap;
use crate::error::{Result, ThumbError};
use crate::io::{promote, temp_path_for};
use crate::types::{IntensityWindow, PlaneSpec};
use async_trait::async_trait;
use bytes::Bytes;
use image::{GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Request handed to a [`SliceExtractor`]
#[derive(Debug, Clone)]
pub struct SliceRequest {
    /// Level of the volume to cut from
    pub size: u32,
    pub plane: PlaneSpec,
    pub window: IntensityWindow,
    pub colormap: Colormap,
    /// Stretch the window onto the full colormap range
    pub normalize: bool,
}

/// Cuts a single colorized plane out of a volume
#[async_trait]
pub trait SliceExtractor: Send + Sync {
    /// Render the plane as PNG, write it to `output` and return the encoded bytes
    async fn slice(&self, volume: &Path, request: &SliceRequest, output: &Path) -> Result<Bytes>;
}

/// Extractor for `.cct` volumes
#[derive(Debug, Clone, Copy, Default)]
pub struct CctSliceExtractor;

impl CctSliceExtractor {
    /// Render a plane to PNG bytes; call from a blocking context
    pub fn render_blocking(&self, volume: &Path, request: &SliceRequest) -> Result<Vec<u8>> {
        let volume = IntermediateVolume::open(volume)?;
        let plane = volume.read_plane(request.size, &request.plane)?;
        debug!(
            plane = %request.plane,
            width = plane.width(),
            height = plane.height(),
            source_slices = volume.header().source_slices,
            "plane extracted"
        );

        let rgb = render(&plane, &request.window, &request.colormap, request.normalize);
        encode_png(&rgb)
    }
}

#[async_trait]
impl SliceExtractor for CctSliceExtractor {
    async fn slice(&self, volume: &Path, request: &SliceRequest, output: &Path) -> Result<Bytes> {
        let extractor = *self;
        let volume = volume.to_path_buf();
        let owned = request.clone();
        let png = tokio::task::spawn_blocking(move || extractor.render_blocking(&volume, &owned))
            .await??;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = temp_path_for(output);
        if let Err(e) = tokio::fs::write(&staging, &png).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(ThumbError::Storage(format!(
                "failed to write {}: {}",
                output.display(),
                e
            )));
        }
        promote(&staging, output).await?;
        Ok(Bytes::from(png))
    }
}

/// Apply the intensity window and colormap to a plane
///
/// Values outside the window are clamped to its bounds before lookup.
pub fn render(
    plane: &GrayImage,
    window: &IntensityWindow,
    colormap: &Colormap,
    normalize: bool,
) -> RgbImage {
    let mut windowed = plane.clone();
    for pixel in windowed.pixels_mut() {
        pixel.0[0] = window.apply(pixel.0[0], normalize);
    }
    colormap.apply(&windowed)
}

/// Encode an image as PNG
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Axis;
    use crate::volume::CctVolumeBuilder;
    use image::Luma;
    use tempfile::TempDir;

    #[test]
    fn test_window_clamps_before_lookup() {
        let plane = GrayImage::from_raw(3, 1, vec![255, 0, 125]).unwrap();
        let window = IntensityWindow::new(50, 200).unwrap();
        let gray = Colormap::gray();

        let raw = render(&plane, &window, &gray, false);
        assert_eq!(raw.get_pixel(0, 0).0, [200, 200, 200]);
        assert_eq!(raw.get_pixel(1, 0).0, [50, 50, 50]);
        assert_eq!(raw.get_pixel(2, 0).0, [125, 125, 125]);

        let stretched = render(&plane, &window, &gray, true);
        assert_eq!(stretched.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(stretched.get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(stretched.get_pixel(2, 0).0, [127, 127, 127]);
    }

    #[test]
    fn test_colormap_is_applied_after_window() {
        let plane = GrayImage::from_raw(1, 1, vec![255]).unwrap();
        let window = IntensityWindow::new(50, 200).unwrap();
        let jet = Colormap::from_name("jet").unwrap();
        let rgb = render(&plane, &window, &jet, false);
        assert_eq!(rgb.get_pixel(0, 0).0, jet.map(200));
    }

    #[tokio::test]
    async fn test_slice_writes_png() {
        let source = TempDir::new().unwrap();
        for i in 0..4u8 {
            GrayImage::from_pixel(8, 8, Luma([i * 60]))
                .save(source.path().join(format!("{}.png", i)))
                .unwrap();
        }
        let cache = TempDir::new().unwrap();
        let volume = cache.path().join("8.cct");
        CctVolumeBuilder::new()
            .build_blocking(source.path(), &[8], true, &volume)
            .unwrap();

        let request = SliceRequest {
            size: 8,
            plane: PlaneSpec::new(Axis::X, 0.5).unwrap(),
            window: IntensityWindow::default(),
            colormap: Colormap::gray(),
            normalize: true,
        };
        let output = cache.path().join("digest.png");
        let png = CctSliceExtractor.slice(&volume, &request, &output).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), png.to_vec());
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 8));
        // x-plane rows run along the stack: top row is the first source plane
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(decoded.get_pixel(0, 7).0, [255, 255, 255]);
    }

    #[tokio::test]
    async fn test_missing_volume_fails() {
        let cache = TempDir::new().unwrap();
        let request = SliceRequest {
            size: 8,
            plane: PlaneSpec::new(Axis::Z, 0.5).unwrap(),
            window: IntensityWindow::default(),
            colormap: Colormap::gray(),
            normalize: true,
        };
        let result = CctSliceExtractor
            .slice(&cache.path().join("none.cct"), &request, &cache.path().join("x.png"))
            .await;
        assert!(matches!(result, Err(ThumbError::Io(_))));
    }
}
