//! Request orchestration for the thumbnail and slice flows
//!
//! Both flows follow `CHECK_CACHE -> HIT: SERVE | MISS: RESOLVE -> FETCH_SOURCE
//! -> TRANSFORM -> STORE -> SERVE`. The dataset service is only consulted on a
//! miss, and every durable result lives in the artifact store.

use crate::colormap::Colormap;
use crate::compression::CompressionLevel;
use crate::config::Config;
use crate::error::{Result, ThumbError};
use crate::io::{promote, temp_path_for, ArtifactStore, FileSystemArtifactStore};
use crate::key::{derive_key, size_key, KeyInput};
use crate::pipeline::{PipelineInvoker, Stage, ThumbnailPlan, UfoPipeline};
use crate::resolver::{DatasetResolver, HttpDatasetResolver};
use crate::slice::{CctSliceExtractor, SliceExtractor, SliceRequest};
use crate::types::{ArtifactKind, DatasetId, PlaneSpec, SliceParams, ThumbnailParams};
use crate::utils::{middle_index, sorted_files};
use crate::volume::{CctVolumeBuilder, VolumeBuilder};
use bytes::Bytes;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A served artifact
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub data: Bytes,
    /// Served from the store without running any generation step
    pub from_cache: bool,
}

impl Artifact {
    pub fn content_type(&self) -> &'static str {
        self.kind
            .content_type()
            .unwrap_or("application/octet-stream")
    }
}

/// Behavior switches of the orchestrator
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Largest accepted thumbnail size
    pub max_size: u32,
    /// Largest accepted slice size; volumes hold `size`³ samples
    pub max_volume_size: u32,
    /// Stretch intensities when building volumes and windowing slices
    pub normalize: bool,
    /// Thumbnail stage settings
    pub plan: ThumbnailPlan,
    /// Colormap applied in-process to thumbnails, when that strategy is active
    pub thumbnail_colormap: Option<Colormap>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_size: 2048,
            max_volume_size: 512,
            normalize: true,
            plan: ThumbnailPlan::default(),
            thumbnail_colormap: None,
        }
    }
}

/// Collaborators of the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ArtifactStore>,
    pub resolver: Arc<dyn DatasetResolver>,
    pub pipeline: Arc<dyn PipelineInvoker>,
    pub builder: Arc<dyn VolumeBuilder>,
    pub extractor: Arc<dyn SliceExtractor>,
}

/// Composes resolver, store, pipeline, builder and extractor into the two artifact flows
#[derive(Clone)]
pub struct ArtifactService {
    parts: Collaborators,
    options: ServiceOptions,
}

impl ArtifactService {
    pub fn new(parts: Collaborators, options: ServiceOptions) -> Self {
        Self { parts, options }
    }

    /// Wire the production collaborators from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let parts = Collaborators {
            store: Arc::new(FileSystemArtifactStore::new(&config.cache_root)),
            resolver: Arc::new(HttpDatasetResolver::new(
                config.resolver_url.clone(),
                config.resolver_timeout(),
            )?),
            pipeline: Arc::new(UfoPipeline::new(
                config.pipeline_program.clone(),
                config.pipeline_timeout(),
            )),
            builder: Arc::new(
                CctVolumeBuilder::new()
                    .with_compression(config.volume_compression, CompressionLevel::default()),
            ),
            extractor: Arc::new(CctSliceExtractor),
        };
        let options = ServiceOptions {
            max_size: config.max_size,
            max_volume_size: config.max_volume_size,
            normalize: config.normalize_volume,
            plan: config.thumbnail_plan(),
            thumbnail_colormap: config.local_thumbnail_colormap()?,
        };
        Ok(Self::new(parts, options))
    }

    fn check_size(size: u32, limit: u32) -> Result<()> {
        if size == 0 || size > limit {
            return Err(ThumbError::InvalidParameter(format!(
                "size must be between 1 and {}, got {}",
                limit, size
            )));
        }
        Ok(())
    }

    /// Serve the thumbnail of a dataset, generating it on a miss or when forced
    pub async fn thumbnail(
        &self,
        dataset: &DatasetId,
        params: &ThumbnailParams,
        token: Option<&str>,
    ) -> Result<Artifact> {
        Self::check_size(params.size, self.options.max_size)?;
        let key = derive_key(KeyInput::Thumbnail(params));
        let path = self
            .parts
            .store
            .artifact_path(dataset, ArtifactKind::Thumbnail, &key);

        debug!(%dataset, size = params.size, force = params.force, "thumbnail: check cache");
        if !params.force && self.parts.store.exists(&path).await? {
            let data = self.parts.store.read(&path).await?;
            debug!(%dataset, path = %path.display(), "thumbnail: cache hit");
            return Ok(Artifact {
                kind: ArtifactKind::Thumbnail,
                path,
                data,
                from_cache: true,
            });
        }

        debug!(%dataset, "thumbnail: resolve");
        let resolved = self.parts.resolver.resolve(dataset, token).await?;

        debug!(%dataset, "thumbnail: fetch source");
        let source = middle_slice(&resolved.slice_directory()).await?;

        debug!(%dataset, source = %source.display(), "thumbnail: transform");
        if let Some(parent) = path.parent() {
            self.parts.store.ensure_directory(parent).await?;
        }
        let data = match &self.options.thumbnail_colormap {
            None => self.transform_direct(&source, params.size, &path).await?,
            Some(colormap) => {
                self.transform_with_local_colormap(dataset, &source, params.size, colormap, &path)
                    .await?
            }
        };

        info!(%dataset, size = params.size, path = %path.display(), "thumbnail generated");
        Ok(Artifact {
            kind: ArtifactKind::Thumbnail,
            path,
            data,
            from_cache: false,
        })
    }

    /// The engine writes the final image; it is staged and renamed into place
    async fn transform_direct(&self, source: &Path, size: u32, path: &Path) -> Result<Bytes> {
        let staging = temp_path_for(path);
        let stages = self.options.plan.stages(source, size, &staging);
        let data = match self.run_staged(&stages, &staging).await {
            Ok(data) => data,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        debug!(path = %path.display(), "thumbnail: store");
        promote(&staging, path).await?;
        Ok(data)
    }

    async fn run_staged(&self, stages: &[Stage], staging: &Path) -> Result<Bytes> {
        self.parts.pipeline.invoke(stages).await?;
        match tokio::fs::read(staging).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => Err(ThumbError::Storage(format!(
                "pipeline reported success but wrote no output at {}: {}",
                staging.display(),
                e
            ))),
        }
    }

    /// The engine writes an 8-bit grayscale TIFF, colorized and encoded here
    async fn transform_with_local_colormap(
        &self,
        dataset: &DatasetId,
        source: &Path,
        size: u32,
        colormap: &Colormap,
        path: &Path,
    ) -> Result<Bytes> {
        let gray_path = self.parts.store.artifact_path(
            dataset,
            ArtifactKind::ThumbnailIntermediate,
            &size_key(size),
        );
        let staging = temp_path_for(&gray_path);
        let stages = self.options.plan.stages(source, size, &staging);
        let gray = match self.run_staged(&stages, &staging).await {
            Ok(gray) => gray,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        promote(&staging, &gray_path).await?;

        let colormap = colormap.clone();
        let jpeg = tokio::task::spawn_blocking(move || colorize_jpeg(&gray, &colormap)).await??;

        debug!(path = %path.display(), "thumbnail: store");
        self.parts.store.write(path, &jpeg).await?;
        Ok(Bytes::from(jpeg))
    }

    /// Render a slice, building the per-size intermediate volume on first use
    pub async fn slice(
        &self,
        dataset: &DatasetId,
        params: &SliceParams,
        token: Option<&str>,
    ) -> Result<Artifact> {
        Self::check_size(params.size, self.options.max_volume_size)?;
        let plane = PlaneSpec::new(params.axis, params.intercept)?;
        let colormap = Colormap::from_optional(params.colormap.as_deref())?;

        let (volume_path, built) = self.ensure_volume(dataset, params.size, token).await?;

        let key = derive_key(KeyInput::Slice(dataset, params));
        let path = self.parts.store.artifact_path(dataset, ArtifactKind::Slice, &key);
        let request = SliceRequest {
            size: params.size,
            plane,
            window: params.window,
            colormap,
            normalize: self.options.normalize,
        };

        debug!(%dataset, %plane, key = %key, colormap = request.colormap.name(), "slice: transform");
        let data = match self.parts.extractor.slice(&volume_path, &request, &path).await {
            // A cached volume failing its header or checksum checks is rebuilt once
            Err(ThumbError::InvalidFormat(reason)) if !built => {
                warn!(path = %volume_path.display(), %reason, "discarding unreadable volume");
                self.build_volume(dataset, params.size, token, &volume_path)
                    .await?;
                self.parts
                    .extractor
                    .slice(&volume_path, &request, &path)
                    .await?
            }
            result => result?,
        };

        info!(%dataset, %plane, path = %path.display(), "slice rendered");
        Ok(Artifact {
            kind: ArtifactKind::Slice,
            path,
            data,
            from_cache: false,
        })
    }

    /// Path of the intermediate volume for `(dataset, size)`, and whether it was just built
    async fn ensure_volume(
        &self,
        dataset: &DatasetId,
        size: u32,
        token: Option<&str>,
    ) -> Result<(PathBuf, bool)> {
        let path = self
            .parts
            .store
            .artifact_path(dataset, ArtifactKind::Volume, &size_key(size));

        debug!(%dataset, size, "slice: check volume cache");
        if self.parts.store.exists(&path).await? {
            debug!(%dataset, path = %path.display(), "slice: volume cache hit");
            return Ok((path, false));
        }

        self.build_volume(dataset, size, token, &path).await?;
        Ok((path, true))
    }

    async fn build_volume(
        &self,
        dataset: &DatasetId,
        size: u32,
        token: Option<&str>,
        path: &Path,
    ) -> Result<()> {
        debug!(%dataset, "slice: resolve");
        let resolved = self.parts.resolver.resolve(dataset, token).await?;
        if let Some(parent) = path.parent() {
            self.parts.store.ensure_directory(parent).await?;
        }

        debug!(%dataset, size, "slice: build volume");
        let summary = self
            .parts
            .builder
            .build(
                &resolved.slice_directory(),
                &[size],
                self.options.normalize,
                path,
            )
            .await?;
        info!(%dataset, size, slices = summary.source_slices, "intermediate volume built");
        Ok(())
    }
}

/// The canonical thumbnail source: the middle file of the sorted slice directory
pub async fn middle_slice(slice_dir: &Path) -> Result<PathBuf> {
    let mut files = sorted_files(slice_dir).await?;
    let index = middle_index(files.len()).ok_or_else(|| {
        ThumbError::NotFound(format!("no slices in {}", slice_dir.display()))
    })?;
    Ok(files.swap_remove(index))
}

fn colorize_jpeg(gray: &[u8], colormap: &Colormap) -> Result<Vec<u8>> {
    let gray = image::load_from_memory(gray)?.to_luma8();
    let rgb = colormap.apply(&gray);
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_middle_slice_uses_integer_division() {
        let dir = TempDir::new().unwrap();
        for name in ["s0", "s1", "s2", "s3", "s4"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(middle_slice(dir.path()).await.unwrap(), dir.path().join("s2"));

        std::fs::remove_file(dir.path().join("s4")).unwrap();
        assert_eq!(middle_slice(dir.path()).await.unwrap(), dir.path().join("s2"));
    }

    #[tokio::test]
    async fn test_middle_slice_of_empty_directory() {
        let dir = TempDir::new().unwrap();
        let err = middle_slice(dir.path()).await.unwrap_err();
        assert!(matches!(err, ThumbError::NotFound(_)));
    }

    #[test]
    fn test_colorize_jpeg() {
        let gray = image::GrayImage::from_pixel(4, 4, image::Luma([200]));
        let mut tiff = Vec::new();
        gray.write_to(&mut Cursor::new(&mut tiff), ImageFormat::Tiff)
            .unwrap();

        let jpeg = colorize_jpeg(&tiff, &Colormap::from_name("hot").unwrap()).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
