//! volthumb - thumbnails and slices of volumetric datasets
//!
//! Serves 2D artifacts derived from large volumes stored as ordered stacks of
//! planes, and caches every generated artifact on disk so that repeated
//! requests never recompute it.
//!
//! # Features
//!
//! - Thumbnails of the middle plane, produced by an external transform engine
//!   (`read ! crop ! rescale ! map-color ! write`)
//! - Axis-aligned slices cut from a compact per-size intermediate volume
//!   (`.cct`), built once and reused for every slice at that size
//! - Intensity windowing and colormap lookup tables
//! - Reproducible cache keys (size for thumbnails, SHA-256 digest for slices)
//! - Authorization delegated to an upstream dataset service
//!
//! # Cache layout
//!
//! ```text
//! cache/{owner}/{dataset}/{size}.jpg     thumbnail
//! cache/{owner}/{dataset}/{size}.tif     grayscale thumbnail (local colormaps)
//! cache/{owner}/{dataset}/{size}.cct     intermediate volume
//! cache/{owner}/{dataset}/{digest}.png   slice
//! ```
//!
//! Nothing is evicted; the cache grows without bound.
//!
//! # Example
//!
//! ```rust,ignore
//! use volthumb::{ArtifactService, Config, DatasetId, ThumbnailParams};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ArtifactService::from_config(&Config::default())?;
//! let dataset = DatasetId::new("alice", "scan-01")?;
//! let thumb = service
//!     .thumbnail(&dataset, &ThumbnailParams::default(), Some("token"))
//!     .await?;
//! println!("{} bytes of {}", thumb.data.len(), thumb.content_type());
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod colormap;
pub mod compression;
pub mod config;
pub mod error;
pub mod io;
pub mod key;
pub mod layout;
pub mod metadata;
pub mod orchestrator;
pub mod pipeline;
pub mod resolver;
pub mod server;
pub mod slice;
pub mod types;
pub mod utils;
pub mod volume;

// Re-exports
pub use access::IntermediateVolume;
pub use colormap::Colormap;
pub use config::{ColormapStrategy, Config};
pub use error::{Result, ThumbError};
pub use io::{ArtifactStore, FileSystemArtifactStore};
pub use key::{derive_key, CacheKey, KeyInput};
pub use orchestrator::{Artifact, ArtifactService, Collaborators, ServiceOptions};
pub use pipeline::{PipelineInvoker, Stage, ThumbnailPlan, UfoPipeline};
pub use resolver::{DatasetResolver, HttpDatasetResolver, ResolvedDataset};
pub use slice::{CctSliceExtractor, SliceExtractor, SliceRequest};
pub use types::{
    ArtifactKind, Axis, DatasetId, IntensityWindow, PlaneSpec, SliceParams, ThumbnailParams,
};
pub use volume::{CctVolumeBuilder, VolumeBuilder, VolumeSummary};

/// Version of the server
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic number of intermediate volume files
pub const CCT_MAGIC: &[u8; 4] = b"CCT\0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
