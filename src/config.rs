//! Runtime configuration
//!
//! Every option can be given as a flag or through a `THUMBNAIL_*` environment
//! variable.

use crate::colormap::Colormap;
use crate::compression::CompressionMethod;
use crate::error::{Result, ThumbError};
use crate::pipeline::ThumbnailPlan;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Where colormaps are applied to thumbnails
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColormapStrategy {
    /// The transform engine applies its own colormap stage
    Pipeline,
    /// The engine writes grayscale; the lookup table is applied in-process
    Local,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "volthumb", version, about = "Thumbnail and slice server for volumetric datasets")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "THUMBNAIL_BIND", default_value = "0.0.0.0:5003")]
    pub bind: SocketAddr,

    /// Root of the artifact cache
    #[arg(long, env = "THUMBNAIL_CACHE_ROOT", default_value = "cache")]
    pub cache_root: PathBuf,

    /// Base URL of the dataset service
    #[arg(long, env = "THUMBNAIL_RESOLVER_URL", default_value = "http://localhost:5000/api")]
    pub resolver_url: String,

    #[arg(long, env = "THUMBNAIL_RESOLVER_TIMEOUT_SECS", default_value_t = 10)]
    pub resolver_timeout_secs: u64,

    /// Transform engine executable
    #[arg(long, env = "THUMBNAIL_PIPELINE_PROGRAM", default_value = "ufo-launch")]
    pub pipeline_program: PathBuf,

    #[arg(long, env = "THUMBNAIL_PIPELINE_TIMEOUT_SECS", default_value_t = 120)]
    pub pipeline_timeout_secs: u64,

    /// Crop a centered window before rescaling thumbnails
    #[arg(long, env = "THUMBNAIL_CROP", default_value_t = true, action = clap::ArgAction::Set)]
    pub crop: bool,

    #[arg(long, env = "THUMBNAIL_CROP_SIZE", default_value_t = 512)]
    pub crop_size: u32,

    /// Bit depth passed to the engine's write stage
    #[arg(long, env = "THUMBNAIL_BITS", default_value_t = 8)]
    pub bits: u8,

    #[arg(long, env = "THUMBNAIL_COLORMAP_STRATEGY", value_enum, default_value_t = ColormapStrategy::Pipeline)]
    pub colormap_strategy: ColormapStrategy,

    /// Colormap for thumbnails; grayscale when unset
    #[arg(long, env = "THUMBNAIL_COLORMAP")]
    pub thumbnail_colormap: Option<String>,

    /// Stretch source intensities when building intermediate volumes
    #[arg(long, env = "THUMBNAIL_NORMALIZE_VOLUME", default_value_t = true, action = clap::ArgAction::Set)]
    pub normalize_volume: bool,

    /// Largest accepted thumbnail size
    #[arg(long, env = "THUMBNAIL_MAX_SIZE", default_value_t = 2048)]
    pub max_size: u32,

    /// Largest accepted slice size; each volume level holds `size`³ samples
    #[arg(long, env = "THUMBNAIL_MAX_VOLUME_SIZE", default_value_t = 512)]
    pub max_volume_size: u32,

    /// Codec for intermediate volume levels
    #[arg(long, env = "THUMBNAIL_VOLUME_COMPRESSION", value_enum, default_value_t = CompressionMethod::Zstd)]
    pub volume_compression: CompressionMethod,

    /// Emit logs as JSON
    #[arg(long, env = "THUMBNAIL_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["volthumb"])
    }
}

impl Config {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resolver_timeout_secs == 0 || self.pipeline_timeout_secs == 0 {
            return Err(ThumbError::Configuration(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.max_size == 0 || self.max_volume_size == 0 || (self.crop && self.crop_size == 0) {
            return Err(ThumbError::Configuration(
                "sizes must be positive".to_string(),
            ));
        }
        if !matches!(self.bits, 8 | 16 | 32) {
            return Err(ThumbError::Configuration(format!(
                "unsupported bit depth {}",
                self.bits
            )));
        }
        if self.colormap_strategy == ColormapStrategy::Local && self.bits != 8 {
            return Err(ThumbError::Configuration(
                "local colormaps need an 8-bit intermediate".to_string(),
            ));
        }
        if let Some(name) = &self.thumbnail_colormap {
            Colormap::from_name(name)
                .map_err(|e| ThumbError::Configuration(e.to_string()))?;
        }
        Ok(())
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver_timeout_secs)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }

    /// Stage settings for thumbnail generation
    pub fn thumbnail_plan(&self) -> ThumbnailPlan {
        ThumbnailPlan {
            crop: self.crop.then_some(self.crop_size),
            map_color: self.colormap_strategy == ColormapStrategy::Pipeline
                && self.thumbnail_colormap.is_some(),
            bits: self.bits,
        }
    }

    /// Colormap applied locally to thumbnails, if that path is enabled
    pub fn local_thumbnail_colormap(&self) -> Result<Option<Colormap>> {
        match (&self.colormap_strategy, &self.thumbnail_colormap) {
            (ColormapStrategy::Local, Some(name)) => Colormap::from_name(name).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind.port(), 5003);
        assert_eq!(config.cache_root, PathBuf::from("cache"));
        assert_eq!(config.resolver_url, "http://localhost:5000/api");
        assert!(config.crop);
        assert_eq!(config.colormap_strategy, ColormapStrategy::Pipeline);
        assert_eq!(config.max_volume_size, 512);
        assert_eq!(config.volume_compression, CompressionMethod::Zstd);
        config.validate().unwrap();

        let plan = config.thumbnail_plan();
        assert_eq!(plan.crop, Some(512));
        assert!(!plan.map_color);
        assert_eq!(plan.bits, 8);
    }

    #[test]
    fn test_colormap_strategies() {
        let pipeline = Config::parse_from(["volthumb", "--thumbnail-colormap", "hot"]);
        assert!(pipeline.thumbnail_plan().map_color);
        assert!(pipeline.local_thumbnail_colormap().unwrap().is_none());

        let local = Config::parse_from([
            "volthumb",
            "--thumbnail-colormap",
            "hot",
            "--colormap-strategy",
            "local",
            "--crop",
            "false",
        ]);
        assert!(!local.thumbnail_plan().map_color);
        assert_eq!(local.thumbnail_plan().crop, None);
        assert_eq!(local.local_thumbnail_colormap().unwrap().unwrap().name(), "hot");
    }

    #[test]
    fn test_volume_settings() {
        let config = Config::parse_from([
            "volthumb",
            "--max-volume-size",
            "256",
            "--volume-compression",
            "deflate",
        ]);
        assert_eq!(config.max_volume_size, 256);
        assert_eq!(config.volume_compression, CompressionMethod::Deflate);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let unknown = Config::parse_from(["volthumb", "--thumbnail-colormap", "rainbow"]);
        assert!(matches!(unknown.validate(), Err(ThumbError::Configuration(_))));

        let zero = Config::parse_from(["volthumb", "--pipeline-timeout-secs", "0"]);
        assert!(zero.validate().is_err());

        let no_volumes = Config::parse_from(["volthumb", "--max-volume-size", "0"]);
        assert!(no_volumes.validate().is_err());

        let deep_local = Config::parse_from(["volthumb", "--colormap-strategy", "local", "--bits", "16"]);
        assert!(deep_local.validate().is_err());
    }
}
