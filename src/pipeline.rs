//! External transform pipeline
//!
//! The transform engine is a black box driven by an argument list of stages
//! separated by `!`, e.g.
//!
//! ```text
//! ufo-launch read path=/d/slices/s2.tif ! crop width=512 height=512 from-center=True \
//!     ! rescale width=128 height=128 ! write filename=cache/a/d/128.jpg bits=8
//! ```
//!
//! Only the exit status of the process is inspected.

use crate::error::{Result, ThumbError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

/// Separator between stages on the command line
pub const STAGE_SEPARATOR: &str = "!";

/// One processing stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Read { path: PathBuf },
    Crop { width: u32, height: u32, from_center: bool },
    Rescale { width: u32, height: u32 },
    MapColor,
    Write { filename: PathBuf, bits: u8 },
}

impl Stage {
    /// Stage name understood by the engine
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Read { .. } => "read",
            Stage::Crop { .. } => "crop",
            Stage::Rescale { .. } => "rescale",
            Stage::MapColor => "map-color",
            Stage::Write { .. } => "write",
        }
    }

    fn push_args(&self, args: &mut Vec<String>) {
        args.push(self.name().to_string());
        match self {
            Stage::Read { path } => args.push(format!("path={}", path.display())),
            Stage::Crop {
                width,
                height,
                from_center,
            } => {
                args.push(format!("width={}", width));
                args.push(format!("height={}", height));
                if *from_center {
                    args.push("from-center=True".to_string());
                }
            }
            Stage::Rescale { width, height } => {
                args.push(format!("width={}", width));
                args.push(format!("height={}", height));
            }
            Stage::MapColor => {}
            Stage::Write { filename, bits } => {
                args.push(format!("filename={}", filename.display()));
                args.push(format!("bits={}", bits));
            }
        }
    }
}

/// Render stages into the engine's argument list
pub fn render_args(stages: &[Stage]) -> Vec<String> {
    let mut args = Vec::new();
    for (i, stage) in stages.iter().enumerate() {
        if i > 0 {
            args.push(STAGE_SEPARATOR.to_string());
        }
        stage.push_args(&mut args);
    }
    args
}

/// Settings that shape the thumbnail stage list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailPlan {
    /// Centered crop window applied before rescaling, if any
    pub crop: Option<u32>,
    /// Append the engine's own colormap stage
    pub map_color: bool,
    /// Bit depth of the written image
    pub bits: u8,
}

impl Default for ThumbnailPlan {
    fn default() -> Self {
        Self {
            crop: Some(512),
            map_color: false,
            bits: 8,
        }
    }
}

impl ThumbnailPlan {
    /// Stages turning `source` into a `size`×`size` image at `destination`
    pub fn stages(&self, source: &Path, size: u32, destination: &Path) -> Vec<Stage> {
        let mut stages = vec![Stage::Read {
            path: source.to_path_buf(),
        }];
        if let Some(window) = self.crop {
            stages.push(Stage::Crop {
                width: window,
                height: window,
                from_center: true,
            });
        }
        stages.push(Stage::Rescale {
            width: size,
            height: size,
        });
        if self.map_color {
            stages.push(Stage::MapColor);
        }
        stages.push(Stage::Write {
            filename: destination.to_path_buf(),
            bits: self.bits,
        });
        stages
    }
}

/// Runs a stage list to completion
#[async_trait]
pub trait PipelineInvoker: Send + Sync {
    async fn invoke(&self, stages: &[Stage]) -> Result<()>;
}

/// Invoker spawning the external engine as a child process
#[derive(Debug, Clone)]
pub struct UfoPipeline {
    program: PathBuf,
    timeout: Duration,
}

impl UfoPipeline {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl PipelineInvoker for UfoPipeline {
    async fn invoke(&self, stages: &[Stage]) -> Result<()> {
        let args = render_args(stages);
        debug!(program = %self.program.display(), args = ?args, "launching pipeline");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                error!(program = %self.program.display(), timeout = ?self.timeout, "pipeline timed out");
                return Err(ThumbError::Timeout(format!(
                    "pipeline did not finish within {:?}",
                    self.timeout
                )));
            }
        };

        if !status.success() {
            error!(program = %self.program.display(), code = ?status.code(), "pipeline failed");
            return Err(ThumbError::PipelineExecution {
                code: status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_full_plan() {
        let plan = ThumbnailPlan {
            crop: Some(512),
            map_color: true,
            bits: 8,
        };
        let stages = plan.stages(Path::new("/d/slices/s2.tif"), 128, Path::new("out/128.jpg"));
        assert_eq!(
            render_args(&stages),
            vec![
                "read",
                "path=/d/slices/s2.tif",
                "!",
                "crop",
                "width=512",
                "height=512",
                "from-center=True",
                "!",
                "rescale",
                "width=128",
                "height=128",
                "!",
                "map-color",
                "!",
                "write",
                "filename=out/128.jpg",
                "bits=8",
            ]
        );
    }

    #[test]
    fn test_render_minimal_plan() {
        let plan = ThumbnailPlan {
            crop: None,
            map_color: false,
            bits: 16,
        };
        let stages = plan.stages(Path::new("a.tif"), 64, Path::new("b.tif"));
        let names: Vec<_> = stages.iter().map(Stage::name).collect();
        assert_eq!(names, vec!["read", "rescale", "write"]);
        assert_eq!(render_args(&stages).last().unwrap(), "bits=16");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_is_reported() {
        let ok = UfoPipeline::new("true", Duration::from_secs(5));
        ok.invoke(&[Stage::MapColor]).await.unwrap();

        let failing = UfoPipeline::new("false", Duration::from_secs(5));
        let err = failing.invoke(&[Stage::MapColor]).await.unwrap_err();
        assert!(matches!(err, ThumbError::PipelineExecution { code: Some(1) }));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let missing = UfoPipeline::new("/nonexistent/ufo-launch", Duration::from_secs(1));
        let err = missing.invoke(&[Stage::MapColor]).await.unwrap_err();
        assert!(matches!(err, ThumbError::Io(_)));
    }
}
