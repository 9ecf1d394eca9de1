//! `v360` reprojection through `ffmpeg`.
//!
//! ```text
//! ffmpeg -y -v error -i <input>
//!   -vf v360=e:rectilinear:h_fov=H:v_fov=V:yaw=Y:pitch=P:roll=R:w=W:h=Hh
//!   -q:v 2 <output>
//! ```
use async_trait::async_trait;
use log::debug;

use crate::params::PipelineParams;
use crate::pipeline_errors::PipelineError;

use super::command::{FfmpegCommand, ToolRunner};
use super::{is_panoramic, RenderJob, RenderOutcome, Renderer};

/// Filter expression for one job.
pub fn v360_filter(job: &RenderJob) -> String {
    format!(
        "v360=e:rectilinear:h_fov={}:v_fov={}:yaw={}:pitch={}:roll={}:w={}:h={}",
        job.horizontal_fov,
        job.vertical_fov(),
        job.yaw,
        job.pitch,
        job.roll,
        job.output_width,
        job.output_height()
    )
}

#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    runner: ToolRunner,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self::from_params(&PipelineParams::default())
    }
}

impl FfmpegRenderer {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    /// `ffmpeg` on `PATH`, bounded by `render_timeout` per invocation.
    pub fn from_params(params: &PipelineParams) -> Self {
        Self::new(ToolRunner::ffmpeg().with_params(params))
    }

    pub fn runner(&self) -> &ToolRunner {
        &self.runner
    }

    pub fn command(job: &RenderJob) -> FfmpegCommand {
        FfmpegCommand::new(&job.input, &job.output)
            .video_filter(v360_filter(job))
            .quality(2)
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, job: &RenderJob) -> Result<RenderOutcome, PipelineError> {
        if !job.input.is_file() {
            return Err(PipelineError::MissingResource(job.input.clone()));
        }
        if let Some(parent) = job.output.parent().filter(|p| !p.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // an undecodable header falls through to ffmpeg, which reports its own error
        match image::image_dimensions(&job.input) {
            Ok((w, h)) if !is_panoramic(w, h) => {
                debug!("{} is {w}x{h}, not panoramic: copying", job.input);
                tokio::fs::copy(&job.input, &job.output).await?;
                return Ok(RenderOutcome::Copied);
            }
            Ok(_) => {}
            Err(e) => debug!("Cannot read dimensions of {}: {e}", job.input),
        }

        self.runner
            .run(&Self::command(job).build_args())
            .await?;
        Ok(RenderOutcome::Reprojected)
    }
}
