//! # Rendering collaborator
//!
//! The yaw computed by the pipeline is handed to an external reprojection tool that turns an
//! equirectangular capture into a rectilinear view facing the building.
//!
//! Modules
//! -----------------
//! * [`command`](crate::render::command) – `ffmpeg`/`ffprobe` command builder and a process runner
//!   with a timeout.
//! * [`ffmpeg`](crate::render::ffmpeg) – [`FfmpegRenderer`](crate::render::ffmpeg::FfmpegRenderer),
//!   the `v360` implementation of [`Renderer`].
//! * [`dewarp`](crate::render::dewarp) – Per-row dewarp stage over an oriented table.
//! * [`frames`](crate::render::frames) – Extraction of matched frames from the run videos.
//!
//! Contract
//! -----------------
//! * An input whose `width / height < 2.0` (or height 0) is not a panoramic capture and is
//!   copied unchanged ([`RenderOutcome::Copied`]).
//! * Otherwise the renderer produces a reprojected image ([`RenderOutcome::Reprojected`]).
//! * Failures are returned as values. [`render_with_retry`] retries transient failures a
//!   bounded number of times and reports the final status; a batch never aborts on them.
use async_trait::async_trait;
use camino::Utf8PathBuf;
use log::warn;

use crate::constants::{Degree, PANORAMIC_ASPECT_RATIO};
use crate::params::{AspectRatio, PipelineParams};
use crate::pipeline_errors::PipelineError;

pub mod command;
pub mod dewarp;
pub mod ffmpeg;
pub mod frames;

/// One reprojection request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub yaw: Degree,
    pub pitch: Degree,
    pub roll: Degree,
    pub horizontal_fov: Degree,
    pub output_width: u32,
    pub aspect_ratio: AspectRatio,
}

impl RenderJob {
    /// A job for `yaw` using the rendering settings of `params`.
    pub fn new(
        input: Utf8PathBuf,
        output: Utf8PathBuf,
        yaw: Degree,
        params: &PipelineParams,
    ) -> Self {
        RenderJob {
            input,
            output,
            yaw,
            pitch: params.pitch,
            roll: params.roll,
            horizontal_fov: params.horizontal_fov,
            output_width: params.output_width,
            aspect_ratio: params.aspect_ratio,
        }
    }

    pub fn output_height(&self) -> u32 {
        self.aspect_ratio.height_for(self.output_width)
    }

    /// `v_fov = 2·atan(tan(h_fov/2) / aspect)`, in degrees.
    pub fn vertical_fov(&self) -> Degree {
        let half = (self.horizontal_fov / 2.0).to_radians();
        (2.0 * (half.tan() / self.aspect_ratio.ratio()).atan()).to_degrees()
    }
}

/// What happened to a render request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The input is not panoramic and was copied unchanged
    Copied,
    /// The input was reprojected at the requested orientation
    Reprojected,
}

/// Panoramic aspect heuristic.
#[inline]
pub fn is_panoramic(width: u32, height: u32) -> bool {
    height != 0 && width as f64 / height as f64 >= PANORAMIC_ASPECT_RATIO
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render one job, a single attempt.
    async fn render(&self, job: &RenderJob) -> Result<RenderOutcome, PipelineError>;
}

fn is_transient(err: &PipelineError) -> bool {
    matches!(
        err,
        PipelineError::RenderFailure { .. }
            | PipelineError::RenderTimeout(_)
            | PipelineError::IoError(_)
    )
}

/// Render with at most `attempts` invocations.
///
/// Transient failures (non-zero exit, timeout, I/O) are retried. A missing input or a missing
/// tool is returned immediately.
///
/// Return
/// ----------
/// * The outcome of the first successful attempt, or [`PipelineError::RenderFailure`] carrying
///   the number of attempts and the last error message.
pub async fn render_with_retry<R>(
    renderer: &R,
    job: &RenderJob,
    attempts: u32,
) -> Result<RenderOutcome, PipelineError>
where
    R: Renderer + ?Sized,
{
    let attempts = attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match renderer.render(job).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if !is_transient(&e) => return Err(e),
            Err(e) => {
                warn!("Render attempt {attempt}/{attempts} for {} failed: {e}", job.input);
                last_error = e.to_string();
            }
        }
    }
    Err(PipelineError::render_failure(attempts, last_error))
}

#[cfg(test)]
mod render_test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyRenderer {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Renderer for FlakyRenderer {
        async fn render(&self, _job: &RenderJob) -> Result<RenderOutcome, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(PipelineError::RenderTimeout(30))
            } else {
                Ok(RenderOutcome::Reprojected)
            }
        }
    }

    fn job() -> RenderJob {
        RenderJob::new(
            "in/1.jpg".into(),
            "out/1.jpg".into(),
            12.5,
            &PipelineParams::default(),
        )
    }

    #[test]
    fn test_panoramic_heuristic() {
        assert!(is_panoramic(5760, 2880));
        assert!(!is_panoramic(1920, 1080));
        assert!(!is_panoramic(100, 0));
    }

    #[test]
    fn test_job_geometry() {
        let j = job();
        assert_eq!(j.output_height(), 1080);
        assert!((j.vertical_fov() - 58.715_507_086).abs() < 1e-8);

        let cinema = PipelineParams::builder()
            .aspect_ratio_str("21:9")
            .build()
            .unwrap();
        let j = RenderJob::new("a.jpg".into(), "b.jpg".into(), 0.0, &cinema);
        assert_eq!(j.output_height(), 822);
        assert!(ffmpeg::v360_filter(&j).ends_with(":w=1920:h=822"));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let r = FlakyRenderer {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let out = render_with_retry(&r, &job(), 3).await.unwrap();
        assert_eq!(out, RenderOutcome::Reprojected);
        assert_eq!(r.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let r = FlakyRenderer {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        match render_with_retry(&r, &job(), 3).await {
            Err(PipelineError::RenderFailure { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_input_is_not_retried() {
        struct Missing(AtomicU32);
        #[async_trait]
        impl Renderer for Missing {
            async fn render(&self, job: &RenderJob) -> Result<RenderOutcome, PipelineError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::MissingResource(job.input.clone()))
            }
        }
        let r = Missing(AtomicU32::new(0));
        assert!(matches!(
            render_with_retry(&r, &job(), 3).await,
            Err(PipelineError::MissingResource(_))
        ));
        assert_eq!(r.0.load(Ordering::SeqCst), 1);
    }
}
