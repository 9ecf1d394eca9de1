//! # Frame extraction
//!
//! Pulls the matched frame of every footprint out of its run video, so that it can be dewarped.
//!
//! 1. Rows are deduplicated on `(matched_file, frame_number)`; the first row's object id names
//!    the output.
//! 2. Rows are grouped by run; each run's video is located under the video root by trying the
//!    extensions `.mp4 .MP4 .mov .MOV .avi`, then the `GH→GL`, `GL→GH` and `GS→GL` renamings.
//! 3. The video is probed with `ffprobe` for its duration and frame rate. Frames beyond
//!    `duration × fps` are dropped. When probing fails, every frame is kept and 30 fps is
//!    assumed.
//! 4. Each frame is extracted at `frame / fps` seconds into `<ObjectId>.jpg`; when that name is
//!    taken, `<ObjectId>_1.jpg` … `<ObjectId>_10.jpg` are tried in turn.
use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::constants::{FrameIndex, FALLBACK_FPS};
use crate::params::PipelineParams;
use crate::pipeline_errors::PipelineError;
use crate::schema::{resolve_all, FRAME_NUMBER, MATCHED_FILE, OBJECT_ID};
use crate::table::Table;

use super::command::{FfmpegCommand, ToolRunner};

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "MP4", "mov", "MOV", "avi"];
const MAX_DUPLICATE_SUFFIX: usize = 10;

/// Candidate video file names for a run, in lookup order.
pub fn video_candidates(run: &str) -> Vec<String> {
    let mut names: Vec<String> = VIDEO_EXTENSIONS
        .iter()
        .map(|ext| format!("{run}.{ext}"))
        .collect();
    for (from, to) in [("GH", "GL"), ("GL", "GH"), ("GS", "GL")] {
        let renamed = run.replace(from, to);
        names.push(format!("{renamed}.mp4"));
        names.push(format!("{renamed}.MP4"));
    }
    names.into_iter().unique().collect()
}

/// Locate the video of `run` under `root`.
pub fn find_video(root: &Utf8Path, run: &str) -> Option<Utf8PathBuf> {
    video_candidates(run)
        .into_iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}

/// Duration and frame rate of a video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
    pub fps: f64,
}

impl VideoInfo {
    pub fn total_frames(&self) -> usize {
        (self.duration * self.fps).floor() as usize
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    r_frame_rate: Option<String>,
}

/// Parse an ffprobe rate, `"30000/1001"` or `"29.97"`.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = match s.trim().split_once('/') {
        Some((n, d)) => n.trim().parse::<f64>().ok()? / d.trim().parse::<f64>().ok()?,
        None => s.trim().parse::<f64>().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Parse the JSON printed by `ffprobe -show_entries format=duration:stream=r_frame_rate`.
pub fn parse_probe_output(json: &[u8]) -> Result<Option<VideoInfo>, PipelineError> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;
    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    let fps = probe
        .streams
        .iter()
        .find_map(|s| s.r_frame_rate.as_deref().and_then(parse_frame_rate));
    Ok(duration.zip(fps).map(|(duration, fps)| VideoInfo { duration, fps }))
}

/// Probe a video. `Ok(None)` when ffprobe runs but reports no usable duration or rate.
pub async fn probe_video(
    runner: &ToolRunner,
    video: &Utf8Path,
) -> Result<Option<VideoInfo>, PipelineError> {
    let args: Vec<String> = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-select_streams",
        "v:0",
        "-show_entries",
        "format=duration:stream=r_frame_rate",
        video.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let output = runner.run(&args).await?;
    parse_probe_output(&output.stdout)
}

/// One frame to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    pub object_id: String,
    pub run: String,
    pub frame_number: FrameIndex,
}

/// Unique frame requests of a matched table, grouped by run in run order.
pub fn frame_requests(table: &Table) -> Result<BTreeMap<String, Vec<FrameRequest>>, PipelineError> {
    let cols = resolve_all(&table.headers, &[MATCHED_FILE, FRAME_NUMBER, OBJECT_ID])?;
    let (run_col, frame_col, id_col) = (cols[0], cols[1], cols[2]);

    let requests = (0..table.len())
        .filter_map(|row| {
            let run = table.cell(row, run_col)?;
            let frame = table
                .number(row, frame_col)
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)?;
            let object_id = table.cell(row, id_col)?;
            Some(FrameRequest {
                object_id: object_id.to_string(),
                run: run.to_string(),
                frame_number: frame as FrameIndex,
            })
        })
        .unique_by(|r| (r.run.clone(), r.frame_number));

    let mut by_run: BTreeMap<String, Vec<FrameRequest>> = BTreeMap::new();
    for r in requests {
        by_run.entry(r.run.clone()).or_default().push(r);
    }
    Ok(by_run)
}

/// First free output name for `object_id`, `None` after ten duplicates.
pub fn free_output_path(dir: &Utf8Path, object_id: &str) -> Option<Utf8PathBuf> {
    std::iter::once(dir.join(format!("{object_id}.jpg")))
        .chain((1..=MAX_DUPLICATE_SUFFIX).map(|i| dir.join(format!("{object_id}_{i}.jpg"))))
        .find(|p| !p.exists())
}

/// Per-record counts of an extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub extracted: usize,
    pub failed: usize,
    /// Frames beyond the end of their video
    pub out_of_range: usize,
    /// Frames whose run has no video
    pub missing_video: usize,
    /// Frames dropped because every output name was taken
    pub name_exhausted: usize,
}

impl fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "extracted={}, failed={}, out_of_range={}, missing_video={}, name_exhausted={}",
            self.extracted, self.failed, self.out_of_range, self.missing_video, self.name_exhausted
        )
    }
}

/// Extracts matched frames with `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg: ToolRunner,
    ffprobe: ToolRunner,
    attempts: u32,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::from_params(&PipelineParams::default())
    }
}

impl FrameExtractor {
    pub fn new(ffmpeg: ToolRunner, ffprobe: ToolRunner, attempts: u32) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            attempts: attempts.max(1),
        }
    }

    /// `ffmpeg` and `ffprobe` bounded by `render_timeout`, retried `render_attempts` times.
    pub fn from_params(params: &PipelineParams) -> Self {
        Self::new(
            ToolRunner::ffmpeg().with_params(params),
            ToolRunner::ffprobe().with_params(params),
            params.render_attempts,
        )
    }

    pub fn command(video: &Utf8Path, seconds: f64, output: &Utf8Path) -> FfmpegCommand {
        FfmpegCommand::new(video, output)
            .seek(seconds)
            .single_frame()
            .quality(1)
            .pixel_format("yuvj420p")
            .log_level("warning")
    }

    /// Extract one frame, retrying up to the configured number of attempts.
    pub async fn extract_frame(
        &self,
        video: &Utf8Path,
        seconds: f64,
        output: &Utf8Path,
    ) -> Result<(), PipelineError> {
        let args = Self::command(video, seconds, output).build_args();
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.ffmpeg.run(&args).await {
                Ok(_) if output.is_file() => return Ok(()),
                Ok(_) => last_error = format!("no output written at {seconds:.3}s"),
                Err(e @ PipelineError::ToolNotFound(_)) => return Err(e),
                Err(e) => last_error = e.to_string(),
            }
            debug!("Extraction attempt {attempt}/{} failed: {last_error}", self.attempts);
        }
        Err(PipelineError::render_failure(self.attempts, last_error))
    }

    /// Extract every matched frame of `table` into `output_dir`.
    ///
    /// Return
    /// ----------
    /// * The per-record counts, or [`PipelineError::Schema`] when `matched_file`,
    ///   `frame_number` or an object id column is absent, or [`PipelineError::ToolNotFound`]
    ///   when `ffmpeg`/`ffprobe` is not installed.
    pub async fn run(
        &self,
        table: &Table,
        video_root: &Utf8Path,
        output_dir: &Utf8Path,
    ) -> Result<ExtractionReport, PipelineError> {
        let by_run = frame_requests(table)?;
        self.ffmpeg.locate()?;
        self.ffprobe.locate()?;
        tokio::fs::create_dir_all(output_dir).await?;

        let mut report = ExtractionReport::default();
        for (run, requests) in by_run {
            let Some(video) = find_video(video_root, &run) else {
                warn!("{}", PipelineError::MissingResource(video_root.join(&run)));
                report.missing_video += requests.len();
                continue;
            };

            let info = match probe_video(&self.ffprobe, &video).await {
                Ok(info) => info,
                Err(e) => {
                    warn!("Probing {video} failed: {e}");
                    None
                }
            };
            let fps = info.map_or(FALLBACK_FPS, |i| i.fps);

            for request in requests {
                if info.is_some_and(|i| request.frame_number >= i.total_frames()) {
                    report.out_of_range += 1;
                    continue;
                }
                let Some(output) = free_output_path(output_dir, &request.object_id) else {
                    report.name_exhausted += 1;
                    continue;
                };
                let seconds = request.frame_number as f64 / fps;
                match self.extract_frame(&video, seconds, &output).await {
                    Ok(()) => report.extracted += 1,
                    Err(e) => {
                        warn!("Frame {} of {run}: {e}", request.frame_number);
                        report.failed += 1;
                    }
                }
            }
        }

        info!("Frame extraction finished: {report}");
        Ok(report)
    }
}
