//! # Pipeline parameters
//!
//! [`PipelineParams`] gathers every tunable of a run: the matching buffer, the orientation
//! window, the yaw offset, and the renderer configuration handed to the external reprojection
//! tool. It is built once at the boundary and passed explicitly to each stage; no stage reads
//! process state.
//!
//! ## Groups
//!
//! - **Matching**: `buffer_distance` (m), `buffer_segments` (polygon segments per quarter circle).
//! - **Orientation**: `window_frames`, `average_samples`.
//! - **Yaw**: `yaw_offset` (camera mount correction, degrees).
//! - **Rendering**: `pitch`, `roll`, `horizontal_fov`, `output_width`, `aspect_ratio`,
//!   `render_attempts`, `render_timeout`.
//! - **Output**: `assign_object_ids`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use panomatch::params::PipelineParams;
//!
//! let params = PipelineParams::builder()
//!     .buffer_distance(30.0)
//!     .window_frames(10)
//!     .aspect_ratio_str("4:3")
//!     .build()
//!     .unwrap();
//! assert_eq!(params.output_height(), 1440);
//! ```
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    Degree, Meter, DEFAULT_AVERAGE_SAMPLES, DEFAULT_BUFFER_DISTANCE, DEFAULT_BUFFER_SEGMENTS,
    DEFAULT_HORIZONTAL_FOV, DEFAULT_OUTPUT_WIDTH, DEFAULT_WINDOW_FRAMES, DEFAULT_YAW_OFFSET,
};
use crate::pipeline_errors::PipelineError;

/// Output aspect ratio `width:height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    pub const WIDESCREEN: AspectRatio = AspectRatio {
        width: 16.0,
        height: 9.0,
    };

    #[inline]
    pub fn ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Pixel height for `width`, truncated: 1920 at 21:9 gives 822.
    pub fn height_for(&self, width: u32) -> u32 {
        (width as f64 * self.height / self.width).floor() as u32
    }
}

impl FromStr for AspectRatio {
    type Err = PipelineError;

    /// Parse `"W:H"` with positive finite parts, e.g. `"16:9"` or `"2.39:1"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::InvalidParameter(format!("invalid aspect ratio {s:?}"));
        let (w, h) = s.split_once(':').ok_or_else(invalid)?;
        let width: f64 = w.trim().parse().map_err(|_| invalid())?;
        let height: f64 = h.trim().parse().map_err(|_| invalid())?;
        if !(PipelineParamsBuilder::gt0(width) && PipelineParamsBuilder::gt0(height))
            || !width.is_finite()
            || !height.is_finite()
        {
            return Err(invalid());
        }
        Ok(AspectRatio { width, height })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Tunables of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    // --- Matching ---
    /// Buffer radius around each footprint, in meters.
    pub buffer_distance: Meter,
    /// Polygon segments per quarter circle of the buffer.
    pub buffer_segments: usize,

    // --- Orientation ---
    /// Frames considered on each side of the matched frame.
    pub window_frames: usize,
    /// Samples averaged on each side.
    pub average_samples: usize,

    // --- Yaw / rendering ---
    pub yaw_offset: Degree,
    pub pitch: Degree,
    pub roll: Degree,
    pub horizontal_fov: Degree,
    pub output_width: u32,
    pub aspect_ratio: AspectRatio,
    /// Total renderer invocations per image (first try included).
    pub render_attempts: u32,
    pub render_timeout: Duration,

    /// Append a sequential `ObjectId` when the footprint table has no id column.
    pub assign_object_ids: bool,
}

impl PipelineParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> PipelineParamsBuilder {
        PipelineParamsBuilder::new()
    }

    /// Output height derived from the width and the aspect ratio.
    pub fn output_height(&self) -> u32 {
        self.aspect_ratio.height_for(self.output_width)
    }

    /// Vertical field of view matching the horizontal one at the output aspect ratio.
    ///
    /// `v_fov = 2·atan(tan(h_fov/2) / aspect)`
    pub fn vertical_fov(&self) -> Degree {
        let half = (self.horizontal_fov / 2.0).to_radians();
        (2.0 * (half.tan() / self.aspect_ratio.ratio()).atan()).to_degrees()
    }
}

impl Default for PipelineParams {
    fn default() -> Self {
        PipelineParams {
            buffer_distance: DEFAULT_BUFFER_DISTANCE,
            buffer_segments: DEFAULT_BUFFER_SEGMENTS,

            window_frames: DEFAULT_WINDOW_FRAMES,
            average_samples: DEFAULT_AVERAGE_SAMPLES,

            yaw_offset: DEFAULT_YAW_OFFSET,
            pitch: 0.0,
            roll: 0.0,
            horizontal_fov: DEFAULT_HORIZONTAL_FOV,
            output_width: DEFAULT_OUTPUT_WIDTH,
            aspect_ratio: AspectRatio::WIDESCREEN,
            render_attempts: 3,
            render_timeout: Duration::from_secs(30),

            assign_object_ids: true,
        }
    }
}

/// Builder for [`PipelineParams`], with validation.
#[derive(Debug, Clone)]
pub struct PipelineParamsBuilder {
    params: PipelineParams,
    aspect_ratio_str: Option<String>,
}

impl Default for PipelineParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: PipelineParams::default(),
            aspect_ratio_str: None,
        }
    }

    // --- Matching ---
    pub fn buffer_distance(mut self, v: Meter) -> Self {
        self.params.buffer_distance = v;
        self
    }
    pub fn buffer_segments(mut self, v: usize) -> Self {
        self.params.buffer_segments = v;
        self
    }

    // --- Orientation ---
    pub fn window_frames(mut self, v: usize) -> Self {
        self.params.window_frames = v;
        self
    }
    pub fn average_samples(mut self, v: usize) -> Self {
        self.params.average_samples = v;
        self
    }

    // --- Yaw / rendering ---
    pub fn yaw_offset(mut self, v: Degree) -> Self {
        self.params.yaw_offset = v;
        self
    }
    pub fn pitch(mut self, v: Degree) -> Self {
        self.params.pitch = v;
        self
    }
    pub fn roll(mut self, v: Degree) -> Self {
        self.params.roll = v;
        self
    }
    pub fn horizontal_fov(mut self, v: Degree) -> Self {
        self.params.horizontal_fov = v;
        self
    }
    pub fn output_width(mut self, v: u32) -> Self {
        self.params.output_width = v;
        self
    }
    pub fn aspect_ratio(mut self, v: AspectRatio) -> Self {
        self.params.aspect_ratio = v;
        self.aspect_ratio_str = None;
        self
    }
    /// Aspect ratio as `"W:H"`, parsed at [`build`](Self::build).
    pub fn aspect_ratio_str(mut self, v: impl Into<String>) -> Self {
        self.aspect_ratio_str = Some(v.into());
        self
    }
    pub fn render_attempts(mut self, v: u32) -> Self {
        self.params.render_attempts = v;
        self
    }
    pub fn render_timeout(mut self, v: Duration) -> Self {
        self.params.render_timeout = v;
        self
    }

    pub fn assign_object_ids(mut self, v: bool) -> Self {
        self.params.assign_object_ids = v;
        self
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff lo < x < hi and comparable.
    #[inline]
    fn open_interval(x: f64, lo: f64, hi: f64) -> bool {
        x.partial_cmp(&lo) == Some(Greater) && x.partial_cmp(&hi) == Some(Less)
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `buffer_distance > 0` and finite.
    /// * `buffer_segments ≥ 1`, `window_frames ≥ 1`, `average_samples ≥ 1`.
    /// * `yaw_offset`, `pitch`, `roll` finite.
    /// * `0 < horizontal_fov < 180`.
    /// * `output_width > 0`; the aspect ratio parses as `W:H` with positive parts.
    /// * `render_attempts ≥ 1`, `render_timeout > 0`.
    ///
    /// Return
    /// ----------
    /// * `Err(PipelineError::InvalidParameter)` naming the first rule that fails.
    pub fn build(mut self) -> Result<PipelineParams, PipelineError> {
        if let Some(s) = self.aspect_ratio_str.take() {
            self.params.aspect_ratio = s.parse()?;
        }
        let p = &self.params;

        if !Self::gt0(p.buffer_distance) || !p.buffer_distance.is_finite() {
            return Err(PipelineError::InvalidParameter(
                "buffer_distance must be > 0".into(),
            ));
        }
        if p.buffer_segments == 0 {
            return Err(PipelineError::InvalidParameter(
                "buffer_segments must be >= 1".into(),
            ));
        }
        if p.window_frames == 0 {
            return Err(PipelineError::InvalidParameter(
                "window_frames must be >= 1".into(),
            ));
        }
        if p.average_samples == 0 {
            return Err(PipelineError::InvalidParameter(
                "average_samples must be >= 1".into(),
            ));
        }
        if !(p.yaw_offset.is_finite() && p.pitch.is_finite() && p.roll.is_finite()) {
            return Err(PipelineError::InvalidParameter(
                "yaw_offset, pitch and roll must be finite".into(),
            ));
        }
        if !Self::open_interval(p.horizontal_fov, 0.0, 180.0) {
            return Err(PipelineError::InvalidParameter(
                "horizontal_fov must be in (0, 180)".into(),
            ));
        }
        if p.output_width == 0 {
            return Err(PipelineError::InvalidParameter(
                "output_width must be > 0".into(),
            ));
        }
        if p.render_attempts == 0 {
            return Err(PipelineError::InvalidParameter(
                "render_attempts must be >= 1".into(),
            ));
        }
        if p.render_timeout.is_zero() {
            return Err(PipelineError::InvalidParameter(
                "render_timeout must be > 0".into(),
            ));
        }
        if matches!(
            p.aspect_ratio.ratio().partial_cmp(&0.0),
            None | Some(Less) | Some(Equal)
        ) {
            return Err(PipelineError::InvalidParameter(
                "aspect_ratio must be positive".into(),
            ));
        }

        Ok(self.params)
    }
}

impl fmt::Display for PipelineParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Pipeline Parameters")?;
            writeln!(f, "-------------------")?;
            writeln!(f, "[Matching]")?;
            writeln!(f, "  buffer_distance  = {:.1} m", self.buffer_distance)?;
            writeln!(f, "  buffer_segments  = {}", self.buffer_segments)?;
            writeln!(f, "\n[Orientation]")?;
            writeln!(f, "  window_frames    = {}", self.window_frames)?;
            writeln!(f, "  average_samples  = {}", self.average_samples)?;
            writeln!(f, "\n[Yaw / rendering]")?;
            writeln!(f, "  yaw_offset       = {:.1}°", self.yaw_offset)?;
            writeln!(f, "  pitch, roll      = {:.1}°, {:.1}°", self.pitch, self.roll)?;
            writeln!(f, "  horizontal_fov   = {:.1}°", self.horizontal_fov)?;
            writeln!(
                f,
                "  output           = {}x{} ({})",
                self.output_width,
                self.output_height(),
                self.aspect_ratio
            )?;
            writeln!(
                f,
                "  render           = {} attempt(s), {}s timeout",
                self.render_attempts,
                self.render_timeout.as_secs()
            )?;
            write!(f, "  assign_object_ids = {}", self.assign_object_ids)
        } else {
            write!(
                f,
                "PipelineParams(buffer={:.1}m, window={}, avg={}, yaw_offset={:.1}°, h_fov={:.1}°, out={}x{})",
                self.buffer_distance,
                self.window_frames,
                self.average_samples,
                self.yaw_offset,
                self.horizontal_fov,
                self.output_width,
                self.output_height()
            )
        }
    }
}
