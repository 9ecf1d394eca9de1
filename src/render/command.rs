//! `ffmpeg` command builder and external-tool runner.
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use tokio::process::Command;

use crate::params::PipelineParams;
use crate::pipeline_errors::PipelineError;

/// Builder for `ffmpeg` invocations.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: Utf8PathBuf,
    output: Utf8PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Utf8Path>, output: impl AsRef<Utf8Path>) -> Self {
        Self {
            input: input.as_ref().to_owned(),
            output: output.as_ref().to_owned(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Accurate seek to `seconds` before the input.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-accurate_seek")
            .input_arg("-ss")
            .input_arg(format!("{seconds:.3}"))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// JPEG quality scale (`-q:v`), 1 is best.
    pub fn quality(self, q: u8) -> Self {
        self.output_arg("-q:v").output_arg(q.to_string())
    }

    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    pub fn pixel_format(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(fmt)
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string());
        args
    }
}

/// Runs an external program with a wall-clock timeout. The child is killed when the timeout
/// expires.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: String,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn ffmpeg() -> Self {
        Self::new("ffmpeg")
    }

    pub fn ffprobe() -> Self {
        Self::new("ffprobe")
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply the pipeline's per-invocation timeout.
    pub fn with_params(self, params: &PipelineParams) -> Self {
        self.with_timeout(params.render_timeout)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the program on `PATH`.
    pub fn locate(&self) -> Result<PathBuf, PipelineError> {
        which::which(&self.program).map_err(|_| PipelineError::ToolNotFound(self.program.clone()))
    }

    /// Run to completion and capture stdout/stderr, whatever the exit status.
    pub async fn output(&self, args: &[String]) -> Result<Output, PipelineError> {
        let path = self.locate()?;
        debug!("Running {} {}", self.program, args.join(" "));

        let child = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(output) => Ok(output?),
            Err(_) => {
                warn!(
                    "{} timed out after {:?}, killing process",
                    self.program, self.timeout
                );
                Err(PipelineError::RenderTimeout(self.timeout.as_secs()))
            }
        }
    }

    /// Run and require a zero exit status.
    pub async fn run(&self, args: &[String]) -> Result<Output, PipelineError> {
        let output = self.output(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PipelineError::render_failure(
            1,
            format!(
                "{} exited with {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            ),
        ))
    }
}
