//! Discovery of GPS logs by naming convention.
//!
//! A log is named `<run>_GoPro Max-GPS5.csv`. The catalog lists the logs of one folder in
//! file-name order, and resolves the exported `matched_file` label of a match back to its log.
//! Cameras of the same rig name their files `GH…` (video) and `GL…` (low-resolution/telemetry);
//! a lookup for a `GH` label falls back to the `GL` log.
use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::GPS_FILE_SUFFIX;
use crate::pipeline_errors::PipelineError;

use super::TrajectoryFile;

static GPS_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^(?P<run>.+){}$", regex::escape(GPS_FILE_SUFFIX)))
        .expect("GPS file pattern is a valid regex")
});

/// Split a log file name into its run identifier, `None` when the name does not follow the
/// convention.
pub fn run_id_from_file_name(file_name: &str) -> Option<&str> {
    GPS_FILE_RE
        .captures(file_name)
        .and_then(|c| c.name("run"))
        .map(|m| m.as_str())
}

#[derive(Debug, Clone)]
pub struct GpsCatalog {
    pub dir: Utf8PathBuf,
    pub files: Vec<TrajectoryFile>,
}

impl GpsCatalog {
    /// List every log of `dir`, sorted by file name.
    pub fn discover(dir: &Utf8Path) -> Result<Self, PipelineError> {
        if !dir.is_dir() {
            return Err(PipelineError::MissingResource(dir.to_owned()));
        }

        let mut files = Vec::new();
        for entry in dir.read_dir_utf8()? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            if let Some(run) = run_id_from_file_name(file_name) {
                files.push(TrajectoryFile {
                    file_name: file_name.to_string(),
                    run_id: run.to_string(),
                    path: entry.path().to_owned(),
                });
            }
        }
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        Ok(GpsCatalog {
            dir: dir.to_owned(),
            files,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolve a `matched_file` label to its log.
    ///
    /// Tries `<label>_GoPro Max-GPS5.csv`, then the same name with `GH` replaced by `GL`.
    ///
    /// Return
    /// ----------
    /// * [`PipelineError::MissingResource`] naming the first candidate path when neither exists.
    pub fn locate(&self, label: &str) -> Result<TrajectoryFile, PipelineError> {
        let mut runs = vec![label.to_string()];
        if label.contains("GH") {
            runs.push(label.replace("GH", "GL"));
        }

        for run in &runs {
            let file_name = format!("{run}{GPS_FILE_SUFFIX}");
            let path = self.dir.join(&file_name);
            if path.is_file() {
                return Ok(TrajectoryFile {
                    file_name,
                    run_id: run.clone(),
                    path,
                });
            }
        }
        Err(PipelineError::MissingResource(
            self.dir.join(format!("{label}{GPS_FILE_SUFFIX}")),
        ))
    }
}
