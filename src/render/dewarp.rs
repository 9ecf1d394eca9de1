//! # Dewarp stage
//!
//! For every row of an oriented table, computes the camera yaw toward the building and renders
//! each extracted frame of that building through a [`Renderer`].
//!
//! Frames of object `<id>` are looked up in the input directory with these patterns, the first
//! pattern with at least one hit wins:
//!
//! 1. `<id>.jpg`
//! 2. `<id>_*.jpg`
//! 3. `*/<id>.jpg`
//! 4. `*/<id>_*.jpg`
//!
//! The output keeps the frame's file name, flattened into the output directory. With
//! `skip_existing`, outputs already on disk are left untouched.
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};

use crate::params::PipelineParams;
use crate::pipeline_errors::PipelineError;
use crate::schema::{resolve_all, OBJECT_ID};
use crate::table::Table;
use crate::yaw::YawColumns;

use super::{render_with_retry, RenderJob, RenderOutcome, Renderer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DewarpOptions {
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub skip_existing: bool,
}

/// Per-record counts of a dewarp run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DewarpReport {
    pub reprojected: usize,
    pub copied: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    /// Rows whose object has no frame on disk
    pub missing_frames: usize,
    /// Rows with a null input (no match, undefined heading, ...)
    pub invalid_rows: usize,
}

impl fmt::Display for DewarpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Dewarp summary")?;
            writeln!(f, "--------------")?;
            writeln!(f, "reprojected      : {}", self.reprojected)?;
            writeln!(f, "copied           : {}", self.copied)?;
            writeln!(f, "skipped existing : {}", self.skipped_existing)?;
            writeln!(f, "failed           : {}", self.failed)?;
            writeln!(f, "missing frames   : {}", self.missing_frames)?;
            write!(f, "invalid rows     : {}", self.invalid_rows)
        } else {
            write!(
                f,
                "reprojected={}, copied={}, skipped={}, failed={}, missing_frames={}, invalid_rows={}",
                self.reprojected,
                self.copied,
                self.skipped_existing,
                self.failed,
                self.missing_frames,
                self.invalid_rows
            )
        }
    }
}

fn files_matching<F>(dir: &Utf8Path, keep: F) -> Vec<Utf8PathBuf>
where
    F: Fn(&str) -> bool,
{
    let Ok(entries) = dir.read_dir_utf8() else {
        return Vec::new();
    };
    let mut files: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file() && keep(e.file_name()))
        .map(|e| e.path().to_owned())
        .collect();
    files.sort();
    files
}

fn subdirectories(dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    let Ok(entries) = dir.read_dir_utf8() else {
        return Vec::new();
    };
    let mut dirs: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .map(|e| e.path().to_owned())
        .collect();
    dirs.sort();
    dirs
}

/// Frames of `object_id` under `dir`, by pattern priority.
pub fn find_input_frames(dir: &Utf8Path, object_id: &str) -> Vec<Utf8PathBuf> {
    let exact = format!("{object_id}.jpg");
    let prefix = format!("{object_id}_");
    let suffixed = |name: &str| name.starts_with(&prefix) && name.ends_with(".jpg");

    let direct = dir.join(&exact);
    if direct.is_file() {
        return vec![direct];
    }
    let hits = files_matching(dir, suffixed);
    if !hits.is_empty() {
        return hits;
    }

    let subdirs = subdirectories(dir);
    let hits: Vec<Utf8PathBuf> = subdirs
        .iter()
        .map(|d| d.join(&exact))
        .filter(|p| p.is_file())
        .collect();
    if !hits.is_empty() {
        return hits;
    }
    subdirs
        .iter()
        .flat_map(|d| files_matching(d, suffixed))
        .collect()
}

/// Dewarp the frames of every row of `table`.
///
/// Arguments
/// -----------------
/// * `table`: Oriented table with an object id, building and camera coordinates, and a heading.
/// * `renderer`: The reprojection collaborator.
/// * `params`: Yaw offset and rendering settings; `render_attempts` bounds the retries.
/// * `options`: Input/output directories and the skip-existing switch.
///
/// Return
/// ----------
/// * The per-record counts. Only a missing input column ([`PipelineError::Schema`]) or an
///   unwritable output directory aborts the stage.
pub async fn run_dewarp<R>(
    table: &Table,
    renderer: &R,
    params: &PipelineParams,
    options: &DewarpOptions,
) -> Result<DewarpReport, PipelineError>
where
    R: Renderer + ?Sized,
{
    let id_col = resolve_all(&table.headers, &[OBJECT_ID])?[0];
    let cols = YawColumns::resolve(table)?;
    tokio::fs::create_dir_all(&options.output_dir).await?;

    let mut report = DewarpReport::default();
    for row in 0..table.len() {
        let Some(object_id) = table.cell(row, id_col) else {
            report.invalid_rows += 1;
            continue;
        };
        let input = match cols.read(table, row) {
            Ok(input) => input,
            Err(e) => {
                debug!("Skipping object {object_id}: {e}");
                report.invalid_rows += 1;
                continue;
            }
        };
        let yaw = input.yaw(params.yaw_offset);

        let frames = find_input_frames(&options.input_dir, object_id);
        if frames.is_empty() {
            warn!(
                "{}",
                PipelineError::MissingResource(options.input_dir.join(format!("{object_id}.jpg")))
            );
            report.missing_frames += 1;
            continue;
        }

        for frame in frames {
            let Some(name) = frame.file_name() else {
                continue;
            };
            let output = options.output_dir.join(name);
            if options.skip_existing && output.exists() {
                report.skipped_existing += 1;
                continue;
            }
            let job = RenderJob::new(frame.clone(), output, yaw, params);
            match render_with_retry(renderer, &job, params.render_attempts).await {
                Ok(RenderOutcome::Reprojected) => report.reprojected += 1,
                Ok(RenderOutcome::Copied) => report.copied += 1,
                Err(e) => {
                    warn!("Object {object_id}: {e}");
                    report.failed += 1;
                }
            }
        }
    }

    info!("Dewarp finished: {report}");
    Ok(report)
}

#[cfg(test)]
mod dewarp_test {
    use super::*;
    use async_trait::async_trait;
    use csv::StringRecord;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        jobs: Mutex<Vec<RenderJob>>,
    }

    #[async_trait]
    impl Renderer for Recorder {
        async fn render(&self, job: &RenderJob) -> Result<RenderOutcome, PipelineError> {
            self.jobs.lock().unwrap().push(job.clone());
            if job.input.as_str().contains("broken") {
                return Err(PipelineError::render_failure(1, "exit 1"));
            }
            std::fs::write(&job.output, b"x")?;
            Ok(RenderOutcome::Reprojected)
        }
    }

    fn touch(path: &Utf8Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_frame_pattern_priority() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        touch(&root.join("7_a.jpg"));
        touch(&root.join("7_b.jpg"));
        touch(&root.join("run1/8.jpg"));
        touch(&root.join("run1/9_x.jpg"));
        touch(&root.join("run2/9_y.jpg"));
        touch(&root.join("70.jpg"));

        let names = |id: &str| -> Vec<String> {
            find_input_frames(root, id)
                .iter()
                .map(|p| p.strip_prefix(root).unwrap().to_string())
                .collect()
        };
        assert_eq!(names("70"), vec!["70.jpg"]);
        assert_eq!(names("7"), vec!["7_a.jpg", "7_b.jpg"]);
        assert_eq!(names("8"), vec!["run1/8.jpg"]);
        assert_eq!(names("9"), vec!["run1/9_x.jpg", "run2/9_y.jpg"]);
        assert!(names("10").is_empty());
    }

    fn oriented() -> Table {
        Table::new(
            StringRecord::from(vec![
                "ObjectId",
                "Center_Longitude",
                "Center_Latitude",
                "vehicle_x",
                "vehicle_y",
                "orientation",
            ]),
            vec![
                StringRecord::from(vec!["1", "0.0", "-0.001", "0.0", "0.0", "90"]),
                StringRecord::from(vec!["2", "0.0", "-0.001", "0.0", "0.0", ""]),
                StringRecord::from(vec!["3", "0.0", "-0.001", "0.0", "0.0", "90"]),
                StringRecord::from(vec!["4", "0.0", "-0.001", "0.0", "0.0", "90"]),
            ],
        )
    }

    #[tokio::test]
    async fn test_run_dewarp_counts_and_skip_existing() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let options = DewarpOptions {
            input_dir: root.join("frames"),
            output_dir: root.join("dewarped"),
            skip_existing: true,
        };
        touch(&options.input_dir.join("1.jpg"));
        touch(&options.input_dir.join("2.jpg"));
        touch(&options.input_dir.join("4_broken.jpg"));

        let params = PipelineParams::builder().render_attempts(2).build().unwrap();
        let recorder = Recorder::default();
        let report = run_dewarp(&oriented(), &recorder, &params, &options)
            .await
            .unwrap();
        assert_eq!(
            report,
            DewarpReport {
                reprojected: 1,
                copied: 0,
                skipped_existing: 0,
                failed: 1,
                missing_frames: 1,
                invalid_rows: 1,
            }
        );
        {
            let jobs = recorder.jobs.lock().unwrap();
            // one job for object 1, two attempts for the broken frame
            assert_eq!(jobs.len(), 3);
            assert!(jobs[0].yaw.abs() < 1e-9);
            assert_eq!(jobs[0].output, options.output_dir.join("1.jpg"));
        }

        let again = run_dewarp(&oriented(), &recorder, &params, &options)
            .await
            .unwrap();
        assert_eq!(again.skipped_existing, 1);
        assert_eq!(again.reprojected, 0);
    }

    #[tokio::test]
    async fn test_missing_column_is_fatal() {
        let table = Table::new(StringRecord::from(vec!["ObjectId", "long", "lat"]), vec![]);
        let options = DewarpOptions {
            input_dir: "in".into(),
            output_dir: std::env::temp_dir().join("panomatch-dewarp").try_into().unwrap(),
            skip_existing: false,
        };
        let err = run_dewarp(&table, &Recorder::default(), &PipelineParams::default(), &options)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
