//! # End-to-end pipeline
//!
//! Chains the three geometric stages in memory:
//!
//! ```text
//! footprints CSV ─┐
//!                 ├─> Matcher ─> orientation ─> yaw ─> output CSV
//! GPS folder ─────┘
//! ```
//!
//! Each stage is also exposed on its own, reading and writing CSV, so an existing matches or
//! oriented table can be resumed from:
//!
//! * [`match_stage`] – footprints + GPS folder → `matched_file`, `frame_number`, `vehicle_x`,
//!   `vehicle_y`.
//! * [`orient_stage`] – matched table + GPS folder → `orientation`.
//! * [`yaw_stage`] – oriented table → `yaw`.
//!
//! Only fatal errors ([`PipelineError::is_fatal`]) abort a run. Unreadable GPS logs are
//! skipped with a warning and counted in the [`PipelineReport`].
use std::fmt;

use camino::Utf8Path;
use log::{info, warn};
use rayon::prelude::*;

use crate::constants::{ORIENTATION_COLUMN, YAW_COLUMN};
use crate::footprints::FootprintSet;
use crate::matching::{apply_matches, Matcher};
use crate::orientation::{orient_matches, orient_table};
use crate::params::PipelineParams;
use crate::pipeline_errors::PipelineError;
use crate::projection::Projector;
use crate::table::{format_optional, Table};
use crate::trajectories::catalog::GpsCatalog;
use crate::trajectories::gps_reader::read_trajectory;
use crate::trajectories::Trajectory;
use crate::yaw::{yaw_matches, yaw_table};

/// Counts collected over one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Rows of the footprint table
    pub footprints: usize,
    /// Footprint rows with a null or non-numeric coordinate
    pub invalid_footprints: usize,
    /// GPS logs read
    pub trajectories: usize,
    /// GPS logs skipped because they could not be read
    pub skipped_trajectories: usize,
    pub matched: usize,
    pub oriented: usize,
    pub yawed: usize,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Pipeline summary")?;
            writeln!(f, "----------------")?;
            writeln!(
                f,
                "footprints   : {} ({} invalid)",
                self.footprints, self.invalid_footprints
            )?;
            writeln!(
                f,
                "trajectories : {} ({} skipped)",
                self.trajectories, self.skipped_trajectories
            )?;
            writeln!(f, "matched      : {}", self.matched)?;
            writeln!(f, "oriented     : {}", self.oriented)?;
            write!(f, "yawed        : {}", self.yawed)
        } else {
            write!(
                f,
                "footprints={}, trajectories={}, matched={}, oriented={}, yawed={}",
                self.footprints, self.trajectories, self.matched, self.oriented, self.yawed
            )
        }
    }
}

/// Read every log of the catalog in parallel.
///
/// Return
/// ----------
/// * The readable trajectories in catalog order and the number of skipped logs, or the first
///   fatal error (a log without GPS columns).
pub fn load_trajectories(catalog: &GpsCatalog) -> Result<(Vec<Trajectory>, usize), PipelineError> {
    let results: Vec<Result<Trajectory, PipelineError>> = catalog
        .files
        .par_iter()
        .map(|file| read_trajectory(file.clone()))
        .collect();

    let mut trajectories = Vec::with_capacity(results.len());
    let mut skipped = 0;
    for result in results {
        match result {
            Ok(t) => trajectories.push(t),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Skipping GPS log: {e}");
                skipped += 1;
            }
        }
    }
    if trajectories.is_empty() {
        warn!("No readable GPS log in {}", catalog.dir);
    }
    Ok((trajectories, skipped))
}

fn write_output(table: &Table, output: Option<&Utf8Path>) -> Result<(), PipelineError> {
    if let Some(path) = output {
        table.write_csv(path)?;
        info!("Wrote {} rows to {path}", table.len());
    }
    Ok(())
}

/// Run match, orientation and yaw in memory.
///
/// Arguments
/// -----------------
/// * `footprints_csv`: Building table with a longitude/latitude pair.
/// * `gps_dir`: Folder of `<run>_GoPro Max-GPS5.csv` logs.
/// * `output`: Where to write the augmented table, if anywhere.
/// * `params`: Validated pipeline parameters.
///
/// Return
/// ----------
/// * The footprint table with `matched_file`, `frame_number`, `vehicle_x`, `vehicle_y`,
///   `orientation` and `yaw` appended, and the run counts. Every footprint row is kept.
///
/// See also
/// ------------
/// * [`match_stage`], [`orient_stage`], [`yaw_stage`] – the same stages over CSV files.
pub fn run_pipeline(
    footprints_csv: &Utf8Path,
    gps_dir: &Utf8Path,
    output: Option<&Utf8Path>,
    params: &PipelineParams,
) -> Result<(Table, PipelineReport), PipelineError> {
    let projector = Projector::default();
    let set = FootprintSet::load(footprints_csv, &projector, params.assign_object_ids)?;
    let catalog = GpsCatalog::discover(gps_dir)?;
    let (trajectories, skipped) = load_trajectories(&catalog)?;

    let matcher = Matcher::new(
        &set.footprints,
        projector,
        params.buffer_distance,
        params.buffer_segments,
    );
    let matches = matcher.match_all(&trajectories);

    let n_rows = set.table.len();
    let headings = orient_matches(
        n_rows,
        &matches,
        &trajectories,
        params.window_frames,
        params.average_samples,
    );
    let yaws = yaw_matches(
        n_rows,
        &set.footprints,
        &matches,
        &headings,
        params.yaw_offset,
    );

    let report = PipelineReport {
        footprints: n_rows,
        invalid_footprints: set.invalid_rows.len(),
        trajectories: trajectories.len(),
        skipped_trajectories: skipped,
        matched: matches.len(),
        oriented: headings.iter().flatten().count(),
        yawed: yaws.iter().flatten().count(),
    };

    let mut table = set.table;
    apply_matches(&mut table, &matches);
    table.set_column(
        ORIENTATION_COLUMN,
        headings.iter().map(|h| format_optional(*h)).collect(),
    );
    table.set_column(YAW_COLUMN, yaws.iter().map(|y| format_optional(*y)).collect());

    info!("Pipeline finished: {report}");
    write_output(&table, output)?;
    Ok((table, report))
}

/// Match footprints against every GPS log of `gps_dir`.
pub fn match_stage(
    footprints_csv: &Utf8Path,
    gps_dir: &Utf8Path,
    output: Option<&Utf8Path>,
    params: &PipelineParams,
) -> Result<Table, PipelineError> {
    let projector = Projector::default();
    let set = FootprintSet::load(footprints_csv, &projector, params.assign_object_ids)?;
    let catalog = GpsCatalog::discover(gps_dir)?;
    let (trajectories, _) = load_trajectories(&catalog)?;

    let matches = Matcher::new(
        &set.footprints,
        projector,
        params.buffer_distance,
        params.buffer_segments,
    )
    .match_all(&trajectories);

    let mut table = set.table;
    apply_matches(&mut table, &matches);
    write_output(&table, output)?;
    Ok(table)
}

/// Add the vehicle heading to a matched table, loading each referenced log once.
pub fn orient_stage(
    matches_csv: &Utf8Path,
    gps_dir: &Utf8Path,
    output: Option<&Utf8Path>,
    params: &PipelineParams,
) -> Result<Table, PipelineError> {
    let mut table = Table::read_csv(matches_csv)?;
    let catalog = GpsCatalog::discover(gps_dir)?;
    orient_table(
        &mut table,
        &catalog,
        params.window_frames,
        params.average_samples,
    )?;
    write_output(&table, output)?;
    Ok(table)
}

/// Add the camera yaw to an oriented table.
pub fn yaw_stage(
    oriented_csv: &Utf8Path,
    output: Option<&Utf8Path>,
    params: &PipelineParams,
) -> Result<Table, PipelineError> {
    let mut table = Table::read_csv(oriented_csv)?;
    yaw_table(&mut table, params.yaw_offset)?;
    write_output(&table, output)?;
    Ok(table)
}

#[cfg(test)]
mod pipeline_test {
    use super::*;
    use camino::Utf8PathBuf;

    const GPS_HEADER: &str = "GPS (Lat.) [deg],GPS (Long.) [deg]\n";

    fn write(path: &Utf8Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn workspace() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir(root.join("gps")).unwrap();
        (dir, root)
    }

    #[test]
    fn test_report_display() {
        let report = PipelineReport {
            footprints: 3,
            invalid_footprints: 1,
            trajectories: 2,
            skipped_trajectories: 0,
            matched: 2,
            oriented: 1,
            yawed: 1,
        };
        assert_eq!(
            report.to_string(),
            "footprints=3, trajectories=2, matched=2, oriented=1, yawed=1"
        );
        let long = format!("{report:#}");
        assert!(long.contains("footprints   : 3 (1 invalid)"));
        assert!(long.ends_with("yawed        : 1"));
    }

    #[test]
    fn test_unreadable_log_is_skipped_but_missing_columns_abort() {
        let (_dir, root) = workspace();
        let gps = root.join("gps");
        write(
            &gps.join("GH01_GoPro Max-GPS5.csv"),
            &format!("{GPS_HEADER}0.0,0.0\n"),
        );
        // not valid UTF-8: a per-log read error
        let mut broken = GPS_HEADER.as_bytes().to_vec();
        broken.extend_from_slice(b"\xff\xfe,0.0\n");
        std::fs::write(gps.join("GH02_GoPro Max-GPS5.csv"), broken).unwrap();

        let catalog = GpsCatalog::discover(&gps).unwrap();
        let (trajectories, skipped) = load_trajectories(&catalog).unwrap();
        assert_eq!(trajectories.len(), 1);
        assert_eq!(skipped, 1);

        write(&gps.join("GH03_GoPro Max-GPS5.csv"), "a,b\n1,2\n");
        let catalog = GpsCatalog::discover(&gps).unwrap();
        assert!(matches!(
            load_trajectories(&catalog),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn test_stages_chain_over_csv() {
        let (_dir, root) = workspace();
        // northbound along lon -90, building ~20 m to the east of frame 10
        let mut log = GPS_HEADER.to_string();
        for i in 0..21 {
            log.push_str(&format!("{},-90.0\n", 30.0 + i as f64 * 1e-5));
        }
        write(&root.join("gps/GH010001_GoPro Max-GPS5.csv"), &log);
        write(
            &root.join("footprints.csv"),
            "name,long,lat\nhouse,-89.99979,30.0001\nfar,-80.0,35.0\n",
        );

        let params = PipelineParams::default();
        let matched = match_stage(
            &root.join("footprints.csv"),
            &root.join("gps"),
            Some(&root.join("matches.csv")),
            &params,
        )
        .unwrap();
        let file_col = matched.column("matched_file").unwrap();
        assert_eq!(matched.cell(0, file_col), Some("GH010001"));
        assert_eq!(matched.cell(1, file_col), None);

        let oriented = orient_stage(
            &root.join("matches.csv"),
            &root.join("gps"),
            Some(&root.join("oriented.csv")),
            &params,
        )
        .unwrap();
        let heading = oriented
            .number(0, oriented.column("orientation").unwrap())
            .unwrap();
        assert!(heading < 1e-6 || heading > 360.0 - 1e-6);

        let yawed = yaw_stage(&root.join("oriented.csv"), None, &params).unwrap();
        let yaw = yawed.number(0, yawed.column("yaw").unwrap()).unwrap();
        // building to the east of a northbound camera: 90 - 90
        assert!(yaw.abs() < 0.1, "yaw = {yaw}");
        assert_eq!(yawed.cell(1, yawed.column("yaw").unwrap()), None);
    }
}
