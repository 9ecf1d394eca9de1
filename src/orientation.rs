//! # Vehicle heading from a trajectory window
//!
//! The heading of the vehicle at a matched frame is the initial bearing between two averaged
//! positions: one just before the frame and one just after it.
//!
//! ```text
//!  before-window              target             after-window
//!  [max(0, t−W) .. t)           t           (t .. min(len−1, t+W)]
//!        └─ mean of last k ─┘        └─ mean of first k ─┘
//!                   before-point ───────────▶ after-point
//! ```
//!
//! * `W` is the window size in frames, `k` the number of averaged samples (default 3).
//! * Averages are taken field by field over the valid values of the slice; a null field of
//!   one sample does not discard the other field.
//! * The heading is **undefined** (`None`) when either window is empty, when the target is
//!   outside the trajectory, or when a slice holds no value for a field. No heading is
//!   fabricated in these cases.
//!
//! Two stages are provided:
//! * [`orient_matches`] – in-memory, from the matcher output and the loaded trajectories.
//! * [`orient_table`] – over a table carrying `matched_file`/`frame_number` columns, resolving
//!   the GPS logs through a [`GpsCatalog`].
use std::collections::HashMap;

use ahash::RandomState;
use log::{debug, info, warn};

use crate::bearing::initial_bearing;
use crate::constants::{Degree, FrameIndex, ORIENTATION_COLUMN};
use crate::matching::FootprintMatches;
use crate::pipeline_errors::PipelineError;
use crate::projection::GeoPoint;
use crate::schema::{resolve_all, FRAME_NUMBER, MATCHED_FILE};
use crate::table::{format_optional, Table};
use crate::trajectories::catalog::GpsCatalog;
use crate::trajectories::gps_reader::read_trajectory;
use crate::trajectories::{Sample, Trajectory};

/// Per-field mean over the valid values, `None` when a field has none.
fn mean_position(samples: &[Sample]) -> Option<GeoPoint> {
    fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
        let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
    let lon = mean(samples.iter().filter_map(|s| s.lon))?;
    let lat = mean(samples.iter().filter_map(|s| s.lat))?;
    Some(GeoPoint::new(lon, lat))
}

/// Averaged positions before and after `target`.
///
/// Arguments
/// -----------------
/// * `trajectory`: The GPS log the target frame belongs to.
/// * `target`: Frame index of the matched sample.
/// * `window`: Number of frames considered on each side.
/// * `average_samples`: Number of samples averaged on each side, nearest to the target first.
///
/// Return
/// ----------
/// * `Some((before, after))`, or `None` when either side is empty or unusable.
pub fn window_points(
    trajectory: &Trajectory,
    target: FrameIndex,
    window: usize,
    average_samples: usize,
) -> Option<(GeoPoint, GeoPoint)> {
    let len = trajectory.len();
    if target >= len {
        return None;
    }
    let k = average_samples.max(1);

    let before = &trajectory.samples[target.saturating_sub(window)..target];
    let after_end = len.min(target.saturating_add(window).saturating_add(1));
    let after = &trajectory.samples[target + 1..after_end.max(target + 1)];
    if before.is_empty() || after.is_empty() {
        return None;
    }

    let before = &before[before.len().saturating_sub(k)..];
    let after = &after[..after.len().min(k)];
    Some((mean_position(before)?, mean_position(after)?))
}

/// Heading of the vehicle at `target`, in `[0, 360)`.
pub fn estimate_heading(
    trajectory: &Trajectory,
    target: FrameIndex,
    window: usize,
    average_samples: usize,
) -> Option<Degree> {
    let (before, after) = window_points(trajectory, target, window, average_samples)?;
    Some(initial_bearing(&before, &after))
}

/// Heading for every matched footprint, indexed by table row.
pub fn orient_matches(
    n_rows: usize,
    matches: &FootprintMatches,
    trajectories: &[Trajectory],
    window: usize,
    average_samples: usize,
) -> Vec<Option<Degree>> {
    let by_file: HashMap<&str, &Trajectory, RandomState> = trajectories
        .iter()
        .map(|t| (t.file.file_name.as_str(), t))
        .collect();

    let mut headings = vec![None; n_rows];
    for m in matches.values().filter(|m| m.footprint_row < n_rows) {
        headings[m.footprint_row] = by_file
            .get(m.file.file_name.as_str())
            .and_then(|t| estimate_heading(t, m.frame_number, window, average_samples));
    }
    headings
}

/// GPS logs loaded on demand by `matched_file` label.
#[derive(Debug)]
pub struct TrajectoryCache<'c> {
    catalog: &'c GpsCatalog,
    loaded: HashMap<String, Option<Trajectory>, RandomState>,
}

impl<'c> TrajectoryCache<'c> {
    pub fn new(catalog: &'c GpsCatalog) -> Self {
        TrajectoryCache {
            catalog,
            loaded: HashMap::default(),
        }
    }

    /// The log for `label`, loaded once.
    ///
    /// Return
    /// ----------
    /// * `Ok(None)` when the log is missing or unreadable (logged, remembered).
    /// * `Err` only for fatal errors, such as a log without GPS columns.
    pub fn get(&mut self, label: &str) -> Result<Option<&Trajectory>, PipelineError> {
        if !self.loaded.contains_key(label) {
            let loaded = match self.catalog.locate(label).and_then(read_trajectory) {
                Ok(t) => Some(t),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("No GPS log for {label}: {e}");
                    None
                }
            };
            self.loaded.insert(label.to_string(), loaded);
        }
        Ok(self.loaded.get(label).and_then(Option::as_ref))
    }
}

/// Parse a frame number cell. Integral floats (`"42.0"`) are accepted.
fn frame_index(table: &Table, row: usize, col: usize) -> Option<FrameIndex> {
    let v = table.number(row, col)?;
    (v >= 0.0 && v.fract() == 0.0).then_some(v as FrameIndex)
}

/// Add an `orientation` column to a matched table.
///
/// Rows without a label or a frame number, and rows whose log cannot be found, get an empty
/// orientation.
///
/// Return
/// ----------
/// * The heading per row, or [`PipelineError::Schema`] when the match columns are absent.
pub fn orient_table(
    table: &mut Table,
    catalog: &GpsCatalog,
    window: usize,
    average_samples: usize,
) -> Result<Vec<Option<Degree>>, PipelineError> {
    let cols = resolve_all(&table.headers, &[MATCHED_FILE, FRAME_NUMBER])?;
    let (file_col, frame_col) = (cols[0], cols[1]);

    let mut cache = TrajectoryCache::new(catalog);
    let mut headings = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let (Some(label), Some(frame)) =
            (table.cell(row, file_col), frame_index(table, row, frame_col))
        else {
            debug!("Row {row}: no match to orient");
            headings.push(None);
            continue;
        };
        let heading = cache
            .get(label)?
            .and_then(|t| estimate_heading(t, frame, window, average_samples));
        headings.push(heading);
    }

    info!(
        "Oriented {} of {} rows",
        headings.iter().filter(|h| h.is_some()).count(),
        headings.len()
    );
    table.set_column(
        ORIENTATION_COLUMN,
        headings.iter().map(|h| format_optional(*h)).collect(),
    );
    Ok(headings)
}

#[cfg(test)]
mod orientation_test {
    use super::*;
    use crate::trajectories::TrajectoryFile;
    use approx::assert_relative_eq;
    use camino::Utf8PathBuf;

    fn northbound(n: usize) -> Trajectory {
        Trajectory::new(
            TrajectoryFile {
                file_name: "GS1_GoPro Max-GPS5.csv".into(),
                run_id: "GS1".into(),
                path: Utf8PathBuf::from("GS1_GoPro Max-GPS5.csv"),
            },
            (0..n)
                .map(|i| Sample::new(-90.0, 30.0 + i as f64 * 1e-4))
                .collect(),
        )
    }

    #[test]
    fn test_first_frame_is_undefined() {
        let t = northbound(100);
        assert_eq!(estimate_heading(&t, 0, 15, 3), None);
        assert_eq!(estimate_heading(&t, 99, 15, 3), None);
        assert_eq!(estimate_heading(&t, 100, 15, 3), None);
    }

    #[test]
    fn test_northbound_heading() {
        let t = northbound(100);
        let h = estimate_heading(&t, 50, 15, 3).unwrap();
        assert_relative_eq!(h, 0.0, epsilon = 1e-9);
        // a single sample on each side is enough
        let h = estimate_heading(&t, 1, 15, 3).unwrap();
        assert_relative_eq!(h, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_window_averages_nearest_samples() {
        let t = northbound(100);
        let (before, after) = window_points(&t, 50, 15, 3).unwrap();
        assert_relative_eq!(before.lat, 30.0 + 48.0 * 1e-4, epsilon = 1e-12);
        assert_relative_eq!(after.lat, 30.0 + 52.0 * 1e-4, epsilon = 1e-12);

        // shorter slices average what is available
        let (before, after) = window_points(&t, 1, 15, 3).unwrap();
        assert_relative_eq!(before.lat, 30.0, epsilon = 1e-12);
        assert_relative_eq!(after.lat, 30.0 + 3.0 * 1e-4, epsilon = 1e-12);
    }

    #[test]
    fn test_null_fields_are_skipped_per_field() {
        let mut t = northbound(10);
        t.samples[4].lon = None;
        let (before, _) = window_points(&t, 5, 15, 3).unwrap();
        assert_relative_eq!(before.lon, -90.0, epsilon = 1e-12);
        assert_relative_eq!(before.lat, 30.0 + 3.0 * 1e-4, epsilon = 1e-12);

        for s in &mut t.samples[2..5] {
            s.lat = None;
        }
        assert_eq!(window_points(&t, 5, 15, 3), None);
    }

    #[test]
    fn test_eastbound_heading() {
        let mut t = northbound(5);
        for (i, s) in t.samples.iter_mut().enumerate() {
            *s = Sample::new(i as f64 * 1e-4, 0.0);
        }
        let h = estimate_heading(&t, 2, 15, 3).unwrap();
        assert_relative_eq!(h, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_orient_table_with_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8Path::from_path(dir.path()).unwrap();
        let mut csv = String::from("GPS (Lat.) [deg],GPS (Long.) [deg]\n");
        for i in 0..20 {
            csv.push_str(&format!("{},-90.0\n", 30.0 + i as f64 * 1e-4));
        }
        std::fs::write(root.join("GL7_GoPro Max-GPS5.csv"), csv).unwrap();
        let catalog = GpsCatalog::discover(root).unwrap();

        let mut table = Table::new(
            csv::StringRecord::from(vec!["ObjectId", "matched_file", "frame_number"]),
            vec![
                csv::StringRecord::from(vec!["1", "GH7", "10.0"]),
                csv::StringRecord::from(vec!["2", "GH7", "0"]),
                csv::StringRecord::from(vec!["3", "", ""]),
                csv::StringRecord::from(vec!["4", "GS9", "3"]),
            ],
        );
        let headings = orient_table(&mut table, &catalog, 15, 3).unwrap();
        assert_relative_eq!(headings[0].unwrap(), 0.0, epsilon = 1e-9);
        assert_eq!(&headings[1..], &[None, None, None]);

        let col = table.column(ORIENTATION_COLUMN).unwrap();
        assert!(table.number(0, col).is_some());
        assert_eq!(table.cell(1, col), None);
    }

    #[test]
    fn test_orient_table_requires_match_columns() {
        let catalog = GpsCatalog {
            dir: Utf8PathBuf::from("/tmp"),
            files: vec![],
        };
        let mut table = Table::new(csv::StringRecord::from(vec!["ObjectId"]), vec![]);
        assert!(matches!(
            orient_table(&mut table, &catalog, 15, 3),
            Err(PipelineError::Schema { .. })
        ));
    }
}
