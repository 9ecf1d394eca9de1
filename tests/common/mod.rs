#![allow(dead_code)]

use approx::assert_abs_diff_eq;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use panomatch::constants::{GPS_FILE_SUFFIX, GPS_LATITUDE_COLUMN, GPS_LONGITUDE_COLUMN};

/// Meters per degree of latitude, close enough for placing test fixtures.
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A temporary folder with a `gps/` subfolder for run logs.
pub struct Workspace {
    _dir: TempDir,
    pub root: Utf8PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir(root.join("gps")).unwrap();
        Workspace { _dir: dir, root }
    }

    pub fn gps_dir(&self) -> Utf8PathBuf {
        self.root.join("gps")
    }

    pub fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Write `<run>_GoPro Max-GPS5.csv` with `(lon, lat)` samples, in the camera's column order
    /// (latitude first) with an extra altitude column.
    pub fn write_gps_log(&self, run: &str, samples: &[(f64, f64)]) -> Utf8PathBuf {
        let mut content = format!("{GPS_LATITUDE_COLUMN},{GPS_LONGITUDE_COLUMN},GPS (Alt.) [m]\n");
        for (lon, lat) in samples {
            content.push_str(&format!("{lat},{lon},12.5\n"));
        }
        self.write(&format!("gps/{run}{GPS_FILE_SUFFIX}"), &content)
    }
}

/// `n` samples heading north from `(lon, lat0)`, one every `step` degrees of latitude.
pub fn northbound(lon: f64, lat0: f64, n: usize, step: f64) -> Vec<(f64, f64)> {
    (0..n).map(|i| (lon, lat0 + i as f64 * step)).collect()
}

/// `n` samples heading east from `(lon0, lat)`, one every `step` degrees of longitude.
pub fn eastbound(lon0: f64, lat: f64, n: usize, step: f64) -> Vec<(f64, f64)> {
    (0..n).map(|i| (lon0 + i as f64 * step, lat)).collect()
}

/// Degrees of longitude spanning `meters` at latitude `lat`.
pub fn lon_offset(meters: f64, lat: f64) -> f64 {
    meters / (METERS_PER_DEG_LAT * lat.to_radians().cos())
}

pub fn lat_offset(meters: f64) -> f64 {
    meters / METERS_PER_DEG_LAT
}

/// Compare two angles in degrees modulo 360.
pub fn assert_angle_close(actual: f64, expected: f64, epsilon: f64) {
    let diff = (actual - expected).rem_euclid(360.0);
    let diff = diff.min(360.0 - diff);
    assert_abs_diff_eq!(diff, 0.0, epsilon = epsilon);
}

pub fn column_values(table: &panomatch::table::Table, name: &str) -> Vec<Option<String>> {
    let col = table
        .column(name)
        .unwrap_or_else(|| panic!("missing column {name}"));
    (0..table.len())
        .map(|row| table.cell(row, col).map(str::to_string))
        .collect()
}

pub fn read_back(path: &Utf8Path) -> panomatch::table::Table {
    panomatch::table::Table::read_csv(path).unwrap()
}
