//! # Trajectories: GPS logs of camera runs
//!
//! A camera run writes one GPS log. Each row is one **sample**; its 0-based row index is the
//! **frame index** used in place of a timestamp. This module owns the typed sample model, the
//! log reader, and the catalog that discovers logs by naming convention.
//!
//! Modules
//! -----------------
//! * [`catalog`](crate::trajectories::catalog) – Discovery of `<run>_GoPro Max-GPS5.csv` files and
//!   lookup of a run's log by its exported label.
//! * [`gps_reader`](crate::trajectories::gps_reader) – Parsing of a log into [`Sample`]s.
//! * *(crate-private)* `progress_bar` – Iteration timing for the optional progress UI.
//!
//! Data Model
//! -----------------
//! * [`Sample`] – nullable longitude/latitude; a null or non-numeric field makes the sample
//!   invalid for every consumer (no candidate, ignored by averaging).
//! * [`Trajectory`] – the ordered samples of one [`TrajectoryFile`].
//! * [`TrajectoryFile`] – path, file name and run identifier of a log.
use camino::Utf8PathBuf;

use crate::constants::FrameIndex;
use crate::projection::GeoPoint;

pub mod catalog;
pub mod gps_reader;

#[cfg(feature = "progress")]
pub(crate) mod progress_bar;

/// One GPS fix. Either coordinate may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub lon: Option<f64>,
    pub lat: Option<f64>,
}

impl Sample {
    pub fn new(lon: f64, lat: f64) -> Self {
        Sample {
            lon: Some(lon),
            lat: Some(lat),
        }
    }

    /// The geographic position, `None` for an invalid sample.
    #[inline]
    pub fn geo(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.lon?, self.lat?))
    }
}

/// Identity of a GPS log on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrajectoryFile {
    /// File name, used for deterministic tie-breaks
    pub file_name: String,
    /// Run identifier: the file name without the log suffix
    pub run_id: String,
    pub path: Utf8PathBuf,
}

impl TrajectoryFile {
    /// Label exported as `matched_file`: the first `_`-separated token of the run id.
    pub fn matched_label(&self) -> &str {
        self.run_id.split('_').next().unwrap_or(&self.run_id)
    }
}

/// The ordered samples of one recorded run.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub file: TrajectoryFile,
    pub samples: Vec<Sample>,
}

impl Trajectory {
    pub fn new(file: TrajectoryFile, samples: Vec<Sample>) -> Self {
        Trajectory { file, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, frame: FrameIndex) -> Option<&Sample> {
        self.samples.get(frame)
    }

    /// Valid samples with their frame index.
    pub fn valid_samples(&self) -> impl Iterator<Item = (FrameIndex, GeoPoint)> + '_ {
        self.samples
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.geo().map(|g| (idx, g)))
    }
}
