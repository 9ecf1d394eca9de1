//! # Footprint ↔ trajectory matching
//!
//! Streams every sample of every GPS log through the [`CandidateIndex`] and keeps, for each
//! footprint, the single globally nearest sample.
//!
//! ## Algorithm
//! 1. Each valid sample is projected with the same [`Projector`] as the footprints.
//! 2. The index returns every footprint whose buffered polygon contains the sample
//!    (broad phase on bounding boxes, narrow phase on the polygon).
//! 3. The distance is measured to the **unbuffered** footprint centre and a [`Candidate`] is
//!    emitted.
//! 4. Per log, only the best candidate per footprint is retained; the per-log partial maps are
//!    then min-merged into the final [`FootprintMatches`].
//!
//! ## Ordering
//! Candidates compare by `(distance, file name, sample index)`. The comparison is a total
//! order, so the min-merge is commutative and associative: logs can be processed in any order,
//! on any number of workers, and the result is identical.
//!
//! ## Concurrency
//! Logs are processed in parallel with `rayon` (`map` per log, then `reduce`). The index and
//! the footprints are only read during the run.
//!
//! ### Progress UI (feature: `progress`)
//! With the `progress` feature, [`Matcher::match_all`] renders a progress bar over the logs and
//! shows a moving average of the per-log processing time.
//!
//! See also
//! ------------
//! * [`apply_matches`] – Writes the `matched_file`, `frame_number`, `vehicle_x`, `vehicle_y`
//!   columns onto a footprint table.
use std::cmp::Ordering;
use std::collections::HashMap;

use ahash::RandomState;
use log::{debug, info};
use rayon::prelude::*;

use crate::constants::{
    FrameIndex, Meter, FRAME_NUMBER_COLUMN, MATCHED_FILE_COLUMN, VEHICLE_X_COLUMN,
    VEHICLE_Y_COLUMN,
};
use crate::footprints::Footprint;
use crate::projection::{GeoPoint, Projector};
use crate::spatial_index::CandidateIndex;
use crate::table::Table;
use crate::trajectories::{Trajectory, TrajectoryFile};

/// A sample falling inside a footprint's buffer. Ephemeral, borrowed from its trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'t> {
    /// Row of the footprint in its source table
    pub footprint_row: usize,
    pub file: &'t TrajectoryFile,
    pub sample_index: FrameIndex,
    pub distance: Meter,
    pub vehicle: GeoPoint,
}

impl Candidate<'_> {
    /// Total order used by the reduction: distance, then file name, then sample index.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.file.file_name.cmp(&other.file.file_name))
            .then_with(|| self.sample_index.cmp(&other.sample_index))
    }

    fn to_match(self) -> Match {
        Match {
            footprint_row: self.footprint_row,
            file: self.file.clone(),
            frame_number: self.sample_index,
            distance: self.distance,
            vehicle: self.vehicle,
        }
    }
}

/// The winning candidate of one footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub footprint_row: usize,
    pub file: TrajectoryFile,
    pub frame_number: FrameIndex,
    pub distance: Meter,
    /// Camera position at the matched sample
    pub vehicle: GeoPoint,
}

/// Best candidate per footprint row.
pub type BestCandidates<'t> = HashMap<usize, Candidate<'t>, RandomState>;

/// Final matches keyed by footprint row.
pub type FootprintMatches = HashMap<usize, Match, RandomState>;

/// Keep `candidate` in `best` if it ranks before the current holder.
#[inline]
pub fn offer<'t>(best: &mut BestCandidates<'t>, candidate: Candidate<'t>) {
    best.entry(candidate.footprint_row)
        .and_modify(|held| {
            if candidate.rank(held) == Ordering::Less {
                *held = candidate;
            }
        })
        .or_insert(candidate);
}

/// Min-merge two partial maps.
pub fn merge_best<'t>(a: BestCandidates<'t>, b: BestCandidates<'t>) -> BestCandidates<'t> {
    let (mut into, from) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    for candidate in from.into_values() {
        offer(&mut into, candidate);
    }
    into
}

/// Spatial matcher over a fixed set of footprints.
#[derive(Debug)]
pub struct Matcher<'f> {
    footprints: &'f [Footprint],
    index: CandidateIndex,
    projector: Projector,
}

impl<'f> Matcher<'f> {
    /// Buffer and index the footprints.
    ///
    /// Arguments
    /// -----------------
    /// * `footprints`: Footprints with their projected centres.
    /// * `projector`: The projector the footprints were projected with; applied to samples.
    /// * `buffer_distance`: Buffer radius in meters.
    /// * `buffer_segments`: Polygon segments per quarter circle.
    pub fn new(
        footprints: &'f [Footprint],
        projector: Projector,
        buffer_distance: Meter,
        buffer_segments: usize,
    ) -> Self {
        let index = CandidateIndex::build(
            footprints
                .iter()
                .enumerate()
                .map(|(id, fp)| (id, fp.projected)),
            buffer_distance,
            buffer_segments,
        );
        debug!(
            "Indexed {} footprints with a {buffer_distance} m buffer",
            index.len()
        );
        Matcher {
            footprints,
            index,
            projector,
        }
    }

    pub fn index(&self) -> &CandidateIndex {
        &self.index
    }

    /// Every candidate produced by one trajectory. Invalid samples produce none.
    pub fn candidates<'t>(
        &'t self,
        trajectory: &'t Trajectory,
    ) -> impl Iterator<Item = Candidate<'t>> + 't {
        trajectory
            .valid_samples()
            .flat_map(move |(sample_index, vehicle)| {
                let point = self.projector.project(&vehicle);
                self.index.query(point).map(move |(id, distance)| Candidate {
                    footprint_row: self.footprints[id].row,
                    file: &trajectory.file,
                    sample_index,
                    distance,
                    vehicle,
                })
            })
    }

    /// Best candidate per footprint for one trajectory.
    pub fn best_for_trajectory<'t>(&'t self, trajectory: &'t Trajectory) -> BestCandidates<'t> {
        let mut best = BestCandidates::default();
        for candidate in self.candidates(trajectory) {
            offer(&mut best, candidate);
        }
        best
    }

    /// Match every footprint against every trajectory.
    ///
    /// Return
    /// ----------
    /// * One [`Match`] per footprint that received at least one candidate. Footprints with no
    ///   candidate are absent from the map.
    pub fn match_all(&self, trajectories: &[Trajectory]) -> FootprintMatches {
        #[cfg(feature = "progress")]
        let best = {
            use crate::trajectories::progress_bar::{fmt_dur, trajectory_progress, FileTimer};
            use std::time::Instant;

            let pb = trajectory_progress(trajectories.len());
            let timer = FileTimer::new(0.2);
            let best = trajectories
                .par_iter()
                .map(|t| {
                    let start = Instant::now();
                    let best = self.best_for_trajectory(t);
                    let avg = timer.record(start.elapsed());
                    pb.set_message(format!("avg per log: {}", fmt_dur(avg)));
                    pb.inc(1);
                    best
                })
                .reduce(BestCandidates::default, merge_best);
            pb.finish_and_clear();
            best
        };

        #[cfg(not(feature = "progress"))]
        let best = trajectories
            .par_iter()
            .map(|t| self.best_for_trajectory(t))
            .reduce(BestCandidates::default, merge_best);

        let matches: FootprintMatches = best
            .into_iter()
            .map(|(row, candidate)| (row, candidate.to_match()))
            .collect();
        info!(
            "Matched {} of {} footprints across {} trajectories",
            matches.len(),
            self.footprints.len(),
            trajectories.len()
        );
        matches
    }
}

/// Write the match columns onto a footprint table. Unmatched rows get empty cells.
pub fn apply_matches(table: &mut Table, matches: &FootprintMatches) {
    let n = table.len();
    let mut files = vec![String::new(); n];
    let mut frames = vec![String::new(); n];
    let mut xs = vec![String::new(); n];
    let mut ys = vec![String::new(); n];

    for m in matches.values().filter(|m| m.footprint_row < n) {
        let row = m.footprint_row;
        files[row] = m.file.matched_label().to_string();
        frames[row] = m.frame_number.to_string();
        xs[row] = m.vehicle.lon.to_string();
        ys[row] = m.vehicle.lat.to_string();
    }

    table.set_column(MATCHED_FILE_COLUMN, files);
    table.set_column(FRAME_NUMBER_COLUMN, frames);
    table.set_column(VEHICLE_X_COLUMN, xs);
    table.set_column(VEHICLE_Y_COLUMN, ys);
}
