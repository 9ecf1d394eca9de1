//! Reader for the per-run GPS logs.
//!
//! Only the longitude and latitude columns are kept; any other column of the export
//! (altitude, speed, timestamps) is ignored. Row order is preserved so that the row index is
//! the frame index.
use std::io::Read;

use csv::StringRecord;
use log::debug;

use crate::constants::{GPS_LATITUDE_COLUMN, GPS_LONGITUDE_COLUMN};
use crate::pipeline_errors::PipelineError;
use crate::schema::column_index;
use crate::table::parse_number;

use super::{Sample, Trajectory, TrajectoryFile};

fn required_column(headers: &StringRecord, name: &'static str) -> Result<usize, PipelineError> {
    column_index(headers, name).ok_or_else(|| PipelineError::Schema {
        field: name,
        expected: vec![name.to_string()],
        found: headers.iter().map(|h| h.trim().to_string()).collect(),
    })
}

/// Parse samples from any CSV source.
pub fn read_samples<R: Read>(source: R) -> Result<Vec<Sample>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(source);
    let headers = reader.headers()?.clone();
    let lon_col = required_column(&headers, GPS_LONGITUDE_COLUMN)?;
    let lat_col = required_column(&headers, GPS_LATITUDE_COLUMN)?;

    let mut samples = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        samples.push(Sample {
            lon: record.get(lon_col).and_then(parse_number),
            lat: record.get(lat_col).and_then(parse_number),
        });
    }
    Ok(samples)
}

/// Load the log described by `file`.
///
/// Return
/// ----------
/// * [`PipelineError::MissingResource`] when the file does not exist,
///   [`PipelineError::Schema`] when a GPS column is absent.
pub fn read_trajectory(file: TrajectoryFile) -> Result<Trajectory, PipelineError> {
    if !file.path.is_file() {
        return Err(PipelineError::MissingResource(file.path.clone()));
    }
    let handle = std::fs::File::open(&file.path)?;
    let samples = read_samples(std::io::BufReader::new(handle))?;
    debug!("Read {} samples from {}", samples.len(), file.file_name);
    Ok(Trajectory::new(file, samples))
}
