//! # Yaw normalizer stage
//!
//! Combines the building position, the camera position at the matched frame and the vehicle
//! heading into the yaw handed to the renderer, wrapped into `(-180, 180]`.
//! The angle arithmetic lives in [`crate::bearing`]; this module resolves the inputs from a
//! table (or from the in-memory stages) and writes the `yaw` column.
//!
//! A row missing any of its inputs (no match, undefined heading, null coordinate) is an
//! [`PipelineError::InvalidSample`]: it gets no yaw and the stage continues.
use log::{debug, info};

use crate::bearing::camera_yaw;
use crate::constants::{Degree, YAW_COLUMN};
use crate::footprints::Footprint;
use crate::matching::FootprintMatches;
use crate::pipeline_errors::PipelineError;
use crate::projection::GeoPoint;
use crate::schema::{
    resolve_all, resolve_coord_pair, HEADING, VEHICLE_LATITUDE, VEHICLE_LONGITUDE,
};
use crate::table::{format_optional, Table};

/// Everything needed to orient the camera toward one building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YawInput {
    pub building: GeoPoint,
    pub camera: GeoPoint,
    pub heading: Degree,
}

impl YawInput {
    #[inline]
    pub fn yaw(&self, yaw_offset: Degree) -> Degree {
        camera_yaw(&self.camera, &self.building, self.heading, yaw_offset)
    }
}

/// Column indices of the yaw inputs.
#[derive(Debug, Clone, Copy)]
pub struct YawColumns {
    pub building_lon: usize,
    pub building_lat: usize,
    pub camera_lon: usize,
    pub camera_lat: usize,
    pub heading: usize,
}

impl YawColumns {
    /// The building resolves as a pair, the same way the footprint loader reads it.
    pub fn resolve(table: &Table) -> Result<Self, PipelineError> {
        let building = resolve_coord_pair(&table.headers)?;
        let cols = resolve_all(
            &table.headers,
            &[VEHICLE_LONGITUDE, VEHICLE_LATITUDE, HEADING],
        )?;
        Ok(YawColumns {
            building_lon: building.lon,
            building_lat: building.lat,
            camera_lon: cols[0],
            camera_lat: cols[1],
            heading: cols[2],
        })
    }

    /// Read the inputs of one row.
    pub fn read(&self, table: &Table, row: usize) -> Result<YawInput, PipelineError> {
        let number = |col: usize| {
            table
                .number(row, col)
                .ok_or_else(|| PipelineError::InvalidSample {
                    row,
                    field: table.headers.get(col).unwrap_or_default().trim().to_string(),
                })
        };
        Ok(YawInput {
            building: GeoPoint::new(number(self.building_lon)?, number(self.building_lat)?),
            camera: GeoPoint::new(number(self.camera_lon)?, number(self.camera_lat)?),
            heading: number(self.heading)?,
        })
    }
}

/// Add a `yaw` column to an oriented table.
///
/// Return
/// ----------
/// * The yaw per row (`None` for rows with an invalid input), or [`PipelineError::Schema`]
///   when an input column is absent.
pub fn yaw_table(table: &mut Table, yaw_offset: Degree) -> Result<Vec<Option<Degree>>, PipelineError> {
    let cols = YawColumns::resolve(table)?;
    let yaws: Vec<Option<Degree>> = (0..table.len())
        .map(|row| match cols.read(table, row) {
            Ok(input) => Some(input.yaw(yaw_offset)),
            Err(e) => {
                debug!("No yaw: {e}");
                None
            }
        })
        .collect();

    info!(
        "Computed yaw for {} of {} rows",
        yaws.iter().filter(|y| y.is_some()).count(),
        yaws.len()
    );
    table.set_column(YAW_COLUMN, yaws.iter().map(|y| format_optional(*y)).collect());
    Ok(yaws)
}

/// Yaw per table row from the in-memory matcher and orientation output.
pub fn yaw_matches(
    n_rows: usize,
    footprints: &[Footprint],
    matches: &FootprintMatches,
    headings: &[Option<Degree>],
    yaw_offset: Degree,
) -> Vec<Option<Degree>> {
    let mut yaws = vec![None; n_rows];
    for fp in footprints.iter().filter(|fp| fp.row < n_rows) {
        let Some(m) = matches.get(&fp.row) else {
            continue;
        };
        let Some(heading) = headings.get(fp.row).copied().flatten() else {
            debug!("Row {}: heading undefined, no yaw", fp.row);
            continue;
        };
        let input = YawInput {
            building: fp.geo,
            camera: m.vehicle,
            heading,
        };
        yaws[fp.row] = Some(input.yaw(yaw_offset));
    }
    yaws
}
