//! # Building footprints
//!
//! Loads the surveyed building table, resolves its coordinate columns once, and produces the
//! typed [`Footprint`] list consumed by the spatial index.
//!
//! The raw [`Table`] is kept alongside so the original columns survive to the output. Rows with
//! a null or non-numeric coordinate are reported as [`PipelineError::InvalidSample`] and are not
//! indexed, but they stay in the table (they simply never receive a match).
use camino::Utf8Path;
use log::warn;
use nalgebra::Point2;

use crate::constants::OBJECT_ID_COLUMN;
use crate::pipeline_errors::PipelineError;
use crate::projection::{GeoPoint, Projector};
use crate::schema::{resolve_coord_pair, resolve_field, FieldAliases, OBJECT_ID};
use crate::table::Table;

/// A surveyed building location. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    /// Row of the footprint in its source table
    pub row: usize,
    pub geo: GeoPoint,
    pub projected: Point2<f64>,
}

/// A footprint table together with its typed, indexable footprints.
#[derive(Debug, Clone)]
pub struct FootprintSet {
    pub table: Table,
    pub footprints: Vec<Footprint>,
    /// Rows skipped because a coordinate was null or not a number
    pub invalid_rows: Vec<usize>,
}

impl FootprintSet {
    /// Read and resolve a footprint CSV.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: CSV with a longitude/latitude pair under one of the accepted alias pairs.
    /// * `projector`: Planar projector applied to every valid footprint.
    /// * `assign_object_ids`: Append a sequential `ObjectId` column when the table has none.
    ///
    /// Return
    /// ----------
    /// * The loaded set, or [`PipelineError::Schema`] when no coordinate pair resolves.
    pub fn load(
        path: &Utf8Path,
        projector: &Projector,
        assign_object_ids: bool,
    ) -> Result<Self, PipelineError> {
        let table = Table::read_csv(path)?;
        Self::from_table(table, projector, assign_object_ids)
    }

    pub fn from_table(
        mut table: Table,
        projector: &Projector,
        assign_object_ids: bool,
    ) -> Result<Self, PipelineError> {
        let coords = resolve_coord_pair(&table.headers)?;

        let mut footprints = Vec::with_capacity(table.len());
        let mut invalid_rows = Vec::new();
        for row in 0..table.len() {
            let lon = table.number(row, coords.lon);
            let lat = table.number(row, coords.lat);
            match (lon, lat) {
                (Some(lon), Some(lat)) => {
                    let geo = GeoPoint::new(lon, lat);
                    footprints.push(Footprint {
                        row,
                        geo,
                        projected: projector.project(&geo),
                    });
                }
                _ => {
                    let err = PipelineError::InvalidSample {
                        row,
                        field: if lon.is_none() {
                            table.headers[coords.lon].to_string()
                        } else {
                            table.headers[coords.lat].to_string()
                        },
                    };
                    warn!("Skipping footprint: {err}");
                    invalid_rows.push(row);
                }
            }
        }

        if assign_object_ids {
            ensure_object_ids(&mut table)?;
        }

        Ok(FootprintSet {
            table,
            footprints,
            invalid_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }
}

/// Append a sequential, 1-based `ObjectId` column unless an id column already exists.
///
/// Return
/// ----------
/// * `true` when ids were assigned, `false` when an existing id column was kept.
pub fn ensure_object_ids(table: &mut Table) -> Result<bool, PipelineError> {
    let optional = FieldAliases {
        required: false,
        ..OBJECT_ID
    };
    if resolve_field(&table.headers, &optional)?.is_some() {
        return Ok(false);
    }
    let ids = (1..=table.len()).map(|i| i.to_string()).collect();
    table.set_column(OBJECT_ID_COLUMN, ids);
    Ok(true)
}
