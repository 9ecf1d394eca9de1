//! # Column schema resolution
//!
//! Input tables arrive with loosely named columns (`long`, `Center_Longitude`, `x`, …).
//! Instead of guessing at every access, each stage declares an explicit **mapping table**
//! from a typed field to its accepted aliases, and resolves it **once** against the header
//! row. The result is a vector of column indices in field order.
//!
//! Resolution rules
//! -----------------
//! * Header names are compared after trimming surrounding whitespace.
//! * Aliases are tried in declaration order; the first alias present wins.
//! * A required field with no alias present yields a single
//!   [`PipelineError::Schema`] naming the field, every accepted alias, and the columns found.
//! * Optional fields resolve to `None` when absent.
//!
//! Building coordinates are resolved as a **pair**: the first alias pair whose two members
//! are both present wins, so a table carrying `x`/`y` projected columns next to
//! `long`/`lat` resolves to the geographic pair declared first. Every stage reading a
//! building position (footprint loading, yaw, dewarp) goes through the same pair list.
use csv::StringRecord;

use crate::pipeline_errors::PipelineError;

/// A typed field and the header names accepted for it.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

/// Longitude/latitude alias pairs accepted for a building position, in priority order.
pub const BUILDING_COORD_PAIRS: &[(&str, &str)] = &[
    ("long", "lat"),
    ("longitude", "latitude"),
    ("x", "y"),
    ("Center_Longitude", "Center_Latitude"),
];

pub const OBJECT_ID: FieldAliases = FieldAliases {
    field: "ObjectId",
    aliases: &["ObjectId", "objectid", "object_id"],
    required: true,
};

pub const MATCHED_FILE: FieldAliases = FieldAliases {
    field: "matched_file",
    aliases: &["matched_file"],
    required: true,
};

pub const FRAME_NUMBER: FieldAliases = FieldAliases {
    field: "frame_number",
    aliases: &["frame_number"],
    required: true,
};

pub const VEHICLE_LONGITUDE: FieldAliases = FieldAliases {
    field: "vehicle_x",
    aliases: &["vehicle_x", "camera_lon", "camera_longitude", "vehicle_x_y"],
    required: true,
};

pub const VEHICLE_LATITUDE: FieldAliases = FieldAliases {
    field: "vehicle_y",
    aliases: &["vehicle_y", "camera_lat", "camera_latitude", "vehicle_y_y"],
    required: true,
};

pub const HEADING: FieldAliases = FieldAliases {
    field: "orientation",
    aliases: &["orientation", "bearing", "heading"],
    required: true,
};

/// Column indices of a building's longitude/latitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordColumns {
    pub lon: usize,
    pub lat: usize,
}

fn header_names(headers: &StringRecord) -> Vec<String> {
    headers.iter().map(|h| h.trim().to_string()).collect()
}

fn position(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

/// Resolve the building longitude/latitude pair of a table.
///
/// Return
/// ----------
/// * The indices of the first alias pair fully present, or a [`PipelineError::Schema`]
///   listing every accepted pair and the available columns.
pub fn resolve_coord_pair(headers: &StringRecord) -> Result<CoordColumns, PipelineError> {
    BUILDING_COORD_PAIRS
        .iter()
        .find_map(|(lon, lat)| {
            Some(CoordColumns {
                lon: position(headers, lon)?,
                lat: position(headers, lat)?,
            })
        })
        .ok_or_else(|| PipelineError::Schema {
            field: "longitude/latitude",
            expected: BUILDING_COORD_PAIRS
                .iter()
                .map(|(lon, lat)| format!("{lon}/{lat}"))
                .collect(),
            found: header_names(headers),
        })
}

/// Resolve a single field, `Ok(None)` when an optional field is absent.
pub fn resolve_field(
    headers: &StringRecord,
    wanted: &FieldAliases,
) -> Result<Option<usize>, PipelineError> {
    match wanted.aliases.iter().find_map(|alias| position(headers, alias)) {
        Some(idx) => Ok(Some(idx)),
        None if !wanted.required => Ok(None),
        None => Err(PipelineError::Schema {
            field: wanted.field,
            expected: wanted.aliases.iter().map(|a| a.to_string()).collect(),
            found: header_names(headers),
        }),
    }
}

/// Resolve a list of required fields; indices are returned in the same order.
pub fn resolve_all(
    headers: &StringRecord,
    wanted_fields: &[FieldAliases],
) -> Result<Vec<usize>, PipelineError> {
    wanted_fields
        .iter()
        .map(|wanted| {
            let required = FieldAliases {
                required: true,
                ..*wanted
            };
            // a required field either resolves or errors
            resolve_field(headers, &required).map(Option::unwrap_or_default)
        })
        .collect()
}

/// Find an exact column, trimming whitespace around header names.
pub fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    position(headers, name)
}
