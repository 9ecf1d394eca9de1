//! # Constants and type definitions for panomatch
//!
//! This module centralizes the **ellipsoid constants**, **default tunables**, and **common type
//! aliases** used throughout the crate, together with the fixed naming conventions of the
//! camera GPS logs.
//!
//! ## Overview
//!
//! - GRS80 ellipsoid parameters used by the planar projection
//! - Default values for matching, orientation, yaw and rendering
//! - Unit type aliases shared across modules
//! - Column names and file suffix of the GPS logs written by the camera

// -------------------------------------------------------------------------------------------------
// Ellipsoid
// -------------------------------------------------------------------------------------------------

/// GRS80 semi-major axis in meters
pub const GRS80_MAJOR_AXIS: f64 = 6_378_137.0;

/// GRS80 inverse flattening
pub const GRS80_INV_FLATTENING: f64 = 298.257_222_101;

// -------------------------------------------------------------------------------------------------
// Default tunables
// -------------------------------------------------------------------------------------------------

/// Radius of the candidate region around a footprint, in meters
pub const DEFAULT_BUFFER_DISTANCE: Meter = 25.0;

/// Number of polygon segments per quarter circle when buffering a footprint
pub const DEFAULT_BUFFER_SEGMENTS: usize = 16;

/// Half-width of the frame window searched on each side of a matched sample
pub const DEFAULT_WINDOW_FRAMES: usize = 15;

/// Number of samples averaged on each side of a matched sample
pub const DEFAULT_AVERAGE_SAMPLES: usize = 3;

/// Camera mount correction applied to the required yaw
pub const DEFAULT_YAW_OFFSET: Degree = -90.0;

/// Horizontal field of view of the rendered view
pub const DEFAULT_HORIZONTAL_FOV: Degree = 90.0;

/// Width in pixels of the rendered view
pub const DEFAULT_OUTPUT_WIDTH: u32 = 1920;

/// Below this width/height ratio an image is not treated as panoramic
pub const PANORAMIC_ASPECT_RATIO: f64 = 2.0;

/// Frame rate assumed when a video cannot be probed
pub const FALLBACK_FPS: f64 = 30.0;

// -------------------------------------------------------------------------------------------------
// GPS log conventions
// -------------------------------------------------------------------------------------------------

/// Suffix tying a run identifier to its GPS log: `<run>_GoPro Max-GPS5.csv`
pub const GPS_FILE_SUFFIX: &str = "_GoPro Max-GPS5.csv";

/// Longitude column of a GPS log
pub const GPS_LONGITUDE_COLUMN: &str = "GPS (Long.) [deg]";

/// Latitude column of a GPS log
pub const GPS_LATITUDE_COLUMN: &str = "GPS (Lat.) [deg]";

// -------------------------------------------------------------------------------------------------
// Output columns
// -------------------------------------------------------------------------------------------------

pub const OBJECT_ID_COLUMN: &str = "ObjectId";
pub const MATCHED_FILE_COLUMN: &str = "matched_file";
pub const FRAME_NUMBER_COLUMN: &str = "frame_number";
pub const VEHICLE_X_COLUMN: &str = "vehicle_x";
pub const VEHICLE_Y_COLUMN: &str = "vehicle_y";
pub const ORIENTATION_COLUMN: &str = "orientation";
pub const YAW_COLUMN: &str = "yaw";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Planar distance in meters
pub type Meter = f64;
/// 0-based position of a sample inside its GPS log
pub type FrameIndex = usize;
