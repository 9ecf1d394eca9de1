//! # panomatch
//!
//! Associates surveyed building locations with the moment a spherical camera passed nearby,
//! using only the GPS logs recorded during the camera runs, then derives the yaw that turns the
//! captured panorama toward the building.
//!
//! Geometric core
//! -----------------
//! * [`matching`] – buffered containment over an R-tree and nearest-candidate reduction.
//! * [`orientation`] – vehicle heading from the samples around a match.
//! * [`yaw`] – camera yaw from building bearing, heading and mount offset.
//!
//! Collaborators
//! -----------------
//! * [`render`] – frame extraction and `ffmpeg` reprojection with bounded retries.
//! * [`vision`] – vision-model description and occupancy classification.
//!
//! The end-to-end run lives in [`pipeline::run_pipeline`].
pub mod bearing;
pub mod constants;
pub mod footprints;
pub mod matching;
pub mod orientation;
pub mod params;
pub mod pipeline;
pub mod pipeline_errors;
pub mod projection;
pub mod render;
pub mod schema;
pub mod spatial_index;
pub mod table;
pub mod trajectories;
pub mod vision;
pub mod yaw;

pub use matching::Matcher;
pub use params::PipelineParams;
pub use pipeline::{run_pipeline, PipelineReport};
pub use pipeline_errors::PipelineError;
pub use projection::{GeoPoint, Projector};
