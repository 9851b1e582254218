//! The prelude exports the types most commonly needed when working
//! with disk images and drive geometry.
pub use super::ckd::{CountField, HomeAddress, RecordId, TrackFormatError};
pub use super::geometry::{DiskGeometry, DriveType, UnknownDriveType, ROTATION_PERIOD};
pub use super::image::{ImageError, ImageHeader};
