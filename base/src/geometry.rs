//! Drive models and their geometry.
//!
//! The geometry of a drive never changes while the simulator is
//! running.  Configuration binds each unit to a [`DriveType`] and the
//! geometry is looked up from that binding whenever an image is
//! attached.
//!
//! | Model   | Cylinders | Heads | Bytes/track | Sense bytes | Type code |
//! | ------- | --------- | ----- | ----------- | ----------- | --------- |
//! | 2311    | 203       | 10    | 3717        | 6           | 0x11      |
//! | 2314    | 203       | 20    | 7294        | 6           | 0x14      |
//! | 3330    | 411       | 19    | 13165       | 24          | 0x30      |
//! | 3330-11 | 815       | 19    | 13165       | 24          | 0x33      |
//! | 3340    | 349       | 12    | 8535        | 24          | 0x40      |
//! | 3350    | 560       | 30    | 19254       | 24          | 0x50      |
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// All the drives we simulate spin at 3600 RPM.
pub const ROTATION_PERIOD: Duration = Duration::from_nanos(16_666_667);

/// Tracks are stored in the image file in units of this many bytes.
pub const TRACK_QUANTUM: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskGeometry {
    pub name: &'static str,
    pub cylinders: u16,
    pub heads: u16,
    /// The largest number of bytes the drive can record on one track.
    pub bytes_per_track: u32,
    /// Number of bytes returned by the Sense command.
    pub sense_bytes: usize,
    pub device_type: u8,
}

impl DiskGeometry {
    /// The size of a track as stored in an image file; the
    /// drive's capacity rounded up to the next [`TRACK_QUANTUM`].
    #[must_use]
    pub fn track_size(&self) -> usize {
        // The rounding always adds at least one byte, so there is
        // room for the end marker even on a completely full track.
        (self.bytes_per_track as usize | (TRACK_QUANTUM - 1)) + 1
    }

    #[must_use]
    pub fn cylinder_size(&self) -> usize {
        self.track_size() * usize::from(self.heads)
    }

    #[must_use]
    pub fn highest_cylinder(&self) -> u16 {
        self.cylinders - 1
    }

    /// How long it takes one byte to pass under the head.
    #[must_use]
    pub fn byte_time(&self) -> Duration {
        ROTATION_PERIOD / self.bytes_per_track
    }
}

const GEOMETRY_2311: DiskGeometry = DiskGeometry {
    name: "2311",
    cylinders: 203,
    heads: 10,
    bytes_per_track: 3717,
    sense_bytes: 6,
    device_type: 0x11,
};

const GEOMETRY_2314: DiskGeometry = DiskGeometry {
    name: "2314",
    cylinders: 203,
    heads: 20,
    bytes_per_track: 7294,
    sense_bytes: 6,
    device_type: 0x14,
};

const GEOMETRY_3330: DiskGeometry = DiskGeometry {
    name: "3330",
    cylinders: 411,
    heads: 19,
    bytes_per_track: 13165,
    sense_bytes: 24,
    device_type: 0x30,
};

const GEOMETRY_3330_11: DiskGeometry = DiskGeometry {
    name: "3330-11",
    cylinders: 815,
    heads: 19,
    bytes_per_track: 13165,
    sense_bytes: 24,
    device_type: 0x33,
};

const GEOMETRY_3340: DiskGeometry = DiskGeometry {
    name: "3340",
    cylinders: 349,
    heads: 12,
    bytes_per_track: 8535,
    sense_bytes: 24,
    device_type: 0x40,
};

const GEOMETRY_3350: DiskGeometry = DiskGeometry {
    name: "3350",
    cylinders: 560,
    heads: 30,
    bytes_per_track: 19254,
    sense_bytes: 24,
    device_type: 0x50,
};

/// Identifies a drive model.  Units are bound to a drive type by
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DriveType {
    #[serde(rename = "2311")]
    Ibm2311,
    #[serde(rename = "2314")]
    Ibm2314,
    #[serde(rename = "3330")]
    Ibm3330,
    #[serde(rename = "3330-11")]
    Ibm3330Model11,
    #[serde(rename = "3340")]
    Ibm3340,
    #[serde(rename = "3350")]
    Ibm3350,
}

impl DriveType {
    #[must_use]
    pub fn geometry(&self) -> &'static DiskGeometry {
        match self {
            DriveType::Ibm2311 => &GEOMETRY_2311,
            DriveType::Ibm2314 => &GEOMETRY_2314,
            DriveType::Ibm3330 => &GEOMETRY_3330,
            DriveType::Ibm3330Model11 => &GEOMETRY_3330_11,
            DriveType::Ibm3340 => &GEOMETRY_3340,
            DriveType::Ibm3350 => &GEOMETRY_3350,
        }
    }

    #[must_use]
    pub const fn all_drive_types() -> [DriveType; 6] {
        [
            DriveType::Ibm2311,
            DriveType::Ibm2314,
            DriveType::Ibm3330,
            DriveType::Ibm3330Model11,
            DriveType::Ibm3340,
            DriveType::Ibm3350,
        ]
    }

    /// Find the drive type whose image files carry `code` in their
    /// header.
    #[must_use]
    pub fn from_device_type_code(code: u8) -> Option<DriveType> {
        DriveType::all_drive_types()
            .into_iter()
            .find(|dt| dt.geometry().device_type == code)
    }
}

impl Display for DriveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(self.geometry().name)
    }
}

#[derive(Debug)]
pub struct UnknownDriveType(String);

impl Display for UnknownDriveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "unknown drive type '{}'", self.0)
    }
}

impl Error for UnknownDriveType {}

impl TryFrom<&str> for DriveType {
    type Error = UnknownDriveType;
    fn try_from(s: &str) -> Result<DriveType, UnknownDriveType> {
        DriveType::all_drive_types()
            .into_iter()
            .find(|dt| dt.geometry().name == s)
            .ok_or_else(|| UnknownDriveType(s.to_owned()))
    }
}

impl FromStr for DriveType {
    type Err = UnknownDriveType;
    fn from_str(s: &str) -> Result<DriveType, UnknownDriveType> {
        DriveType::try_from(s)
    }
}

#[test]
fn test_drive_type_round_trip() {
    for orig in DriveType::all_drive_types() {
        let name = orig.to_string();
        match DriveType::try_from(name.as_str()) {
            Ok(dt) => {
                assert_eq!(dt, orig);
            }
            Err(_) => {
                panic!("unable to round-trip drive type {orig:?}");
            }
        }
        assert_eq!(
            DriveType::from_device_type_code(orig.geometry().device_type),
            Some(orig)
        );
    }
    assert!(DriveType::try_from("2305").is_err());
}

#[test]
fn test_track_size_is_rounded_up() {
    let g = DriveType::Ibm2314.geometry();
    assert_eq!(g.track_size(), 7680);
    assert_eq!(g.cylinder_size(), 7680 * 20);
    assert_eq!(DriveType::Ibm2311.geometry().track_size(), 4096);
    assert_eq!(DriveType::Ibm3350.geometry().track_size(), 19456);
    for dt in DriveType::all_drive_types() {
        let g = dt.geometry();
        assert_eq!(g.track_size() % TRACK_QUANTUM, 0);
        assert!(g.track_size() > g.bytes_per_track as usize);
    }
}

#[test]
fn test_byte_time() {
    let g = DriveType::Ibm2314.geometry();
    // 16.67ms per revolution over 7294 bytes.
    assert_eq!(g.byte_time(), Duration::from_nanos(2284));
}
