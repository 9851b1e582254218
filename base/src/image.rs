//! The disk image file format.
//!
//! An image file holds a fixed 512-byte header followed by one block
//! per cylinder.  Each cylinder block holds one track image per head,
//! and each track image is [`DiskGeometry::track_size`] bytes long.
//!
//! ## Header
//!
//! | Offset | Length | Contents |
//! | ------ | ------ | -------- |
//! | 0      | 8      | device id tag, `CKD_P370` |
//! | 8      | 4      | heads per cylinder, little-endian |
//! | 12     | 4      | track size, little-endian |
//! | 16     | 1      | device type code |
//! | 17     | 1      | file sequence number (always zero) |
//! | 18     | 2      | highest cylinder number, little-endian |
//! | 20     | 492    | reserved, zero |
//!
//! Fields inside the tracks (home address, count fields) are
//! big-endian; see the [`crate::ckd`] module.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::ckd::format_track;
use super::geometry::DiskGeometry;

pub const HEADER_LEN: usize = 512;
pub const DEVICE_ID_TAG: [u8; 8] = *b"CKD_P370";

/// Bytes of the header after the fields we understand.
const HEADER_RESERVED_LEN: usize = HEADER_LEN - 20;

#[derive(Debug)]
pub enum ImageError {
    Io(io::Error),
    BadTag([u8; 8]),
    GeometryMismatch {
        field: &'static str,
        expected: u64,
        found: u64,
    },
    /// The file is too short to hold all the cylinders the header
    /// promises.
    Truncated { expected: u64, found: u64 },
}

impl Display for ImageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ImageError::Io(e) => write!(f, "I/O error on disk image: {e}"),
            ImageError::BadTag(tag) => {
                write!(
                    f,
                    "disk image has device id tag {:?}, expected {:?}",
                    String::from_utf8_lossy(tag),
                    String::from_utf8_lossy(&DEVICE_ID_TAG)
                )
            }
            ImageError::GeometryMismatch {
                field,
                expected,
                found,
            } => {
                write!(
                    f,
                    "disk image header field '{field}' is {found} but the drive needs {expected}"
                )
            }
            ImageError::Truncated { expected, found } => {
                write!(
                    f,
                    "disk image is {found} bytes long but should be at least {expected} bytes"
                )
            }
        }
    }
}

impl Error for ImageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ImageError {
    fn from(e: io::Error) -> ImageError {
        ImageError::Io(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    pub heads: u32,
    pub track_size: u32,
    pub device_type: u8,
    pub file_sequence: u8,
    pub highest_cylinder: u16,
}

impl ImageHeader {
    #[must_use]
    pub fn for_geometry(geometry: &DiskGeometry) -> ImageHeader {
        ImageHeader {
            heads: u32::from(geometry.heads),
            // Track sizes are at most a few tens of kilobytes.
            track_size: geometry.track_size() as u32,
            device_type: geometry.device_type,
            file_sequence: 0,
            highest_cylinder: geometry.highest_cylinder(),
        }
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<ImageHeader, ImageError> {
        let mut tag = [0_u8; 8];
        r.read_exact(&mut tag)?;
        if tag != DEVICE_ID_TAG {
            return Err(ImageError::BadTag(tag));
        }
        let heads = r.read_u32::<LittleEndian>()?;
        let track_size = r.read_u32::<LittleEndian>()?;
        let device_type = r.read_u8()?;
        let file_sequence = r.read_u8()?;
        let highest_cylinder = r.read_u16::<LittleEndian>()?;
        let mut reserved = [0_u8; HEADER_RESERVED_LEN];
        r.read_exact(&mut reserved)?;
        Ok(ImageHeader {
            heads,
            track_size,
            device_type,
            file_sequence,
            highest_cylinder,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ImageError> {
        w.write_all(&DEVICE_ID_TAG)?;
        w.write_u32::<LittleEndian>(self.heads)?;
        w.write_u32::<LittleEndian>(self.track_size)?;
        w.write_u8(self.device_type)?;
        w.write_u8(self.file_sequence)?;
        w.write_u16::<LittleEndian>(self.highest_cylinder)?;
        w.write_all(&[0_u8; HEADER_RESERVED_LEN])?;
        Ok(())
    }

    /// Check that an image with this header can be mounted on a drive
    /// with the indicated geometry.
    pub fn validate(&self, geometry: &DiskGeometry) -> Result<(), ImageError> {
        let expected = ImageHeader::for_geometry(geometry);
        let check = |field: &'static str, expected: u64, found: u64| {
            if expected == found {
                Ok(())
            } else {
                Err(ImageError::GeometryMismatch {
                    field,
                    expected,
                    found,
                })
            }
        };
        check("heads", expected.heads.into(), self.heads.into())?;
        check(
            "track size",
            expected.track_size.into(),
            self.track_size.into(),
        )?;
        check(
            "device type",
            expected.device_type.into(),
            self.device_type.into(),
        )?;
        if self.highest_cylinder > expected.highest_cylinder {
            return Err(ImageError::GeometryMismatch {
                field: "highest cylinder",
                expected: expected.highest_cylinder.into(),
                found: self.highest_cylinder.into(),
            });
        }
        Ok(())
    }

    /// The number of bytes a complete image with this header occupies.
    #[must_use]
    pub fn image_len(&self) -> u64 {
        let cylinders = u64::from(self.highest_cylinder) + 1;
        HEADER_LEN as u64 + cylinders * u64::from(self.heads) * u64::from(self.track_size)
    }
}

/// Position within the image file of the first byte of `cylinder`.
#[must_use]
pub fn cylinder_offset(geometry: &DiskGeometry, cylinder: u16) -> u64 {
    HEADER_LEN as u64 + u64::from(cylinder) * geometry.cylinder_size() as u64
}

/// Read the header of an image and check it against `geometry`,
/// including that the file is long enough to hold every cylinder.
pub fn open_image<S: Read + Seek>(
    store: &mut S,
    geometry: &DiskGeometry,
) -> Result<ImageHeader, ImageError> {
    store.seek(SeekFrom::Start(0))?;
    let header = ImageHeader::read_from(store)?;
    header.validate(geometry)?;
    let found = store.seek(SeekFrom::End(0))?;
    let expected = header.image_len();
    if found < expected {
        return Err(ImageError::Truncated { expected, found });
    }
    Ok(header)
}

/// Build the image of a freshly formatted cylinder.
#[must_use]
pub fn formatted_cylinder(geometry: &DiskGeometry, cylinder: u16) -> Vec<u8> {
    let mut buf = vec![0_u8; geometry.cylinder_size()];
    for (head, track) in buf.chunks_exact_mut(geometry.track_size()).enumerate() {
        // There are never more than a few dozen heads.
        format_track(track, cylinder, head as u16);
    }
    buf
}

/// Write a fresh header and formatted cylinders for the whole
/// capacity of the drive.
pub fn format_image<W: Write + Seek>(w: &mut W, geometry: &DiskGeometry) -> Result<(), ImageError> {
    w.seek(SeekFrom::Start(0))?;
    ImageHeader::for_geometry(geometry).write_to(w)?;
    for cylinder in 0..geometry.cylinders {
        w.write_all(&formatted_cylinder(geometry, cylinder))?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::ckd::{records, HomeAddress, END_MARKER};
    use crate::geometry::DriveType;

    #[test]
    fn test_header_layout() {
        let g = DriveType::Ibm2314.geometry();
        let mut buf: Vec<u8> = Vec::new();
        ImageHeader::for_geometry(g)
            .write_to(&mut buf)
            .expect("writing to a Vec should succeed");
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[0..8], b"CKD_P370");
        assert_eq!(&buf[8..12], &[20, 0, 0, 0]);
        assert_eq!(&buf[12..16], &[0x00, 0x1E, 0, 0]); // 7680
        assert_eq!(buf[16], 0x14);
        assert_eq!(buf[17], 0);
        assert_eq!(&buf[18..20], &[202, 0]);
        assert!(buf[20..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_header_rejects_other_geometry() {
        let mut cursor = Cursor::new(Vec::new());
        ImageHeader::for_geometry(DriveType::Ibm2311.geometry())
            .write_to(&mut cursor)
            .expect("writing to a Vec should succeed");
        cursor.set_position(0);
        let header = ImageHeader::read_from(&mut cursor).expect("header should be readable");
        match header.validate(DriveType::Ibm2314.geometry()) {
            Err(ImageError::GeometryMismatch { field: "heads", .. }) => (),
            other => panic!("expected a heads mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_tag() {
        let mut data = vec![0_u8; HEADER_LEN];
        data[..8].copy_from_slice(b"NOTADISK");
        match ImageHeader::read_from(&mut Cursor::new(data)) {
            Err(ImageError::BadTag(tag)) => assert_eq!(&tag, b"NOTADISK"),
            other => panic!("expected BadTag, got {other:?}"),
        }
    }

    #[test]
    fn test_format_and_open() {
        let g = DriveType::Ibm2311.geometry();
        let mut cursor = Cursor::new(Vec::new());
        format_image(&mut cursor, g).expect("format should succeed");
        let expected_len = HEADER_LEN + usize::from(g.cylinders) * g.cylinder_size();
        assert_eq!(cursor.get_ref().len(), expected_len);
        let header = open_image(&mut cursor, g).expect("image should open");
        assert_eq!(header, ImageHeader::for_geometry(g));

        // Check a track in the middle of the image.
        let start = cylinder_offset(g, 100) as usize + 7 * g.track_size();
        let track = &cursor.get_ref()[start..start + g.track_size()];
        assert_eq!(HomeAddress::from_bytes(track), Some(HomeAddress::new(100, 7)));
        let recs: Vec<_> = records(track).collect();
        assert_eq!(recs.len(), 1);
        assert_eq!(&track[13..17], &END_MARKER);
    }

    #[test]
    fn test_open_truncated_image() {
        let g = DriveType::Ibm2311.geometry();
        let mut cursor = Cursor::new(Vec::new());
        format_image(&mut cursor, g).expect("format should succeed");
        let short = cursor.get_ref().len() - 1;
        cursor.get_mut().truncate(short);
        match open_image(&mut cursor, g) {
            Err(ImageError::Truncated { found, .. }) => assert_eq!(found, short as u64),
            other => panic!("expected Truncated, got {other:?}"),
        }
    }
}
