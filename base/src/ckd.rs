//! Count-key-data record layout.
//!
//! A CKD track starts with a home address, which is followed by
//! record zero (R0) and then by any number of data records.  Each
//! record begins with a count field which describes the lengths of
//! the (optional) key field and the data field that follow it.  The
//! last record on the track is followed by an end marker, four bytes
//! of all-ones.
//!
//! ## Home Address
//!
//! | Offset | Length | Contents |
//! | ------ | ------ | -------- |
//! | 0      | 1      | flag (always zero for a good track) |
//! | 1      | 2      | cylinder, big-endian |
//! | 3      | 2      | head, big-endian |
//!
//! ## Count Field
//!
//! | Offset | Length | Contents |
//! | ------ | ------ | -------- |
//! | 0      | 2      | cylinder, big-endian |
//! | 2      | 2      | head, big-endian |
//! | 4      | 1      | record number |
//! | 5      | 1      | key length |
//! | 6      | 2      | data length, big-endian |
use std::error::Error;
use std::fmt::{self, Display, Formatter};

pub const HOME_ADDRESS_LEN: usize = 5;
pub const COUNT_LEN: usize = 8;
pub const END_MARKER: [u8; 4] = [0xFF; 4];

/// Record zero's count field always immediately follows the home
/// address.
pub const R0_OFFSET: usize = HOME_ADDRESS_LEN;

/// Length of the `CCHHR` identifier with which Search ID commands
/// compare the start of a count field.
pub const RECORD_ID_LEN: usize = 5;

#[must_use]
pub fn is_end_marker(bytes: &[u8]) -> bool {
    bytes.len() >= END_MARKER.len() && bytes[..END_MARKER.len()] == END_MARKER
}

fn be16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HomeAddress {
    pub flag: u8,
    pub cylinder: u16,
    pub head: u16,
}

impl HomeAddress {
    #[must_use]
    pub fn new(cylinder: u16, head: u16) -> HomeAddress {
        HomeAddress {
            flag: 0,
            cylinder,
            head,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HOME_ADDRESS_LEN] {
        let c = self.cylinder.to_be_bytes();
        let h = self.head.to_be_bytes();
        [self.flag, c[0], c[1], h[0], h[1]]
    }

    /// Decode a home address.  Returns `None` if `bytes` is too short.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<HomeAddress> {
        if bytes.len() < HOME_ADDRESS_LEN {
            None
        } else {
            Some(HomeAddress {
                flag: bytes[0],
                cylinder: be16(&bytes[1..3]),
                head: be16(&bytes[3..5]),
            })
        }
    }
}

/// The `CCHHR` identifier of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub cylinder: u16,
    pub head: u16,
    pub record: u8,
}

impl RecordId {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_ID_LEN] {
        let c = self.cylinder.to_be_bytes();
        let h = self.head.to_be_bytes();
        [c[0], c[1], h[0], h[1], self.record]
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "C{}H{}R{}", self.cylinder, self.head, self.record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountField {
    pub id: RecordId,
    pub key_length: u8,
    pub data_length: u16,
}

impl CountField {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; COUNT_LEN] {
        let id = self.id.to_bytes();
        let dl = self.data_length.to_be_bytes();
        [id[0], id[1], id[2], id[3], id[4], self.key_length, dl[0], dl[1]]
    }

    /// Decode a count field.  Returns `None` if `bytes` is too short
    /// or holds the end marker.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<CountField> {
        if bytes.len() < COUNT_LEN || is_end_marker(bytes) {
            None
        } else {
            Some(CountField {
                id: RecordId {
                    cylinder: be16(&bytes[0..2]),
                    head: be16(&bytes[2..4]),
                    record: bytes[4],
                },
                key_length: bytes[5],
                data_length: be16(&bytes[6..8]),
            })
        }
    }

    /// Total length of the record including its count field.
    #[must_use]
    pub fn record_len(&self) -> usize {
        COUNT_LEN + usize::from(self.key_length) + usize::from(self.data_length)
    }
}

/// The contents of a freshly formatted track: a home address, an
/// empty R0 and the end marker.  The rest of `track` is zeroed.
pub fn format_track(track: &mut [u8], cylinder: u16, head: u16) {
    track.fill(0);
    track[..HOME_ADDRESS_LEN].copy_from_slice(&HomeAddress::new(cylinder, head).to_bytes());
    let r0 = CountField {
        id: RecordId {
            cylinder,
            head,
            record: 0,
        },
        key_length: 0,
        data_length: 0,
    };
    let end_of_r0 = R0_OFFSET + COUNT_LEN;
    track[R0_OFFSET..end_of_r0].copy_from_slice(&r0.to_bytes());
    track[end_of_r0..end_of_r0 + END_MARKER.len()].copy_from_slice(&END_MARKER);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackFormatError {
    /// The home address or a record runs off the end of the track.
    Truncated { offset: usize },
}

impl Display for TrackFormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TrackFormatError::Truncated { offset } => {
                write!(f, "record at track offset {offset} runs past the end of the track")
            }
        }
    }
}

impl Error for TrackFormatError {}

/// A record found on a track by [`records`].
#[derive(Debug, PartialEq, Eq)]
pub struct Record<'a> {
    /// Offset of the count field within the track.
    pub offset: usize,
    pub count: CountField,
    pub key: &'a [u8],
    pub data: &'a [u8],
}

/// Iterates over the records (including R0) of a track.
#[derive(Debug)]
pub struct TrackRecords<'a> {
    track: &'a [u8],
    pos: Option<usize>,
}

impl<'a> Iterator for TrackRecords<'a> {
    type Item = Result<Record<'a>, TrackFormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pos?;
        let remaining = match self.track.get(offset..) {
            Some(r) if r.len() >= END_MARKER.len() => r,
            _ => {
                self.pos = None;
                return Some(Err(TrackFormatError::Truncated { offset }));
            }
        };
        if is_end_marker(remaining) {
            self.pos = None;
            return None;
        }
        let count = match CountField::from_bytes(remaining) {
            Some(count) if count.record_len() + END_MARKER.len() <= remaining.len() => count,
            _ => {
                self.pos = None;
                return Some(Err(TrackFormatError::Truncated { offset }));
            }
        };
        let key_start = COUNT_LEN;
        let data_start = key_start + usize::from(count.key_length);
        let data_end = data_start + usize::from(count.data_length);
        self.pos = Some(offset + count.record_len());
        Some(Ok(Record {
            offset,
            count,
            key: &remaining[key_start..data_start],
            data: &remaining[data_start..data_end],
        }))
    }
}

/// List the records of a track, starting with R0.
#[must_use]
pub fn records(track: &[u8]) -> TrackRecords<'_> {
    TrackRecords {
        track,
        pos: Some(R0_OFFSET),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn test_formatted_track() {
        let mut track = vec![0xAA_u8; 512];
        format_track(&mut track, 5, 3);
        assert_eq!(&track[..5], &[0, 0, 5, 0, 3]);
        assert_eq!(&track[5..13], &[0, 5, 0, 3, 0, 0, 0, 0]);
        assert!(is_end_marker(&track[13..]));
        assert!(track[17..].iter().all(|b| *b == 0));
        assert_eq!(
            HomeAddress::from_bytes(&track),
            Some(HomeAddress::new(5, 3))
        );

        let recs: Vec<_> = records(&track).collect();
        assert_eq!(recs.len(), 1);
        match &recs[0] {
            Ok(r0) => {
                assert_eq!(r0.offset, R0_OFFSET);
                assert_eq!(r0.count.id.record, 0);
                assert!(r0.data.is_empty());
            }
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_truncated_record() {
        let mut track = vec![0_u8; 64];
        format_track(&mut track, 0, 0);
        // Overwrite the end marker with a count field claiming far
        // more data than the track can hold.
        let bogus = CountField {
            id: RecordId {
                cylinder: 0,
                head: 0,
                record: 1,
            },
            key_length: 0,
            data_length: 1000,
        };
        track[13..21].copy_from_slice(&bogus.to_bytes());
        let result: Vec<_> = records(&track).collect();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1], Err(TrackFormatError::Truncated { offset: 13 }));
    }

    #[test]
    fn test_count_field_layout() {
        let c = CountField {
            id: RecordId {
                cylinder: 0x0102,
                head: 0x0304,
                record: 5,
            },
            key_length: 6,
            data_length: 0x0708,
        };
        assert_eq!(c.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(c.record_len(), 8 + 6 + 0x708);
        assert_eq!(CountField::from_bytes(&END_MARKER), None);
    }

    #[proptest]
    fn records_terminate_on_arbitrary_tracks(
        #[strategy(proptest::collection::vec(proptest::num::u8::ANY, 0..600))] track: Vec<u8>,
    ) {
        // Garbage on the track must yield an error or the end of the
        // iteration, never a panic or an endless sequence.
        let mut seen = 0;
        for item in records(&track) {
            seen += 1;
            assert!(seen <= track.len());
            if let Ok(record) = item {
                assert!(record.offset + record.count.record_len() <= track.len());
            }
        }
    }
}
