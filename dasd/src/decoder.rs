//! The track position decoder.
//!
//! A CKD drive presents each field of a track only while the head is
//! over it.  The decoder models the rotation of one track as a state
//! machine which moves forward one byte time per [`Decoder::step`]:
//!
//! ```text
//! Index -> HomeAddress -> Count -> [Key] -> Data -> AddressMark -+
//!                 |          ^                                   |
//!                 |          +-----------------------------------+
//!                 v                                              v
//!            EndOfTrack  <---------------------------------  (end marker)
//!                 |
//!                 +--> Index
//! ```
//!
//! `Seeking` is entered when a seek starts and left (to `Index`) when
//! it completes; the decoder does not step while seeking.
//!
//! The decoder reads lengths from the track it is given at each step,
//! so a command which rewrites a count field changes how the rest of
//! the revolution is decoded.
use base::ckd::{
    is_end_marker, CountField, TrackFormatError, COUNT_LEN, END_MARKER, HOME_ADDRESS_LEN,
    R0_OFFSET,
};
use tracing::{event, Level};

/// Byte times spent at the end of the track before the index point
/// comes round again.
pub const END_OF_TRACK_SETTLE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackState {
    Index,
    HomeAddress,
    Count,
    Key,
    Data,
    AddressMark,
    EndOfTrack,
    Seeking,
}

/// The outcome of one step of the decoder.
#[derive(Debug, PartialEq, Eq)]
pub struct Step {
    /// The head just passed the index point (moved from `Index` to
    /// `HomeAddress`).
    pub passed_index: bool,
    /// The track data could not be decoded; the decoder has parked at
    /// `EndOfTrack`.
    pub error: Option<TrackFormatError>,
}

#[derive(Debug, Clone)]
pub struct Decoder {
    state: TrackState,
    /// Bytes of the current field which have already passed the head.
    field_offset: usize,
    /// Track offset of the current record's count field (or of the
    /// end marker, at `EndOfTrack`).
    record_start: usize,
    key_length: u8,
    data_length: u16,
    /// Toggles each time the decoder arrives at the index point.
    index_toggle: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new()
    }
}

impl Decoder {
    #[must_use]
    pub fn new() -> Decoder {
        Decoder {
            state: TrackState::Index,
            field_offset: 0,
            record_start: R0_OFFSET,
            key_length: 0,
            data_length: 0,
            index_toggle: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[must_use]
    pub fn field_offset(&self) -> usize {
        self.field_offset
    }

    #[must_use]
    pub fn record_start(&self) -> usize {
        self.record_start
    }

    /// Only meaningful once the count field has passed.
    #[must_use]
    pub fn key_length(&self) -> u8 {
        self.key_length
    }

    /// Only meaningful once the count field has passed.
    #[must_use]
    pub fn data_length(&self) -> u16 {
        self.data_length
    }

    #[must_use]
    pub fn index_toggle(&self) -> bool {
        self.index_toggle
    }

    #[must_use]
    pub fn in_record_zero(&self) -> bool {
        self.record_start == R0_OFFSET
    }

    /// True at the first byte time of `state`.
    #[must_use]
    pub fn at_start_of(&self, state: TrackState) -> bool {
        self.state == state && self.field_offset == 0
    }

    /// True when the byte under the head is the last one of the
    /// current field (or, for an empty data field, at its single
    /// byte time).
    #[must_use]
    pub fn at_end_of_field(&self) -> bool {
        let len = match self.state {
            TrackState::HomeAddress => HOME_ADDRESS_LEN,
            TrackState::Count => COUNT_LEN,
            TrackState::Key => usize::from(self.key_length),
            TrackState::Data => usize::from(self.data_length).max(1),
            _ => 1,
        };
        self.field_offset + 1 >= len
    }

    /// Track offset of the byte under the head, when the head is over
    /// a field holding data.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        match self.state {
            TrackState::HomeAddress => Some(self.field_offset),
            TrackState::Count => Some(self.record_start + self.field_offset),
            TrackState::Key => Some(self.record_start + COUNT_LEN + self.field_offset),
            TrackState::Data if self.data_length > 0 => Some(
                self.record_start + COUNT_LEN + usize::from(self.key_length) + self.field_offset,
            ),
            _ => None,
        }
    }

    /// Track offset at which the record following the current one
    /// starts.
    #[must_use]
    pub fn next_record_offset(&self) -> usize {
        self.record_start + COUNT_LEN + usize::from(self.key_length) + usize::from(self.data_length)
    }

    /// Number of byte times the decoder spends in its current
    /// position.
    #[must_use]
    pub fn occupancy(&self) -> u32 {
        match self.state {
            TrackState::EndOfTrack => END_OF_TRACK_SETTLE,
            _ => 1,
        }
    }

    pub fn begin_seek(&mut self) {
        self.state = TrackState::Seeking;
        self.field_offset = 0;
    }

    /// The seek is complete; the head is at the index point of the
    /// new track.
    pub fn arrive(&mut self) {
        self.state = TrackState::Index;
        self.field_offset = 0;
        self.index_toggle = !self.index_toggle;
    }

    /// Re-decode the record boundary at the current record's start
    /// offset.  Used after a command rewrites the track there.
    pub fn resync(&mut self, track: &[u8]) -> Option<TrackFormatError> {
        self.enter_record(track, self.record_start)
    }

    fn enter_record(&mut self, track: &[u8], offset: usize) -> Option<TrackFormatError> {
        self.record_start = offset;
        self.field_offset = 0;
        self.key_length = 0;
        self.data_length = 0;
        let remaining = track.get(offset..).unwrap_or_default();
        if remaining.len() >= END_MARKER.len() && is_end_marker(remaining) {
            self.state = TrackState::EndOfTrack;
            None
        } else if remaining.len() < COUNT_LEN + END_MARKER.len() {
            self.state = TrackState::EndOfTrack;
            Some(TrackFormatError::Truncated { offset })
        } else {
            self.state = TrackState::Count;
            None
        }
    }

    fn finish_count(&mut self, track: &[u8]) -> Option<TrackFormatError> {
        let offset = self.record_start;
        let count = track
            .get(offset..)
            .and_then(CountField::from_bytes)
            .filter(|c| offset + c.record_len() + END_MARKER.len() <= track.len());
        match count {
            Some(c) => {
                self.key_length = c.key_length;
                self.data_length = c.data_length;
                self.field_offset = 0;
                self.state = if c.key_length > 0 {
                    TrackState::Key
                } else {
                    TrackState::Data
                };
                None
            }
            None => {
                self.state = TrackState::EndOfTrack;
                self.field_offset = 0;
                Some(TrackFormatError::Truncated { offset })
            }
        }
    }

    /// Move forward by one position.
    pub fn step(&mut self, track: &[u8]) -> Step {
        let mut passed_index = false;
        let error = match self.state {
            TrackState::Seeking => None,
            TrackState::Index => {
                passed_index = true;
                self.state = TrackState::HomeAddress;
                self.field_offset = 0;
                None
            }
            TrackState::HomeAddress => {
                self.field_offset += 1;
                if self.field_offset >= HOME_ADDRESS_LEN {
                    self.enter_record(track, R0_OFFSET)
                } else {
                    None
                }
            }
            TrackState::Count => {
                self.field_offset += 1;
                if self.field_offset >= COUNT_LEN {
                    self.finish_count(track)
                } else {
                    None
                }
            }
            TrackState::Key => {
                self.field_offset += 1;
                if self.field_offset >= usize::from(self.key_length) {
                    self.state = TrackState::Data;
                    self.field_offset = 0;
                }
                None
            }
            TrackState::Data => {
                self.field_offset += 1;
                if self.field_offset >= usize::from(self.data_length) {
                    self.state = TrackState::AddressMark;
                    self.field_offset = 0;
                }
                None
            }
            TrackState::AddressMark => self.enter_record(track, self.next_record_offset()),
            TrackState::EndOfTrack => {
                self.state = TrackState::Index;
                self.field_offset = 0;
                self.index_toggle = !self.index_toggle;
                None
            }
        };
        Step {
            passed_index,
            error,
        }
    }

    /// Let `byte_times` byte times pass with nobody watching the
    /// track.  Returns the number of byte times left over (less than
    /// the occupancy of the final position).
    pub fn advance(&mut self, track: &[u8], byte_times: u64) -> u64 {
        let mut budget = byte_times;
        while self.state != TrackState::Seeking {
            let cost = u64::from(self.occupancy());
            if budget < cost {
                break;
            }
            budget -= cost;
            if let Some(e) = self.step(track).error {
                event!(Level::DEBUG, "undecodable track passed the head: {}", e);
            }
        }
        budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::ckd::{format_track, RecordId};
    use test_strategy::proptest;

    fn two_record_track() -> Vec<u8> {
        let mut track = vec![0_u8; 512];
        format_track(&mut track, 1, 2);
        let r1 = CountField {
            id: RecordId {
                cylinder: 1,
                head: 2,
                record: 1,
            },
            key_length: 3,
            data_length: 4,
        };
        let start = R0_OFFSET + COUNT_LEN;
        track[start..start + COUNT_LEN].copy_from_slice(&r1.to_bytes());
        let end = start + r1.record_len();
        track[end..end + 4].copy_from_slice(&END_MARKER);
        track
    }

    /// Step through one revolution from Index, recording each state.
    fn revolution(track: &[u8]) -> Vec<TrackState> {
        let mut d = Decoder::new();
        let mut states = vec![d.state()];
        loop {
            d.step(track);
            states.push(d.state());
            if d.state() == TrackState::Index {
                return states;
            }
        }
    }

    fn run_lengths(states: &[TrackState]) -> Vec<(TrackState, usize)> {
        let mut out: Vec<(TrackState, usize)> = Vec::new();
        for s in states {
            match out.last_mut() {
                Some((prev, n)) if prev == s => *n += 1,
                _ => out.push((*s, 1)),
            }
        }
        out
    }

    #[test]
    fn test_formatted_track_revolution() {
        let mut track = vec![0_u8; 512];
        format_track(&mut track, 0, 0);
        assert_eq!(
            run_lengths(&revolution(&track)),
            vec![
                (TrackState::Index, 1),
                (TrackState::HomeAddress, 5),
                (TrackState::Count, 8),
                (TrackState::Data, 1),
                (TrackState::AddressMark, 1),
                (TrackState::EndOfTrack, 1),
                (TrackState::Index, 1),
            ]
        );
    }

    #[test]
    fn test_keyed_record_revolution() {
        let track = two_record_track();
        assert_eq!(
            run_lengths(&revolution(&track)),
            vec![
                (TrackState::Index, 1),
                (TrackState::HomeAddress, 5),
                (TrackState::Count, 8),
                (TrackState::Data, 1),
                (TrackState::AddressMark, 1),
                (TrackState::Count, 8),
                (TrackState::Key, 3),
                (TrackState::Data, 4),
                (TrackState::AddressMark, 1),
                (TrackState::EndOfTrack, 1),
                (TrackState::Index, 1),
            ]
        );
    }

    #[test]
    fn test_cursor_follows_fields() {
        let track = two_record_track();
        let mut d = Decoder::new();
        let mut offsets = Vec::new();
        while d.state() != TrackState::EndOfTrack {
            if let Some(pos) = d.cursor() {
                offsets.push(pos);
            }
            d.step(&track);
        }
        // Every byte from the home address to the end of R1 passes
        // the head exactly once, in order.
        let expected: Vec<usize> = (0..(R0_OFFSET + COUNT_LEN + COUNT_LEN + 3 + 4)).collect();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_track_without_record_zero() {
        let mut track = vec![0_u8; 64];
        format_track(&mut track, 0, 0);
        track[R0_OFFSET..R0_OFFSET + 4].copy_from_slice(&END_MARKER);
        assert_eq!(
            run_lengths(&revolution(&track)),
            vec![
                (TrackState::Index, 1),
                (TrackState::HomeAddress, 5),
                (TrackState::EndOfTrack, 1),
                (TrackState::Index, 1),
            ]
        );
    }

    #[test]
    fn test_overlong_record_is_a_decode_error() {
        let mut track = vec![0_u8; 64];
        format_track(&mut track, 0, 0);
        // R0 claims 100 bytes of data on a 64-byte track.
        track[R0_OFFSET + 6..R0_OFFSET + 8].copy_from_slice(&100_u16.to_be_bytes());
        let mut d = Decoder::new();
        let mut errors = Vec::new();
        for _ in 0..(1 + 5 + 8) {
            if let Some(e) = d.step(&track).error {
                errors.push(e);
            }
        }
        assert_eq!(errors, vec![TrackFormatError::Truncated { offset: R0_OFFSET }]);
        assert_eq!(d.state(), TrackState::EndOfTrack);
    }

    #[test]
    fn test_index_toggle_and_passes() {
        let mut track = vec![0_u8; 512];
        format_track(&mut track, 0, 0);
        let mut d = Decoder::new();
        let before = d.index_toggle();
        let mut passes = 0;
        for _ in 0..40 {
            if d.step(&track).passed_index {
                passes += 1;
            }
        }
        // One revolution of a formatted track is 17 positions.
        assert_eq!(passes, 3);
        assert_eq!(d.index_toggle(), before);
    }

    #[test]
    fn test_end_of_track_settles() {
        let mut track = vec![0_u8; 512];
        format_track(&mut track, 0, 0);
        let mut d = Decoder::new();
        let mut total = 0_u32;
        loop {
            total += d.occupancy();
            d.step(&track);
            if d.state() == TrackState::Index {
                break;
            }
        }
        // index(1) + HA(5) + count(8) + empty data(1) + mark(1) + settle
        assert_eq!(total, 1 + 5 + 8 + 1 + 1 + END_OF_TRACK_SETTLE);
    }

    #[test]
    fn test_advance_catches_up() {
        let mut track = vec![0_u8; 512];
        format_track(&mut track, 0, 0);
        let mut d = Decoder::new();
        // Index(1) + HA(5) + 3 bytes of count.
        let left = d.advance(&track, 9);
        assert_eq!(left, 0);
        assert_eq!(d.state(), TrackState::Count);
        assert_eq!(d.field_offset(), 3);

        d.begin_seek();
        assert_eq!(d.advance(&track, 1000), 1000);
        assert_eq!(d.state(), TrackState::Seeking);
        d.arrive();
        assert_eq!(d.state(), TrackState::Index);
    }

    #[proptest]
    fn decoder_always_returns_to_index(
        #[strategy(proptest::collection::vec(proptest::num::u8::ANY, 16..600))] track: Vec<u8>,
    ) {
        let mut d = Decoder::new();
        let mut positions = 0_usize;
        loop {
            if let Some(pos) = d.cursor() {
                assert!(pos < track.len());
            }
            d.step(&track);
            positions += 1;
            if d.state() == TrackState::Index {
                break;
            }
            // Every position but Index and EndOfTrack consumes at
            // least one byte of the track.
            assert!(positions <= 2 * track.len() + 4);
        }
    }
}
