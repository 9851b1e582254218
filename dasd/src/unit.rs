//! Disk drives and their cached cylinder images.
use std::fmt::Debug;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::Duration;

use tracing::{event, Level};

use base::geometry::{DiskGeometry, DriveType, ROTATION_PERIOD};
use base::image::cylinder_offset;

use super::command::CommandCode;
use super::decoder::{Decoder, Step, TrackState};
use super::fault::{Fault, FaultKind};
use super::status::SenseBytes;

/// Anything which can hold a disk image.  Files are the usual
/// choice; tests use in-memory cursors.
pub trait BackingStore: Read + Write + Seek + Debug {}

impl<T: Read + Write + Seek + Debug> BackingStore for T {}

/// The cached image of one cylinder (all of its tracks), together
/// with the position decoder for the track under the selected head.
#[derive(Debug)]
pub struct TrackBuffer {
    image: Vec<u8>,
    track_size: usize,
    cylinder: Option<u16>,
    dirty: bool,
    pub(crate) decoder: Decoder,
}

impl TrackBuffer {
    fn unallocated() -> TrackBuffer {
        TrackBuffer {
            image: Vec::new(),
            track_size: 0,
            cylinder: None,
            dirty: false,
            decoder: Decoder::new(),
        }
    }

    fn allocate(geometry: &DiskGeometry) -> TrackBuffer {
        TrackBuffer {
            image: vec![0; geometry.cylinder_size()],
            track_size: geometry.track_size(),
            cylinder: None,
            dirty: false,
            decoder: Decoder::new(),
        }
    }

    #[must_use]
    pub fn cylinder(&self) -> Option<u16> {
        self.cylinder
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn flush(&mut self, store: &mut dyn BackingStore, geometry: &DiskGeometry) -> io::Result<()> {
        if let (true, Some(cylinder)) = (self.dirty, self.cylinder) {
            event!(Level::DEBUG, "writing back cylinder {}", cylinder);
            store.seek(SeekFrom::Start(cylinder_offset(geometry, cylinder)))?;
            store.write_all(&self.image)?;
            store.flush()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn load(
        &mut self,
        store: &mut dyn BackingStore,
        geometry: &DiskGeometry,
        cylinder: u16,
    ) -> io::Result<()> {
        if self.cylinder == Some(cylinder) {
            return Ok(());
        }
        self.flush(store, geometry)?;
        // If the read fails part-way, the buffer holds no cylinder.
        self.cylinder = None;
        store.seek(SeekFrom::Start(cylinder_offset(geometry, cylinder)))?;
        store.read_exact(&mut self.image)?;
        event!(Level::TRACE, "loaded cylinder {}", cylinder);
        self.cylinder = Some(cylinder);
        Ok(())
    }

    #[must_use]
    pub fn track(&self, head: u16) -> &[u8] {
        let start = usize::from(head) * self.track_size;
        self.image
            .get(start..start + self.track_size)
            .unwrap_or_default()
    }

    /// Mutable access to a track.  Marks the cylinder as needing to
    /// be written back.
    pub fn track_mut(&mut self, head: u16) -> &mut [u8] {
        self.dirty = true;
        let start = usize::from(head) * self.track_size;
        self.image
            .get_mut(start..start + self.track_size)
            .unwrap_or_default()
    }

    pub(crate) fn step(&mut self, head: u16) -> Step {
        let start = usize::from(head) * self.track_size;
        let track = self
            .image
            .get(start..start + self.track_size)
            .unwrap_or_default();
        self.decoder.step(track)
    }

    pub(crate) fn resync(&mut self, head: u16) -> Option<base::ckd::TrackFormatError> {
        let start = usize::from(head) * self.track_size;
        let track = self
            .image
            .get(start..start + self.track_size)
            .unwrap_or_default();
        self.decoder.resync(track)
    }

    fn advance(&mut self, head: u16, byte_times: u64) -> u64 {
        let start = usize::from(head) * self.track_size;
        let track = self
            .image
            .get(start..start + self.track_size)
            .unwrap_or_default();
        self.decoder.advance(track, byte_times)
    }

    #[must_use]
    pub fn byte_under_head(&self, head: u16) -> Option<u8> {
        let pos = self.decoder.cursor()?;
        self.track(head).get(pos).copied()
    }

    pub fn write_under_head(&mut self, head: u16, byte: u8) -> bool {
        match self.decoder.cursor() {
            Some(pos) => match self.track_mut(head).get_mut(pos) {
                Some(b) => {
                    *b = byte;
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}

/// State which lasts for one command chain.
#[derive(Debug, Default, Clone)]
pub(crate) struct ChainState {
    pub(crate) file_mask: u8,
    pub(crate) mask_set: bool,
    /// The previous command was a search which was satisfied.
    pub(crate) search_ok: bool,
    /// The last search compared fewer bytes than the field holds.
    pub(crate) short_search: bool,
    pub(crate) last_command: Option<CommandCode>,
}

/// A seek which has been started but has not completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SeekInProgress {
    pub(crate) cylinder: u16,
    pub(crate) head: u16,
    /// When the seek completes, the command is complete (rather than
    /// the drive raising attention).
    pub(crate) chained: bool,
}

#[derive(Debug)]
pub struct DriveUnit {
    pub(crate) address: u8,
    pub(crate) drive_type: DriveType,
    pub(crate) store: Option<Box<dyn BackingStore>>,
    pub(crate) highest_cylinder: u16,
    pub(crate) cylinder: u16,
    pub(crate) head: u16,
    pub(crate) track: TrackBuffer,
    pub(crate) sense: SenseBytes,
    pub(crate) chain: ChainState,
    pub(crate) seek: Option<SeekInProgress>,
    /// Simulated time at which the decoder's current position began.
    pub(crate) position_time: Duration,
}

fn intervention(address: u8, e: &io::Error) -> Fault {
    Fault::new(
        FaultKind::InterventionRequired,
        format!("I/O error on the image of unit {address:02X}: {e}"),
    )
}

impl DriveUnit {
    pub(crate) fn new(address: u8, drive_type: DriveType) -> DriveUnit {
        DriveUnit {
            address,
            drive_type,
            store: None,
            highest_cylinder: 0,
            cylinder: 0,
            head: 0,
            track: TrackBuffer::unallocated(),
            sense: SenseBytes::default(),
            chain: ChainState::default(),
            seek: None,
            position_time: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[must_use]
    pub fn drive_type(&self) -> DriveType {
        self.drive_type
    }

    #[must_use]
    pub fn geometry(&self) -> &'static DiskGeometry {
        self.drive_type.geometry()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    #[must_use]
    pub fn position(&self) -> (u16, u16) {
        (self.cylinder, self.head)
    }

    /// True when the last search compared fewer bytes than the
    /// recorded field holds.
    #[must_use]
    pub fn short_search(&self) -> bool {
        self.chain.short_search
    }

    #[must_use]
    pub fn sense(&self) -> SenseBytes {
        self.sense
    }

    #[must_use]
    pub fn track_state(&self) -> TrackState {
        self.track.decoder.state()
    }

    /// Take on a new medium, with the heads at cylinder 0 head 0.
    pub(crate) fn mount(
        &mut self,
        now: Duration,
        mut store: Box<dyn BackingStore>,
        highest_cylinder: u16,
    ) -> io::Result<()> {
        let geometry = self.geometry();
        let mut track = TrackBuffer::allocate(geometry);
        track.load(store.as_mut(), geometry, 0)?;
        self.track = track;
        self.store = Some(store);
        self.highest_cylinder = highest_cylinder;
        self.cylinder = 0;
        self.head = 0;
        self.seek = None;
        self.sense.clear();
        self.position_time = now;
        Ok(())
    }

    pub(crate) fn unmount(&mut self) -> Option<Box<dyn BackingStore>> {
        self.track = TrackBuffer::unallocated();
        self.seek = None;
        self.store.take()
    }

    pub(crate) fn flush(&mut self) -> Result<(), Fault> {
        let geometry = self.geometry();
        let address = self.address;
        match self.store.as_mut() {
            Some(store) => self
                .track
                .flush(store.as_mut(), geometry)
                .map_err(|e| intervention(address, &e)),
            None => Ok(()),
        }
    }

    /// Make sure the cylinder under the heads is in the track buffer.
    pub(crate) fn load_cylinder(&mut self, cylinder: u16) -> Result<(), Fault> {
        let geometry = self.geometry();
        let address = self.address;
        match self.store.as_mut() {
            Some(store) => self
                .track
                .load(store.as_mut(), geometry, cylinder)
                .map_err(|e| intervention(address, &e)),
            None => Err(Fault::new(
                FaultKind::InterventionRequired,
                format!("unit {address:02X} has no medium"),
            )),
        }
    }

    pub(crate) fn current_track(&self) -> &[u8] {
        self.track.track(self.head)
    }

    pub(crate) fn current_track_mut(&mut self) -> &mut [u8] {
        self.track.track_mut(self.head)
    }

    /// Bring the decoder up to date with the rotation of the disk,
    /// which has continued while nobody was watching.  The elapsed
    /// time is capped at `ROTATION_PERIOD` (`bytes_per_track` byte
    /// times).  A decoder pass over a track takes only its recorded
    /// fields plus the end-of-track settle, so the capped time may
    /// span several passes.
    pub(crate) fn catch_up(&mut self, now: Duration) {
        if !self.is_attached()
            || self.track.decoder.state() == TrackState::Seeking
            || now <= self.position_time
        {
            return;
        }
        let byte_time = self.geometry().byte_time();
        let elapsed = (now - self.position_time).min(ROTATION_PERIOD);
        let byte_times = (elapsed.as_nanos() / byte_time.as_nanos().max(1)) as u64;
        let left = self.track.advance(self.head, byte_times);
        // The byte times left over were spent in the current position.
        let consumed = (byte_times - left) as u32;
        self.position_time = now - elapsed + byte_time * consumed;
        event!(
            Level::TRACE,
            "caught up {} byte times, now at {:?}",
            byte_times - left,
            self.track.decoder.state()
        );
    }

    /// Delay until the decoder reaches its current position.
    pub(crate) fn delay_until_position(&self, now: Duration) -> Duration {
        self.position_time.saturating_sub(now)
    }

    pub(crate) fn latch_fault(&mut self, fault: &Fault) {
        let (byte0, byte1) = fault.kind.sense_bits();
        if byte0 != 0 || byte1 != 0 {
            self.sense.set(byte0, byte1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use base::ckd::HomeAddress;
    use base::image::format_image;

    fn formatted_unit(drive_type: DriveType) -> DriveUnit {
        let mut cursor = Cursor::new(Vec::new());
        format_image(&mut cursor, drive_type.geometry()).expect("format should succeed");
        let mut unit = DriveUnit::new(0x80, drive_type);
        unit.mount(
            Duration::ZERO,
            Box::new(cursor),
            drive_type.geometry().highest_cylinder(),
        )
        .expect("a formatted image can be mounted");
        unit
    }

    #[test]
    fn test_load_and_write_back() {
        let mut unit = formatted_unit(DriveType::Ibm2311);
        unit.load_cylinder(7).expect("cylinder 7 exists");
        unit.head = 2;
        assert_eq!(
            HomeAddress::from_bytes(unit.current_track()),
            Some(HomeAddress::new(7, 2))
        );
        assert!(!unit.track.is_dirty());
        unit.current_track_mut()[100] = 0x5A;
        assert!(unit.track.is_dirty());

        // Loading another cylinder writes the dirty one back first.
        unit.load_cylinder(8).expect("cylinder 8 exists");
        assert!(!unit.track.is_dirty());
        unit.load_cylinder(7).expect("cylinder 7 exists");
        assert_eq!(unit.current_track()[100], 0x5A);
    }

    #[test]
    fn test_unmounted_unit_needs_intervention() {
        let mut unit = DriveUnit::new(0x81, DriveType::Ibm2314);
        match unit.load_cylinder(0) {
            Err(f) => assert_eq!(f.kind, FaultKind::InterventionRequired),
            Ok(()) => panic!("a unit without medium cannot load a cylinder"),
        }
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut unit = formatted_unit(DriveType::Ibm2314);
        unit.load_cylinder(0).expect("cylinder 0 exists");
        let byte_time = unit.geometry().byte_time();
        // Index + 5 bytes of home address + 2 bytes of count.
        unit.catch_up(byte_time * 8);
        assert_eq!(unit.track_state(), TrackState::Count);
        assert_eq!(unit.track.decoder.field_offset(), 2);

        // A long idle period is cut down to one rotation period, and
        // leaves the decoder somewhere in its current position.
        let later = Duration::from_secs(3600);
        unit.catch_up(later);
        assert!(unit.position_time <= later);
        assert!(later - unit.position_time < byte_time * crate::decoder::END_OF_TRACK_SETTLE);
    }

    #[test]
    fn test_idle_time_is_cut_to_one_rotation_period() {
        // A formatted track is a few dozen byte times long, far less
        // than a rotation period, so both of these wrap the track many
        // times.  Only the first rotation period counts.
        let mut short = formatted_unit(DriveType::Ibm2314);
        let mut long = formatted_unit(DriveType::Ibm2314);
        short.catch_up(ROTATION_PERIOD);
        long.catch_up(ROTATION_PERIOD * 100);
        assert_eq!(short.track_state(), long.track_state());
        assert_eq!(
            short.track.decoder.field_offset(),
            long.track.decoder.field_offset()
        );
        assert_eq!(
            ROTATION_PERIOD - short.position_time,
            ROTATION_PERIOD * 100 - long.position_time
        );
    }
}
