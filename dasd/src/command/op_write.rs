//! The write commands and Erase.
//!
//! Write R0 and Write CKD format a record: the count field comes from
//! the host and an end marker is written after the record, so any
//! records which followed it are lost.  Write Data and Write Key and
//! Data update an existing record in place, keeping its lengths.
//!
//! Once the channel has ended, the rest of the field is filled with
//! zeros.
use tracing::{event, Level};

use base::ckd::{CountField, COUNT_LEN, END_MARKER, R0_OFFSET};

use super::{Completion, Env, Operation, Progress, Started};
use crate::decoder::{Decoder, TrackState};
use crate::fault::{Fault, FaultKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteTarget {
    HomeAddress,
    RecordZero,
    CountKeyAndData,
    Data,
    KeyAndData,
}

#[derive(Debug)]
pub(crate) struct WriteOp {
    target: WriteTarget,
    begun: bool,
}

fn overrun(offset: usize, len: usize, bytes_per_track: usize) -> Fault {
    Fault::new(
        FaultKind::TrackOverrun,
        format!(
            "record at offset {offset} needs {len} bytes and an end marker; the track holds {bytes_per_track}"
        ),
    )
}

/// Make room for a new record at `offset`: an empty count field
/// followed by the end marker.
fn open_record(env: &mut Env, offset: usize) -> Result<(), Fault> {
    let bytes_per_track = env.unit.geometry().bytes_per_track as usize;
    let end = offset + COUNT_LEN;
    if end + END_MARKER.len() > bytes_per_track {
        return Err(overrun(offset, COUNT_LEN, bytes_per_track));
    }
    let track = env.unit.current_track_mut();
    track[offset..end].fill(0);
    track[end..end + END_MARKER.len()].copy_from_slice(&END_MARKER);
    Ok(())
}

/// The count field at `offset` is complete; terminate the track after
/// the record it describes.
fn close_record(env: &mut Env, offset: usize) -> Result<(), Fault> {
    let bytes_per_track = env.unit.geometry().bytes_per_track as usize;
    let count = CountField::from_bytes(&env.unit.current_track()[offset..])
        .ok_or_else(|| overrun(offset, COUNT_LEN, bytes_per_track))?;
    let end = offset + count.record_len();
    if end + END_MARKER.len() > bytes_per_track {
        // Leave the track ending where the record would have begun.
        let head = env.unit.head;
        env.unit.current_track_mut()[offset..offset + END_MARKER.len()]
            .copy_from_slice(&END_MARKER);
        env.unit.track.resync(head);
        return Err(overrun(offset, count.record_len(), bytes_per_track));
    }
    env.unit.current_track_mut()[end..end + END_MARKER.len()].copy_from_slice(&END_MARKER);
    event!(
        Level::TRACE,
        "unit {:02X} formatted record {} at offset {}",
        env.unit.address(),
        count.id,
        offset
    );
    Ok(())
}

impl WriteOp {
    pub(super) fn started(target: WriteTarget) -> Started {
        Started::Positional(Operation::Write(WriteOp {
            target,
            begun: false,
        }))
    }

    pub(super) fn waiting(&self) -> bool {
        !self.begun
    }

    fn can_begin(&self, d: &Decoder) -> bool {
        match self.target {
            WriteTarget::HomeAddress => d.at_start_of(TrackState::HomeAddress),
            WriteTarget::RecordZero => {
                d.in_record_zero()
                    && (d.at_start_of(TrackState::Count) || d.state() == TrackState::EndOfTrack)
            }
            WriteTarget::CountKeyAndData => d.state() == TrackState::AddressMark,
            WriteTarget::Data => d.at_start_of(TrackState::Data),
            WriteTarget::KeyAndData => {
                d.at_start_of(TrackState::Key)
                    || (d.at_start_of(TrackState::Data) && d.key_length() == 0)
            }
        }
    }

    fn begin(&mut self, env: &mut Env) -> Result<(), Fault> {
        self.begun = true;
        match self.target {
            WriteTarget::RecordZero => {
                open_record(env, R0_OFFSET)?;
                let head = env.unit.head;
                if let Some(e) = env.unit.track.resync(head) {
                    return Err(Fault::new(FaultKind::DataCheck, e.to_string()));
                }
            }
            WriteTarget::CountKeyAndData => {
                // The decoder moves on to the new count field at the
                // next byte time.
                let offset = env.unit.track.decoder.next_record_offset();
                open_record(env, offset)?;
            }
            _ => (),
        }
        Ok(())
    }

    pub(super) fn tick(&mut self, env: &mut Env) -> Result<Progress, Fault> {
        if !self.begun {
            if !self.can_begin(&env.unit.track.decoder) {
                return Ok(Progress::Continue);
            }
            self.begin(env)?;
        }
        let head = env.unit.head;
        if env.unit.track.decoder.cursor().is_some() {
            let b = env.from_host()?.unwrap_or(0);
            env.unit.track.write_under_head(head, b);
        }
        let d = &env.unit.track.decoder;
        let (state, at_end) = (d.state(), d.at_end_of_field());
        let record_start = d.record_start();
        match (self.target, state) {
            (WriteTarget::HomeAddress, TrackState::HomeAddress) if at_end => {
                Ok(Progress::Done(Completion::default()))
            }
            (WriteTarget::RecordZero | WriteTarget::CountKeyAndData, TrackState::Count)
                if at_end =>
            {
                close_record(env, record_start)?;
                Ok(Progress::Continue)
            }
            (_, TrackState::Data) if at_end => Ok(Progress::Done(Completion::default())),
            _ => Ok(Progress::Continue),
        }
    }
}

/// Erase the rest of the track, from the record after the one just
/// written.
#[derive(Debug, Default)]
pub(crate) struct EraseOp {
    done: bool,
}

impl EraseOp {
    pub(super) fn waiting(&self) -> bool {
        !self.done
    }

    pub(super) fn tick(&mut self, env: &mut Env) -> Result<Progress, Fault> {
        let d = &env.unit.track.decoder;
        let (boundary, resync) = if d.state() == TrackState::AddressMark {
            (d.next_record_offset(), false)
        } else if d.at_start_of(TrackState::Count) {
            (d.record_start(), true)
        } else {
            return Ok(Progress::Continue);
        };
        let track = env.unit.current_track_mut();
        let end = boundary + END_MARKER.len();
        if end > track.len() {
            return Err(overrun(boundary, 0, track.len()));
        }
        track[boundary..end].copy_from_slice(&END_MARKER);
        track[end..].fill(0);
        if resync {
            let head = env.unit.head;
            env.unit.track.resync(head);
        }
        event!(
            Level::TRACE,
            "unit {:02X} erased track from offset {}",
            env.unit.address(),
            boundary
        );
        self.done = true;
        Ok(Progress::Done(Completion::default()))
    }
}
