//! The read commands.
use super::{Completion, Env, Operation, Progress, Started};
use crate::decoder::{Decoder, TrackState};
use crate::fault::Fault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadTarget {
    HomeAddress,
    /// Count, key and data of record zero.
    RecordZero,
    /// The next count field other than R0's.
    Count,
    Data,
    KeyAndData,
    /// The next record other than R0.
    CountKeyAndData,
}

#[derive(Debug)]
pub(crate) struct ReadOp {
    target: ReadTarget,
    begun: bool,
}

impl ReadOp {
    pub(super) fn started(target: ReadTarget) -> Started {
        Started::Positional(Operation::Read(ReadOp {
            target,
            begun: false,
        }))
    }

    pub(super) fn waiting(&self) -> bool {
        !self.begun
    }

    fn can_begin(&self, d: &Decoder) -> bool {
        match self.target {
            ReadTarget::HomeAddress => d.at_start_of(TrackState::HomeAddress),
            ReadTarget::RecordZero => d.at_start_of(TrackState::Count) && d.in_record_zero(),
            ReadTarget::Count | ReadTarget::CountKeyAndData => {
                d.at_start_of(TrackState::Count) && !d.in_record_zero()
            }
            ReadTarget::Data => d.at_start_of(TrackState::Data),
            ReadTarget::KeyAndData => {
                d.at_start_of(TrackState::Key)
                    || (d.at_start_of(TrackState::Data) && d.key_length() == 0)
            }
        }
    }

    fn final_field(&self) -> TrackState {
        match self.target {
            ReadTarget::HomeAddress => TrackState::HomeAddress,
            ReadTarget::Count => TrackState::Count,
            _ => TrackState::Data,
        }
    }

    pub(super) fn tick(&mut self, env: &mut Env) -> Result<Progress, Fault> {
        if !self.begun {
            if !self.can_begin(&env.unit.track.decoder) {
                return Ok(Progress::Continue);
            }
            self.begun = true;
        }
        if let Some(b) = env.unit.track.byte_under_head(env.unit.head) {
            // Once the channel has ended the rest of the field is
            // read but discarded.
            env.to_host(b)?;
        }
        let d = &env.unit.track.decoder;
        if d.state() != self.final_field() || !d.at_end_of_field() {
            return Ok(Progress::Continue);
        }
        let end_of_file = d.data_length() == 0
            && !d.in_record_zero()
            && matches!(
                self.target,
                ReadTarget::Data | ReadTarget::KeyAndData | ReadTarget::CountKeyAndData
            );
        Ok(Progress::Done(if end_of_file {
            Completion::end_of_file()
        } else {
            Completion::default()
        }))
    }
}
