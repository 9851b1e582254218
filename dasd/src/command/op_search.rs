//! The search commands.
//!
//! A search latches its argument from the channel when it starts and
//! then compares the argument with each matching field as the field
//! passes under the head, one byte per byte time.  The outcome of a
//! comparison is decided by the first byte which differs.
use std::cmp::Ordering;

use tracing::{event, Level};

use base::ckd::{HOME_ADDRESS_LEN, RECORD_ID_LEN};

use super::{Completion, Env, Operation, Progress, Started};
use crate::decoder::TrackState;
use crate::fault::{Fault, FaultKind};

const KEY_ARGUMENT_LIMIT: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchField {
    /// The cylinder and head of the home address (not its flag byte).
    HomeAddress,
    /// The record identifier at the front of each count field.
    Id,
    Key,
}

/// How the recorded field must compare with the argument for the
/// search to be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Equal,
    High,
    EqualOrHigh,
}

impl Comparison {
    fn satisfied_by(self, recorded: Ordering) -> bool {
        match self {
            Comparison::Equal => recorded == Ordering::Equal,
            Comparison::High => recorded == Ordering::Greater,
            Comparison::EqualOrHigh => recorded != Ordering::Less,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SearchOp {
    field: SearchField,
    comparison: Comparison,
    argument: Vec<u8>,
    /// Result of comparing the part of the current field seen so far.
    ordering: Ordering,
}

impl SearchField {
    fn len(self) -> usize {
        match self {
            SearchField::HomeAddress => HOME_ADDRESS_LEN - 1,
            SearchField::Id => RECORD_ID_LEN,
            SearchField::Key => KEY_ARGUMENT_LIMIT,
        }
    }
}

pub(super) fn start(
    env: &mut Env,
    field: SearchField,
    comparison: Comparison,
) -> Result<Started, Fault> {
    let argument = env.argument(field.len())?;
    if argument.is_empty() {
        return Err(Fault::new(
            FaultKind::CommandReject,
            "search command supplied no argument",
        ));
    }
    env.unit.chain.short_search = field != SearchField::Key && argument.len() < field.len();
    event!(
        Level::TRACE,
        "unit {:02X} searching {:?} {:?} {:02X?}",
        env.unit.address(),
        field,
        comparison,
        argument
    );
    Ok(Started::Positional(Operation::Search(SearchOp {
        field,
        comparison,
        argument,
        ordering: Ordering::Equal,
    })))
}

impl SearchOp {
    /// The index into the argument of the byte under the head, and the
    /// number of bytes which take part in this comparison.
    fn position(&self, env: &Env) -> Option<(usize, usize)> {
        let decoder = &env.unit.track.decoder;
        let offset = decoder.field_offset();
        let (i, compared) = match (self.field, decoder.state()) {
            // Skip the flag byte.
            (SearchField::HomeAddress, TrackState::HomeAddress) if offset >= 1 => {
                (offset - 1, self.argument.len())
            }
            (SearchField::Id, TrackState::Count) => (offset, self.argument.len()),
            (SearchField::Key, TrackState::Key) => (
                offset,
                self.argument.len().min(usize::from(decoder.key_length())),
            ),
            _ => return None,
        };
        (i < compared).then_some((i, compared))
    }

    pub(super) fn tick(&mut self, env: &mut Env) -> Result<Progress, Fault> {
        let Some((i, compared)) = self.position(env) else {
            return Ok(Progress::Continue);
        };
        let recorded = env.unit.track.byte_under_head(env.unit.head).unwrap_or(0);
        if i == 0 {
            self.ordering = Ordering::Equal;
            if self.field == SearchField::Key {
                env.unit.chain.short_search =
                    self.argument.len() < usize::from(env.unit.track.decoder.key_length());
            }
        }
        if self.ordering == Ordering::Equal {
            self.ordering = recorded.cmp(&self.argument[i]);
        }
        if i + 1 < compared {
            return Ok(Progress::Continue);
        }
        if self.comparison.satisfied_by(self.ordering) {
            event!(
                Level::TRACE,
                "unit {:02X} search satisfied ({:?}) at record offset {}",
                env.unit.address(),
                self.ordering,
                env.unit.track.decoder.record_start()
            );
            env.unit.chain.search_ok = true;
            Ok(Progress::Done(Completion::modified()))
        } else {
            Ok(Progress::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparisons() {
        use Ordering::*;
        assert!(Comparison::Equal.satisfied_by(Equal));
        assert!(!Comparison::Equal.satisfied_by(Greater));
        assert!(Comparison::High.satisfied_by(Greater));
        assert!(!Comparison::High.satisfied_by(Equal));
        assert!(Comparison::EqualOrHigh.satisfied_by(Equal));
        assert!(Comparison::EqualOrHigh.satisfied_by(Greater));
        assert!(!Comparison::EqualOrHigh.satisfied_by(Less));
    }
}
