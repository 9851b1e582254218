//! Faults detected while executing channel commands.
//!
//! A fault never stops the simulation.  The command which hit it is
//! terminated, the drive's sense bytes describe what happened and the
//! host sees the result in the status word.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use super::status::*;

/// The kinds of fault the controller reports.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum FaultKind {
    /// No drive answered to the device address.
    Selection,
    /// Data chaining or a data-transfer command without a fresh
    /// address/count pair.
    Chaining,
    /// The channel addressed host memory which does not exist.
    NonExistentMemory,
    /// The file mask forbids the operation.
    WriteProtect,
    /// The command was issued out of the required order.
    Sequence,
    RecordNotFound,
    TrackOverrun,
    /// Malformed data on the track.
    DataCheck,
    /// The command is unsupported or its argument is malformed.
    CommandReject,
    /// The argument of a seek is outside the drive's geometry.
    InvalidSeek,
    /// The drive has no medium, or its backing store failed.
    InterventionRequired,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            FaultKind::Selection => "selection-error",
            FaultKind::Chaining => "chaining-error",
            FaultKind::NonExistentMemory => "non-existent-memory",
            FaultKind::WriteProtect => "write-protect",
            FaultKind::Sequence => "sequence-error",
            FaultKind::RecordNotFound => "record-not-found",
            FaultKind::TrackOverrun => "track-overrun",
            FaultKind::DataCheck => "data-check",
            FaultKind::CommandReject => "command-reject",
            FaultKind::InvalidSeek => "invalid-seek",
            FaultKind::InterventionRequired => "intervention-required",
        })
    }
}

impl FaultKind {
    #[must_use]
    pub const fn all_fault_kinds() -> [FaultKind; 11] {
        [
            FaultKind::Selection,
            FaultKind::Chaining,
            FaultKind::NonExistentMemory,
            FaultKind::WriteProtect,
            FaultKind::Sequence,
            FaultKind::RecordNotFound,
            FaultKind::TrackOverrun,
            FaultKind::DataCheck,
            FaultKind::CommandReject,
            FaultKind::InvalidSeek,
            FaultKind::InterventionRequired,
        ]
    }

    /// The condition bits posted when a command ends with this fault.
    #[must_use]
    pub fn status_bits(&self) -> u32 {
        match self {
            FaultKind::Selection => STATUS_SELECTION_ERROR,
            FaultKind::Chaining => STATUS_CHAINING_ERROR | STATUS_CHANNEL_END | STATUS_DEVICE_END,
            FaultKind::NonExistentMemory => {
                STATUS_NON_EXISTENT_MEMORY | STATUS_CHANNEL_END | STATUS_DEVICE_END
            }
            _ => STATUS_UNIT_CHECK | STATUS_CHANNEL_END | STATUS_DEVICE_END,
        }
    }

    /// The bits this fault sets in sense bytes 0 and 1.
    #[must_use]
    pub fn sense_bits(&self) -> (u8, u8) {
        match self {
            FaultKind::Selection | FaultKind::Chaining | FaultKind::NonExistentMemory => (0, 0),
            FaultKind::WriteProtect => (SENSE0_COMMAND_REJECT, SENSE1_FILE_PROTECTED),
            FaultKind::Sequence => (SENSE0_COMMAND_REJECT, SENSE1_INVALID_SEQUENCE),
            FaultKind::RecordNotFound => (0, SENSE1_NO_RECORD_FOUND),
            FaultKind::TrackOverrun => (0, SENSE1_TRACK_OVERRUN),
            FaultKind::DataCheck => (SENSE0_DATA_CHECK, SENSE1_DATA_CHECK_IN_COUNT),
            FaultKind::CommandReject => (SENSE0_COMMAND_REJECT, 0),
            FaultKind::InvalidSeek => (SENSE0_COMMAND_REJECT | SENSE0_SEEK_CHECK, 0),
            FaultKind::InterventionRequired => (SENSE0_INTERVENTION_REQUIRED, 0),
        }
    }
}

#[derive(Debug)]
pub struct UnknownFaultName(String);

impl Display for UnknownFaultName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "unknown fault name '{}'", self.0)
    }
}

impl Error for UnknownFaultName {}

impl TryFrom<&str> for FaultKind {
    type Error = UnknownFaultName;
    fn try_from(s: &str) -> Result<FaultKind, UnknownFaultName> {
        FaultKind::all_fault_kinds()
            .into_iter()
            .find(|k| k.to_string() == s)
            .ok_or_else(|| UnknownFaultName(s.to_owned()))
    }
}

/// A fault, with a description of the circumstances for the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new<S: Into<String>>(kind: FaultKind, message: S) -> Fault {
        Fault {
            kind,
            message: message.into(),
        }
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for Fault {}

#[test]
fn test_fault_kind_round_trip() {
    for orig_kind in FaultKind::all_fault_kinds() {
        let name = orig_kind.to_string();
        match FaultKind::try_from(name.as_str()) {
            Ok(k) => {
                assert_eq!(k, orig_kind);
            }
            Err(_) => {
                panic!("unable to round-trip fault kind {orig_kind:?}");
            }
        }
    }
    assert!(FaultKind::try_from("this is not a fault name").is_err());
}

#[test]
fn test_unit_check_faults_set_sense() {
    for kind in FaultKind::all_fault_kinds() {
        let unit_check = kind.status_bits() & STATUS_UNIT_CHECK != 0;
        let (b0, b1) = kind.sense_bits();
        // Exactly the faults which post unit check leave something
        // for the Sense command to report.
        assert_eq!(unit_check, b0 != 0 || b1 != 0, "{kind}");
    }
}
